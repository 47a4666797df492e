//! セッションの出力ポート

use alloc::string::String;
use alloc::vec::Vec;

use chat_render::{BufferView, MessageView};

/// セッションが描画を指示する先
///
/// ブラウザではメッセージ一覧のコンテナ・送信ボタン・ローディング表示・
/// 設定パネルを束ねた DOM 実装（`chat-wasm`）が使われる。
pub trait ChatView {
    /// アシスタント発言 1 件分の描画先
    type Message: MessageView;

    /// ユーザー発言を追加する（変換済みマークアップ）
    fn push_user_message(&mut self, markup: &str);

    /// 空のアシスタント発言を追加し、その描画先を返す
    fn open_assistant_message(&mut self) -> Self::Message;

    /// エラーをアシスタント発言の体裁でプレーンテキストとして追加する
    fn push_error_message(&mut self, text: &str);

    /// 送信中表示の切り替え（送信ボタンの無効化・ローディング表示）
    fn set_busy(&mut self, busy: bool);

    /// 設定パネルの開閉
    fn set_settings_open(&mut self, open: bool);
}

/// [`MemoryChatView`] が記録する描画指示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    UserMessage(String),
    AssistantOpened,
    ErrorMessage(String),
    Busy(bool),
    SettingsOpen(bool),
}

/// 描画指示を記録するだけのビュー
///
/// アシスタント発言の中身は [`BufferView`] に書かれ、
/// `ChatSession::rendered` で参照できる。
#[derive(Debug, Clone, Default)]
pub struct MemoryChatView {
    events: Vec<ViewEvent>,
}

impl MemoryChatView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ViewEvent] {
        &self.events
    }

    /// 記録をすべて取り出す
    pub fn take_events(&mut self) -> Vec<ViewEvent> {
        core::mem::take(&mut self.events)
    }

    /// 表示されたエラーメッセージ
    pub fn error_messages(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|event| match event {
            ViewEvent::ErrorMessage(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// 最後に指示された送信中表示
    pub fn is_busy(&self) -> bool {
        self.events
            .iter()
            .rev()
            .find_map(|event| match event {
                ViewEvent::Busy(busy) => Some(*busy),
                _ => None,
            })
            .unwrap_or(false)
    }
}

impl ChatView for MemoryChatView {
    type Message = BufferView;

    fn push_user_message(&mut self, markup: &str) {
        self.events.push(ViewEvent::UserMessage(String::from(markup)));
    }

    fn open_assistant_message(&mut self) -> BufferView {
        self.events.push(ViewEvent::AssistantOpened);
        BufferView::new()
    }

    fn push_error_message(&mut self, text: &str) {
        self.events.push(ViewEvent::ErrorMessage(String::from(text)));
    }

    fn set_busy(&mut self, busy: bool) {
        self.events.push(ViewEvent::Busy(busy));
    }

    fn set_settings_open(&mut self, open: bool) {
        self.events.push(ViewEvent::SettingsOpen(open));
    }
}
