//! DOM 上のチャット画面
//!
//! ```text
//! #messagesContainer
//!   div.message.user        ─ div.message-content + div.message-avatar
//!   div.message.assistant   ─ div.message-avatar + div.message-content
//! ```

use chat_render::MessageView;
use chat_session::ChatView;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;
use web_sys::{Document, Element};

use crate::console;

/// 最初のメッセージを追加するときに消す案内表示
const WELCOME_SELECTOR: &str = ".welcome-message";

/// ローディング表示・設定パネルの表示状態を表すクラス
const ACTIVE_CLASS: &str = "active";

/// 画面を構成する要素の id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementIds {
    pub messages_container: String,
    pub send_button: String,
    pub loading: String,
    pub settings_panel: String,
}

impl Default for ElementIds {
    fn default() -> Self {
        ElementIds {
            messages_container: String::from("messagesContainer"),
            send_button: String::from("sendButton"),
            loading: String::from("loading"),
            settings_panel: String::from("settingsPanel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sender {
    User,
    Assistant,
}

impl Sender {
    fn class_name(&self) -> &'static str {
        match self {
            Sender::User => "message user",
            Sender::Assistant => "message assistant",
        }
    }

    fn avatar(&self) -> &'static str {
        match self {
            Sender::User => r#"<i class="fas fa-user"></i>"#,
            Sender::Assistant => r#"<i class="fas fa-robot"></i>"#,
        }
    }
}

/// [`ChatView`] の DOM 実装
///
/// メッセージ一覧のコンテナは必須。送信ボタン・ローディング表示・
/// 設定パネルは見つからなければ無視する。
pub struct DomChatView {
    document: Document,
    messages: Element,
    send_button: Option<Element>,
    loading: Option<Element>,
    settings_panel: Option<Element>,
}

impl DomChatView {
    /// 現在のページから要素を取得する
    ///
    /// # エラー
    /// - `document` が無い（Worker など）
    /// - メッセージ一覧のコンテナが見つからない
    pub fn from_document(ids: &ElementIds) -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("No document available"))?;
        let messages = document
            .get_element_by_id(&ids.messages_container)
            .ok_or_else(|| {
                JsValue::from_str(&format!("Element #{} not found", ids.messages_container))
            })?;

        let lookup = |id: &str| {
            let element = document.get_element_by_id(id);
            if element.is_none() {
                console::warn(&format!("Element #{} not found, ignoring", id));
            }
            element
        };
        let send_button = lookup(&ids.send_button);
        let loading = lookup(&ids.loading);
        let settings_panel = lookup(&ids.settings_panel);

        Ok(DomChatView {
            document,
            messages,
            send_button,
            loading,
            settings_panel,
        })
    }

    /// メッセージ 1 件分の要素を追加し、本文要素を返す
    fn append_message(&self, sender: Sender) -> Result<Element, JsValue> {
        if self.messages.query_selector(WELCOME_SELECTOR)?.is_some() {
            self.messages.set_inner_html("");
        }

        let message = self.document.create_element("div")?;
        message.set_class_name(sender.class_name());

        let avatar = self.document.create_element("div")?;
        avatar.set_class_name("message-avatar");
        avatar.set_inner_html(sender.avatar());

        let content = self.document.create_element("div")?;
        content.set_class_name("message-content");

        match sender {
            Sender::User => {
                message.append_child(&content)?;
                message.append_child(&avatar)?;
            }
            Sender::Assistant => {
                message.append_child(&avatar)?;
                message.append_child(&content)?;
            }
        }
        self.messages.append_child(&message)?;
        Ok(content)
    }

    fn append_or_log(&self, sender: Sender) -> Option<Element> {
        match self.append_message(sender) {
            Ok(content) => Some(content),
            Err(err) => {
                console::error(&format!("Failed to add message: {:?}", err));
                None
            }
        }
    }
}

impl ChatView for DomChatView {
    type Message = DomMessage;

    fn push_user_message(&mut self, markup: &str) {
        if let Some(content) = self.append_or_log(Sender::User) {
            content.set_inner_html(markup);
        }
        scroll_to_end(&self.messages);
    }

    fn open_assistant_message(&mut self) -> DomMessage {
        let content = self.append_or_log(Sender::Assistant);
        scroll_to_end(&self.messages);
        DomMessage {
            container: self.messages.clone(),
            content,
        }
    }

    fn push_error_message(&mut self, text: &str) {
        if let Some(content) = self.append_or_log(Sender::Assistant) {
            content.set_text_content(Some(text));
        }
        scroll_to_end(&self.messages);
    }

    fn set_busy(&mut self, busy: bool) {
        if let Some(button) = &self.send_button {
            let result = if busy {
                button.set_attribute("disabled", "")
            } else {
                button.remove_attribute("disabled")
            };
            if let Err(err) = result {
                console::warn(&format!("Failed to update send button: {:?}", err));
            }
        }
        if let Some(loading) = &self.loading {
            toggle_active(loading, busy);
        }
    }

    fn set_settings_open(&mut self, open: bool) {
        if let Some(panel) = &self.settings_panel {
            toggle_active(panel, open);
        }
    }
}

/// アシスタント発言 1 件分の `.message-content` 要素
///
/// 要素の作成に失敗した場合は描画を捨てる（累積マークアップは
/// セッション側に残る）。
pub struct DomMessage {
    container: Element,
    content: Option<Element>,
}

impl MessageView for DomMessage {
    fn append_markup(&mut self, markup: &str) {
        if let Some(content) = &self.content {
            if let Err(err) = content.insert_adjacent_html("beforeend", markup) {
                console::warn(&format!("Failed to append markup: {:?}", err));
            }
        }
    }

    fn replace_markup(&mut self, markup: &str) {
        if let Some(content) = &self.content {
            content.set_inner_html(markup);
        }
    }

    fn scroll_to_end(&mut self) {
        scroll_to_end(&self.container);
    }
}

fn scroll_to_end(container: &Element) {
    container.set_scroll_top(container.scroll_height());
}

fn toggle_active(element: &Element, active: bool) {
    if let Err(err) = element.class_list().toggle_with_force(ACTIVE_CLASS, active) {
        console::warn(&format!("Failed to toggle class: {:?}", err));
    }
}
