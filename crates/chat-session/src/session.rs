//! 送信状態機械
//!
//! 1 回の送信（ターン）ごとに新しい [`StreamFrameDecoder`] と
//! [`IncrementalRenderer`] を作り、トランスポートからの通知で状態を進める。
//! 時刻は常に呼び出し側から `now_ms`（`Date.now()`）として注入する。

use alloc::format;

use chat_render::{format_message, IncrementalRenderer, MessageView, RenderedMessage};
use chat_stream::{DecoderStats, StreamEvent, StreamFrameDecoder};
use serde::Serialize;

use crate::api::{ChatReply, ChatRequest, ErrorBody, OutgoingRequest, TurnId};
use crate::config::{ChatConfig, ChatSettings, Endpoint};
use crate::error::{ChatError, ConfigError, TransportFailure};
use crate::view::ChatView;

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    /// まだ一度も送信していない
    Idle,
    /// リクエスト送信済み、応答ヘッダー（または一括応答の本文）待ち
    Sending,
    /// ストリームを読み取り中
    Streaming,
    /// 直前の送信が正常に完了した
    Done,
    /// 直前の送信が失敗した（エラーメッセージ表示済み）
    Failed,
}

impl ChatPhase {
    /// 送信が進行中か（次の送信を受け付けない）
    pub fn is_active(&self) -> bool {
        matches!(self, ChatPhase::Sending | ChatPhase::Streaming)
    }

    /// 直前の送信が終わった状態か
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatPhase::Done | ChatPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatPhase::Idle => "idle",
            ChatPhase::Sending => "sending",
            ChatPhase::Streaming => "streaming",
            ChatPhase::Done => "done",
            ChatPhase::Failed => "failed",
        }
    }
}

/// 応答の受け取り方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// `/api/chat/stream`：delta を逐次追記する
    Streaming,
    /// `/api/chat`：`{reply}` を一括で描画する
    Complete,
}

impl ResponseMode {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            ResponseMode::Streaming => Endpoint::ChatStream,
            ResponseMode::Complete => Endpoint::Chat,
        }
    }
}

/// 応答ヘッダー受信後に呼び出し側が行うべきこと
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    /// body の ReadableStream を読み、チャンクごとに `on_chunk` を呼ぶ
    ReadStream,
    /// body 全体を読み、`on_reply_body` を呼ぶ
    ReadReply,
    /// body 全体を読み、`on_error_body` を呼ぶ
    ReadError,
    /// この応答はもう不要（タイムアウト済み・破棄済み）
    Discard,
}

/// `on_chunk` の後に読み取りを続けるかどうか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// 読み取りを打ち切り、リクエストを中断する
    Stop,
}

/// セッション統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// 受け付けた送信数
    pub sends: u64,
    /// 正常に完了した送信数
    pub completed: u64,
    /// 失敗した送信数（タイムアウトを含む）
    pub failed: u64,
    /// タイムアウトした送信数
    pub timeouts: u64,
    /// 直前に完了した送信の所要時間（ミリ秒）
    pub last_latency_ms: Option<u64>,
    /// 現在（または直前）のターンのデコーダ統計
    pub decoder: DecoderStats,
}

/// 1 回の送信分の状態
struct Turn<M: MessageView> {
    id: TurnId,
    mode: ResponseMode,
    decoder: StreamFrameDecoder,
    renderer: IncrementalRenderer<M>,
    started_ms: u64,
    deadline_ms: u64,
    /// 応答ヘッダーの HTTP ステータス
    status: Option<u16>,
}

/// チャットセッション
///
/// 入力ポート（`on_send` / `on_settings_toggle`）とトランスポートからの通知を受け、
/// 出力ポート [`ChatView`] に描画を指示する。
///
/// ## スレッド安全性
///
/// WASM はシングルスレッドのため、ロックは持たない。
/// 呼び出し側は非同期の読み取りループをまたいで借用を保持しないこと。
pub struct ChatSession<V: ChatView> {
    config: ChatConfig,
    settings: ChatSettings,
    view: V,
    phase: ChatPhase,
    turn: Option<Turn<V::Message>>,
    /// 最後に払い出したターン識別子
    last_turn: TurnId,
    settings_open: bool,
    last_error: Option<ChatError>,
    stats: SessionStats,
}

impl<V: ChatView> ChatSession<V> {
    /// セッションを生成する
    ///
    /// # エラー
    /// - 設定値が不正（タイムアウト 0、範囲外の max_tokens / temperature）
    pub fn new(config: ChatConfig, view: V) -> Result<Self, ConfigError> {
        config.validate()?;
        let settings = config.settings()?;
        Ok(ChatSession {
            config,
            settings,
            view,
            phase: ChatPhase::Idle,
            turn: None,
            last_turn: TurnId::NONE,
            settings_open: false,
            last_error: None,
            stats: SessionStats::default(),
        })
    }

    // ===== 入力ポート =====

    /// ユーザー入力を送信する
    ///
    /// ユーザー発言と空のアシスタント発言を描画し、送信中表示に切り替え、
    /// 呼び出し側が発行すべき HTTP リクエストを返す。
    ///
    /// # 引数
    /// - `input`: 入力欄の内容（前後の空白は除去する）
    /// - `mode`: ストリーミングか一括応答か
    /// - `now_ms`: 現在時刻（タイムアウトの起点）
    ///
    /// # 戻り値
    /// - `Ok(Some(request))`: 送信すべきリクエスト
    /// - `Ok(None)`: 入力が空なので何もしない
    ///
    /// # エラー
    /// - `ChatError::Busy`: 前回の送信が進行中
    /// - `ChatError::Encode`: 本文の JSON 化に失敗
    pub fn on_send(
        &mut self,
        input: &str,
        mode: ResponseMode,
        now_ms: u64,
    ) -> Result<Option<OutgoingRequest>, ChatError> {
        let message = input.trim();
        if message.is_empty() {
            return Ok(None);
        }
        if self.phase.is_active() {
            return Err(ChatError::Busy);
        }

        let endpoint = mode.endpoint();
        let body = serde_json::to_string(&ChatRequest::new(message, &self.settings))
            .map_err(|e| ChatError::Encode(format!("{}", e)))?;

        self.view.push_user_message(&format_message(message));
        self.view.set_busy(true);
        let message_view = self.view.open_assistant_message();

        let id = self.last_turn.next();
        self.last_turn = id;
        self.turn = Some(Turn {
            id,
            mode,
            decoder: StreamFrameDecoder::new(),
            renderer: IncrementalRenderer::new(message_view),
            started_ms: now_ms,
            deadline_ms: now_ms.saturating_add(self.config.timeout_ms),
            status: None,
        });
        self.phase = ChatPhase::Sending;
        self.last_error = None;
        self.stats.sends += 1;

        Ok(Some(OutgoingRequest {
            turn: id,
            endpoint,
            url: self.config.url(endpoint),
            body,
        }))
    }

    /// 設定パネルの開閉を切り替える
    ///
    /// # 戻り値
    /// 切り替え後に開いているかどうか
    pub fn on_settings_toggle(&mut self) -> bool {
        self.settings_open = !self.settings_open;
        self.view.set_settings_open(self.settings_open);
        self.settings_open
    }

    /// 次回以降の送信の temperature を変更する
    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        self.settings.set_temperature(temperature)
    }

    /// 次回以降の送信の max_tokens を変更する
    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<(), ConfigError> {
        self.settings.set_max_tokens(max_tokens)
    }

    // ===== トランスポートからの通知 =====
    //
    // いずれも `turn` が現在の送信と一致しない通知（破棄・リセット済みの
    // 送信からの遅れた通知）は無視する。

    /// 応答ヘッダーを受信した
    pub fn on_response_head(&mut self, turn: TurnId, status: u16, now_ms: u64) -> ResponseAction {
        if !self.is_current(turn) || self.phase != ChatPhase::Sending || self.expire(now_ms) {
            return ResponseAction::Discard;
        }
        let Some(turn) = self.turn.as_mut() else {
            return ResponseAction::Discard;
        };

        turn.status = Some(status);
        if !(200..300).contains(&status) {
            return ResponseAction::ReadError;
        }

        match turn.mode {
            ResponseMode::Streaming => {
                self.phase = ChatPhase::Streaming;
                ResponseAction::ReadStream
            }
            ResponseMode::Complete => ResponseAction::ReadReply,
        }
    }

    /// ストリームのチャンクを受信した
    ///
    /// 完結したフレームの delta を描画する。不正なフレームは黙って捨てる。
    /// `event: error` フレームを受け取った場合は送信を失敗させる。
    pub fn on_chunk(&mut self, turn: TurnId, chunk: &[u8], now_ms: u64) -> Flow {
        if !self.is_current(turn) || self.phase != ChatPhase::Streaming || self.expire(now_ms) {
            return Flow::Stop;
        }
        let Some(turn) = self.turn.as_mut() else {
            return Flow::Stop;
        };

        let mut server_error = None;
        for event in turn.decoder.feed_events(chunk) {
            match event {
                StreamEvent::Delta(text) => turn.renderer.append(&text),
                StreamEvent::Error(message) => {
                    server_error = Some(message);
                    break;
                }
                StreamEvent::Start | StreamEvent::End => {}
            }
        }

        match server_error {
            Some(message) => {
                self.fail(ChatError::Server {
                    status: None,
                    message: Some(message),
                });
                Flow::Stop
            }
            None => Flow::Continue,
        }
    }

    /// ストリームが終端に達した（トランスポートが閉じた）
    ///
    /// 区切りで終わっていない末尾は破棄する。
    pub fn on_stream_end(&mut self, turn: TurnId, now_ms: u64) {
        if !self.is_current(turn) || self.phase != ChatPhase::Streaming {
            return;
        }
        if let Some(turn) = self.turn.as_mut() {
            turn.decoder.finish();
        }
        self.complete(now_ms);
    }

    /// 一括応答（`/api/chat`、2xx）の本文を受信した
    pub fn on_reply_body(&mut self, turn: TurnId, body: &[u8], now_ms: u64) {
        let awaiting = self.is_current(turn)
            && self.phase == ChatPhase::Sending
            && self
                .turn
                .as_ref()
                .is_some_and(|turn| turn.mode == ResponseMode::Complete && turn.status.is_some());
        if !awaiting || self.expire(now_ms) {
            return;
        }

        let reply: ChatReply = serde_json::from_slice(body).unwrap_or_default();
        match reply.reply {
            Some(content) => {
                if let Some(turn) = self.turn.as_mut() {
                    turn.renderer.render_complete(&content);
                }
                self.complete(now_ms);
            }
            None => {
                let status = self.turn.as_ref().and_then(|turn| turn.status);
                self.fail(ChatError::Server {
                    status,
                    message: reply.error,
                });
            }
        }
    }

    /// 非 2xx 応答の本文を受信した（本文が読めなかった場合は空スライスでよい）
    pub fn on_error_body(&mut self, turn: TurnId, body: &[u8]) {
        if !self.is_current(turn) {
            return;
        }
        let status = self.turn.as_ref().and_then(|turn| turn.status);
        self.fail(ChatError::Server {
            status,
            message: ErrorBody::message_from(body),
        });
    }

    /// fetch / 読み取りが例外で失敗した
    pub fn on_transport_error(&mut self, turn: TurnId, failure: TransportFailure) {
        if !self.is_current(turn) {
            return;
        }
        let err = match failure {
            TransportFailure::Aborted => ChatError::Timeout,
            TransportFailure::Network(cause) => ChatError::Network(cause),
        };
        self.fail(err);
    }

    /// 期限を過ぎていれば送信をタイムアウトで失敗させる
    ///
    /// タイマー発火時に呼ぶ。`true` を返したら呼び出し側は
    /// リクエストを中断（`AbortController::abort`）して読み取りを解放すること。
    pub fn expire(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms() {
            Some(deadline) if now_ms >= deadline => {
                self.fail(ChatError::Timeout);
                true
            }
            _ => false,
        }
    }

    /// 進行中の送信を破棄して初期状態に戻す（エラーは表示しない）
    pub fn reset(&mut self) {
        if self.phase.is_active() {
            self.view.set_busy(false);
        }
        self.turn = None;
        self.phase = ChatPhase::Idle;
    }

    // ===== 参照 =====

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    /// 送信が進行中か
    pub fn is_busy(&self) -> bool {
        self.phase.is_active()
    }

    /// 現在（または直前）の送信の識別子
    pub fn current_turn(&self) -> Option<TurnId> {
        self.turn.as_ref().map(|turn| turn.id)
    }

    /// 進行中の送信の期限（ミリ秒）
    pub fn deadline_ms(&self) -> Option<u64> {
        if !self.phase.is_active() {
            return None;
        }
        self.turn.as_ref().map(|turn| turn.deadline_ms)
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn is_settings_open(&self) -> bool {
        self.settings_open
    }

    /// 直前の送信のエラー
    pub fn last_error(&self) -> Option<&ChatError> {
        self.last_error.as_ref()
    }

    /// 現在（または直前）のアシスタント発言のマークアップ
    pub fn rendered(&self) -> Option<&RenderedMessage> {
        self.turn.as_ref().map(|turn| turn.renderer.message())
    }

    /// 現在（または直前）のアシスタント発言の描画先
    pub fn message_view(&self) -> Option<&V::Message> {
        self.turn.as_ref().map(|turn| turn.renderer.view())
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// セッション統計
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            decoder: self
                .turn
                .as_ref()
                .map(|turn| turn.decoder.stats())
                .unwrap_or_default(),
            ..self.stats
        }
    }

    // ===== Private メソッド =====

    /// `turn` が現在の送信か
    fn is_current(&self, turn: TurnId) -> bool {
        self.turn.as_ref().is_some_and(|current| current.id == turn)
    }

    fn complete(&mut self, now_ms: u64) {
        self.phase = ChatPhase::Done;
        self.view.set_busy(false);
        self.stats.completed += 1;
        self.stats.last_latency_ms = self
            .turn
            .as_ref()
            .map(|turn| now_ms.saturating_sub(turn.started_ms));
    }

    /// 送信を失敗させ、エラーメッセージを 1 つだけ表示する
    ///
    /// 既に終了している送信に対しては何もしない。
    fn fail(&mut self, err: ChatError) {
        if !self.phase.is_active() {
            return;
        }
        if let Some(turn) = self.turn.as_mut() {
            turn.decoder.finish();
        }

        self.view.push_error_message(&err.user_message());
        self.view.set_busy(false);
        self.phase = ChatPhase::Failed;
        self.stats.failed += 1;
        if err == ChatError::Timeout {
            self.stats.timeouts += 1;
        }
        self.last_error = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{MemoryChatView, ViewEvent};
    use alloc::string::String;
    use alloc::vec::Vec;

    const T0: u64 = 1_000_000;

    fn session() -> ChatSession<MemoryChatView> {
        ChatSession::new(ChatConfig::default(), MemoryChatView::new()).unwrap()
    }

    fn streaming(session: &mut ChatSession<MemoryChatView>, text: &str) -> TurnId {
        let turn = session
            .on_send(text, ResponseMode::Streaming, T0)
            .unwrap()
            .unwrap()
            .turn;
        assert_eq!(session.on_response_head(turn, 200, T0 + 10), ResponseAction::ReadStream);
        turn
    }

    fn rendered(session: &ChatSession<MemoryChatView>) -> String {
        String::from(session.rendered().unwrap().as_str())
    }

    #[test]
    fn test_streaming_happy_path() {
        let mut session = session();
        let request = session
            .on_send("  hello  ", ResponseMode::Streaming, T0)
            .unwrap()
            .unwrap();
        let turn = request.turn;
        assert_ne!(turn, TurnId::NONE);
        assert_eq!(request.url, "/api/chat/stream");
        assert_eq!(request.method(), "POST");
        assert_eq!(
            request.body,
            r#"{"message":"hello","max_tokens":2048,"temperature":0.7}"#
        );
        assert_eq!(session.phase(), ChatPhase::Sending);
        assert_eq!(session.deadline_ms(), Some(T0 + 60_000));

        assert_eq!(session.on_response_head(turn, 200, T0 + 5), ResponseAction::ReadStream);
        assert_eq!(session.phase(), ChatPhase::Streaming);

        let flow = session.on_chunk(
            turn,
            b"event: start\ndata: {\"status\": \"start\"}\n\ndata: {\"delta\":\"hi\"}\n\ndata: {\"delta\":\"!\"}\n\n",
            T0 + 20,
        );
        assert_eq!(flow, Flow::Continue);
        assert_eq!(rendered(&session), "hi!");

        session.on_stream_end(turn, T0 + 30);
        assert_eq!(session.phase(), ChatPhase::Done);
        assert_eq!(session.deadline_ms(), None);

        assert_eq!(
            session.view().events(),
            &[
                ViewEvent::UserMessage(String::from("hello")),
                ViewEvent::Busy(true),
                ViewEvent::AssistantOpened,
                ViewEvent::Busy(false),
            ]
        );

        let stats = session.stats();
        assert_eq!(stats.sends, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.last_latency_ms, Some(30));
        assert_eq!(stats.decoder.deltas, 2);
    }

    #[test]
    fn test_empty_input_is_ignored() {
        let mut session = session();
        assert_eq!(session.on_send("   \n", ResponseMode::Streaming, T0), Ok(None));
        assert_eq!(session.phase(), ChatPhase::Idle);
        assert!(session.view().events().is_empty());
    }

    #[test]
    fn test_second_send_while_busy_is_rejected() {
        let mut session = session();
        streaming(&mut session, "first");
        assert_eq!(
            session.on_send("second", ResponseMode::Streaming, T0 + 1),
            Err(ChatError::Busy)
        );
        assert_eq!(session.stats().sends, 1);
    }

    #[test]
    fn test_timeout_surfaces_exactly_one_error() {
        let mut session = session();
        let turn = streaming(&mut session, "slow");
        assert_eq!(
            session.on_chunk(turn, b"data: {\"delta\":\"par", T0 + 100),
            Flow::Continue
        );

        assert!(!session.expire(T0 + 59_999));
        assert!(session.expire(T0 + 60_000));
        assert_eq!(session.phase(), ChatPhase::Failed);
        assert_eq!(session.last_error(), Some(&ChatError::Timeout));

        // 中断による読み取り失敗・遅れて届いたチャンクは無視される
        session.on_transport_error(turn, TransportFailure::Aborted);
        assert_eq!(session.on_chunk(turn, b"tial\"}\n\n", T0 + 60_001), Flow::Stop);
        assert!(!session.expire(T0 + 70_000));

        let errors: Vec<&str> = session.view().error_messages().collect();
        assert_eq!(
            errors,
            ["Sorry, an error occurred: Request timed out, please try again later"]
        );
        assert!(!session.view().is_busy());
        assert_eq!(session.stats().timeouts, 1);
        assert_eq!(rendered(&session), "");
    }

    #[test]
    fn test_late_chunk_after_deadline_times_out() {
        let mut session = session();
        let turn = streaming(&mut session, "slow");
        assert_eq!(
            session.on_chunk(turn, b"data: {\"delta\":\"x\"}\n\n", T0 + 60_000),
            Flow::Stop
        );
        assert_eq!(session.last_error(), Some(&ChatError::Timeout));
        assert_eq!(rendered(&session), "");
    }

    #[test]
    fn test_abort_maps_to_timeout() {
        let mut session = session();
        let turn = session.on_send("x", ResponseMode::Streaming, T0).unwrap().unwrap().turn;
        session.on_transport_error(turn, TransportFailure::Aborted);
        assert_eq!(session.last_error(), Some(&ChatError::Timeout));
    }

    #[test]
    fn test_network_failure() {
        let mut session = session();
        let turn = session.on_send("x", ResponseMode::Streaming, T0).unwrap().unwrap().turn;
        session.on_transport_error(turn, TransportFailure::Network(String::from(
            "TypeError: Failed to fetch",
        )));
        assert_eq!(session.phase(), ChatPhase::Failed);
        let errors: Vec<&str> = session.view().error_messages().collect();
        assert_eq!(
            errors,
            ["Sorry, an error occurred: Network connection failed, please check your connection"]
        );
    }

    #[test]
    fn test_non_2xx_with_error_body() {
        let mut session = session();
        let turn = session.on_send("x", ResponseMode::Streaming, T0).unwrap().unwrap().turn;
        assert_eq!(session.on_response_head(turn, 500, T0 + 5), ResponseAction::ReadError);
        session.on_error_body(turn, br#"{"error": "DeepSeek API is not configured"}"#);

        assert_eq!(
            session.last_error(),
            Some(&ChatError::Server {
                status: Some(500),
                message: Some(String::from("DeepSeek API is not configured")),
            })
        );
        let errors: Vec<&str> = session.view().error_messages().collect();
        assert_eq!(
            errors,
            ["Sorry, an error occurred: DeepSeek API is not configured"]
        );
    }

    #[test]
    fn test_rate_limited_and_unreadable_body() {
        let mut session = session();
        let turn = session.on_send("x", ResponseMode::Streaming, T0).unwrap().unwrap().turn;
        assert_eq!(session.on_response_head(turn, 429, T0 + 5), ResponseAction::ReadError);
        session.on_error_body(turn, b"Too Many Requests");
        let errors: Vec<&str> = session.view().error_messages().collect();
        assert_eq!(
            errors,
            ["Sorry, an error occurred: Too many requests, please try again later"]
        );
    }

    #[test]
    fn test_stream_error_event_fails_turn_and_keeps_partial_reply() {
        let mut session = session();
        let turn = streaming(&mut session, "x");
        let flow = session.on_chunk(
            turn,
            b"data: {\"delta\":\"partial \"}\n\nevent: error\ndata: {\"error\": \"upstream closed\"}\n\ndata: {\"delta\":\"ignored\"}\n\n",
            T0 + 20,
        );
        assert_eq!(flow, Flow::Stop);
        assert_eq!(rendered(&session), "partial ");
        assert_eq!(
            session.last_error(),
            Some(&ChatError::Server {
                status: None,
                message: Some(String::from("upstream closed")),
            })
        );

        // 終了後のストリーム終端通知は無視される
        session.on_stream_end(turn, T0 + 30);
        assert_eq!(session.phase(), ChatPhase::Failed);
        assert_eq!(session.stats().completed, 0);
    }

    #[test]
    fn test_malformed_frames_do_not_abort_stream() {
        let mut session = session();
        let turn = streaming(&mut session, "x");
        assert_eq!(
            session.on_chunk(
                turn,
                b"data: {oops\n\nretry: 10\n\ndata: {\"delta\":\"**ok**\"}\n\n",
                T0 + 20
            ),
            Flow::Continue
        );
        assert_eq!(rendered(&session), "<strong>ok</strong>");
        assert_eq!(session.stats().decoder.dropped_frames, 2);
    }

    #[test]
    fn test_complete_mode_replaces_message() {
        let mut session = session();
        let request = session
            .on_send("explain", ResponseMode::Complete, T0)
            .unwrap()
            .unwrap();
        let turn = request.turn;
        assert_eq!(request.url, "/api/chat");
        assert_eq!(session.on_response_head(turn, 200, T0 + 5), ResponseAction::ReadReply);
        assert_eq!(session.phase(), ChatPhase::Sending);

        session.on_reply_body(
            turn,
            br##"{"reply":"# Answer\n- *one*","usage":{"total_tokens":50}}"##,
            T0 + 50,
        );
        assert_eq!(session.phase(), ChatPhase::Done);
        assert_eq!(
            rendered(&session),
            "<h3>Answer</h3><br><ul><li><em>one</em></li></ul>"
        );
        assert_eq!(session.message_view().unwrap().replacement_count(), 1);
    }

    #[test]
    fn test_complete_mode_error_in_body() {
        let mut session = session();
        let turn = session.on_send("x", ResponseMode::Complete, T0).unwrap().unwrap().turn;
        session.on_response_head(turn, 200, T0 + 5);
        session.on_reply_body(turn, br#"{"error":"API response malformed"}"#, T0 + 6);
        assert_eq!(session.phase(), ChatPhase::Failed);
        assert_eq!(
            session.last_error(),
            Some(&ChatError::Server {
                status: Some(200),
                message: Some(String::from("API response malformed")),
            })
        );
    }

    #[test]
    fn test_reply_body_before_head_is_ignored() {
        let mut session = session();
        let turn = session.on_send("x", ResponseMode::Complete, T0).unwrap().unwrap().turn;
        session.on_reply_body(turn, br#"{"reply":"early"}"#, T0 + 1);
        assert_eq!(session.phase(), ChatPhase::Sending);
        assert_eq!(rendered(&session), "");
    }

    #[test]
    fn test_each_send_gets_fresh_decoder() {
        let mut session = session();
        let turn = streaming(&mut session, "first");
        session.on_chunk(turn, b"data: {\"delta\":\"a\"}\n\ndata: {\"delta\":\"dangling", T0 + 1);
        session.on_stream_end(turn, T0 + 2);
        assert_eq!(rendered(&session), "a");
        assert_eq!(session.stats().decoder.discarded_bytes, 24);

        let turn = streaming(&mut session, "second");
        session.on_chunk(turn, b"\"}\n\ndata: {\"delta\":\"b\"}\n\n", T0 + 3);
        assert_eq!(rendered(&session), "b");
        assert_eq!(session.stats().sends, 2);
    }

    #[test]
    fn test_settings_toggle_and_update() {
        let mut session = session();
        assert!(session.on_settings_toggle());
        assert!(!session.on_settings_toggle());
        assert_eq!(
            session.view().events(),
            &[ViewEvent::SettingsOpen(true), ViewEvent::SettingsOpen(false)]
        );

        session.set_temperature(1.2).unwrap();
        session.set_max_tokens(100).unwrap();
        assert!(session.set_temperature(-0.1).is_err());

        let request = session
            .on_send("x", ResponseMode::Streaming, T0)
            .unwrap()
            .unwrap();
        assert_eq!(
            request.body,
            r#"{"message":"x","max_tokens":100,"temperature":1.2}"#
        );
    }

    #[test]
    fn test_reset_during_stream() {
        let mut session = session();
        let turn = streaming(&mut session, "x");
        session.reset();
        assert_eq!(session.phase(), ChatPhase::Idle);
        assert!(!session.view().is_busy());
        assert!(session.rendered().is_none());
        assert_eq!(session.on_chunk(turn, b"data: {\"delta\":\"x\"}\n\n", T0 + 1), Flow::Stop);
        assert_eq!(session.view().error_messages().count(), 0);
    }

    #[test]
    fn test_late_abort_from_discarded_send_is_ignored() {
        let mut session = session();
        let first = streaming(&mut session, "first");
        session.reset();

        let second = session
            .on_send("second", ResponseMode::Streaming, T0 + 5)
            .unwrap()
            .unwrap()
            .turn;
        assert_ne!(first, second);

        // 破棄した送信の読み取りが遅れて AbortError で失敗する
        session.on_transport_error(first, TransportFailure::Aborted);
        assert_eq!(session.phase(), ChatPhase::Sending);
        assert_eq!(session.last_error(), None);
        assert_eq!(session.view().error_messages().count(), 0);
        assert!(session.view().is_busy());

        assert_eq!(session.on_response_head(first, 200, T0 + 6), ResponseAction::Discard);
        assert_eq!(session.on_response_head(second, 200, T0 + 6), ResponseAction::ReadStream);
        assert_eq!(
            session.on_chunk(first, b"data: {\"delta\":\"stale\"}\n\n", T0 + 7),
            Flow::Stop
        );
        session.on_stream_end(first, T0 + 8);
        assert_eq!(session.phase(), ChatPhase::Streaming);

        assert_eq!(
            session.on_chunk(second, b"data: {\"delta\":\"fresh\"}\n\n", T0 + 9),
            Flow::Continue
        );
        session.on_stream_end(second, T0 + 10);
        assert_eq!(session.phase(), ChatPhase::Done);
        assert_eq!(rendered(&session), "fresh");
        assert_eq!(session.current_turn(), Some(second));
    }

    #[test]
    fn test_previous_turn_events_do_not_touch_next_turn() {
        let mut session = session();
        let first = streaming(&mut session, "first");
        session.on_stream_end(first, T0 + 1);

        let second = session
            .on_send("second", ResponseMode::Complete, T0 + 2)
            .unwrap()
            .unwrap()
            .turn;
        session.on_error_body(first, b"{\"error\":\"late\"}");
        session.on_reply_body(first, br#"{"reply":"late"}"#, T0 + 3);
        assert_eq!(session.phase(), ChatPhase::Sending);

        assert_eq!(session.on_response_head(second, 200, T0 + 4), ResponseAction::ReadReply);
        session.on_reply_body(second, br#"{"reply":"ok"}"#, T0 + 5);
        assert_eq!(session.phase(), ChatPhase::Done);
        assert_eq!(rendered(&session), "ok");
        assert_eq!(session.view().error_messages().count(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ChatConfig {
            max_tokens: 0,
            ..ChatConfig::default()
        };
        assert!(ChatSession::new(config, MemoryChatView::new()).is_err());
    }
}
