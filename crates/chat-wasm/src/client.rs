//! ChatClient wasm-bindgen エクスポート
//!
//! チャット画面の主エントリポイント。
//! fetch・ReadableStream・タイマーを駆動し、進行を `ChatSession` に通知する。

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Promise;
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::{AbortController, ReadableStreamDefaultReader, Response};

use chat_session::{
    ChatConfig, ChatPhase, ChatSession, Flow, HealthStatus, OutgoingRequest, ResponseAction,
    ResponseMode, TurnId,
};

use crate::console;
use crate::dom::{DomChatView, ElementIds};
use crate::fetch::{self, RequestGuard};

/// コンストラクタに渡す JSON オプション
///
/// ```json
/// {
///   "api_base": "",
///   "timeout_ms": 60000,
///   "max_tokens": 2048,
///   "temperature": 0.7,
///   "elements": { "messages_container": "messagesContainer" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    #[serde(flatten)]
    pub chat: ChatConfig,
    pub elements: ElementIds,
}

impl ClientOptions {
    /// JSON 文字列を解析する。`None` または空文字列なら既定値
    pub fn from_json(json: Option<&str>) -> Result<Self, serde_json::Error> {
        match json.map(str::trim) {
            None | Some("") => Ok(ClientOptions::default()),
            Some(json) => serde_json::from_str(json),
        }
    }
}

struct ClientState {
    session: ChatSession<DomChatView>,
    /// 進行中の送信とその中断手段（dispose 用）
    in_flight: Option<(TurnId, AbortController)>,
}

type SharedState = Rc<RefCell<ClientState>>;

/// チャットクライアント
///
/// ## 内部アーキテクチャ
///
/// ```text
/// ChatClient
///   └── ChatSession   (chat-session) - 送信状態機械
///         ├── StreamFrameDecoder  (chat-stream) - フレーム分割・delta 抽出
///         ├── IncrementalRenderer (chat-render) - Markdown 変換・追記
///         └── DomChatView                       - DOM への描画
/// ```
///
/// ## スレッド安全性
///
/// WASM はシングルスレッドのため、状態は `Rc<RefCell<_>>` で共有する。
/// `await` をまたいで借用を保持しない。
#[wasm_bindgen]
pub struct ChatClient {
    state: SharedState,
}

#[wasm_bindgen]
impl ChatClient {
    /// クライアントを初期化する
    ///
    /// # 引数
    /// - `options_json`: [`ClientOptions`] の JSON。省略時はすべて既定値
    ///
    /// # エラー
    /// - JSON の解析失敗
    /// - 設定値が範囲外
    /// - メッセージ一覧のコンテナが見つからない
    #[wasm_bindgen(constructor)]
    pub fn new(options_json: Option<String>) -> Result<ChatClient, JsError> {
        let options = ClientOptions::from_json(options_json.as_deref())
            .map_err(|e| JsError::new(&format!("Invalid options: {}", e)))?;
        let view = DomChatView::from_document(&options.elements)
            .map_err(|e| JsError::new(&format!("DOM setup failed: {:?}", e)))?;
        let session = ChatSession::new(options.chat, view)
            .map_err(|e| JsError::new(&format!("Invalid settings: {}", e)))?;

        Ok(ChatClient {
            state: Rc::new(RefCell::new(ClientState {
                session,
                in_flight: None,
            })),
        })
    }

    /// 起動時の処理（バックグラウンドでヘルスチェックを行う）
    #[wasm_bindgen]
    pub fn init(&self) {
        let request = health_request(&self.state);
        spawn_local(async move {
            match fetch_health(&request).await {
                Ok(health) if !health.is_healthy() => {
                    console::warn(&format!("Server reports status {:?}", health.status));
                }
                Ok(health) if !health.deepseek_configured => {
                    console::warn("DeepSeek API key is not configured on the server");
                }
                Ok(_) => console::info("Chat server is healthy"),
                Err(err) => console::error(&format!("Health check failed: {:?}", err)),
            }
        });
    }

    /// 進行中の送信を中断し、セッションを初期状態に戻す
    #[wasm_bindgen]
    pub fn dispose(&self) {
        let mut state = self.state.borrow_mut();
        if let Some((_, controller)) = state.in_flight.take() {
            controller.abort();
        }
        state.session.reset();
    }

    /// メッセージをストリーミングで送信する
    ///
    /// 応答の完了（または失敗の表示）で resolve する。
    /// 前回の送信が進行中なら reject する。
    #[wasm_bindgen]
    pub fn send(&self, message: String) -> Promise {
        let state = Rc::clone(&self.state);
        future_to_promise(async move {
            run_send(state, message, ResponseMode::Streaming).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// メッセージを送信し、応答を一括で描画する（`/api/chat`）
    #[wasm_bindgen(js_name = "sendComplete")]
    pub fn send_complete(&self, message: String) -> Promise {
        let state = Rc::clone(&self.state);
        future_to_promise(async move {
            run_send(state, message, ResponseMode::Complete).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// サーバーの状態を問い合わせる
    ///
    /// API キーが設定済みなら `true` で resolve する。
    #[wasm_bindgen(js_name = "checkHealth")]
    pub fn check_health(&self) -> Promise {
        let request = health_request(&self.state);
        future_to_promise(async move {
            let health = fetch_health(&request).await?;
            Ok(JsValue::from_bool(
                health.is_healthy() && health.deepseek_configured,
            ))
        })
    }

    /// 設定パネルの開閉を切り替え、開いているかどうかを返す
    #[wasm_bindgen(js_name = "toggleSettings")]
    pub fn toggle_settings(&self) -> bool {
        self.state.borrow_mut().session.on_settings_toggle()
    }

    /// 次回以降の送信の temperature を設定する（0.0〜2.0）
    #[wasm_bindgen(js_name = "setTemperature")]
    pub fn set_temperature(&self, temperature: f32) -> Result<(), JsError> {
        self.state
            .borrow_mut()
            .session
            .set_temperature(temperature)
            .map_err(|e| JsError::new(&format!("{}", e)))
    }

    /// 次回以降の送信の max_tokens を設定する
    #[wasm_bindgen(js_name = "setMaxTokens")]
    pub fn set_max_tokens(&self, max_tokens: u32) -> Result<(), JsError> {
        self.state
            .borrow_mut()
            .session
            .set_max_tokens(max_tokens)
            .map_err(|e| JsError::new(&format!("{}", e)))
    }

    /// 送信が進行中か
    #[wasm_bindgen(js_name = "isBusy")]
    pub fn is_busy(&self) -> bool {
        self.state.borrow().session.is_busy()
    }

    /// 現在の状態（"idle" / "sending" / "streaming" / "done" / "failed"）
    #[wasm_bindgen]
    pub fn phase(&self) -> String {
        String::from(self.state.borrow().session.phase().as_str())
    }

    /// セッション統計を JSON 文字列で返す
    ///
    /// # 戻り値
    /// JSON 文字列:
    /// ```json
    /// {
    ///   "sends": 3,
    ///   "completed": 2,
    ///   "failed": 1,
    ///   "timeouts": 0,
    ///   "last_latency_ms": 4210,
    ///   "decoder": {
    ///     "bytes_fed": 10240, "frames": 152, "deltas": 150,
    ///     "dropped_frames": 0, "discarded_bytes": 0
    ///   }
    /// }
    /// ```
    #[wasm_bindgen(js_name = "getStats")]
    pub fn get_stats(&self) -> Result<String, JsError> {
        let stats = self.state.borrow().session.stats();
        serde_json::to_string(&stats).map_err(|e| JsError::new(&format!("{}", e)))
    }
}

fn health_request(state: &SharedState) -> OutgoingRequest {
    OutgoingRequest::health(state.borrow().session.config())
}

async fn fetch_health(request: &OutgoingRequest) -> Result<HealthStatus, JsValue> {
    let response = fetch::fetch(request, None).await?;
    if !response.ok() {
        return Err(JsValue::from_str(&format!("HTTP {}", response.status())));
    }
    let body = fetch::response_bytes(&response).await?;
    HealthStatus::from_body(&body).map_err(|e| JsValue::from_str(&format!("{}", e)))
}

/// 1 回の送信を最後まで駆動する
///
/// 送信の失敗はセッションがエラーメッセージとして表示するので、
/// `Err` を返すのは送信を受け付けなかった場合だけ。
async fn run_send(state: SharedState, message: String, mode: ResponseMode) -> Result<(), JsValue> {
    let (request, timeout_ms) = {
        let mut guard = state.borrow_mut();
        let session = &mut guard.session;
        match session.on_send(&message, mode, fetch::now_ms()) {
            Ok(Some(request)) => (request, session.config().timeout_ms),
            Ok(None) => return Ok(()),
            Err(e) => return Err(JsError::new(&format!("{}", e)).into()),
        }
    };
    let turn = request.turn;

    drive_turn(&state, &request, timeout_ms).await;

    // dispose 後に始まった次の送信の中断手段は残す
    {
        let mut state = state.borrow_mut();
        if state.in_flight.as_ref().is_some_and(|(id, _)| *id == turn) {
            state.in_flight = None;
        }
    }
    log_failure(&state);
    Ok(())
}

/// fetch から応答本文の処理までを行う
async fn drive_turn(state: &SharedState, request: &OutgoingRequest, timeout_ms: u64) {
    let turn = request.turn;
    let on_timeout = {
        let state = Rc::clone(state);
        move || {
            if let Ok(mut state) = state.try_borrow_mut() {
                state.session.expire(fetch::now_ms());
            }
        }
    };
    let request_guard = match RequestGuard::arm(timeout_ms, on_timeout) {
        Ok(request_guard) => request_guard,
        Err(err) => {
            fail(state, turn, &err);
            return;
        }
    };
    state.borrow_mut().in_flight = Some((turn, request_guard.controller()));

    let response = match fetch::fetch(request, Some(&request_guard.signal())).await {
        Ok(response) => response,
        Err(err) => {
            fail(state, turn, &err);
            return;
        }
    };

    let action = state
        .borrow_mut()
        .session
        .on_response_head(turn, response.status(), fetch::now_ms());
    match action {
        ResponseAction::ReadStream => read_stream(state, turn, &response).await,
        ResponseAction::ReadReply => match fetch::response_bytes(&response).await {
            Ok(body) => state
                .borrow_mut()
                .session
                .on_reply_body(turn, &body, fetch::now_ms()),
            Err(err) => fail(state, turn, &err),
        },
        ResponseAction::ReadError => {
            let body = fetch::response_bytes(&response).await.unwrap_or_default();
            state.borrow_mut().session.on_error_body(turn, &body);
        }
        ResponseAction::Discard => {}
    }
}

/// ストリームを終端まで読み、チャンクごとにセッションへ渡す
async fn read_stream(state: &SharedState, turn: TurnId, response: &Response) {
    let Some(body) = response.body() else {
        state.borrow_mut().session.on_error_body(turn, &[]);
        return;
    };
    let reader: ReadableStreamDefaultReader = body.get_reader().unchecked_into();

    loop {
        match fetch::read_chunk(&reader).await {
            Ok(Some(chunk)) => {
                let flow = state
                    .borrow_mut()
                    .session
                    .on_chunk(turn, &chunk, fetch::now_ms());
                if flow == Flow::Stop {
                    fetch::cancel_reader(&reader).await;
                    break;
                }
            }
            Ok(None) => {
                state
                    .borrow_mut()
                    .session
                    .on_stream_end(turn, fetch::now_ms());
                break;
            }
            Err(err) => {
                fail(state, turn, &err);
                break;
            }
        }
    }
}

fn fail(state: &SharedState, turn: TurnId, err: &JsValue) {
    state
        .borrow_mut()
        .session
        .on_transport_error(turn, fetch::classify(err));
}

fn log_failure(state: &SharedState) {
    let state = state.borrow();
    if state.session.phase() != ChatPhase::Failed {
        return;
    }
    if let Some(err) = state.session.last_error() {
        console::error(&format!("Failed to send message: {}", err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default_when_absent() {
        assert_eq!(ClientOptions::from_json(None).unwrap(), ClientOptions::default());
        assert_eq!(
            ClientOptions::from_json(Some("  ")).unwrap(),
            ClientOptions::default()
        );
    }

    #[test]
    fn test_options_partial_json() {
        let options = ClientOptions::from_json(Some(
            r#"{"timeout_ms": 30000, "temperature": 1.0, "elements": {"loading": "spinner"}}"#,
        ))
        .unwrap();
        assert_eq!(options.chat.timeout_ms, 30_000);
        assert_eq!(options.chat.temperature, 1.0);
        assert_eq!(options.chat.max_tokens, 2048);
        assert_eq!(options.elements.loading, "spinner");
        assert_eq!(options.elements.messages_container, "messagesContainer");
    }

    #[test]
    fn test_options_invalid_json() {
        assert!(ClientOptions::from_json(Some("{timeout")).is_err());
    }
}
