//! fetch / ReadableStream / タイマーの薄いラッパー

use js_sys::{Reflect, Uint8Array};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    AbortController, AbortSignal, Headers, ReadableStreamDefaultReader, Request, RequestInit,
    Response,
};

use chat_session::{OutgoingRequest, TransportFailure};

/// 中断時に fetch / read が投げる DOMException の名前
const ABORT_ERROR: &str = "AbortError";

/// 現在時刻（ミリ秒）
pub(crate) fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

fn window() -> Result<web_sys::Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))
}

/// リクエストを発行し、応答ヘッダーの到着を待つ
pub(crate) async fn fetch(
    request: &OutgoingRequest,
    signal: Option<&AbortSignal>,
) -> Result<Response, JsValue> {
    let init = RequestInit::new();
    init.set_method(request.method());
    if !request.body.is_empty() {
        let headers = Headers::new()?;
        headers.set("Content-Type", "application/json")?;
        init.set_headers(&headers);
        init.set_body(&JsValue::from_str(&request.body));
    }
    init.set_signal(signal);

    let js_request = Request::new_with_str_and_init(&request.url, &init)?;
    let response = JsFuture::from(window()?.fetch_with_request(&js_request)).await?;
    response.dyn_into::<Response>()
}

/// body の ReadableStream から次のチャンクを読む。終端なら `None`
pub(crate) async fn read_chunk(
    reader: &ReadableStreamDefaultReader,
) -> Result<Option<Vec<u8>>, JsValue> {
    let result = JsFuture::from(reader.read()).await?;
    let done = Reflect::get(&result, &JsValue::from_str("done"))?
        .as_bool()
        .unwrap_or(false);
    if done {
        return Ok(None);
    }
    let value = Reflect::get(&result, &JsValue::from_str("value"))?;
    Ok(Some(Uint8Array::new(&value).to_vec()))
}

/// 読み取りを打ち切り、ストリームの解放を待つ
///
/// 打ち切りの失敗は読み取り側から見て意味がないので無視する。
pub(crate) async fn cancel_reader(reader: &ReadableStreamDefaultReader) {
    let _ = JsFuture::from(reader.cancel()).await;
}

/// body 全体を読む
pub(crate) async fn response_bytes(response: &Response) -> Result<Vec<u8>, JsValue> {
    let buffer = JsFuture::from(response.array_buffer()?).await?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

/// fetch / read の失敗を分類する
pub(crate) fn classify(err: &JsValue) -> TransportFailure {
    let name = Reflect::get(err, &JsValue::from_str("name"))
        .ok()
        .and_then(|name| name.as_string());
    if name.as_deref() == Some(ABORT_ERROR) {
        return TransportFailure::Aborted;
    }

    let cause = match err.dyn_ref::<js_sys::Error>() {
        Some(error) => String::from(error.message()),
        None => format!("{:?}", err),
    };
    TransportFailure::Network(cause)
}

/// 1 回の送信の中断手段とタイムアウトタイマー
///
/// drop するとタイマーを解除する。
pub(crate) struct RequestGuard {
    controller: AbortController,
    timer: i32,
    _on_timeout: Closure<dyn FnMut()>,
}

impl RequestGuard {
    /// `delay_ms` 後に `on_timeout` を呼んでからリクエストを中断するタイマーを仕掛ける
    pub(crate) fn arm<F>(delay_ms: u64, mut on_timeout: F) -> Result<Self, JsValue>
    where
        F: FnMut() + 'static,
    {
        let controller = AbortController::new()?;
        let abort = controller.clone();
        let callback = Closure::<dyn FnMut()>::new(move || {
            on_timeout();
            abort.abort();
        });

        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        let timer = window()?.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            delay,
        )?;

        Ok(RequestGuard {
            controller,
            timer,
            _on_timeout: callback,
        })
    }

    pub(crate) fn signal(&self) -> AbortSignal {
        self.controller.signal()
    }

    pub(crate) fn controller(&self) -> AbortController {
        self.controller.clone()
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_timeout_with_handle(self.timer);
        }
    }
}
