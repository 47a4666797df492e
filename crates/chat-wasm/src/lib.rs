//! # chat-wasm
//!
//! wasm-bindgen エクスポート：ブラウザのチャット画面から呼び出す公開 API。
//!
//! ## 使用方法（JavaScript）
//!
//! ```javascript
//! import init, { ChatClient, init_panic_hook } from './pkg/chat_wasm.js';
//!
//! await init();
//! init_panic_hook();
//!
//! // 省略したオプションは既定値（タイムアウト 60 秒、max_tokens 2048、temperature 0.7）
//! const client = new ChatClient(JSON.stringify({ timeout_ms: 30000 }));
//! client.init();
//!
//! sendButton.addEventListener('click', async () => {
//!     const text = messageInput.value;
//!     messageInput.value = '';
//!     await client.send(text);
//! });
//! settingsToggle.addEventListener('click', () => client.toggleSettings());
//! temperatureSlider.addEventListener('input', (e) => client.setTemperature(Number(e.target.value)));
//! ```

use wasm_bindgen::prelude::*;

pub mod client;
pub mod dom;
mod fetch;

pub use client::{ChatClient, ClientOptions};
pub use dom::{DomChatView, DomMessage, ElementIds};

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// テキストをチャット表示用の HTML マークアップに変換する
///
/// ユーザー発言・過去ログの描画など、セッションを経由しない表示に使う。
#[wasm_bindgen(js_name = "renderMarkdown")]
pub fn render_markdown(text: &str) -> String {
    chat_render::format_message(text)
}

/// ブラウザコンソールへの出力
pub(crate) mod console {
    use wasm_bindgen::JsValue;

    pub(crate) fn info(message: &str) {
        web_sys::console::info_1(&JsValue::from_str(message));
    }

    pub(crate) fn warn(message: &str) {
        web_sys::console::warn_1(&JsValue::from_str(message));
    }

    pub(crate) fn error(message: &str) {
        web_sys::console::error_1(&JsValue::from_str(message));
    }
}
