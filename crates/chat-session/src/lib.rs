//! # chat-session
//!
//! 1 会話セッション分の送信状態機械。
//!
//! HTTP 通信・タイマー・DOM 操作は一切行わない（sans-IO）。
//! 呼び出し側（`chat-wasm`）が fetch の進行に合わせてイベントを通知し、
//! セッションは [`ChatView`] を通じて描画を指示する。
//!
//! ## 状態遷移
//!
//! ```text
//!            on_send                on_response_head(2xx, stream)
//!   Idle ──────────────▶ Sending ──────────────────────────────▶ Streaming
//!    ▲                     │  │                                   │   │
//!    │                     │  └─ on_reply_body ──▶ Done ◀── on_stream_end
//!    │                     │                                          │
//!    │        非 2xx / ネットワーク断 / タイムアウト / error イベント  │
//!    │                     └──────────────▶ Failed ◀──────────────────┘
//!    │                                        │
//!    └──────────── 次の on_send（Done / Failed からも可）
//! ```
//!
//! - 送信中（Sending / Streaming）に次の送信は受け付けない
//! - 送信ごとに新しいデコーダとメッセージバッファを作る
//! - 失敗時のエラーメッセージは 1 回の送信につき必ず 1 つだけ表示する

#![no_std]
extern crate alloc;

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod view;

pub use api::{ChatReply, ChatRequest, HealthStatus, OutgoingRequest, TurnId, Usage};
pub use config::{ChatConfig, ChatSettings, Endpoint};
pub use error::{ChatError, ConfigError, TransportFailure};
pub use session::{ChatPhase, ChatSession, Flow, ResponseAction, ResponseMode, SessionStats};
pub use view::{ChatView, MemoryChatView, ViewEvent};

/// リクエストのタイムアウト（ミリ秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// 生成する最大トークン数の既定値
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// max_tokens の上限
pub const MAX_TOKENS_LIMIT: u32 = 8192;

/// サンプリング温度の既定値
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// サンプリング温度の下限
pub const MIN_TEMPERATURE: f32 = 0.0;

/// サンプリング温度の上限
pub const MAX_TEMPERATURE: f32 = 2.0;

/// ユーザーに表示するエラーメッセージの前置き
pub const APOLOGY_PREFIX: &str = "Sorry, an error occurred: ";
