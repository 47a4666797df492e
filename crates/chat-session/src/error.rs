//! セッションのエラー型

use alloc::format;
use alloc::string::String;

use crate::{APOLOGY_PREFIX, MAX_TEMPERATURE, MAX_TOKENS_LIMIT, MIN_TEMPERATURE};

/// HTTP 429 Too Many Requests
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// 送信処理のエラー
///
/// `Network` / `Timeout` / `Server` はユーザーに表示する。
/// フレーム単位のエラー（不正なフレーム・JSON 解析失敗）は
/// `chat-stream` 内で吸収されるので、ここには現れない。
#[derive(Debug, Clone, PartialEq)]
pub enum ChatError {
    /// 接続できなかった、または途中で切断された
    Network(String),
    /// タイムアウト（既定 60 秒）
    Timeout,
    /// サーバーがエラーを返した
    ///
    /// - `status`: 非 2xx の HTTP ステータス（ストリーム中の error イベントでは `None`）
    /// - `message`: 応答 JSON の `error` フィールド
    Server {
        status: Option<u16>,
        message: Option<String>,
    },
    /// 前回の送信がまだ完了していない
    Busy,
    /// リクエスト本文のエンコードに失敗
    Encode(String),
}

impl ChatError {
    /// ユーザーに表示するかどうか
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ChatError::Network(_) | ChatError::Timeout | ChatError::Server { .. }
        )
    }

    /// 前置き無しの説明文
    pub fn detail(&self) -> String {
        match self {
            ChatError::Timeout => String::from("Request timed out, please try again later"),
            ChatError::Network(_) => {
                String::from("Network connection failed, please check your connection")
            }
            ChatError::Server {
                status: Some(STATUS_TOO_MANY_REQUESTS),
                ..
            } => String::from("Too many requests, please try again later"),
            ChatError::Server {
                message: Some(message),
                ..
            } => message.clone(),
            ChatError::Server { .. } => String::from("Request failed"),
            ChatError::Busy => String::from("A reply is still being received"),
            ChatError::Encode(err) => format!("Could not encode request: {}", err),
        }
    }

    /// アシスタント発言として表示する文面（前置き付き）
    pub fn user_message(&self) -> String {
        format!("{}{}", APOLOGY_PREFIX, self.detail())
    }
}

impl core::fmt::Display for ChatError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ChatError::Network(cause) => write!(f, "Network failure: {}", cause),
            ChatError::Timeout => write!(f, "Request timed out"),
            ChatError::Server { status, message } => {
                write!(f, "Server error")?;
                if let Some(status) = status {
                    write!(f, " (HTTP {})", status)?;
                }
                if let Some(message) = message {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
            ChatError::Busy => write!(f, "A send is already in flight"),
            ChatError::Encode(err) => write!(f, "Request encoding failed: {}", err),
        }
    }
}

/// 設定値のエラー
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// temperature が範囲外
    TemperatureOutOfRange(f32),
    /// max_tokens が範囲外
    MaxTokensOutOfRange(u32),
    /// タイムアウトが 0
    ZeroTimeout,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::TemperatureOutOfRange(t) => write!(
                f,
                "Temperature {} out of range ({}..={})",
                t, MIN_TEMPERATURE, MAX_TEMPERATURE
            ),
            ConfigError::MaxTokensOutOfRange(n) => {
                write!(f, "max_tokens {} out of range (1..={})", n, MAX_TOKENS_LIMIT)
            }
            ConfigError::ZeroTimeout => write!(f, "Timeout must be greater than zero"),
        }
    }
}

/// トランスポート層（fetch / ReadableStream）の失敗
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// AbortController による中断（タイムアウトタイマー発火）
    Aborted,
    /// それ以外の失敗（DNS・接続拒否・切断など）
    Network(String),
}
