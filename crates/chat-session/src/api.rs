//! サーバーとの JSON ワイヤー型

use alloc::string::String;

use serde::{Deserialize, Serialize};

use crate::config::{ChatConfig, ChatSettings, Endpoint};

/// `/api/chat` と `/api/chat/stream` 共通のリクエスト本文
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl<'a> ChatRequest<'a> {
    pub fn new(message: &'a str, settings: &ChatSettings) -> Self {
        ChatRequest {
            message,
            max_tokens: settings.max_tokens(),
            temperature: settings.temperature(),
        }
    }
}

/// `/api/chat` の応答本文
///
/// 成功時は `reply`、失敗時は `error` が入る。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// トークン使用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// 非 2xx 応答の本文（`{"error": "..."}`）
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// 本文から `error` を取り出す。JSON でなければ `None`
    pub(crate) fn message_from(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.error)
    }
}

/// `/api/health` の応答本文
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub deepseek_configured: bool,
}

impl HealthStatus {
    /// 応答本文を解析する
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// 送信（ターン）の識別子
///
/// `ChatSession::on_send` が送信ごとに払い出す。トランスポートからの通知には
/// この値を添え、破棄済みの送信からの遅れた通知を区別する。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TurnId(u64);

impl TurnId {
    /// どの送信にも属さないリクエスト（ヘルスチェックなど）
    pub const NONE: TurnId = TurnId(0);

    pub fn get(&self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> TurnId {
        TurnId(self.0.wrapping_add(1).max(1))
    }
}

/// 呼び出し側が送信すべき HTTP リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    /// このリクエストを発行した送信
    pub turn: TurnId,
    pub endpoint: Endpoint,
    /// 完全な URL（`ChatConfig::api_base` + パス）
    pub url: String,
    /// JSON 本文（`Content-Type: application/json`）
    pub body: String,
}

impl OutgoingRequest {
    /// `GET /api/health`
    pub fn health(config: &ChatConfig) -> Self {
        OutgoingRequest {
            turn: TurnId::NONE,
            endpoint: Endpoint::Health,
            url: config.url(Endpoint::Health),
            body: String::new(),
        }
    }

    pub fn method(&self) -> &'static str {
        self.endpoint.method()
    }
}
