//! 接続先・生成パラメータの設定

use alloc::format;
use alloc::string::String;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_MS, MAX_TEMPERATURE,
    MAX_TOKENS_LIMIT, MIN_TEMPERATURE,
};

/// サーバーが公開するエンドポイント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /api/chat`（JSON で一括応答）
    Chat,
    /// `POST /api/chat/stream`（chunked body で delta を逐次返す）
    ChatStream,
    /// `GET /api/health`
    Health,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Chat => "/api/chat",
            Endpoint::ChatStream => "/api/chat/stream",
            Endpoint::Health => "/api/health",
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Endpoint::Chat | Endpoint::ChatStream => "POST",
            Endpoint::Health => "GET",
        }
    }
}

/// クライアント設定
///
/// JS 側からは JSON で渡す。省略したフィールドは既定値になる。
///
/// ```json
/// { "api_base": "", "timeout_ms": 60000, "max_tokens": 2048, "temperature": 0.7 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// API の起点 URL。空文字列ならページと同じオリジンの相対パスを使う
    pub api_base: String,
    /// 1 回の送信のタイムアウト（ミリ秒）
    pub timeout_ms: u64,
    /// 初期 max_tokens
    pub max_tokens: u32,
    /// 初期 temperature
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            api_base: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ChatConfig {
    /// 設定値を検証する
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.settings().map(|_| ())
    }

    /// 初期の生成パラメータ
    pub fn settings(&self) -> Result<ChatSettings, ConfigError> {
        ChatSettings::new(self.max_tokens, self.temperature)
    }

    /// エンドポイントの URL を組み立てる
    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), endpoint.path())
    }
}

/// 送信ごとにリクエストへ載せる生成パラメータ
///
/// 設定パネルのスライダー・入力欄から更新される。値は常に検証済み。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatSettings {
    max_tokens: u32,
    temperature: f32,
}

impl ChatSettings {
    /// # エラー
    /// - `max_tokens` が 1〜[`MAX_TOKENS_LIMIT`] の範囲外
    /// - `temperature` が [`MIN_TEMPERATURE`]〜[`MAX_TEMPERATURE`] の範囲外（NaN を含む）
    pub fn new(max_tokens: u32, temperature: f32) -> Result<Self, ConfigError> {
        check_max_tokens(max_tokens)?;
        check_temperature(temperature)?;
        Ok(ChatSettings {
            max_tokens,
            temperature,
        })
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<(), ConfigError> {
        check_max_tokens(max_tokens)?;
        self.max_tokens = max_tokens;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        check_temperature(temperature)?;
        self.temperature = temperature;
        Ok(())
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        ChatSettings {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

fn check_max_tokens(max_tokens: u32) -> Result<(), ConfigError> {
    if (1..=MAX_TOKENS_LIMIT).contains(&max_tokens) {
        Ok(())
    } else {
        Err(ConfigError::MaxTokensOutOfRange(max_tokens))
    }
}

fn check_temperature(temperature: f32) -> Result<(), ConfigError> {
    if (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        Ok(())
    } else {
        Err(ConfigError::TemperatureOutOfRange(temperature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ChatConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout_ms, 60_000);

        let settings = config.settings().unwrap();
        assert_eq!(settings.max_tokens(), 2048);
        assert_eq!(settings.temperature(), 0.7);
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let mut config = ChatConfig::default();
        assert_eq!(config.url(Endpoint::ChatStream), "/api/chat/stream");

        config.api_base = String::from("https://tutor.example.com/");
        assert_eq!(config.url(Endpoint::Health), "https://tutor.example.com/api/health");
        assert_eq!(config.url(Endpoint::Chat), "https://tutor.example.com/api/chat");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ChatConfig = serde_json::from_str(r#"{"timeout_ms": 5000}"#).unwrap();
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.api_base, "");
    }

    #[test]
    fn test_invalid_config() {
        let config = ChatConfig {
            timeout_ms: 0,
            ..ChatConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));

        let config = ChatConfig {
            temperature: 3.5,
            ..ChatConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TemperatureOutOfRange(3.5))
        );
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = ChatSettings::default();
        assert!(settings.set_temperature(0.0).is_ok());
        assert!(settings.set_temperature(2.0).is_ok());
        assert!(settings.set_temperature(2.1).is_err());
        assert!(settings.set_temperature(f32::NAN).is_err());
        assert_eq!(settings.temperature(), 2.0);

        assert_eq!(
            settings.set_max_tokens(0),
            Err(ConfigError::MaxTokensOutOfRange(0))
        );
        assert!(settings.set_max_tokens(MAX_TOKENS_LIMIT + 1).is_err());
        assert!(settings.set_max_tokens(512).is_ok());
        assert_eq!(settings.max_tokens(), 512);
    }
}
