//! フレームの解析
//!
//! ## Frame Format
//! ```text
//! 差分フレーム（タグなしイベント）:
//!   data: {"delta":"text"}
//!
//! 型付きイベントフレーム:
//!   event: start | end | error
//!   data: {...}            (複数行可、"\n" で連結)
//! ```

use alloc::borrow::Cow;
use alloc::string::String;

use serde_json::{Map, Value};

use crate::error::FrameError;
use crate::{DATA_TAG, EVENT_TAG};

/// error イベントに `error` フィールドが無い場合のメッセージ
const DEFAULT_STREAM_ERROR: &str = "Stream error";

/// フレームから取り出したイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// テキスト差分
    Delta(String),
    /// サーバーが生成を開始した（`event: start`）
    Start,
    /// サーバーが生成を終えた（`event: end`）
    End,
    /// サーバー側で生成中にエラーが起きた（`event: error`）
    Error(String),
}

impl StreamEvent {
    /// `Delta` の中身を返す
    pub fn as_delta(&self) -> Option<&str> {
        match self {
            StreamEvent::Delta(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// `Delta` なら中身の所有権ごと返す
    pub fn into_delta(self) -> Option<String> {
        match self {
            StreamEvent::Delta(text) => Some(text),
            _ => None,
        }
    }
}

/// バックログから切り出された 1 フレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    /// `event:` 行の値。`data:` で始まるフレームでは `None`
    pub event: Option<&'a str>,
    /// JSON ペイロード文字列
    pub data: Cow<'a, str>,
}

impl<'a> Frame<'a> {
    /// フレーム文字列（区切りの `"\n\n"` は含まない）を解析する
    ///
    /// # エラー
    /// - `data:` / `event:` のどちらでも始まらない場合は `FrameError::MissingTag`
    pub fn parse(text: &'a str) -> Result<Frame<'a>, FrameError> {
        if let Some(rest) = text.strip_prefix(DATA_TAG) {
            // タグ直後の空白（改行含む）をすべて読み飛ばし、残り全体をペイロードとする
            return Ok(Frame {
                event: None,
                data: Cow::Borrowed(rest.trim_start()),
            });
        }

        if let Some(rest) = text.strip_prefix(EVENT_TAG) {
            let mut lines = rest.split('\n');
            let name = lines.next().unwrap_or_default().trim();

            let mut data = String::new();
            let mut first = true;
            for line in lines {
                if let Some(value) = line.strip_prefix(DATA_TAG) {
                    if !first {
                        data.push('\n');
                    }
                    data.push_str(value.strip_prefix(' ').unwrap_or(value));
                    first = false;
                }
            }

            return Ok(Frame {
                event: Some(name),
                data: Cow::Owned(data),
            });
        }

        Err(FrameError::MissingTag)
    }

    /// フレームをイベントに変換する
    ///
    /// # 戻り値
    /// - `Ok(Some(event))`: 上位に渡すイベント
    /// - `Ok(None)`: 解析できたが何も運んでいない（delta 無し、未知のイベント名など）
    ///
    /// # エラー
    /// - ペイロードが必要なフレームで JSON 解析に失敗した場合は `FrameError::InvalidJson`
    pub fn into_event(self) -> Result<Option<StreamEvent>, FrameError> {
        match self.event {
            None => {
                let payload = parse_payload(&self.data)?;
                // 空文字列・文字列以外の delta は描画しない
                Ok(string_field(&payload, "delta")
                    .filter(|delta| !delta.is_empty())
                    .map(|delta| StreamEvent::Delta(String::from(delta))))
            }
            Some("start") => Ok(Some(StreamEvent::Start)),
            Some("end") => Ok(Some(StreamEvent::End)),
            Some("error") => {
                let payload = parse_payload(&self.data)?;
                let message = string_field(&payload, "error").unwrap_or(DEFAULT_STREAM_ERROR);
                Ok(Some(StreamEvent::Error(String::from(message))))
            }
            Some(_) => Ok(None),
        }
    }
}

/// ペイロードを JSON オブジェクトとして解析する
///
/// 未知のフィールドや型の違うフィールドは無視する。キーが重複した場合は後勝ち。
fn parse_payload(data: &str) -> Result<Map<String, Value>, FrameError> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(FrameError::InvalidJson),
    }
}

fn string_field<'m>(payload: &'m Map<String, Value>, key: &str) -> Option<&'m str> {
    payload.get(key).and_then(Value::as_str)
}
