//! # chat-stream
//!
//! ストリーミング応答（chunked HTTP body）のフレームデコーダ。
//!
//! `/api/chat/stream` が返すバイト列を受け取り、空行区切りのフレームを切り出して
//! テキスト差分（delta）を取り出す。`no_std` + `alloc` 環境（WASM を含む）で動作する。
//!
//! ## Wire Format
//!
//! ```text
//! data: {"delta":"こん"}\n\n
//! data: {"delta":"にちは"}\n\n
//! event: end\n
//! data: {}\n\n
//! ```
//!
//! - フレームは `"\n\n"` で区切られる
//! - `data:` で始まるフレームのみ delta を運ぶ（タグの後の空白は無視）
//! - `event: <name>` で始まるフレームは型付きイベント（start / end / error）
//! - JSON として解釈できないフレームは黙って破棄する（ストリームは止めない）
//!
//! ## 処理フロー
//!
//! ```text
//! RawChunk ──▶ Utf8Accumulator ──▶ Backlog ──▶ Frame::parse ──▶ StreamEvent
//!             (境界で切れた         ("\n\n" で     (tag + JSON)
//!              マルチバイトを保持)    切り出す)
//! ```

#![no_std]
extern crate alloc;

pub mod decoder;
pub mod error;
pub mod frame;
pub mod utf8;

pub use decoder::{DecoderStats, StreamFrameDecoder};
pub use error::FrameError;
pub use frame::{Frame, StreamEvent};
pub use utf8::Utf8Accumulator;

/// フレーム区切り（空行）
pub const FRAME_DELIMITER: &str = "\n\n";

/// delta を運ぶフレームの先頭タグ
pub const DATA_TAG: &str = "data:";

/// 型付きイベントフレームの先頭タグ
pub const EVENT_TAG: &str = "event:";
