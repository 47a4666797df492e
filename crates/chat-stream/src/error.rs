//! フレーム解析エラー型

/// フレーム単位のエラー
///
/// どちらもデコーダ内部で吸収され、呼び出し側には伝播しない。
/// 破棄されたフレーム数は [`crate::DecoderStats`] で確認できる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// `data:` / `event:` タグで始まっていない（ハートビート等）
    MissingTag,
    /// ペイロードが JSON オブジェクトとして解釈できない
    InvalidJson,
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::MissingTag => write!(f, "Frame does not start with a data or event tag"),
            FrameError::InvalidJson => write!(f, "Frame payload is not a valid JSON object"),
        }
    }
}
