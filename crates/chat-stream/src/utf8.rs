//! インクリメンタル UTF-8 デコーダ
//!
//! ネットワークの読み取り単位はバイト境界なので、マルチバイト文字
//! （日本語・中国語・絵文字など）がチャンク境界で分断されることがある。
//! 不完全な末尾バイト列は次のチャンクが届くまで保持する。

use alloc::string::String;
use alloc::vec::Vec;

/// チャンク境界をまたぐ UTF-8 シーケンスを保持するデコーダ
///
/// ブラウザの `TextDecoder`（`stream: true`）と同じく、不正なバイト列は
/// U+FFFD に置き換えて処理を継続する。
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    /// 前回のチャンク末尾で未完成だったバイト列（最大 3 バイト）
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    /// 新しいデコーダを生成する
    pub fn new() -> Self {
        Utf8Accumulator {
            pending: Vec::new(),
        }
    }

    /// チャンクをデコードして `out` に追記する
    ///
    /// # 引数
    /// - `chunk`: 受信したバイト列
    /// - `out`: デコード結果の追記先
    ///
    /// # 戻り値
    /// `out` に追記したバイト数
    pub fn decode(&mut self, chunk: &[u8], out: &mut String) -> usize {
        let before = out.len();

        let joined;
        let mut input: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            self.pending.extend_from_slice(chunk);
            joined = core::mem::take(&mut self.pending);
            &joined
        };

        loop {
            match core::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(text) = core::str::from_utf8(&input[..valid]) {
                        out.push_str(text);
                    }
                    match err.error_len() {
                        // 不正なシーケンス → 置換文字を出して読み進める
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &input[valid + len..];
                        }
                        // 末尾が未完成 → 次のチャンクまで保持
                        None => {
                            self.pending.extend_from_slice(&input[valid..]);
                            break;
                        }
                    }
                }
            }
        }

        out.len() - before
    }

    /// 保持中の未完成バイト数
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// ストリーム終端：保持中のバイトを破棄し、その数を返す
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }
}
