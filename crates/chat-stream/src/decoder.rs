//! ストリームフレームデコーダ本体

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use crate::frame::{Frame, StreamEvent};
use crate::utf8::Utf8Accumulator;
use crate::FRAME_DELIMITER;

/// デコーダの統計情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// 受け取った総バイト数
    pub bytes_fed: u64,
    /// 切り出したフレーム数（空フレームは除く）
    pub frames: u64,
    /// 上位に渡した delta 数
    pub deltas: u64,
    /// 解析に失敗して破棄したフレーム数
    pub dropped_frames: u64,
    /// ストリーム終端で破棄した未完成バイト数
    pub discarded_bytes: u64,
}

/// 受信チャンクからフレームを取り出すステートフルなデコーダ
///
/// ## 不変条件
/// `feed` / `feed_events` から戻った時点で、バックログには完全なフレーム
/// （`"\n\n"` で終端したもの）が一つも残っていない。
///
/// ## 使い方
/// ```
/// use chat_stream::StreamFrameDecoder;
///
/// let mut decoder = StreamFrameDecoder::new();
/// assert!(decoder.feed(b"data: {\"delta\":\"par").is_empty());
/// assert_eq!(decoder.feed(b"tial\"}\n\n"), ["partial"]);
/// ```
#[derive(Debug, Default)]
pub struct StreamFrameDecoder {
    /// チャンク境界で切れた UTF-8 シーケンスの保持
    utf8: Utf8Accumulator,
    /// まだフレームとして完結していないテキスト
    backlog: String,
    /// 区切り探索の再開位置（バイトオフセット）
    scan_from: usize,
    /// 統計情報
    stats: DecoderStats,
}

impl StreamFrameDecoder {
    /// 新しいデコーダを生成する
    pub fn new() -> Self {
        StreamFrameDecoder {
            utf8: Utf8Accumulator::new(),
            backlog: String::new(),
            scan_from: 0,
            stats: DecoderStats::default(),
        }
    }

    /// チャンクを取り込み、完結したフレームの delta を返す
    ///
    /// `data:` で始まらないフレーム・JSON として不正なフレーム・delta の無い
    /// フレームは何も返さない。エラーにはならない。
    ///
    /// # 引数
    /// - `chunk`: ネットワークから読み取った生バイト列
    ///
    /// # 戻り値
    /// このチャンクで完結したフレームの delta（到着順）
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.feed_events(chunk)
            .into_iter()
            .filter_map(StreamEvent::into_delta)
            .collect()
    }

    /// チャンクを取り込み、完結したフレームのイベントを返す
    ///
    /// `feed` と同じフレーミングで、`event: start|end|error` の型付きフレームも
    /// イベントとして返す。
    pub fn feed_events(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if chunk.is_empty() {
            return events;
        }

        self.stats.bytes_fed += chunk.len() as u64;
        self.utf8.decode(chunk, &mut self.backlog);

        while let Some(idx) = self.find_delimiter() {
            let frame = self.take_frame(idx);
            if frame.is_empty() {
                continue;
            }
            self.stats.frames += 1;

            match Frame::parse(&frame).and_then(Frame::into_event) {
                Ok(Some(event)) => {
                    if matches!(event, StreamEvent::Delta(_)) {
                        self.stats.deltas += 1;
                    }
                    events.push(event);
                }
                Ok(None) => {}
                Err(_) => self.stats.dropped_frames += 1,
            }
        }

        // 区切りの 1 バイト目だけ届いている可能性があるので 1 バイト手前から再開する
        self.scan_from = self.backlog.len().saturating_sub(FRAME_DELIMITER.len() - 1);
        events
    }

    /// ストリーム終端を処理する
    ///
    /// 区切りで終わっていない末尾はフレームではないので破棄し、
    /// デコーダを次のストリームに使える状態に戻す。
    ///
    /// # 戻り値
    /// 破棄したバイト数（未完成の UTF-8 シーケンスを含む）
    pub fn finish(&mut self) -> usize {
        let discarded = self.backlog.len() + self.utf8.finish();
        self.backlog.clear();
        self.scan_from = 0;
        self.stats.discarded_bytes += discarded as u64;
        discarded
    }

    /// 未完結のテキスト
    pub fn backlog(&self) -> &str {
        &self.backlog
    }

    /// 保持中のデータが何も無いか
    pub fn is_idle(&self) -> bool {
        self.backlog.is_empty() && self.utf8.pending_len() == 0
    }

    /// 統計情報
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    // ===== Private メソッド =====

    /// バックログ中の次の区切り位置を探す
    ///
    /// `'\n'` は UTF-8 のマルチバイト列に現れないので、バイト単位で探索してよい。
    fn find_delimiter(&self) -> Option<usize> {
        let delimiter = FRAME_DELIMITER.as_bytes();
        self.backlog.as_bytes()[self.scan_from..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)
            .map(|pos| pos + self.scan_from)
    }

    /// 区切りまでをバックログから取り除き、フレーム本体を返す
    fn take_frame(&mut self, idx: usize) -> String {
        let rest = self.backlog.split_off(idx + FRAME_DELIMITER.len());
        let mut frame = core::mem::replace(&mut self.backlog, rest);
        frame.truncate(idx);
        self.scan_from = 0;
        frame
    }
}
