use crate::types::CaptionRecord;
use std::collections::VecDeque;

/// 字幕バッファの上限件数
///
/// 直近の会話のスライディングウィンドウとして機能させるための
/// 意図的な制限。メモリと表示量を抑える代わりに、古い字幕は
/// 要約の対象からも外れる。
pub const HISTORY_LIMIT: usize = 10;

/// 直近の字幕を保持する有界バッファ
///
/// 挿入順を保ち、上限を超えたら最古のレコードから追い出す (FIFO)。
/// 発話者自身のクライアントでも、ブロードキャストを受信した
/// 各ピアのクライアントでも、まったく同じ使い方をする。
///
/// # Examples
///
/// ```
/// # use live_caption::caption::{CaptionBuffer, HISTORY_LIMIT};
/// # use live_caption::types::CaptionRecord;
/// let mut buffer = CaptionBuffer::new();
/// for i in 0..15 {
///     buffer.push(CaptionRecord::new(format!("utterance {i}"), "You", "en", 0.9));
/// }
/// assert_eq!(buffer.len(), HISTORY_LIMIT);
/// assert_eq!(buffer.snapshot()[0].text, "utterance 5");
/// ```
#[derive(Debug, Default)]
pub struct CaptionBuffer {
    records: VecDeque<CaptionRecord>,
}

impl CaptionBuffer {
    pub fn new() -> Self {
        Self {
            records: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// 字幕を追加
    ///
    /// 上限を超えた場合は最古のレコードを追い出す。償却 O(1)。
    pub fn push(&mut self, record: CaptionRecord) {
        self.records.push_back(record);
        while self.records.len() > HISTORY_LIMIT {
            self.records.pop_front();
        }
    }

    /// 現在の内容を挿入順で取得（読み取り専用スナップショット）
    pub fn snapshot(&self) -> Vec<CaptionRecord> {
        self.records.iter().cloned().collect()
    }

    /// 保持している件数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// バッファが空かどうか
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// バッファをクリア
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
