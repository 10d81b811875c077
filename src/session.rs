use crate::caption::CaptionBuffer;
use crate::types::{CaptionRecord, RecordingState};
use std::sync::Arc;
use tokio::sync::Mutex;

/// タスク間で共有するセッションハンドル
///
/// チャンク収集タスク・要約スケジューラ・リレー受信タスクが
/// 同じセッションを参照する。すべての変更はこの型のロック越しに
/// `Session` の操作メソッドを通して行う。
pub type SharedSession = Arc<Mutex<Session>>;

/// 1回の録音ライフサイクルの状態
///
/// 録音状態・未送信チャンク・字幕バッファ・現在の要約・ルームIDを保持する。
/// 録音開始時にチャンクと以前の字幕/要約はリセットされる。
/// ルームIDはセッションをまたいで維持される。
#[derive(Debug)]
pub struct Session {
    state: RecordingState,
    chunks: Vec<Vec<u8>>,
    captions: CaptionBuffer,
    summary: String,
    room_id: String,
}

impl Session {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            state: RecordingState::Idle,
            chunks: Vec::new(),
            captions: CaptionBuffer::new(),
            summary: String::new(),
            room_id: room_id.into(),
        }
    }

    /// 共有ハンドルを作成
    pub fn shared(room_id: impl Into<String>) -> SharedSession {
        Arc::new(Mutex::new(Self::new(room_id)))
    }

    /// 録音を開始
    ///
    /// チャンク・字幕・要約をリセットして `Recording` に遷移する。
    pub fn begin_recording(&mut self) {
        self.chunks.clear();
        self.captions.clear();
        self.summary.clear();
        self.state = RecordingState::Recording;
    }

    /// 停止処理へ遷移
    ///
    /// `Recording` 中のみ有効。`Stopping` 中の二重呼び出しは no-op
    /// （文字起こしリクエストはセッションあたり同時に1つまで）。
    ///
    /// # Returns
    /// 遷移できた場合 true
    pub fn begin_stopping(&mut self) -> bool {
        if self.state == RecordingState::Recording {
            self.state = RecordingState::Stopping;
            true
        } else {
            false
        }
    }

    /// 停止処理の完了
    ///
    /// レスポンス消費後（成功・失敗どちらでも）に呼び、`Idle` に戻す。
    pub fn finish(&mut self) {
        self.state = RecordingState::Idle;
    }

    /// エンコード済みチャンクを追加
    ///
    /// 空チャンクは無視する。
    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// 蓄積チャンクを1つのペイロードに連結して取り出す
    ///
    /// セッション内のチャンクリストは空になる。
    pub fn take_payload(&mut self) -> Vec<u8> {
        let chunks = std::mem::take(&mut self.chunks);
        chunks.concat()
    }

    /// 字幕を追加（ローカル生成・リレー受信どちらも同じ経路）
    pub fn append_caption(&mut self, record: CaptionRecord) {
        self.captions.push(record);
    }

    /// 現在の要約を上書き
    ///
    /// 要約は追記やバージョン管理をせず、常に最新の1つだけを保持する。
    pub fn set_summary(&mut self, summary: String) {
        self.summary = summary;
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn captions(&self) -> &CaptionBuffer {
        &self.captions
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// 未送信チャンク数（テスト・デバッグ用途）
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_recording_resets_state() {
        let mut session = Session::new("room-demo-001");
        session.push_chunk(vec![1, 2, 3]);
        session.append_caption(CaptionRecord::new("old".to_string(), "You", "en", 0.9));
        session.set_summary("old summary".to_string());

        session.begin_recording();

        assert_eq!(session.state(), RecordingState::Recording);
        assert_eq!(session.chunk_count(), 0);
        assert!(session.captions().is_empty());
        assert!(session.summary().is_empty());
        // ルームIDは維持される
        assert_eq!(session.room_id(), "room-demo-001");
    }

    #[test]
    fn test_stop_transition_once_only() {
        let mut session = Session::new("r");
        assert!(!session.begin_stopping()); // Idle からは遷移できない

        session.begin_recording();
        assert!(session.begin_stopping());
        assert_eq!(session.state(), RecordingState::Stopping);

        // Stopping 中の二重停止は no-op
        assert!(!session.begin_stopping());

        session.finish();
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[test]
    fn test_take_payload_concatenates_in_order() {
        let mut session = Session::new("r");
        session.begin_recording();
        session.push_chunk(vec![1, 2]);
        session.push_chunk(vec![]); // 空チャンクは無視
        session.push_chunk(vec![3]);
        session.push_chunk(vec![4, 5]);

        let payload = session.take_payload();
        assert_eq!(payload, vec![1, 2, 3, 4, 5]);
        assert_eq!(session.chunk_count(), 0);

        // 2回目は空
        assert!(session.take_payload().is_empty());
    }
}
