use serde::{Deserialize, Serialize};

/// 録音セッションの状態
///
/// `idle → recording → stopping → idle` の順に遷移する。
/// 同一セッションで文字起こしリクエストが重複して発行されることはない。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    /// 待機中（録音していない）
    Idle,

    /// 録音中
    ///
    /// 一定間隔でエンコード済みチャンクが蓄積される
    Recording,

    /// 停止処理中
    ///
    /// 入力デバイスを解放し、蓄積チャンクを1つのペイロードに
    /// 連結して文字起こしリクエストを発行する
    Stopping,
}

/// リレー接続の状態
///
/// 猶予時間内に `Connected` へ到達できなければ `Disconnected` に戻り、
/// アプリケーション全体がスタンドアロンモードで動作する。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// 未接続（スタンドアロンモード）
    Disconnected,

    /// 接続試行中
    Connecting,

    /// 接続済み（ルーム参加済み）
    Connected,
}

/// 字幕レコード
///
/// 認識された1つの発話。話者・タイムスタンプ・言語・信頼度を持つ。
/// リレー経由で他の参加者にもそのまま配信される。
///
/// # 不変条件
///
/// `confidence == 0.0` かつ `language == "error"` となるのは
/// キャプチャ/処理失敗を表す合成レコードの場合のみ。
/// 文字起こし結果が空だった場合はレコード自体を作らない。
///
/// # Examples
///
/// ```
/// # use live_caption::types::CaptionRecord;
/// let caption = CaptionRecord::new("こんにちは".to_string(), "You", "ja", 0.9);
/// assert!(!caption.is_error());
///
/// let error = CaptionRecord::system_error("Error: Failed to process audio.");
/// assert!(error.is_error());
/// assert_eq!(error.confidence, 0.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    /// 時刻由来の識別子（エポックミリ秒）
    pub id: u64,

    /// 発話テキスト（空文字列にはならない）
    pub text: String,

    /// 話者ラベル
    ///
    /// 失敗レコードの場合は "System"
    pub speaker: String,

    /// 表示用タイムスタンプ（"%H:%M:%S"）
    pub timestamp: String,

    /// 言語コード（"en", "ja" など。失敗レコードは "error"）
    pub language: String,

    /// 信頼度 (0.0〜1.0)
    pub confidence: f32,
}

impl CaptionRecord {
    /// 新しい字幕レコードを作成
    ///
    /// id は現在時刻のエポックミリ秒、timestamp はローカル時刻から生成する。
    pub fn new(
        text: String,
        speaker: impl Into<String>,
        language: impl Into<String>,
        confidence: f32,
    ) -> Self {
        let now = chrono::Local::now();
        Self {
            id: now.timestamp_millis() as u64,
            text,
            speaker: speaker.into(),
            timestamp: now.format("%H:%M:%S").to_string(),
            language: language.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// 失敗を表す合成レコードを作成
    ///
    /// 話者 "System"、言語 "error"、信頼度 0.0 で固定。
    /// UI側は成功レコードと同じ経路で描画できる。
    pub fn system_error(text: impl Into<String>) -> Self {
        Self::new(text.into(), "System", "error", 0.0)
    }

    /// 失敗レコードかどうか
    pub fn is_error(&self) -> bool {
        self.confidence == 0.0 && self.language == "error"
    }
}

/// 文字起こしリクエスト
///
/// `POST /transcribe` のリクエストボディ。
/// audio は base64 エンコードされたペイロード。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscribeRequest {
    /// base64 エンコード済み音声ペイロード
    ///
    /// 欠落時は空文字列になり、400 (MissingAudio) として扱う
    #[serde(default)]
    pub audio: String,

    /// 言語ヒント（省略時 "en"）
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

/// 文字起こし結果
///
/// `POST /transcribe` のレスポンスボディ。
///
/// # JSON出力例
///
/// ```json
/// {
///   "text": "Long audio recording processed",
///   "language": "en",
///   "confidence": 0.8
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// 文字起こしテキスト（成功時に空になることはない）
    pub text: String,

    /// 検出された言語（現状はヒントをそのまま返す）
    pub language: String,

    /// 信頼度 (0.0〜1.0)
    pub confidence: f32,
}
