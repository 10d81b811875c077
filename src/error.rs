use thiserror::Error;

/// 字幕パイプラインのエラー分類
///
/// 4分類それぞれで呼び出し側の扱いが異なる:
///
/// - `DeviceUnavailable`: ユーザー向け。権限付与後の再試行で回復可能
/// - `MissingAudio`: リクエスト不正。そのままの再試行では回復しない
/// - `TranscriptionFailed`: 内部/上流の失敗。合成字幕として表示し、セッションは継続
/// - `RelayUnreachable`: スタンドアロンモードへ静かにフォールバック（エラー表示しない）
#[derive(Debug, Error)]
pub enum CaptionError {
    /// 音声入力デバイスを取得できない（権限拒否、デバイスなし）
    #[error("音声入力デバイスを取得できません: {0}")]
    DeviceUnavailable(String),

    /// リクエストに音声データが含まれていない
    #[error("音声データがありません")]
    MissingAudio,

    /// 文字起こし処理の失敗（呼び出し側には常に汎用エラーとして見せる）
    #[error("文字起こしに失敗しました: {0}")]
    TranscriptionFailed(String),

    /// リレーサーバーに到達できない
    #[error("リレーサーバーに接続できません: {0}")]
    RelayUnreachable(String),
}

impl CaptionError {
    /// 同じ入力での再試行に意味があるかどうか
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CaptionError::MissingAudio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_audio_not_retryable() {
        assert!(!CaptionError::MissingAudio.is_retryable());
        assert!(CaptionError::DeviceUnavailable("permission denied".to_string()).is_retryable());
        assert!(CaptionError::TranscriptionFailed("timeout".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = CaptionError::RelayUnreachable("127.0.0.1:9090".to_string());
        assert!(err.to_string().contains("127.0.0.1:9090"));
    }
}
