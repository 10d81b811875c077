use crate::config::TranscribeConfig;
use crate::error::CaptionError;
use crate::types::{TranscribeRequest, TranscriptResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use std::io::Cursor;

/// 文字起こしサービスの共通トレイト
///
/// 音声ペイロードと言語ヒントを受け取り、認識テキスト・検出言語・
/// 信頼度を返す。HTTPゲートウェイ実装とテスト用モックが差し替え可能。
#[async_trait]
pub trait TranscribeService: Send + Sync {
    /// 1つの音声ペイロードを文字起こし
    ///
    /// # Errors
    ///
    /// - ペイロードが空: `CaptionError::MissingAudio`
    /// - それ以外の失敗: `CaptionError::TranscriptionFailed`
    async fn transcribe(&self, pcm: &[u8], language: &str)
        -> Result<TranscriptResult, CaptionError>;
}

/// 文字起こしゲートウェイのHTTPクライアント
///
/// PCMペイロードをWAVに変換し、base64エンコードして
/// `POST /transcribe` に送信する。
pub struct HttpTranscribeClient {
    endpoint: String,
    sample_rate: u32,
    client: reqwest::Client,
}

impl HttpTranscribeClient {
    pub fn new(config: &TranscribeConfig, sample_rate: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("文字起こしHTTPクライアント作成失敗")?;

        Ok(Self {
            endpoint: format!("{}/transcribe", config.gateway_url.trim_end_matches('/')),
            sample_rate,
            client,
        })
    }

    /// PCMデータ (16bit LE) をWAVフォーマットに変換
    fn pcm_to_wav(&self, pcm: &[u8]) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("WAVライター作成失敗")?;

            for bytes in pcm.chunks_exact(2) {
                let sample = i16::from_le_bytes([bytes[0], bytes[1]]);
                writer.write_sample(sample).context("WAV書き込み失敗")?;
            }

            writer.finalize().context("WAV finalize失敗")?;
        }

        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl TranscribeService for HttpTranscribeClient {
    async fn transcribe(
        &self,
        pcm: &[u8],
        language: &str,
    ) -> Result<TranscriptResult, CaptionError> {
        if pcm.is_empty() {
            return Err(CaptionError::MissingAudio);
        }

        let wav_data = self
            .pcm_to_wav(pcm)
            .map_err(|e| CaptionError::TranscriptionFailed(e.to_string()))?;

        log::debug!("文字起こしリクエスト: WAVデータサイズ {} バイト", wav_data.len());

        let request = TranscribeRequest {
            audio: BASE64_STANDARD.encode(&wav_data),
            language: language.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CaptionError::TranscriptionFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(CaptionError::MissingAudio);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CaptionError::TranscriptionFailed(format!(
                "{} - {}",
                status, error_text
            )));
        }

        response
            .json::<TranscriptResult>()
            .await
            .map_err(|e| CaptionError::TranscriptionFailed(e.to_string()))
    }
}
