use crate::config::AudioConfig;
use crate::error::CaptionError;
use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use regex_lite::Regex;
use tokio::sync::mpsc;

/// チャンク化された音声ソースの抽象
///
/// 連続したマイク入力を「一定間隔のエンコード済みチャンク」の列に
/// 変換するものなら何でもよい。ネイティブオーディオAPI、
/// ハードウェアドライバのシム、テスト用のモックが差し替え可能。
pub trait ChunkedAudioSource {
    /// キャプチャを開始し、チャンクの受信チャンネルを返す
    ///
    /// # Errors
    ///
    /// 権限拒否やデバイス不在の場合は `CaptionError::DeviceUnavailable`。
    fn start(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, CaptionError>;

    /// キャプチャを停止し、入力ハンドルを解放する
    ///
    /// 解放後、受信チャンネルはクローズされる。
    fn stop(&mut self);
}

/// cpal ベースのマイク入力ソース
///
/// デバイスからの入力をモノラル PCM16 (リトルエンディアン) に変換し、
/// 設定された間隔ぶんのサンプルがたまるたびに1チャンクとして送出する。
pub struct CpalAudioSource {
    device_id: String,
    sample_rate: u32,
    chunk_interval_ms: u64,
    stream: Option<cpal::Stream>,
}

impl CpalAudioSource {
    pub fn new(config: &AudioConfig, chunk_interval_ms: u64) -> Self {
        Self {
            device_id: config.device_id.clone(),
            sample_rate: config.sample_rate,
            chunk_interval_ms,
            stream: None,
        }
    }

    /// デバイスを取得
    fn acquire_device(&self) -> Result<cpal::Device, CaptionError> {
        let host = cpal::default_host();

        if self.device_id == "default" {
            host.default_input_device()
                .ok_or_else(|| CaptionError::DeviceUnavailable("デフォルト入力デバイスなし".to_string()))
        } else {
            // デバイスIDが指定されている場合は、デバイス一覧から検索
            Self::input_devices()
                .map_err(|e| CaptionError::DeviceUnavailable(e.to_string()))?
                .into_iter()
                .find(|d| d.name().ok().as_deref() == Some(&self.device_id))
                .ok_or_else(|| CaptionError::DeviceUnavailable(self.device_id.clone()))
        }
    }

    /// ストリームを構築
    fn build_stream<T>(
        &self,
        device: &cpal::Device,
        tx: mpsc::Sender<Vec<u8>>,
        channels: u16,
    ) -> Result<cpal::Stream, CaptionError>
    where
        T: SizedSample + Sample + Send + 'static,
        <T as Sample>::Float: Into<f32>,
    {
        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let samples_per_chunk =
            (self.sample_rate as u64 * self.chunk_interval_ms / 1000) as usize;
        let mut pending: Vec<u8> = Vec::with_capacity(samples_per_chunk * 2);

        let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
            // インターリーブされたフレームをモノラルPCM16に変換
            for frame in data.chunks(channels as usize) {
                let mut acc = 0.0f32;
                for sample in frame {
                    let f: f32 = sample.to_float_sample().into();
                    acc += f;
                }
                let mono = (acc / channels as f32).clamp(-1.0, 1.0);
                let i16_sample = (mono * i16::MAX as f32) as i16;
                pending.extend_from_slice(&i16_sample.to_le_bytes());
            }

            // 1チャンクぶんたまったら送出（レスポンスは待たない）
            while pending.len() >= samples_per_chunk * 2 {
                let chunk: Vec<u8> = pending.drain(..samples_per_chunk * 2).collect();
                match tx.try_send(chunk) {
                    Ok(_) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::warn!("音声チャンクの送信失敗: バッファ満杯");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        log::warn!("音声チャンクの送信失敗: チャンネルクローズ");
                    }
                }
            }
        };

        let error_callback = move |err| {
            log::error!("ストリームエラー: {}", err);
        };

        device
            .build_input_stream(&stream_config, data_callback, error_callback, None)
            .map_err(|e| CaptionError::DeviceUnavailable(e.to_string()))
    }

    /// デバイス一覧を表示
    pub fn list_devices() -> Result<()> {
        println!("利用可能な入力デバイス:");
        println!();

        for (idx, device) in Self::input_devices()?.into_iter().enumerate() {
            let name = device.name()?;
            println!("  [{}] {}", idx, name);

            device.supported_input_configs()?.for_each(|config_range| {
                println!(
                    "      フォーマット: {:?}, {}-{}Hz, {}ch",
                    config_range.sample_format(),
                    config_range.min_sample_rate().0,
                    config_range.max_sample_rate().0,
                    config_range.channels()
                );
            });
            println!();
        }

        Ok(())
    }

    /// 仮想デバイスや会議アプリのデバイスを除外した入力デバイス一覧を取得
    fn input_devices() -> Result<Vec<cpal::Device>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()?
            .filter(|device| {
                if let Ok(name) = device.name() {
                    // 除外するデバイス名のリスト
                    let excluded_names_regex = Regex::new(
                        "AirPods|iPhone|Webcam|Background|Microsoft Teams|ZoomAudioDevice",
                    )
                    .unwrap();
                    !excluded_names_regex.is_match(&name)
                } else {
                    true
                }
            })
            .collect();
        Ok(devices)
    }
}

impl ChunkedAudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, CaptionError> {
        let device = self.acquire_device()?;
        log::info!("入力デバイス: {:?}", device.name());

        let default_config = device
            .default_input_config()
            .map_err(|e| CaptionError::DeviceUnavailable(e.to_string()))?;
        let channels = default_config.channels();

        let (tx, rx) = mpsc::channel::<Vec<u8>>(64);

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(&device, tx, channels)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(&device, tx, channels)?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(&device, tx, channels)?,
            cpal::SampleFormat::I32 => self.build_stream::<i32>(&device, tx, channels)?,
            other => {
                return Err(CaptionError::DeviceUnavailable(format!(
                    "サポートされていないサンプルフォーマット: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| CaptionError::DeviceUnavailable(e.to_string()))?;
        self.stream = Some(stream);

        log::info!("音声入力ストリームを開始しました");
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            log::info!("音声入力ストリームを停止しました");
        }
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        self.stop();
    }
}
