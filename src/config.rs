use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub transcribe: TranscribeConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// オーディオ入力設定
///
/// # デフォルト値
///
/// - `device_id`: "default" (システムのデフォルトデバイス)
/// - `sample_rate`: 16000 Hz
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

/// キャプチャ設定
///
/// 録音セッションのチャンク生成間隔と字幕メタデータ。
///
/// # デフォルト値
///
/// - `chunk_interval_ms`: 1000 ms (1秒ごとにチャンクを生成)
/// - `language`: "en"
/// - `speaker`: "You"
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_chunk_interval_ms")]
    pub chunk_interval_ms: u64,
    #[serde(default = "default_capture_language")]
    pub language: String,
    #[serde(default = "default_speaker")]
    pub speaker: String,
}

/// 文字起こしゲートウェイ（クライアント側）設定
///
/// # デフォルト値
///
/// - `gateway_url`: "http://127.0.0.1:3000"
/// - `timeout_seconds`: 30 秒
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscribeConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// ルームブロードキャストリレー（クライアント側）設定
///
/// `enabled = false` の場合は接続を試みず、最初から
/// スタンドアロンモードで動作する。
///
/// # デフォルト値
///
/// - `enabled`: true
/// - `endpoint`: "127.0.0.1:9090"
/// - `connect_timeout_secs`: 3 秒（猶予時間）
/// - `room_id`: "room-demo-001"
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_enabled")]
    pub enabled: bool,
    #[serde(default = "default_relay_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_room_id")]
    pub room_id: String,
}

/// 要約スケジューラ設定
///
/// # デフォルト値
///
/// - `interval_secs`: 20 秒
/// - `min_captions`: 3 件（この件数を超えたら要約を開始）
/// - `participants`: 3 人（要約文面に使う参加者数）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_min_captions")]
    pub min_captions: usize,
    #[serde(default = "default_participants")]
    pub participants: usize,
}

/// サーバーモード設定
///
/// # デフォルト値
///
/// - `http_addr`: "0.0.0.0:3000" (文字起こしゲートウェイ + ヘルスチェック)
/// - `relay_addr`: "0.0.0.0:9090" (ルームブロードキャストリレー)
/// - `temp_dir`: "./temp" (処理中の音声の一時置き場)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_relay_addr")]
    pub relay_addr: String,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
}

/// ログ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default functions
fn default_device_id() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_chunk_interval_ms() -> u64 {
    1000 // 1秒ごとにチャンクを生成
}

fn default_capture_language() -> String {
    "en".to_string()
}

fn default_speaker() -> String {
    "You".to_string()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_relay_enabled() -> bool {
    true
}

fn default_relay_endpoint() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    3 // 猶予時間内に接続できなければスタンドアロンモード
}

fn default_room_id() -> String {
    "room-demo-001".to_string()
}

fn default_summary_interval_secs() -> u64 {
    20
}

fn default_min_captions() -> usize {
    3
}

fn default_participants() -> usize {
    3
}

fn default_http_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_relay_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_temp_dir() -> String {
    "./temp".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            capture: CaptureConfig::default(),
            transcribe: TranscribeConfig::default(),
            relay: RelayConfig::default(),
            summary: SummaryConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: default_chunk_interval_ms(),
            language: default_capture_language(),
            speaker: default_speaker(),
        }
    }
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: default_relay_enabled(),
            endpoint: default_relay_endpoint(),
            connect_timeout_secs: default_connect_timeout_secs(),
            room_id: default_room_id(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_summary_interval_secs(),
            min_captions: default_min_captions(),
            participants: default_participants(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            relay_addr: default_relay_addr(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// TOML形式の設定ファイルをパースしてConfig構造体を生成する。
    ///
    /// # Errors
    ///
    /// ファイルの読み込みまたはパースに失敗した場合にエラーを返す。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("設定ファイルの読み込みに失敗: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "設定ファイルのパースに失敗")?;
        Ok(config)
    }

    /// デフォルト設定をファイルに書き出し
    ///
    /// 既存のファイルは上書きされる。
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        let content =
            toml::to_string_pretty(&config).with_context(|| "設定のシリアライズに失敗")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("設定ファイルの書き込みに失敗: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// 設定ファイルがあれば読み込み、なければデフォルトを使用
    ///
    /// # Errors
    ///
    /// ファイルが存在するがパースに失敗した場合にエラーを返す。
    /// ファイルが存在しない場合はエラーにならず、デフォルト設定を返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }
}
