//! live-caption - ルーム単位のライブ字幕配信・要約システム
//!
//! このクレートは、マイク入力をチャンク化して文字起こしゲートウェイに
//! 送信し、得られた字幕を同じルームの参加者にリアルタイム配信する
//! システムを提供します。
//!
//! # 主な機能
//!
//! - **チャンク化キャプチャ**: マイク入力を一定間隔のPCMチャンクとして蓄積し、録音停止時に1リクエストへ連結
//! - **文字起こしゲートウェイ**: base64音声を受け取るHTTPエンドポイント（`--serve` モード）
//! - **ルームブロードキャスト**: 改行区切りJSONのリレー経由で同室参加者に字幕を配信
//! - **スタンドアロンフォールバック**: リレー接続が猶予時間内に確立しなければローカル機能のみで継続
//! - **時間ゲート付き要約**: 録音中かつ字幕が一定件数を超えている間、固定間隔で要約を更新
//!
//! # アーキテクチャ
//!
//! ```text
//! [Microphone] → [CpalAudioSource] → [CaptureClient] → [HttpTranscribeClient]
//!                                          │                    │
//!                                          ↓                    ↓ POST /transcribe
//!                                    [Session]            [Gateway Server]
//!                                     │     ↑
//!                          ┌──────────┘     └──────────┐
//!                          ↓                           │
//!                  [SummaryScheduler]         [ConnectionSession]
//!                          │                           │
//!                          ↓                           ↓ JSON lines / TCP
//!                      [Summary]                 [Relay / RoomRegistry]
//!                                                      │
//!                                                      ↓
//!                                               [Room Peers]
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use live_caption::config::Config;
//!
//! // 設定ファイルを読み込み
//! let config = Config::load_or_default("config.toml").unwrap();
//!
//! // またはデフォルト設定を生成
//! Config::write_default("config.toml").unwrap();
//! ```

pub mod audio_source;
pub mod capture;
pub mod caption;
pub mod config;
pub mod connection;
pub mod error;
pub mod relay;
pub mod server;
pub mod session;
pub mod summary;
pub mod transcribe;
pub mod types;
