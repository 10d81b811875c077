use crate::config::SummaryConfig;
use crate::session::SharedSession;
use crate::types::{CaptionRecord, RecordingState};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// 要約サービスに渡すセッションメタデータ
#[derive(Clone, Debug)]
pub struct SummaryContext {
    /// 参加者数
    pub participants: usize,
    /// アクティブな言語コード
    pub language: String,
}

/// 要約サービスの共通トレイト
///
/// 蓄積された字幕とセッションメタデータを受け取り、短い要約文を返す。
/// 現状はテンプレート実装だが、実モデル呼び出しへの差し替えは
/// スケジューラのゲートロジックに触れずに行える。
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        captions: &[CaptionRecord],
        context: &SummaryContext,
    ) -> Result<String>;
}

/// テンプレートベースの要約実装
///
/// 字幕の件数と平均信頼度から定型文を組み立てる。
/// 返す文字列が空になることはない。
pub struct TemplateSummarizer;

#[async_trait]
impl Summarizer for TemplateSummarizer {
    async fn summarize(
        &self,
        captions: &[CaptionRecord],
        context: &SummaryContext,
    ) -> Result<String> {
        let spoken: Vec<&CaptionRecord> = captions.iter().filter(|c| !c.is_error()).collect();
        let avg_confidence = if spoken.is_empty() {
            0.0
        } else {
            spoken.iter().map(|c| c.confidence).sum::<f32>() / spoken.len() as f32
        };

        Ok(format!(
            "Conference Summary ({}): The session covered {} recent utterances \
             with {} active participants. Live captioning enabled in {} \
             with average confidence of {:.0}%.",
            chrono::Local::now().format("%H:%M:%S"),
            spoken.len(),
            context.participants,
            context.language.to_uppercase(),
            avg_confidence * 100.0,
        ))
    }
}

/// 時間ゲート付きの要約スケジューラ
///
/// 録音中かつ字幕が一定件数を超えている間だけ、固定間隔で
/// 要約サービスを呼び出して現在の要約スロットを上書きする。
pub struct SummaryScheduler;

impl SummaryScheduler {
    /// スケジューラタスクを起動
    ///
    /// ゲート条件:
    /// - 録音中でなくなったらタスク自体を終了する（タイマー解体）。
    ///   録音を再開する場合は改めて spawn し直す。
    /// - 録音中でも字幕が `min_captions` 件以下の間は何もしない
    pub fn spawn(
        session: SharedSession,
        summarizer: Arc<dyn Summarizer>,
        config: SummaryConfig,
        language: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(config.interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval の最初のティックは即時発火するため読み捨てる
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let (captions, gate_open) = {
                    let guard = session.lock().await;
                    let recording = guard.state() == RecordingState::Recording;
                    if !recording {
                        log::debug!("要約スケジューラ: 録音終了のためタイマーを解体");
                        break;
                    }
                    (
                        guard.captions().snapshot(),
                        guard.captions().len() > config.min_captions,
                    )
                };

                if !gate_open {
                    continue;
                }

                let context = SummaryContext {
                    participants: config.participants,
                    language: language.clone(),
                };

                match summarizer.summarize(&captions, &context).await {
                    Ok(summary) if !summary.is_empty() => {
                        log::debug!("要約を更新: {} 文字", summary.len());
                        session.lock().await.set_summary(summary);
                    }
                    Ok(_) => {
                        log::warn!("要約サービスが空の要約を返しました");
                    }
                    Err(e) => {
                        log::error!("要約生成に失敗: {}", e);
                    }
                }
            }
        })
    }
}
