use crate::audio_source::ChunkedAudioSource;
use crate::config::{CaptureConfig, SummaryConfig};
use crate::session::SharedSession;
use crate::summary::{Summarizer, SummaryScheduler};
use crate::transcribe::TranscribeService;
use crate::types::{CaptionRecord, RecordingState};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// マイク権限エラー時にUIへ出す字幕テキスト
const START_FAILED_TEXT: &str =
    "Error: Failed to start recording. Please check microphone permissions.";

/// 文字起こし失敗時にUIへ出す字幕テキスト
const PROCESS_FAILED_TEXT: &str = "Error: Failed to process audio. Please try again.";

/// 録音セッションのクライアント
///
/// 連続したマイク入力を1セッション1リクエストの文字起こしに変換する。
/// 録音中はチャンク収集タスクと要約スケジューラが動き、停止時に
/// 蓄積チャンクを連結した単一ペイロードでゲートウェイを1回だけ呼ぶ。
///
/// キャプチャ・文字起こしの失敗は合成字幕（話者 "System"）に変換して
/// セッションを継続する。セッションそのものを落とすことはない。
pub struct CaptureClient {
    session: SharedSession,
    source: Box<dyn ChunkedAudioSource>,
    transcriber: Arc<dyn TranscribeService>,
    summarizer: Arc<dyn Summarizer>,
    capture_config: CaptureConfig,
    summary_config: SummaryConfig,
    /// リレーへの送信チャンネル（スタンドアロンモードでは None）
    publish_tx: Option<mpsc::Sender<CaptionRecord>>,
    chunk_task: Option<JoinHandle<()>>,
    summary_task: Option<JoinHandle<()>>,
}

impl CaptureClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: SharedSession,
        source: Box<dyn ChunkedAudioSource>,
        transcriber: Arc<dyn TranscribeService>,
        summarizer: Arc<dyn Summarizer>,
        capture_config: CaptureConfig,
        summary_config: SummaryConfig,
        publish_tx: Option<mpsc::Sender<CaptionRecord>>,
    ) -> Self {
        Self {
            session,
            source,
            transcriber,
            summarizer,
            capture_config,
            summary_config,
            publish_tx,
            chunk_task: None,
            summary_task: None,
        }
    }

    /// 録音を開始
    ///
    /// 入力デバイスの取得に失敗した場合はセッションを落とさず、
    /// 失敗を表す合成字幕を追加して `Idle` のままにする。
    pub async fn start_recording(&mut self) {
        if self.session.lock().await.state() != RecordingState::Idle {
            log::debug!("すでに録音中のため開始要求を無視");
            return;
        }

        let rx = match self.source.start() {
            Ok(rx) => rx,
            Err(e) => {
                log::error!("録音開始に失敗: {}", e);
                self.session
                    .lock()
                    .await
                    .append_caption(CaptionRecord::system_error(START_FAILED_TEXT));
                return;
            }
        };

        self.session.lock().await.begin_recording();
        log::info!("録音を開始しました");

        // チャンク収集タスク: ソースが解放されるまで受信し続ける。
        // レスポンスを待たずに次のチャンクを受け入れる (push-interval)。
        let session = self.session.clone();
        self.chunk_task = Some(tokio::spawn(async move {
            let mut rx = rx;
            while let Some(chunk) = rx.recv().await {
                session.lock().await.push_chunk(chunk);
            }
        }));

        // 要約スケジューラ: 録音終了で自然に終了する
        if let Some(old) = self.summary_task.take() {
            old.abort();
        }
        self.summary_task = Some(SummaryScheduler::spawn(
            self.session.clone(),
            self.summarizer.clone(),
            self.summary_config.clone(),
            self.capture_config.language.clone(),
        ));
    }

    /// 録音を停止し、蓄積チャンクを文字起こしする
    ///
    /// 文字起こしリクエストはセッションあたり1回だけ発行する。
    /// 停止処理中の二重呼び出しは no-op。
    pub async fn stop_recording(&mut self) {
        if !self.session.lock().await.begin_stopping() {
            log::debug!("録音中ではないため停止要求を無視");
            return;
        }

        // 入力ハンドルを解放。送信側が閉じることで収集タスクは
        // 残りのチャンクを排出して終了する
        self.source.stop();
        if let Some(task) = self.chunk_task.take() {
            let _ = task.await;
        }

        let payload = self.session.lock().await.take_payload();
        if payload.is_empty() {
            log::info!("音声チャンクがないため文字起こしをスキップ");
            self.session.lock().await.finish();
            return;
        }

        log::info!("文字起こしリクエストを発行: {} バイト", payload.len());

        match self
            .transcriber
            .transcribe(&payload, &self.capture_config.language)
            .await
        {
            Ok(result) => {
                let text = result.text.trim();
                if text.is_empty() {
                    // 空の文字起こし結果は字幕にしない
                    log::warn!("文字起こし結果が空のため字幕を追加しません");
                } else {
                    let caption = CaptionRecord::new(
                        text.to_string(),
                        self.capture_config.speaker.clone(),
                        result.language,
                        result.confidence,
                    );
                    self.session.lock().await.append_caption(caption.clone());
                    self.publish(caption);
                }
            }
            Err(e) => {
                log::error!("文字起こしに失敗: {}", e);
                self.session
                    .lock()
                    .await
                    .append_caption(CaptionRecord::system_error(PROCESS_FAILED_TEXT));
            }
        }

        self.session.lock().await.finish();
        log::info!("録音を停止しました");
    }

    /// 字幕をリレーに送信（ベストエフォート）
    ///
    /// 失敗しても送信側の字幕フローには一切影響させない。
    fn publish(&self, caption: CaptionRecord) {
        if let Some(tx) = &self.publish_tx {
            if let Err(e) = tx.try_send(caption) {
                log::debug!("リレーへの字幕送信失敗（無視）: {}", e);
            }
        }
    }

    /// 現在録音中かどうか
    pub async fn is_recording(&self) -> bool {
        self.session.lock().await.state() == RecordingState::Recording
    }
}
