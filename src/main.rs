use anyhow::Result;
use env_logger::Env;
use live_caption::audio_source::CpalAudioSource;
use live_caption::capture::CaptureClient;
use live_caption::config::Config;
use live_caption::connection::ConnectionSession;
use live_caption::server::run_server;
use live_caption::session::Session;
use live_caption::summary::TemplateSummarizer;
use live_caption::transcribe::HttpTranscribeClient;
use live_caption::types::CaptionRecord;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[tokio::main]
async fn main() -> Result<()> {
    // コマンドライン引数をパース
    let args: Vec<String> = std::env::args().collect();

    // デバイス一覧表示モード
    if args.len() > 1 && args[1] == "--show-interfaces" {
        CpalAudioSource::list_devices()?;
        return Ok(());
    }

    // 設定ファイル生成モード
    if args.len() > 1 && args[1] == "--generate-config" {
        let config_path = if args.len() > 2 {
            &args[2]
        } else {
            "config.toml"
        };
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    let serve_mode = args.iter().any(|a| a == "--serve");

    // 設定ファイルのパス
    let config_path = if args.len() > 1 && !args[1].starts_with("--") {
        &args[1]
    } else {
        "config.toml"
    };

    // 設定を読み込み
    let config = Config::load_or_default(config_path)?;

    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or(config.log.level.clone()))
        .format_timestamp(None)
        .init();

    log::info!("live-caption を起動します");
    log::info!("設定: {:?}", config);

    // ゲートウェイサーバーモード
    if serve_mode {
        return run_server(&config.server).await;
    }

    run_client(config).await
}

/// キャプチャクライアントのメインループ
///
/// 起動時に録音を開始し、新しい字幕と要約の更新をJSON形式で
/// 標準出力に流す。Ctrl+C で録音を停止して終了する。
async fn run_client(config: Config) -> Result<()> {
    // Ctrl+C ハンドラを設定
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        log::info!("停止シグナルを受信しました...");
        running_clone.store(false, Ordering::SeqCst);
    })?;

    let session = Session::shared(&config.relay.room_id);

    // リレー接続（猶予時間内に確立できなければスタンドアロン）
    let connection = ConnectionSession::establish(&config.relay, session.clone()).await;
    if connection.is_connected() {
        log::info!("ルーム {} で字幕を共有します", config.relay.room_id);
    } else {
        log::info!("スタンドアロンモードで動作します（字幕共有なし）");
    }

    let source = CpalAudioSource::new(&config.audio, config.capture.chunk_interval_ms);
    let transcriber = Arc::new(HttpTranscribeClient::new(
        &config.transcribe,
        config.audio.sample_rate,
    )?);

    let mut capture = CaptureClient::new(
        session.clone(),
        Box::new(source),
        transcriber,
        Arc::new(TemplateSummarizer),
        config.capture.clone(),
        config.summary.clone(),
        connection.publish_sender(),
    );

    capture.start_recording().await;
    log::info!("録音を開始しました (Ctrl+C で停止)");

    // メインループ: 新着字幕と要約の更新を出力しながら停止を待つ
    let mut printed: Vec<CaptionRecord> = Vec::new();
    let mut last_summary = String::new();

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let (snapshot, summary) = {
            let guard = session.lock().await;
            (guard.captions().snapshot(), guard.summary().to_string())
        };

        for caption in &snapshot {
            if !printed.contains(caption) {
                if let Ok(json) = serde_json::to_string(caption) {
                    println!("{}", json);
                }
            }
        }
        printed = snapshot;

        if !summary.is_empty() && summary != last_summary {
            if let Ok(json) = serde_json::to_string(&serde_json::json!({ "summary": summary })) {
                println!("{}", json);
            }
            last_summary = summary;
        }
    }

    // クリーンアップ
    log::info!("停止処理を開始します...");
    capture.stop_recording().await;

    // 停止時の文字起こし結果も出力する
    for caption in session.lock().await.captions().snapshot() {
        if !printed.contains(&caption) {
            if let Ok(json) = serde_json::to_string(&caption) {
                println!("{}", json);
            }
        }
    }

    log::info!("live-caption を終了しました");

    Ok(())
}
