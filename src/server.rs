use crate::config::ServerConfig;
use crate::relay::{run_relay, RoomRegistry};
use crate::types::{TranscribeRequest, TranscriptResult};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// 長尺音声とみなすペイロードの閾値（バイト）
const LONG_AUDIO_BYTES: usize = 50_000;

/// APIエラー
///
/// クライアントに返すJSONボディは固定文字列で、内部詳細は
/// ログにのみ残す。
pub enum ApiError {
    /// 音声データが欠落 (400)
    MissingAudio,
    /// 処理失敗 (500)
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingAudio => (StatusCode::BAD_REQUEST, "No audio data provided"),
            ApiError::Internal(detail) => {
                log::error!("文字起こし処理に失敗: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Transcription failed")
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

struct AppState {
    temp_dir: PathBuf,
}

/// `POST /transcribe`
///
/// base64エンコードされた音声を受け取り、一時ファイルに展開して
/// 処理し、文字起こし結果を返す。一時ファイルはレスポンス返却時に
/// 自動削除される。
async fn transcribe_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TranscribeRequest>,
) -> Result<Json<TranscriptResult>, ApiError> {
    if request.audio.is_empty() {
        return Err(ApiError::MissingAudio);
    }

    let audio_data = BASE64_STANDARD
        .decode(&request.audio)
        .map_err(|e| ApiError::Internal(format!("base64デコード失敗: {}", e)))?;

    // ドロップ時に削除される一時ファイルに展開
    let mut temp_file = tempfile::Builder::new()
        .prefix("audio-")
        .suffix(".wav")
        .tempfile_in(&state.temp_dir)
        .map_err(|e| ApiError::Internal(format!("一時ファイル作成失敗: {}", e)))?;
    temp_file
        .write_all(&audio_data)
        .map_err(|e| ApiError::Internal(format!("一時ファイル書き込み失敗: {}", e)))?;

    log::debug!(
        "音声ペイロードを受信: {} バイト ({:?})",
        audio_data.len(),
        temp_file.path()
    );

    let text = if audio_data.len() > LONG_AUDIO_BYTES {
        "Long audio recording processed"
    } else {
        "Short audio recording processed"
    };

    Ok(Json(TranscriptResult {
        text: text.to_string(),
        language: request.language,
        confidence: 0.8,
    }))
}

/// `GET /health`
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Local::now().to_rfc3339(),
        "services": {
            "transcription": "ready",
            "socket": "ready",
        },
    }))
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/transcribe", post(transcribe_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// ゲートウェイサーバーを起動
///
/// HTTPエンドポイントとリレーサーバーを同時に立ち上げる。
pub async fn run_server(config: &ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("一時ディレクトリ作成失敗: {}", config.temp_dir))?;

    let relay_listener = TcpListener::bind(&config.relay_addr)
        .await
        .with_context(|| format!("リレーアドレスのバインド失敗: {}", config.relay_addr))?;

    let state = Arc::new(AppState {
        temp_dir: PathBuf::from(&config.temp_dir),
    });
    let listener = TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("HTTPアドレスのバインド失敗: {}", config.http_addr))?;
    log::info!("ゲートウェイサーバーを起動: http://{}", config.http_addr);

    // リレーとHTTPのどちらが落ちてもサーバー全体を終了させる
    let relay = run_relay(relay_listener, RoomRegistry::new());
    let http = async {
        axum::serve(listener, build_router(state))
            .await
            .context("HTTPサーバーの実行失敗")
    };
    tokio::try_join!(relay, http)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn test_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        // テストプロセス終了まで残す
        Arc::new(AppState {
            temp_dir: dir.into_path(),
        })
    }

    fn request_with_bytes(len: usize) -> TranscribeRequest {
        TranscribeRequest {
            audio: BASE64_STANDARD.encode(vec![0u8; len]),
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_short_audio_classification() {
        let result = transcribe_handler(State(test_state()), Json(request_with_bytes(1000)))
            .await
            .map_err(|_| ())
            .unwrap();
        assert_eq!(result.text, "Short audio recording processed");
        assert_eq!(result.language, "en");
        assert_eq!(result.confidence, 0.8);
    }

    #[tokio::test]
    async fn test_long_audio_classification_boundary() {
        // ちょうど閾値のサイズは短尺扱い
        let result = transcribe_handler(State(test_state()), Json(request_with_bytes(50_000)))
            .await
            .map_err(|_| ())
            .unwrap();
        assert_eq!(result.text, "Short audio recording processed");

        let result = transcribe_handler(State(test_state()), Json(request_with_bytes(50_001)))
            .await
            .map_err(|_| ())
            .unwrap();
        assert_eq!(result.text, "Long audio recording processed");
    }

    #[tokio::test]
    async fn test_language_hint_is_echoed() {
        let request = TranscribeRequest {
            audio: BASE64_STANDARD.encode(b"abc"),
            language: "ja".to_string(),
        };
        let result = transcribe_handler(State(test_state()), Json(request))
            .await
            .map_err(|_| ())
            .unwrap();
        assert_eq!(result.language, "ja");
    }

    #[tokio::test]
    async fn test_missing_audio_is_bad_request() {
        let request = TranscribeRequest {
            audio: String::new(),
            language: "en".to_string(),
        };
        let error = transcribe_handler(State(test_state()), Json(request))
            .await
            .map_err(|e| e.into_response())
            .unwrap_err();

        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(error.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "No audio data provided");
    }

    #[tokio::test]
    async fn test_invalid_base64_is_internal_error() {
        let request = TranscribeRequest {
            audio: "not valid base64 !!!".to_string(),
            language: "en".to_string(),
        };
        let error = transcribe_handler(State(test_state()), Json(request))
            .await
            .map_err(|e| e.into_response())
            .unwrap_err();

        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(error.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "Transcription failed");
    }

    #[tokio::test]
    async fn test_gateway_over_loopback_http() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(test_state())).await.unwrap();
        });

        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{}/transcribe", addr))
            .json(&request_with_bytes(100))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let result: TranscriptResult = response.json().await.unwrap();
        assert_eq!(result.text, "Short audio recording processed");

        // audio フィールド欠落でも 422 ではなく 400 を返す
        let response = client
            .post(format!("http://{}/transcribe", addr))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let health: serde_json::Value = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
    }

    #[tokio::test]
    async fn test_relay_failure_fails_run_server() {
        // リレー側の失敗は握りつぶさずサーバー全体の失敗にする
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            http_addr: "127.0.0.1:0".to_string(),
            relay_addr: occupied.local_addr().unwrap().to_string(),
            temp_dir: dir.path().to_string_lossy().into_owned(),
        };

        assert!(run_server(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_health_response_shape() {
        let Json(body) = health_handler().await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"]["transcription"], "ready");
        assert_eq!(body["services"]["socket"], "ready");
        assert!(body["timestamp"].is_string());
    }
}
