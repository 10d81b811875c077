use crate::config::RelayConfig;
use crate::relay::RelayEvent;
use crate::session::SharedSession;
use crate::types::{CaptionRecord, ConnectionState};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

/// リレーサーバーとの接続セッション
///
/// 起動時に一度だけ接続を試み、猶予時間内に確立できなければ
/// スタンドアロンモードに切り替える。スタンドアロンでも録音・
/// 文字起こし・要約のローカル機能はすべて動作し、字幕の
/// 配信と受信だけが行われない。
///
/// 接続状態は受信タスク・送信タスクと共有しており、セッション中に
/// リレーが切断された場合は `Disconnected` に遷移する。
pub struct ConnectionSession {
    state: watch::Receiver<ConnectionState>,
    publish_tx: Option<mpsc::Sender<CaptionRecord>>,
}

impl ConnectionSession {
    /// リレーへの接続を確立する
    ///
    /// 接続に成功するとルーム参加イベントを送信し、受信タスクと
    /// 送信タスクを起動する。失敗はエラーではなくスタンドアロンへの
    /// フォールバックとして扱う。
    pub async fn establish(config: &RelayConfig, session: SharedSession) -> Self {
        if !config.enabled {
            log::info!("リレー無効設定のためスタンドアロンモードで起動");
            return Self::standalone();
        }

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let grace = Duration::from_secs(config.connect_timeout_secs);
        let stream = match timeout(grace, TcpStream::connect(&config.endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                log::warn!(
                    "リレー {} への接続失敗: {}。スタンドアロンモードに移行",
                    config.endpoint,
                    e
                );
                return Self::standalone();
            }
            Err(_) => {
                log::warn!(
                    "リレー {} への接続が {} 秒以内に確立せず。スタンドアロンモードに移行",
                    config.endpoint,
                    config.connect_timeout_secs
                );
                return Self::standalone();
            }
        };

        let (read_half, mut write_half) = stream.into_split();
        let room_id = config.room_id.clone();

        // 参加宣言。失敗したらスタンドアロンに落とす
        let join = RelayEvent::JoinRoom {
            room_id: room_id.clone(),
        };
        let join_line = match serde_json::to_string(&join) {
            Ok(line) => format!("{}\n", line),
            Err(e) => {
                log::error!("参加イベントのシリアライズ失敗: {}", e);
                return Self::standalone();
            }
        };
        if let Err(e) = write_half.write_all(join_line.as_bytes()).await {
            log::warn!("参加イベントの送信失敗: {}。スタンドアロンモードに移行", e);
            return Self::standalone();
        }

        let _ = state_tx.send(ConnectionState::Connected);
        let state_tx = Arc::new(state_tx);
        log::info!("リレー {} に接続、ルーム {} に参加", config.endpoint, room_id);

        // 受信タスク: 同室の他参加者の字幕をローカルバッファに合流させる。
        // ストリームが終わったら切断状態に遷移させる
        let reader_session = session.clone();
        let reader_state = state_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<RelayEvent>(line) {
                    Ok(RelayEvent::Caption { caption, .. }) => {
                        reader_session.lock().await.append_caption(caption);
                    }
                    Ok(other) => {
                        log::debug!("リレーからの想定外イベントを無視: {:?}", other);
                    }
                    Err(e) => {
                        log::warn!("リレーからの不正な行を破棄: {}", e);
                    }
                }
            }
            log::warn!("リレーとの接続が切断されました。スタンドアロンモードに移行");
            let _ = reader_state.send(ConnectionState::Disconnected);
        });

        // 送信タスク: ローカル字幕をファイアアンドフォーゲットで配信
        let (publish_tx, mut publish_rx) = mpsc::channel::<CaptionRecord>(32);
        let writer_state = state_tx.clone();
        tokio::spawn(async move {
            while let Some(caption) = publish_rx.recv().await {
                let event = RelayEvent::Caption {
                    room_id: room_id.clone(),
                    caption,
                };
                let mut line = match serde_json::to_string(&event) {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("字幕イベントのシリアライズ失敗: {}", e);
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    log::warn!("リレーへの字幕送信失敗: {}。スタンドアロンモードに移行", e);
                    let _ = writer_state.send(ConnectionState::Disconnected);
                    break;
                }
            }
        });

        Self {
            state: state_rx,
            publish_tx: Some(publish_tx),
        }
    }

    fn standalone() -> Self {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            state: state_rx,
            publish_tx: None,
        }
    }

    /// 現在の接続状態
    ///
    /// セッション中にリレーが切断された場合も `Disconnected` を返す。
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// 字幕配信用の送信チャンネル（スタンドアロンでは None）
    pub fn publish_sender(&self) -> Option<mpsc::Sender<CaptionRecord>> {
        self.publish_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{run_relay, RoomRegistry};
    use crate::session::Session;
    use tokio::net::TcpListener;

    fn test_relay_config(endpoint: &str) -> RelayConfig {
        RelayConfig {
            enabled: true,
            endpoint: endpoint.to_string(),
            connect_timeout_secs: 3,
            room_id: "room-test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_disabled_relay_is_standalone() {
        let config = RelayConfig {
            enabled: false,
            ..test_relay_config("127.0.0.1:1")
        };
        let session = Session::shared("room-test");

        let conn = ConnectionSession::establish(&config, session).await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.publish_sender().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_relay_falls_back_to_standalone() {
        // 接続拒否されるポート: バインドしてすぐ閉じる
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = test_relay_config(&addr.to_string());
        let session = Session::shared("room-test");

        let conn = ConnectionSession::establish(&config, session).await;
        assert!(!conn.is_connected());
        assert!(conn.publish_sender().is_none());
    }

    #[tokio::test]
    async fn test_relay_drop_marks_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // 接続を受け付けてから切断するだけのリレー
        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(socket);
        });

        let config = test_relay_config(&addr.to_string());
        let session = Session::shared("room-test");
        let conn = ConnectionSession::establish(&config, session).await;
        assert!(conn.is_connected());

        accept.await.unwrap();

        // 受信タスクがストリーム終了を検知して状態を切り替えるまで待つ
        let mut disconnected = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if !conn.is_connected() {
                disconnected = true;
                break;
            }
        }
        assert!(disconnected, "リレー切断後も Connected のままになっている");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connected_session_receives_room_captions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(run_relay(listener, RoomRegistry::new()));

        let config = test_relay_config(&addr.to_string());
        let session = Session::shared("room-test");
        let conn = ConnectionSession::establish(&config, session.clone()).await;
        assert!(conn.is_connected());

        // 同室のピアを生のTCPクライアントとして参加させる
        let mut peer = TcpStream::connect(addr).await.unwrap();
        let join = serde_json::to_string(&RelayEvent::JoinRoom {
            room_id: "room-test".to_string(),
        })
        .unwrap();
        peer.write_all(format!("{}\n", join).as_bytes())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let remote = CaptionRecord::new("remote words".to_string(), "Peer", "en", 0.7);
        let event = serde_json::to_string(&RelayEvent::Caption {
            room_id: "room-test".to_string(),
            caption: remote,
        })
        .unwrap();
        peer.write_all(format!("{}\n", event).as_bytes())
            .await
            .unwrap();

        // 受信タスクがローカルバッファに合流させるまで待つ
        let mut received = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let guard = session.lock().await;
            if let Some(last) = guard.captions().snapshot().last() {
                assert_eq!(last.text, "remote words");
                assert_eq!(last.speaker, "Peer");
                received = true;
                break;
            }
        }
        assert!(received, "ピアの字幕がローカルバッファに届かなかった");

        server.abort();
    }

    #[tokio::test]
    async fn test_published_caption_reaches_peer() {
        use tokio::io::AsyncReadExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(run_relay(listener, RoomRegistry::new()));

        let mut peer = TcpStream::connect(addr).await.unwrap();
        let join = serde_json::to_string(&RelayEvent::JoinRoom {
            room_id: "room-test".to_string(),
        })
        .unwrap();
        peer.write_all(format!("{}\n", join).as_bytes())
            .await
            .unwrap();

        let config = test_relay_config(&addr.to_string());
        let session = Session::shared("room-test");
        let conn = ConnectionSession::establish(&config, session).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let tx = conn.publish_sender().unwrap();
        tx.send(CaptionRecord::new(
            "outbound".to_string(),
            "You",
            "en",
            0.9,
        ))
        .await
        .unwrap();

        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let line = String::from_utf8_lossy(&buf[..n]);
        let parsed: RelayEvent = serde_json::from_str(line.trim()).unwrap();
        match parsed {
            RelayEvent::Caption { caption, .. } => assert_eq!(caption.text, "outbound"),
            other => panic!("想定外のイベント: {:?}", other),
        }

        server.abort();
    }
}
