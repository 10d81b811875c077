use crate::types::CaptionRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

/// リレー回線上を流れるイベント
///
/// 改行区切りJSONの1行が1イベント。`event` フィールドで種別を示す。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RelayEvent {
    /// ルームへの参加宣言。再送信すると前のルームから抜けて移動する
    JoinRoom { room_id: String },
    /// 字幕のブロードキャスト要求
    Caption {
        room_id: String,
        caption: CaptionRecord,
    },
}

/// 接続中のメンバー
struct Member {
    room_id: String,
    tx: mpsc::Sender<RelayEvent>,
}

/// ルーム所属の台帳
///
/// 接続IDからメンバーを引く。1接続は常に高々1ルームに所属し、
/// 後から参加したルームが前の所属を置き換える。
#[derive(Default)]
pub struct RoomRegistry {
    members: Mutex<HashMap<u64, Member>>,
}

impl RoomRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 接続をルームに参加させる。既存の所属は置き換え
    pub async fn join(&self, conn_id: u64, room_id: &str, tx: mpsc::Sender<RelayEvent>) {
        let mut members = self.members.lock().await;
        if let Some(prev) = members.get(&conn_id) {
            log::info!(
                "接続 {} がルームを移動: {} -> {}",
                conn_id,
                prev.room_id,
                room_id
            );
        } else {
            log::info!("接続 {} がルーム {} に参加", conn_id, room_id);
        }
        members.insert(
            conn_id,
            Member {
                room_id: room_id.to_string(),
                tx,
            },
        );
    }

    /// 接続を台帳から外す（切断時）
    pub async fn leave(&self, conn_id: u64) {
        if let Some(member) = self.members.lock().await.remove(&conn_id) {
            log::info!("接続 {} がルーム {} から退出", conn_id, member.room_id);
        }
    }

    /// 字幕を送信元と同じルームの他メンバー全員に配信
    ///
    /// 未参加の接続からの発行は破棄する。個々のメンバーへの配信失敗は
    /// ログに残すのみで、他メンバーへの配信は続行する。
    pub async fn publish(&self, sender_id: u64, caption: CaptionRecord) {
        let members = self.members.lock().await;

        let room_id = match members.get(&sender_id) {
            Some(member) => member.room_id.clone(),
            None => {
                log::warn!("未参加の接続 {} からの字幕を破棄", sender_id);
                return;
            }
        };

        let event = RelayEvent::Caption {
            room_id: room_id.clone(),
            caption,
        };

        for (id, member) in members.iter() {
            if *id == sender_id || member.room_id != room_id {
                continue;
            }
            if let Err(e) = member.tx.try_send(event.clone()) {
                log::warn!("接続 {} への字幕配信失敗: {}", id, e);
            }
        }
    }

    /// 指定ルームの現在のメンバー数
    pub async fn room_size(&self, room_id: &str) -> usize {
        self.members
            .lock()
            .await
            .values()
            .filter(|m| m.room_id == room_id)
            .count()
    }
}

/// リレーサーバーの受付ループ
///
/// 接続ごとに読み取りタスクと書き込みタスクを起動し、
/// 切断時に台帳から退出させる。
pub async fn run_relay(listener: TcpListener, registry: Arc<RoomRegistry>) -> Result<()> {
    let local_addr = listener.local_addr().context("リレーアドレス取得失敗")?;
    log::info!("リレーサーバーを起動: {}", local_addr);

    let next_id = AtomicU64::new(1);

    loop {
        let (socket, peer) = listener.accept().await.context("リレー接続受付失敗")?;
        let conn_id = next_id.fetch_add(1, Ordering::Relaxed);
        log::debug!("リレー接続 {} を受付: {}", conn_id, peer);

        let registry = registry.clone();
        tokio::spawn(async move {
            handle_connection(socket, conn_id, registry).await;
        });
    }
}

/// 1接続ぶんの処理
///
/// 行単位でイベントを読み取り、パース不能な行は破棄して継続する。
async fn handle_connection(socket: TcpStream, conn_id: u64, registry: Arc<RoomRegistry>) {
    let (read_half, mut write_half) = socket.into_split();
    let (tx, mut rx) = mpsc::channel::<RelayEvent>(32);

    // 書き込みタスク: 台帳経由で届いたイベントを回線に流す
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    log::error!("イベントのシリアライズ失敗: {}", e);
                    continue;
                }
            };
            line.push('\n');
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<RelayEvent>(line) {
                    Ok(RelayEvent::JoinRoom { room_id }) => {
                        registry.join(conn_id, &room_id, tx.clone()).await;
                    }
                    Ok(RelayEvent::Caption { caption, .. }) => {
                        registry.publish(conn_id, caption).await;
                    }
                    Err(e) => {
                        log::warn!("接続 {} の不正なイベントを破棄: {}", conn_id, e);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::debug!("接続 {} の読み取りエラー: {}", conn_id, e);
                break;
            }
        }
    }

    registry.leave(conn_id).await;
    writer.abort();
    log::debug!("リレー接続 {} を終了", conn_id);
}
