use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use threadline_types::events::{ChangeEvent, RealtimeCommand, RealtimeFrame, Subscription};

use crate::feed::{ChangeFeed, matches_any};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time a new connection gets to send its Identify command.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single realtime websocket connection.
///
/// The client must first send `Identify { token }`; after `Ready` it may send
/// `Subscribe` at any time to replace its filter set. Each `Subscribe` is
/// answered with `Subscribed` once the new filters are installed, and every
/// change published after that frame is matched against them. Only changes
/// matching the current filters are forwarded.
pub async fn handle_connection(socket: WebSocket, feed: ChangeFeed, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (user_id, username) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("Realtime client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to realtime feed", username, user_id);

    // Listen before Ready so nothing published after the handshake is missed
    let broadcast_rx = feed.receiver();

    // Step 2: Send Ready frame
    let ready = RealtimeFrame::Ready {
        user_id,
        username: username.clone(),
    };
    let Ok(ready) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready.into())).await.is_err() {
        return;
    }

    feed.connection_opened();
    run_connection_loop(sender, receiver, broadcast_rx, user_id, &username).await;
    feed.connection_closed();

    info!("{} ({}) disconnected from realtime feed", username, user_id);
}

async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    mut broadcast_rx: broadcast::Receiver<ChangeEvent>,
    user_id: Uuid,
    username: &str,
) {
    // Per-connection filters (shared between send and recv tasks).
    let filters: Arc<RwLock<Vec<Subscription>>> = Arc::new(RwLock::new(Vec::new()));
    let send_filters = filters.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Frames the receive side answers with, written by the send side
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<RealtimeFrame>();

    // Forward matching changes -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Realtime receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let wanted = match send_filters.read() {
                        Ok(filters) => matches_any(&filters, &event),
                        Err(_) => break,
                    };
                    if !wanted {
                        continue;
                    }

                    let Ok(text) = serde_json::to_string(&RealtimeFrame::Change(event)) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(frame) = reply_rx.recv() => {
                    let Ok(text) = serde_json::to_string(&frame) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let username_recv = username.to_string();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RealtimeCommand>(&text) {
                    Ok(RealtimeCommand::Subscribe { subscriptions }) => {
                        debug!(
                            "{} ({}) now subscribed to {:?}",
                            username_recv, user_id, subscriptions
                        );
                        let count = subscriptions.len();
                        match filters.write() {
                            Ok(mut current) => *current = subscriptions,
                            Err(_) => break,
                        }
                        let ack = RealtimeFrame::Subscribed {
                            subscriptions: count,
                        };
                        if reply_tx.send(ack).is_err() {
                            break;
                        }
                    }
                    // Already handled
                    Ok(RealtimeCommand::Identify { .. }) => {}
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use threadline_types::api::Claims;

    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(RealtimeCommand::Identify { token }) =
                    serde_json::from_str::<RealtimeCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.username));
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}
