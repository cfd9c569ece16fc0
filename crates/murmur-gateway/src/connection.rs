use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use murmur_types::events::GatewayEvent;

use crate::presence::Presence;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The bearer token was
/// already validated at the HTTP upgrade layer, so the socket goes straight
/// to Ready and the delivery loop.
pub async fn handle_connection(socket: WebSocket, presence: Presence, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to gateway", user_id);

    let ready = GatewayEvent::Ready { user_id };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    let (conn_id, mut events) = presence.register(user_id).await;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            event = events.recv() => {
                // A closed receiver means a newer connection replaced us.
                let Some(event) = event else { break };
                let text = serde_json::to_string(&event).unwrap();
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Pong(_))) => pong_received = true,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("{} gateway read error: {}", user_id, e);
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if pong_received {
                    pong_received = false;
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("{} heartbeat timeout (missed {} pongs), dropping connection", user_id, missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }

    presence.unregister(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}
