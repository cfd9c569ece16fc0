use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use murmur_types::events::GatewayEvent;

/// Process-wide map from user id to their one live delivery channel.
///
/// Constructed once at startup and injected wherever push delivery is
/// needed. Best-effort: an absent entry means the client will catch up by
/// polling history, so nothing here is durable.
#[derive(Clone, Default)]
pub struct Presence {
    inner: Arc<PresenceInner>,
}

#[derive(Default)]
struct PresenceInner {
    /// user_id -> (conn_id, sender). One channel per user; the last
    /// registered connection wins.
    channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delivery channel for the user, replacing any previous
    /// registration. Returns the connection id and the receiving end.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Remove the registration, but only if conn_id still owns it. A stale
    /// disconnect must not evict a newer connection's channel.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.channels.write().await;
        if let Some((stored, _)) = channels.get(&user_id) {
            if *stored == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// The user's live channel, if any.
    pub async fn lookup(&self, user_id: Uuid) -> Option<mpsc::UnboundedSender<GatewayEvent>> {
        self.inner
            .channels
            .read()
            .await
            .get(&user_id)
            .map(|(_, tx)| tx.clone())
    }
}
