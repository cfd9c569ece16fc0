use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway. Delivery is best-effort: a
/// client that misses an event catches up by re-reading history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is registered for delivery.
    Ready { user_id: Uuid },

    /// A message addressed to this user was persisted.
    NewMessage(Message),
}
