//! New-message notifications for subscribers such as dashboards.
//!
//! Delivery is best effort: slow subscribers lag and lose events, and
//! nothing is replayed.

use relay_core::models::{Channel, Message, Sender};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    MessageStored {
        tenant_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
        sender: Sender,
        channel: Channel,
    },
}

impl RelayEvent {
    pub fn tenant_id(&self) -> Uuid {
        match self {
            RelayEvent::MessageStored { tenant_id, .. } => *tenant_id,
        }
    }
}

#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<RelayEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    pub fn message_stored(&self, tenant_id: Uuid, channel: Channel, message: &Message) {
        // No subscribers is not an error.
        let _ = self.tx.send(RelayEvent::MessageStored {
            tenant_id,
            conversation_id: message.conversation_id,
            message_id: message.id,
            sender: message.sender,
            channel,
        });
    }
}
