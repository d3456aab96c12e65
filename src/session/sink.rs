use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::message::RawMessage;

/// Receives every data-bearing message a session classifies.
pub trait DataSink: Send + Sync {
    fn publish(&self, board: Uuid, message: &RawMessage);
}

/// Event payload fanned out by [`BroadcastSink`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEvent {
    /// Session the message arrived on
    pub board: Uuid,
    /// Input channel, absent for digital output snapshots
    pub channel: Option<u8>,
    /// Host receive time
    pub received_at: DateTime<Utc>,
    pub message: RawMessage,
}

pub struct BroadcastSink {
    events_tx: broadcast::Sender<DataEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _events_rx) = broadcast::channel(capacity.max(1));
        Self { events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.events_tx.subscribe()
    }
}

impl DataSink for BroadcastSink {
    fn publish(&self, board: Uuid, message: &RawMessage) {
        let event = DataEvent {
            board,
            channel: message.channel(),
            received_at: Utc::now(),
            message: message.clone(),
        };
        // No subscribers is not an error.
        let _ = self.events_tx.send(event);
    }
}
