//! Real-time change propagation
//!
//! Every successful mutation publishes a [`ChangeEvent`] to the
//! [`BroadcastHub`], which fans the serialized event out to all live
//! WebSocket subscribers. Delivery is best-effort and at-most-once:
//! no acknowledgement, no buffering for late joiners, no retry. A
//! subscriber whose channel is gone is pruned during fan-out without
//! disturbing delivery to the rest.
//!
//! ## Wire format
//!
//! ```json
//! {"action":"update","collection":"sensors","key":"d1_1718000000","source":"mqtt"}
//! ```
//!
//! `source` is present only for bridge-originated events and is
//! advisory metadata, not an ordering contract.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// What happened to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Update,
    Delete,
}

/// One broadcast notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub collection: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ChangeEvent {
    pub fn update(collection: &str, key: &str) -> Self {
        Self {
            action: ChangeAction::Update,
            collection: collection.to_string(),
            key: key.to_string(),
            source: None,
        }
    }

    pub fn delete(collection: &str, key: &str) -> Self {
        Self {
            action: ChangeAction::Delete,
            collection: collection.to_string(),
            key: key.to_string(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

/// Registry of live subscribers with snapshot fan-out
pub struct BroadcastHub {
    subscribers: DashMap<u64, mpsc::UnboundedSender<String>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber. The caller owns the receiving half and
    /// must call [`unsubscribe`](Self::unsubscribe) with the returned
    /// id when the connection ends.
    pub fn subscribe(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        debug!("subscriber {} connected ({} total)", id, self.subscribers.len());
        (id, rx)
    }

    /// Remove a subscriber
    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            debug!("subscriber {} disconnected ({} remaining)", id, self.subscribers.len());
        }
    }

    /// Fan an event out to every current subscriber. Iterates a
    /// snapshot of the registry taken up front, so subscribers joining
    /// or leaving mid-flight never corrupt the fan-out; a failed send
    /// (receiver dropped) removes that subscriber and delivery to the
    /// rest continues. Returns the number of successful deliveries.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                debug!("failed to serialize change event: {}", err);
                return 0;
            }
        };

        let snapshot: Vec<(u64, mpsc::UnboundedSender<String>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (id, sender) in snapshot {
            if sender.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                // Receiver gone: treat as an implicit disconnect
                self.subscribers.remove(&id);
                debug!("subscriber {} pruned during fan-out", id);
            }
        }
        delivered
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
