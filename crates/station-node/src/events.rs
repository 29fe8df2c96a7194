//! State-change publication.
//!
//! Observers get every transition in order: each subscriber owns a bounded
//! mpsc channel, publishes go to all of them sequentially, and a
//! subscriber that stays full past the publish timeout is dropped rather
//! than collapsing the stream to latest-state-wins. Intermediate
//! `Starting`/`Stopping` states are always observable.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use station_shared::constants::{EVENT_BUFFER_SIZE, EVENT_PUBLISH_TIMEOUT_SECS};

use crate::lifecycle::LifecycleState;
use crate::node::StationNode;

/// Why a snapshot was published.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventReason {
    Created,
    Lifecycle(LifecycleState),
    StatsUpdated,
    ConfigUpdated,
    NetworkSettingsUpdated,
    CertificateChanged,
    Error,
    Deleted,
}

/// One state-change notification: the reason plus a full node snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StationEvent {
    pub reason: EventReason,
    pub node: StationNode,
}

/// Publish/subscribe channel for [`StationEvent`]s.
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<StationEvent>>>,
    buffer: usize,
    publish_timeout: Duration,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer: EVENT_BUFFER_SIZE,
            publish_timeout: Duration::from_secs(EVENT_PUBLISH_TIMEOUT_SECS),
        }
    }

    #[cfg(test)]
    fn with_limits(buffer: usize, publish_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer,
            publish_timeout,
        }
    }

    /// Register a new observer. Events published after this call are
    /// delivered in publish order.
    pub async fn subscribe(&self) -> mpsc::Receiver<StationEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.lock().await.push(tx);
        rx
    }

    /// Deliver an event to every live subscriber, in order. Subscribers
    /// that have gone away, or that stay full past the publish timeout,
    /// are removed.
    pub async fn publish(&self, event: StationEvent) {
        let mut subscribers = self.subscribers.lock().await;
        let mut alive = Vec::with_capacity(subscribers.len());
        for tx in subscribers.drain(..) {
            match tokio::time::timeout(self.publish_timeout, tx.send(event.clone())).await {
                Ok(Ok(())) => alive.push(tx),
                Ok(Err(_)) => debug!("Dropping closed event subscriber"),
                Err(_) => {
                    warn!("Dropping event subscriber stuck past publish timeout");
                }
            }
        }
        *subscribers = alive;
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
