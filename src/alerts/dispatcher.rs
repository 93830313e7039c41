//! Best-effort fan-out of alert events
//!
//! Every handler gets its own bounded queue drained by a delivery thread, so
//! `publish` never waits on a handler. A full queue drops the event with a
//! warning. A handler that errors or panics is logged and keeps receiving.
//! Stream subscribers get a bounded broadcast channel and lose the oldest
//! events if they fall behind.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use super::types::AlertEvent;

/// Callback invoked for every published alert
///
/// Runs on the subscription's delivery thread and may block.
pub type AlertHandler = Arc<dyn Fn(&AlertEvent) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

pub struct AlertDispatcher {
    queues: RwLock<Vec<(SubscriptionId, mpsc::Sender<AlertEvent>)>>,
    queue_capacity: usize,
    next_id: AtomicU64,
    stream: broadcast::Sender<AlertEvent>,
}

impl AlertDispatcher {
    /// `capacity` bounds the broadcast stream and each handler queue
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (stream, _) = broadcast::channel(capacity);
        Self {
            queues: RwLock::new(Vec::new()),
            queue_capacity: capacity,
            next_id: AtomicU64::new(1),
            stream,
        }
    }

    pub fn subscribe(&self, handler: AlertHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (queue, pending) = mpsc::channel(self.queue_capacity);

        let spawned = std::thread::Builder::new()
            .name(format!("lanpulse-alerts-{}", id.0))
            .spawn(move || deliver(id, handler, pending));
        if let Err(e) = spawned {
            crate::log_error!("Could not start delivery for alert subscriber {:?}: {}", id, e);
            return id;
        }

        let mut queues = match self.queues.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queues.push((id, queue));
        id
    }

    /// Returns false when `id` was not subscribed
    ///
    /// Events already queued for the handler are still delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut queues = match self.queues.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = queues.len();
        queues.retain(|(existing, _)| *existing != id);
        queues.len() != before
    }

    /// Receiver for queue-style consumers
    pub fn subscribe_stream(&self) -> broadcast::Receiver<AlertEvent> {
        self.stream.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        let queues = match self.queues.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queues.len() + self.stream.receiver_count()
    }

    /// Queues `event` for every current subscriber without waiting on any
    pub fn publish(&self, event: &AlertEvent) {
        match event.severity {
            super::AlertSeverity::High => crate::log_warn!(
                "[{}] {} ({} -> {})",
                event.severity.as_str(),
                event.message,
                event.previous,
                event.current
            ),
            _ => crate::log_info!(
                "[{}] {} ({} -> {})",
                event.severity.as_str(),
                event.message,
                event.previous,
                event.current
            ),
        }

        let queues = match self.queues.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (id, queue) in queues.iter() {
            match queue.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => crate::log_warn!(
                    "Alert subscriber {:?} is {} events behind; dropped alert for {}",
                    id,
                    self.queue_capacity,
                    event.address()
                ),
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    crate::log_debug!("Alert subscriber {:?} has stopped", id)
                }
            }
        }
        drop(queues);

        // No receivers is fine
        let _ = self.stream.send(event.clone());
    }
}

/// Delivery loop for one subscription; ends once its sender is dropped
fn deliver(id: SubscriptionId, handler: AlertHandler, mut pending: mpsc::Receiver<AlertEvent>) {
    while let Some(event) = pending.blocking_recv() {
        match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => crate::log_error!("Alert subscriber {:?} failed: {:#}", id, e),
            Err(_) => crate::log_error!("Alert subscriber {:?} panicked", id),
        }
    }
    crate::log_debug!("Alert subscriber {:?} closed", id);
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new(crate::config::ALERT_STREAM_CAPACITY)
    }
}
