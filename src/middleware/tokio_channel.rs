//! Broadcast channel fanning out over per-subscriber Tokio queues
//!
//! Each subscription owns an unbounded `tokio::sync::mpsc` queue drained by
//! a task on the current Tokio runtime. `publish` pushes the message onto
//! the queue of every subscriber of its event, so a slow subscriber falls
//! behind but never skips a message, and each subscriber sees messages in
//! send order. Clones share the same registry, so handing a clone to each
//! context wires them together.
//!
//! Handlers run on runtime worker threads. The middleware serializes the
//! operations it issues against one cache, so a remote message never
//! interleaves with a local mutation on a multi-thread runtime.

use crate::error::{InvalidationError, Result};
use crate::middleware::channel::{BroadcastChannel, InvalidationMessage, MessageHandler};
use crate::subscription::Subscription;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, trace};

type SenderRegistry = Arc<RwLock<HashMap<String, Vec<(u64, UnboundedSender<InvalidationMessage>)>>>>;

#[derive(Clone, Default)]
pub struct TokioBroadcastChannel {
    senders: SenderRegistry,
    next_id: Arc<AtomicU64>,
}

impl TokioBroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions across all events
    pub fn receiver_count(&self) -> usize {
        self.senders.read().values().map(Vec::len).sum()
    }
}

impl BroadcastChannel for TokioBroadcastChannel {
    fn publish(&self, message: InvalidationMessage) -> Result<()> {
        let senders = self.senders.read();
        let Some(registered) = senders.get(&message.event) else {
            trace!("Published {} with no receivers", message.event);
            return Ok(());
        };

        for (id, sender) in registered {
            // A closed queue belongs to a receiver being torn down
            if sender.send(message.clone()).is_err() {
                trace!("Receiver {} for {} is closed", id, message.event);
            }
        }
        trace!("Published {} to {} receivers", message.event, registered.len());

        Ok(())
    }

    fn subscribe(&self, event: &str, handler: MessageHandler) -> Result<Subscription> {
        let runtime = Handle::try_current().map_err(|e| {
            InvalidationError::ChannelError(format!("tokio runtime required to subscribe: {}", e))
        })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, mut receiver) = mpsc::unbounded_channel::<InvalidationMessage>();

        // Registered before spawning so nothing published after this call is missed
        self.senders
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, sender));

        let task_event = event.to_string();
        let task = runtime.spawn(async move {
            while let Some(message) = receiver.recv().await {
                handler(&message);
            }
            debug!("Receiver {} for {} stopped", id, task_event);
        });
        debug!("Spawned receiver {} for {}", id, event);

        let senders = Arc::clone(&self.senders);
        let event = event.to_string();
        Ok(Subscription::new(move || {
            let mut senders = senders.write();
            if let Some(registered) = senders.get_mut(&event) {
                registered.retain(|(sender_id, _)| *sender_id != id);
                if registered.is_empty() {
                    senders.remove(&event);
                }
            }
            task.abort();
            debug!("Removed receiver {} for {}", id, event);
        }))
    }
}
