//! # Shared Outbox
//!
//! The single many-producer / single-consumer queue between the workers and
//! the display coordinator. It is unbounded: publishing never blocks and never
//! drops a message while the coordinator is alive. Ordering is FIFO per
//! producer; updates from different workers interleave in arrival order.

use crate::Update;
use tokio::sync::mpsc;

/// Create a connected outbox pair.
pub fn channel() -> (Outbox, Inbound) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbox { tx }, Inbound { rx })
}

/// Producer side of the outbox. Cheap to clone, safe to use from any thread.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Update>,
}

impl Outbox {
    /// Publish an update.
    ///
    /// Returns `false` when the coordinator has gone away; delivery is
    /// best-effort so callers usually only log this.
    pub fn publish(&self, update: Update) -> bool {
        let kind = update.kind();
        match self.tx.send(update) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("Outbox closed, dropping {} update", kind);
                false
            }
        }
    }
}

/// Consumer side of the outbox, owned by the display coordinator.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::UnboundedReceiver<Update>,
}

impl Inbound {
    /// Wait for the next update. `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<Update> {
        self.rx.recv().await
    }

    /// True when no update is waiting right now.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Remembers the last value a worker published so identical results are not
/// sent twice.
///
/// Comparison is plain deep equality; the first value is always considered a
/// change.
#[derive(Debug)]
pub struct LastPublished<T> {
    last: Option<T>,
}

impl<T> Default for LastPublished<T> {
    fn default() -> Self {
        LastPublished { last: None }
    }
}

impl<T: PartialEq + Clone> LastPublished<T> {
    /// Record `value` and report whether it differs from the previous one.
    pub fn update(&mut self, value: &T) -> bool {
        if self.last.as_ref() == Some(value) {
            return false;
        }
        self.last = Some(value.clone());
        true
    }
}
