//! Bounded ingress queue between intake and the matching worker.
//!
//! Multiple producers, single consumer. The queue is the serialization
//! boundary for the engine: commands are applied strictly in the order they
//! were enqueued. Enqueueing never blocks; a full queue is surfaced to
//! intake as explicit backpressure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::types::EngineCommand;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("command queue is full")]
    Full,
    #[error("command queue is closed")]
    Closed,
}

pub struct CommandQueue;

impl CommandQueue {
    pub fn new(capacity: usize) -> (QueueSender, QueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let depth = Arc::new(AtomicUsize::new(0));
        (
            QueueSender {
                tx,
                depth: Arc::clone(&depth),
                capacity,
            },
            QueueReceiver { rx, depth },
        )
    }
}

/// Producer half; cheap to clone across request handlers.
#[derive(Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<EngineCommand>,
    depth: Arc<AtomicUsize>,
    capacity: usize,
}

impl QueueSender {
    /// Non-blocking enqueue. `Full` tells intake to surface service
    /// unavailability to the client.
    pub fn try_enqueue(&self, cmd: EngineCommand) -> Result<(), QueueError> {
        // Counted before the send so the consumer's decrement can never
        // observe the message ahead of the increment.
        self.depth.fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => QueueError::Full,
                    mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
                })
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer half; owned by the single matching worker.
pub struct QueueReceiver {
    rx: mpsc::Receiver<EngineCommand>,
    depth: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Await the next command; `None` once all senders are gone.
    pub async fn recv(&mut self) -> Option<EngineCommand> {
        let cmd = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        Some(cmd)
    }
}
