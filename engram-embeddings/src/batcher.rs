//! Batch coalescer for embedding requests.
//!
//! Individual `embed` calls append to a pending batch. The batch flushes
//! when it reaches the target size, or a timer fires `max_wait` after the
//! first enqueue, whichever comes first. A flush dispatches every item
//! concurrently through the connection gate; each waiter gets exactly its
//! own outcome, in waiter order, never completion order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use engram_core::errors::{EngramError, EngramResult};

use crate::pool::RequestGate;
use crate::provider::EmbeddingClient;

struct PendingItem {
    text: String,
    tx: oneshot::Sender<EngramResult<Vec<f32>>>,
}

struct PendingBatch {
    items: Vec<PendingItem>,
    /// Bumped whenever a batch is taken, so a stale timer cannot flush
    /// a younger batch early.
    generation: u64,
}

struct BatcherInner {
    client: Arc<dyn EmbeddingClient>,
    gate: Arc<RequestGate>,
    batch_size: usize,
    max_wait: Duration,
    request_timeout: Duration,
    pending: Mutex<PendingBatch>,
}

impl BatcherInner {
    /// Take the current batch if `generation` still names it.
    fn take_if_current(&self, generation: u64) -> Vec<PendingItem> {
        let Ok(mut pending) = self.pending.lock() else {
            return Vec::new();
        };
        if pending.generation != generation || pending.items.is_empty() {
            return Vec::new();
        }
        pending.generation += 1;
        std::mem::take(&mut pending.items)
    }

    /// Dispatch every item concurrently. Failures reach only their own
    /// waiter; a dropped waiter is ignored.
    async fn flush(self: Arc<Self>, items: Vec<PendingItem>) {
        debug!(size = items.len(), "flushing embedding batch");
        for item in items {
            let inner = Arc::clone(&self);
            tokio::spawn(async move {
                let result = inner.dispatch(&item.text).await;
                let _ = item.tx.send(result);
            });
        }
    }

    async fn dispatch(&self, text: &str) -> EngramResult<Vec<f32>> {
        let permit = self.gate.acquire(self.request_timeout).await?;
        let result = tokio::time::timeout(self.request_timeout, self.client.embed(text)).await;
        match result {
            Err(_) => {
                permit.complete(false);
                Err(EngramError::timeout("embedding request"))
            }
            Ok(Err(e)) => {
                permit.complete(false);
                Err(e)
            }
            Ok(Ok(vec)) => {
                permit.complete(true);
                Ok(vec)
            }
        }
    }
}

/// The coalescer handle. Cheap to clone.
#[derive(Clone)]
pub struct BatchEmbedder {
    inner: Arc<BatcherInner>,
}

impl BatchEmbedder {
    pub fn new(
        client: Arc<dyn EmbeddingClient>,
        gate: Arc<RequestGate>,
        batch_size: usize,
        max_wait: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                client,
                gate,
                batch_size: batch_size.max(1),
                max_wait,
                request_timeout,
                pending: Mutex::new(PendingBatch { items: Vec::new(), generation: 0 }),
            }),
        }
    }

    /// Embed one text through the current batch.
    pub async fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        let (tx, rx) = oneshot::channel();

        let ready = {
            let Ok(mut pending) = self.inner.pending.lock() else {
                return Err(EngramError::embedding("batch state poisoned"));
            };
            pending.items.push(PendingItem { text: text.to_string(), tx });

            if pending.items.len() >= self.inner.batch_size {
                pending.generation += 1;
                Some(std::mem::take(&mut pending.items))
            } else {
                if pending.items.len() == 1 {
                    // First item of a fresh batch: arm the flush timer.
                    let inner = Arc::clone(&self.inner);
                    let generation = pending.generation;
                    tokio::spawn(async move {
                        tokio::time::sleep(inner.max_wait).await;
                        let items = inner.take_if_current(generation);
                        if !items.is_empty() {
                            inner.flush(items).await;
                        }
                    });
                }
                None
            }
        };

        if let Some(items) = ready {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.flush(items));
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(EngramError::embedding("batch dropped before completion")),
        }
    }
}
