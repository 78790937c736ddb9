//! Bounded-concurrency FIFO job queue for background work.
//!
//! Owns a fixed set of worker tasks draining one queue, so jobs beyond
//! the concurrency limit start strictly in enqueue order. A job's panic
//! or error reaches only its own waiter.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

struct PendingGuard {
    pending: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

impl JobQueue {
    /// Start `concurrency` workers. Must be called inside a tokio
    /// runtime.
    pub fn new(concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        for worker in 0..concurrency.max(1) {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => job.await,
                        None => {
                            debug!(worker, "job queue worker shutting down");
                            break;
                        }
                    }
                }
            });
        }
        Self {
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Queue a task. The receiver resolves with the task's output, or
    /// with a receive error if the task panicked or the queue shut down.
    /// Dropping the receiver detaches the task; it still runs.
    pub fn enqueue<F, T>(&self, task: F) -> oneshot::Receiver<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let (done_tx, done_rx) = oneshot::channel();
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            notify: Arc::clone(&self.notify),
        };
        let job: Job = Box::pin(async move {
            let _guard = guard;
            if let Ok(value) = std::panic::AssertUnwindSafe(task).catch_unwind().await {
                let _ = done_tx.send(value);
            }
        });
        if self.tx.send(job).is_err() {
            // Queue torn down; the boxed job (and its guard) was dropped,
            // which already corrected the pending count.
            debug!("enqueue on closed job queue");
        }
        done_rx
    }

    /// Number of tasks queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Resolve once nothing is queued or running.
    pub async fn drain(&self) {
        loop {
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.notify.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
