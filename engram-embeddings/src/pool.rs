//! Bounded-concurrency gate for outbound embedding requests.
//!
//! A fixed number of slots; acquire blocks until one frees, fairly
//! (longest waiter first, tokio semaphore FIFO). Dropping a pending
//! acquire releases its queue position; dropping a held permit releases
//! the slot. Latency and outcome counters ride along on the permit.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use engram_core::errors::{EngramError, EngramResult};

#[derive(Debug, Default)]
struct PoolCounters {
    active: AtomicUsize,
    waiting: AtomicUsize,
    total_acquired: AtomicU64,
    total_succeeded: AtomicU64,
    total_failed: AtomicU64,
    wait_micros: AtomicU64,
    response_micros: AtomicU64,
}

/// Point-in-time view of the gate's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub active: usize,
    pub waiting: usize,
    pub total_acquired: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub wait_micros: u64,
    pub response_micros: u64,
}

pub struct RequestGate {
    semaphore: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
    capacity: usize,
}

/// Decrements the waiting counter even when the acquire future is
/// dropped mid-wait.
struct WaitGuard<'a>(&'a PoolCounters);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.waiting.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RequestGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            counters: Arc::new(PoolCounters::default()),
            capacity,
        }
    }

    /// Wait for a slot, failing with `Timeout` when the deadline passes
    /// first. The returned permit holds the slot until dropped.
    pub async fn acquire(&self, deadline: Duration) -> EngramResult<GatePermit> {
        self.counters.waiting.fetch_add(1, Ordering::Relaxed);
        let wait_guard = WaitGuard(&self.counters);
        let started = Instant::now();

        let acquired =
            tokio::time::timeout(deadline, Arc::clone(&self.semaphore).acquire_owned()).await;
        drop(wait_guard);

        let permit = match acquired {
            Err(_) => return Err(EngramError::timeout("pool acquire")),
            // The semaphore is never closed while the gate is alive.
            Ok(Err(_)) => return Err(EngramError::embedding("connection gate closed")),
            Ok(Ok(permit)) => permit,
        };

        self.counters
            .wait_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.counters.total_acquired.fetch_add(1, Ordering::Relaxed);
        self.counters.active.fetch_add(1, Ordering::Relaxed);

        Ok(GatePermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
            held_since: Instant::now(),
        })
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            capacity: self.capacity,
            active: self.counters.active.load(Ordering::Relaxed),
            waiting: self.counters.waiting.load(Ordering::Relaxed),
            total_acquired: self.counters.total_acquired.load(Ordering::Relaxed),
            total_succeeded: self.counters.total_succeeded.load(Ordering::Relaxed),
            total_failed: self.counters.total_failed.load(Ordering::Relaxed),
            wait_micros: self.counters.wait_micros.load(Ordering::Relaxed),
            response_micros: self.counters.response_micros.load(Ordering::Relaxed),
        }
    }
}

/// A held slot. Drop releases it to the longest-waiting acquirer;
/// `complete` additionally records the request outcome and latency.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<PoolCounters>,
    held_since: Instant,
}

impl GatePermit {
    pub fn complete(self, success: bool) {
        self.counters
            .response_micros
            .fetch_add(self.held_since.elapsed().as_micros() as u64, Ordering::Relaxed);
        if success {
            self.counters.total_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_within_capacity_is_immediate() {
        let gate = RequestGate::new(2);
        let a = gate.acquire(Duration::from_millis(50)).await.unwrap();
        let b = gate.acquire(Duration::from_millis(50)).await.unwrap();
        let snap = gate.snapshot();
        assert_eq!(snap.active, 2);
        assert_eq!(snap.total_acquired, 2);
        drop(a);
        drop(b);
        assert_eq!(gate.snapshot().active, 0);
    }

    #[tokio::test]
    async fn exhausted_gate_times_out() {
        let gate = RequestGate::new(1);
        let _held = gate.acquire(Duration::from_millis(50)).await.unwrap();
        let err = gate.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, EngramError::Timeout { .. }));
        // The timed-out waiter left no residue.
        assert_eq!(gate.snapshot().waiting, 0);
    }

    #[tokio::test]
    async fn released_slot_unblocks_waiter() {
        let gate = Arc::new(RequestGate::new(1));
        let held = gate.acquire(Duration::from_secs(1)).await.unwrap();

        let gate2 = Arc::clone(&gate);
        let waiter = tokio::spawn(async move {
            gate2.acquire(Duration::from_secs(1)).await.is_ok()
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_acquire_leaks_nothing() {
        let gate = Arc::new(RequestGate::new(1));
        let _held = gate.acquire(Duration::from_secs(1)).await.unwrap();

        let gate2 = Arc::clone(&gate);
        let pending = tokio::spawn(async move {
            let _ = gate2.acquire(Duration::from_secs(60)).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        pending.abort();
        let _ = pending.await;

        assert_eq!(gate.snapshot().waiting, 0);
        drop(_held);
        // The slot is still usable after the cancelled waiter.
        assert!(gate.acquire(Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn complete_records_outcomes() {
        let gate = RequestGate::new(1);
        gate.acquire(Duration::from_millis(50)).await.unwrap().complete(true);
        gate.acquire(Duration::from_millis(50)).await.unwrap().complete(false);
        let snap = gate.snapshot();
        assert_eq!(snap.total_succeeded, 1);
        assert_eq!(snap.total_failed, 1);
        assert_eq!(snap.active, 0);
    }
}
