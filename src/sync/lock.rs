//! # Keyed asynchronous mutual exclusion.
//!
//! [`Lock`] serializes work per key and optionally bounds how much work runs at
//! once across all keys.
//!
//! ```text
//! wait_for(key, f)
//!   ├─► join the FIFO queue of `key`        (tokio Mutex, fair)
//!   ├─► acquire a global permit if capped   (tokio Semaphore, fair)
//!   ├─► f().await
//!   └─► release permit, release key, drop the key's queue if nobody waits
//! ```
//!
//! ## Rules
//! - Work under the same key runs one at a time, in submission order.
//! - Distinct keys run concurrently up to `capacity`; once saturated,
//!   requests wait FIFO regardless of key.
//! - The key's queue is entered before capacity is requested, so a permit is
//!   never held while waiting for a busy key.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

/// Keyed async mutex with an optional global concurrency cap.
pub struct Lock<K> {
    queues: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
    capacity: Option<Arc<Semaphore>>,
}

impl<K> Lock<K>
where
    K: Hash + Eq + Clone,
{
    /// Unbounded lock: only same-key work is serialized.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: None,
        }
    }

    /// Lock allowing at most `capacity` pieces of work at once (`0` = unbounded).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: (capacity > 0).then(|| Arc::new(Semaphore::new(capacity))),
        }
    }

    /// Runs `f` once all earlier work under `key` finished; resolves with its output.
    ///
    /// `f` is only called once the ticket is at the head of the queue, so the
    /// future it builds observes the state left by its predecessors.
    pub async fn wait_for<F, Fut, T>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = Ticket::enter(self, key);
        let _turn = ticket.queue.lock().await;
        let _permit = match &self.capacity {
            // The semaphore is never closed.
            Some(sem) => sem.acquire().await.ok(),
            None => None,
        };
        f().await
    }

    /// Number of tickets (running or waiting) under `key`.
    pub fn pending(&self, key: &K) -> usize {
        self.queues
            .lock()
            .get(key)
            .map(|q| Arc::strong_count(q) - 1)
            .unwrap_or(0)
    }

    /// Returns `true` when no work is running or queued under any key.
    pub fn is_idle(&self) -> bool {
        self.queues.lock().is_empty()
    }
}

/// Place in a key's queue; leaving (completion or cancellation) drops the
/// queue once nobody else holds it.
struct Ticket<'a, K>
where
    K: Hash + Eq + Clone,
{
    lock: &'a Lock<K>,
    key: K,
    queue: Arc<AsyncMutex<()>>,
}

impl<'a, K> Ticket<'a, K>
where
    K: Hash + Eq + Clone,
{
    fn enter(lock: &'a Lock<K>, key: K) -> Self {
        let queue = {
            let mut queues = lock.queues.lock();
            Arc::clone(queues.entry(key.clone()).or_default())
        };
        Self { lock, key, queue }
    }
}

impl<K> Drop for Ticket<'_, K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        let mut queues = self.lock.queues.lock();
        // One reference lives in the map, one is ours.
        if Arc::strong_count(&self.queue) == 2 {
            queues.remove(&self.key);
        }
    }
}

impl<K> Default for Lock<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn same_key_runs_in_submission_order_one_at_a_time() {
        let lock = Arc::new(Lock::new());
        let running = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let (lock, running, order) = (lock.clone(), running.clone(), order.clone());
            handles.push(tokio::spawn(async move {
                lock.wait_for("app", || async move {
                    assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                    order.lock().push(i);
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
            // Let the spawned task enqueue before the next one.
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert!(lock.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_overlap() {
        let lock = Arc::new(Lock::new());
        let peak = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for key in 0..3u32 {
            let (lock, peak, running) = (lock.clone(), peak.clone(), running.clone());
            handles.push(tokio::spawn(async move {
                lock.wait_for(key, || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_bounds_work_across_keys() {
        let lock = Arc::new(Lock::with_capacity(2));
        let peak = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for key in 0..6u32 {
            let (lock, peak, running) = (lock.clone(), peak.clone(), running.clone());
            handles.push(tokio::spawn(async move {
                lock.wait_for(key, || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resolves_with_the_work_outcome() {
        let lock: Lock<&str> = Lock::new();
        let ok: Result<u8, &str> = lock.wait_for("k", || async { Ok(7) }).await;
        let err: Result<u8, &str> = lock.wait_for("k", || async { Err("bad") }).await;
        assert_eq!(ok, Ok(7));
        assert_eq!(err, Err("bad"));
        assert_eq!(lock.pending(&"k"), 0);
    }
}
