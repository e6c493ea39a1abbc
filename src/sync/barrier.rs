//! # Count-down readiness barrier.
//!
//! A [`ReadyBarrier`] is created with N [`ReadyCounter`]s and resolves once all
//! of them counted. `count()` consumes the counter; dropping an uncounted
//! counter counts it as well, so a failing participant cannot stall the waiter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

struct Shared {
    remaining: AtomicUsize,
    done: watch::Sender<bool>,
}

impl Shared {
    fn count(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.send_replace(true);
        }
    }
}

/// Waiting side; cloneable.
#[derive(Clone)]
pub struct ReadyBarrier {
    shared: Arc<Shared>,
}

impl ReadyBarrier {
    /// Creates a barrier expecting `n` counts. `n = 0` is ready immediately.
    pub fn new(n: usize) -> (Self, Vec<ReadyCounter>) {
        let (done, _) = watch::channel(n == 0);
        let shared = Arc::new(Shared {
            remaining: AtomicUsize::new(n),
            done,
        });
        let counters = (0..n)
            .map(|_| ReadyCounter {
                shared: Some(Arc::clone(&shared)),
            })
            .collect();
        (Self { shared }, counters)
    }

    /// Counts still missing.
    pub fn remaining(&self) -> usize {
        self.shared.remaining.load(Ordering::Acquire)
    }

    /// Returns `true` once every counter counted.
    pub fn is_ready(&self) -> bool {
        *self.shared.done.borrow()
    }

    /// Waits until every counter counted.
    pub async fn wait(&self) {
        let mut rx = self.shared.done.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

/// One expected count.
pub struct ReadyCounter {
    shared: Option<Arc<Shared>>,
}

impl ReadyCounter {
    /// Signals readiness.
    pub fn count(mut self) {
        if let Some(shared) = self.shared.take() {
            shared.count();
        }
    }
}

impl Drop for ReadyCounter {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.count();
        }
    }
}
