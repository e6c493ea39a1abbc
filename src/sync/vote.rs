//! # One-veto-wins ballot.
//!
//! A [`VoteGate`] is created with N [`VoteController`]s. Each controller votes
//! exactly once (the methods consume it):
//! - `veto()` decides the gate as [`GateOutcome::Vetoed`] immediately; later
//!   votes are ignored.
//! - once every controller passed, the gate decides [`GateOutcome::Passed`]
//!   with the passed values in the order `pass` was called.
//! - dropping a controller without voting abstains: it counts towards
//!   completion but contributes no value.
//!
//! ```text
//! VoteGate::new(3) ──► [c1, c2, c3]
//!   c2.pass("b") ─► c1.pass("a") ─► c3.pass("c")   ⇒ Passed(["b", "a", "c"])
//!   c2.pass("b") ─► c3.veto()                      ⇒ Vetoed (c1 ignored)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Final decision of a [`VoteGate`].
#[derive(Debug, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// Every controller passed (or abstained); values in `pass` call order.
    Passed(Arc<[T]>),
    /// At least one controller vetoed.
    Vetoed,
}

impl<T> Clone for GateOutcome<T> {
    fn clone(&self) -> Self {
        match self {
            GateOutcome::Passed(values) => GateOutcome::Passed(Arc::clone(values)),
            GateOutcome::Vetoed => GateOutcome::Vetoed,
        }
    }
}

impl<T> GateOutcome<T> {
    /// Returns `true` for [`GateOutcome::Vetoed`].
    pub fn is_vetoed(&self) -> bool {
        matches!(self, GateOutcome::Vetoed)
    }
}

struct Ballot<T> {
    remaining: usize,
    values: Vec<T>,
    decided: bool,
}

struct Shared<T> {
    ballot: Mutex<Ballot<T>>,
    outcome: watch::Sender<Option<GateOutcome<T>>>,
}

impl<T> Shared<T> {
    fn cast(&self, vote: Option<Option<T>>) {
        let mut ballot = self.ballot.lock();
        if ballot.decided {
            return;
        }
        ballot.remaining -= 1;
        match vote {
            None => {
                ballot.decided = true;
                self.outcome.send_replace(Some(GateOutcome::Vetoed));
            }
            Some(value) => {
                ballot.values.extend(value);
                if ballot.remaining == 0 {
                    ballot.decided = true;
                    let values: Arc<[T]> = std::mem::take(&mut ballot.values).into();
                    self.outcome.send_replace(Some(GateOutcome::Passed(values)));
                }
            }
        }
    }
}

/// Read side of the ballot; cloneable.
pub struct VoteGate<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for VoteGate<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> VoteGate<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a gate with `n` controllers. `n = 0` passes immediately with no values.
    pub fn new(n: usize) -> (Self, Vec<VoteController<T>>) {
        let initial = (n == 0).then(|| GateOutcome::Passed(Arc::from(Vec::new())));
        let (outcome, _) = watch::channel(initial);
        let shared = Arc::new(Shared {
            ballot: Mutex::new(Ballot {
                remaining: n,
                values: Vec::with_capacity(n),
                decided: n == 0,
            }),
            outcome,
        });
        let controllers = (0..n)
            .map(|_| VoteController {
                shared: Some(Arc::clone(&shared)),
            })
            .collect();
        (Self { shared }, controllers)
    }

    /// Current decision, if any.
    pub fn peek(&self) -> Option<GateOutcome<T>> {
        self.shared.outcome.borrow().clone()
    }

    /// Waits for the decision.
    pub async fn outcome(&self) -> GateOutcome<T> {
        let mut rx = self.shared.outcome.subscribe();
        match rx.wait_for(|o| o.is_some()).await {
            Ok(decided) => decided.clone().unwrap_or(GateOutcome::Vetoed),
            // The sender lives in `self.shared`; it cannot be dropped while we wait.
            Err(_) => GateOutcome::Vetoed,
        }
    }

    /// Waits for the decision; `true` when vetoed.
    pub async fn is_final_vetoed(&self) -> bool {
        self.outcome().await.is_vetoed()
    }
}

/// One vote; consumed by `pass` or `veto`.
pub struct VoteController<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> VoteController<T> {
    /// Approves, contributing `value`.
    pub fn pass(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            shared.cast(Some(Some(value)));
        }
    }

    /// Rejects; decides the gate immediately.
    pub fn veto(mut self) {
        if let Some(shared) = self.shared.take() {
            shared.cast(None);
        }
    }
}

impl<T> Drop for VoteController<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.cast(Some(None));
        }
    }
}
