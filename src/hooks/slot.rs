//! # Tap storage shared by [`Hook`] and [`DecisionHook`].
//!
//! Taps are kept in registration order behind a short critical section; a
//! call snapshots them, drops once-taps, then runs the snapshot without the
//! lock held so a tap may tap or untap the slot it runs in.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::subscribers::panic_message;

static TAP_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identifies one tap; pass it to `untap` to remove the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapId(u64);

impl TapId {
    fn next() -> Self {
        TapId(TAP_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

struct Tap<F: ?Sized> {
    id: TapId,
    name: Arc<str>,
    once: bool,
    f: Arc<F>,
}

impl<F: ?Sized> Clone for Tap<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            once: self.once,
            f: Arc::clone(&self.f),
        }
    }
}

/// Ordered tap list shared by both slot kinds.
struct Taps<F: ?Sized> {
    slot: &'static str,
    taps: Mutex<Vec<Tap<F>>>,
}

impl<F: ?Sized> Taps<F> {
    fn new(slot: &'static str) -> Self {
        Self {
            slot,
            taps: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, name: &str, once: bool, f: Arc<F>) -> TapId {
        let id = TapId::next();
        self.taps.lock().push(Tap {
            id,
            name: name.into(),
            once,
            f,
        });
        id
    }

    fn remove(&self, id: TapId) -> bool {
        let mut taps = self.taps.lock();
        let before = taps.len();
        taps.retain(|t| t.id != id);
        taps.len() != before
    }

    /// Snapshot for one call; once-taps are consumed here so re-entrant calls skip them.
    fn take_round(&self) -> Vec<Tap<F>> {
        let mut taps = self.taps.lock();
        let round = taps.clone();
        taps.retain(|t| !t.once);
        round
    }

    fn len(&self) -> usize {
        self.taps.lock().len()
    }
}

/// Notification slot. Taps run inline, in registration order.
pub struct Hook<A> {
    inner: Taps<dyn Fn(&A) + Send + Sync>,
}

impl<A> Hook<A> {
    /// Creates an empty slot named `slot` (used in diagnostics).
    pub fn new(slot: &'static str) -> Self {
        Self {
            inner: Taps::new(slot),
        }
    }

    /// Adds a persistent tap.
    pub fn tap<F>(&self, name: &str, f: F) -> TapId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.inner.push(name, false, Arc::new(f))
    }

    /// Adds a tap that is removed after its first invocation.
    pub fn tap_once<F>(&self, name: &str, f: F) -> TapId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.inner.push(name, true, Arc::new(f))
    }

    /// Removes a tap; returns `false` if it was already gone.
    pub fn untap(&self, id: TapId) -> bool {
        self.inner.remove(id)
    }

    /// Number of live taps.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` when nothing is tapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every tap with `args`. Panics are logged and swallowed.
    pub fn call(&self, args: &A) {
        for tap in self.inner.take_round() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (tap.f)(args))) {
                tracing::warn!(
                    hook = self.inner.slot,
                    tap = %tap.name,
                    info = %panic_message(panic.as_ref()),
                    "hook tap panicked"
                );
            }
        }
    }
}

impl<A> fmt::Debug for Hook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("slot", &self.inner.slot)
            .field("taps", &self.len())
            .finish()
    }
}

/// Slot whose taps vote on a yes/no decision.
///
/// Every tap runs (so side effects such as logging always happen); the answer is
/// `true` when at least one tap returned `true`.
pub struct DecisionHook<A> {
    inner: Taps<dyn Fn(&A) -> bool + Send + Sync>,
}

impl<A> DecisionHook<A> {
    /// Creates an empty slot named `slot`.
    pub fn new(slot: &'static str) -> Self {
        Self {
            inner: Taps::new(slot),
        }
    }

    /// Adds a persistent tap.
    pub fn tap<F>(&self, name: &str, f: F) -> TapId
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.inner.push(name, false, Arc::new(f))
    }

    /// Adds a tap that is removed after its first invocation.
    pub fn tap_once<F>(&self, name: &str, f: F) -> TapId
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.inner.push(name, true, Arc::new(f))
    }

    /// Removes a tap; returns `false` if it was already gone.
    pub fn untap(&self, id: TapId) -> bool {
        self.inner.remove(id)
    }

    /// Number of live taps.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` when nothing is tapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Asks every tap; `false` when untapped.
    pub fn decide(&self, args: &A) -> bool {
        let mut answer = false;
        for tap in self.inner.take_round() {
            match catch_unwind(AssertUnwindSafe(|| (tap.f)(args))) {
                Ok(yes) => answer |= yes,
                Err(panic) => tracing::warn!(
                    hook = self.inner.slot,
                    tap = %tap.name,
                    info = %panic_message(panic.as_ref()),
                    "decision tap panicked; counted as no"
                ),
            }
        }
        answer
    }
}

impl<A> fmt::Debug for DecisionHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionHook")
            .field("slot", &self.inner.slot)
            .field("taps", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn taps_run_in_order_and_untap_removes() {
        let hook: Hook<u32> = Hook::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let first = hook.tap("first", move |v| s.lock().push(("first", *v)));
        let s = seen.clone();
        hook.tap("second", move |v| s.lock().push(("second", *v)));

        hook.call(&1);
        assert!(hook.untap(first));
        assert!(!hook.untap(first));
        hook.call(&2);

        assert_eq!(
            *seen.lock(),
            vec![("first", 1), ("second", 1), ("second", 2)]
        );
    }

    #[test]
    fn once_tap_fires_once() {
        let hook: Hook<()> = Hook::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        hook.tap_once("once", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        hook.call(&());
        hook.call(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(hook.is_empty());
    }

    #[test]
    fn panicking_tap_does_not_stop_the_rest() {
        let hook: Hook<()> = Hook::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        hook.tap("bad", |_| panic!("bad tap"));
        let h = hits.clone();
        hook.tap("good", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        hook.call(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decision_is_any_yes_and_panic_counts_as_no() {
        let hook: DecisionHook<u32> = DecisionHook::new("retry");
        assert!(!hook.decide(&0));

        hook.tap("panics", |_| panic!("nope"));
        assert!(!hook.decide(&0));

        hook.tap("even", |n| n % 2 == 0);
        assert!(hook.decide(&2));
        assert!(!hook.decide(&3));
    }
}
