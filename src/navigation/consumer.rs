//! # Navigation consumers.
//!
//! Every registered [`NavigationConsumer`] receives one
//! [`NavigationDescriptor`] per navigation, holding its private vote and
//! readiness tokens:
//! - `vote.veto()` rejects the navigation (the history is reverted, no event);
//! - `vote.pass(name)` approves it;
//! - `ready.count()` signals that the consumer finished reacting to it;
//! - `gate` resolves once every consumer voted, so a consumer can hold its
//!   side effects until the navigation is known to go through.
//!
//! Dropping a token without using it abstains (vote) or counts (ready), so a
//! consumer that fails half-way never stalls navigation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use super::history::Location;
use crate::sync::{ReadyCounter, VoteController, VoteGate};

static CONSUMER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Registration handle of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsumerId(u64);

impl ConsumerId {
    pub(crate) fn next() -> Self {
        ConsumerId(CONSUMER_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

/// What triggered a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    /// `push_state`.
    Push,
    /// `replace_state` or `redirect`.
    Replace,
    /// Native back/forward.
    Pop,
    /// Re-evaluation of the current location.
    Reroute,
}

impl NavigationMode {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationMode::Push => "push",
            NavigationMode::Replace => "replace",
            NavigationMode::Pop => "pop",
            NavigationMode::Reroute => "reroute",
        }
    }
}

/// Snapshot of one navigation.
///
/// The old side is fixed. The new side is read-only to consumers; the
/// coordinator advances it when a later navigation supersedes this one while
/// it is still pending, so slow consumers always act on the latest target.
#[derive(Clone, Debug)]
pub struct RouterNavigation {
    old: Location,
    target: Arc<RwLock<Location>>,
}

impl RouterNavigation {
    pub(crate) fn new(old: Location, new: Location) -> Self {
        Self {
            old,
            target: Arc::new(RwLock::new(new)),
        }
    }

    /// URL before the navigation.
    pub fn old_url(&self) -> &str {
        &self.old.url
    }

    /// State before the navigation.
    pub fn old_state(&self) -> &Value {
        &self.old.state
    }

    /// Current target URL.
    pub fn new_url(&self) -> String {
        self.target.read().url.clone()
    }

    /// Current target state.
    pub fn new_state(&self) -> Value {
        self.target.read().state.clone()
    }

    /// Current target entry.
    pub fn new_location(&self) -> Location {
        self.target.read().clone()
    }

    pub(crate) fn advance(&self, to: Location) {
        *self.target.write() = to;
    }
}

/// One consumer's view of a navigation.
pub struct NavigationDescriptor {
    /// The navigation.
    pub navigation: RouterNavigation,
    /// What triggered it.
    pub mode: NavigationMode,
    /// Approval token.
    pub vote: VoteController<Arc<str>>,
    /// Readiness token.
    pub ready: ReadyCounter,
    /// Combined vote of all consumers.
    pub gate: VoteGate<Arc<str>>,
}

/// Party that must agree before a navigation commits.
pub trait NavigationConsumer: Send + Sync + 'static {
    /// Receives a navigation. Runs synchronously inside the submitting call;
    /// asynchronous work should be spawned. Panics are caught.
    fn accept(&self, navigation: NavigationDescriptor);
}
