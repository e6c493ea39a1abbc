//! # NavigationCoordinator: consensus before any URL change is visible.
//!
//! ```text
//! push_state / replace_state / redirect / handle_popstate / reroute
//!   ├─► dead-loop check, redirects only (refuse with NavigationError::DeadLoop)
//!   ├─► write history (push/replace/redirect)
//!   ├─► supersede pending navigations (their target := this one)
//!   ├─► VoteGate(n) + ReadyBarrier(n), n = live consumers
//!   ├─► consumer.accept(descriptor) for each   (panics caught)
//!   └─► enqueue ──► flusher (one task, submission order)
//!                      ├─ superseded (even mid-vote) → Superseded
//!                      ├─ vetoed              → replace history with last commit → Vetoed
//!                      └─ passed → barrier    → commit, popstate (+ hashchange) → Committed
//! ```
//!
//! ## Rules
//! - Outcomes resolve strictly in submission order, whatever order the votes
//!   complete in.
//! - A superseded navigation neither commits nor dispatches: a burst of
//!   navigations produces exactly one `popstate`.
//! - A superseded navigation stops holding the queue at once, even while its
//!   consumers are still deciding.
//! - A burst lasts while navigations are pending. Only [`redirect`]s, the
//!   counter-navigations of consumers, are counted: a URL redirected to more
//!   than `dead_loop_threshold` times in one burst is refused and the
//!   `dead_loop` hook fires once per burst.
//!
//! [`redirect`]: NavigationCoordinator::redirect
//! - Consumers are held weakly; a dropped consumer simply stops voting.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::consumer::{
    ConsumerId, NavigationConsumer, NavigationDescriptor, NavigationMode, RouterNavigation,
};
use super::history::{HistoryBackend, HistoryWrite, Location, MemoryHistory, NavEvent};
use crate::config::NavigationConfig;
use crate::error::NavigationError;
use crate::events::{Bus, Event, EventKind};
use crate::hooks::Hook;
use crate::subscribers::panic_message;
use crate::sync::{GateOutcome, ReadyBarrier, VoteGate};

static GLOBAL: OnceLock<NavigationCoordinator> = OnceLock::new();

type Reply = Result<NavigationOutcome, NavigationError>;

/// How a navigation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Every consumer approved; events were dispatched.
    Committed,
    /// A consumer vetoed; the history was reverted.
    Vetoed,
    /// A later navigation took over before this one resolved.
    Superseded,
}

/// Argument of the `dead_loop` extension point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadLoop {
    /// URL that kept being requested.
    pub url: String,
    /// Repetitions within the burst.
    pub count: u32,
}

/// Extension points of the coordinator.
#[derive(Debug)]
pub struct NavigationHooks {
    /// Fires once per burst when auto-redirection is aborted.
    pub dead_loop: Hook<DeadLoop>,
    /// Fires after a navigation committed.
    pub committed: Hook<Location>,
    /// Fires after a vetoed navigation was reverted.
    pub vetoed: Hook<Location>,
}

/// Pending result of a submitted navigation.
pub struct NavigationHandle {
    target: Location,
    reply: HandleReply,
}

enum HandleReply {
    Ready(Reply),
    Waiting(oneshot::Receiver<Reply>),
}

impl NavigationHandle {
    fn ready(target: Location, reply: Reply) -> Self {
        Self {
            target,
            reply: HandleReply::Ready(reply),
        }
    }

    /// Requested entry.
    pub fn target(&self) -> &Location {
        &self.target
    }

    /// Error the navigation was refused with on submission, if any. A
    /// refused navigation left the history untouched.
    pub fn refusal(&self) -> Option<&NavigationError> {
        match &self.reply {
            HandleReply::Ready(Err(e)) => Some(e),
            _ => None,
        }
    }

    /// Waits for the navigation to resolve.
    pub async fn outcome(self) -> Result<NavigationOutcome, NavigationError> {
        match self.reply {
            HandleReply::Ready(reply) => reply,
            HandleReply::Waiting(rx) => rx.await.unwrap_or(Err(NavigationError::Closed)),
        }
    }
}

struct Pending {
    seq: u64,
    mode: NavigationMode,
    navigation: RouterNavigation,
    gate: VoteGate<Arc<str>>,
    barrier: ReadyBarrier,
    superseded: CancellationToken,
    reply: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl Pending {
    fn is_superseded(&self) -> bool {
        self.superseded.is_cancelled()
    }
}

struct NavState {
    committed: Location,
    pending: Vec<Arc<Pending>>,
    burst: HashMap<String, u32>,
    burst_reported: bool,
    next_seq: u64,
    closed: bool,
    tx: Option<mpsc::UnboundedSender<Arc<Pending>>>,
}

struct Inner {
    backend: Arc<dyn HistoryBackend>,
    config: NavigationConfig,
    bus: Bus,
    hooks: NavigationHooks,
    consumers: Mutex<BTreeMap<ConsumerId, Weak<dyn NavigationConsumer>>>,
    state: Mutex<NavState>,
    idle: watch::Sender<usize>,
    cancel: CancellationToken,
}

/// Serializes navigations and collects consumer consensus. Cheap to clone.
#[derive(Clone)]
pub struct NavigationCoordinator {
    inner: Arc<Inner>,
}

impl NavigationCoordinator {
    /// Coordinator over `backend`. The flusher task is spawned on the first
    /// navigation, so construction does not need a runtime.
    pub fn new(backend: Arc<dyn HistoryBackend>, config: NavigationConfig) -> Self {
        let current = backend.location();
        let (idle, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                bus: Bus::default(),
                hooks: NavigationHooks {
                    dead_loop: Hook::new("dead_loop"),
                    committed: Hook::new("committed"),
                    vetoed: Hook::new("vetoed"),
                },
                consumers: Mutex::new(BTreeMap::new()),
                state: Mutex::new(NavState {
                    committed: current,
                    pending: Vec::new(),
                    burst: HashMap::new(),
                    burst_reported: false,
                    next_seq: 0,
                    closed: false,
                    tx: None,
                }),
                idle,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Process-wide coordinator, created over a [`MemoryHistory`] at `/` on
    /// first use unless one was installed with [`install_global`](Self::install_global).
    pub fn global() -> NavigationCoordinator {
        GLOBAL
            .get_or_init(|| {
                NavigationCoordinator::new(
                    Arc::new(MemoryHistory::default()),
                    NavigationConfig::default(),
                )
            })
            .clone()
    }

    /// Installs the process-wide coordinator. Fails (handing it back) if one
    /// already exists.
    pub fn install_global(coordinator: NavigationCoordinator) -> Result<(), NavigationCoordinator> {
        GLOBAL.set(coordinator)
    }

    /// Bus carrying navigation events.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Extension points.
    pub fn hooks(&self) -> &NavigationHooks {
        &self.inner.hooks
    }

    /// Backend this coordinator writes to.
    pub fn backend(&self) -> &Arc<dyn HistoryBackend> {
        &self.inner.backend
    }

    /// Last committed entry.
    pub fn committed(&self) -> Location {
        self.inner.state.lock().committed.clone()
    }

    /// Registers a consumer (held weakly).
    pub fn register(&self, consumer: Weak<dyn NavigationConsumer>) -> ConsumerId {
        let id = ConsumerId::next();
        self.inner.consumers.lock().insert(id, consumer);
        id
    }

    /// Unregisters a consumer; `false` if it was not registered.
    pub fn unregister(&self, id: ConsumerId) -> bool {
        self.inner.consumers.lock().remove(&id).is_some()
    }

    /// Number of live consumers.
    pub fn consumer_count(&self) -> usize {
        let mut consumers = self.inner.consumers.lock();
        consumers.retain(|_, c| c.strong_count() > 0);
        consumers.len()
    }

    /// Appends an entry and navigates to it.
    pub fn push_state(&self, url: impl Into<String>, state: Value) -> NavigationHandle {
        self.submit(NavigationMode::Push, Location::with_state(url, state), false)
    }

    /// Overwrites the current entry and navigates to it.
    pub fn replace_state(&self, url: impl Into<String>, state: Value) -> NavigationHandle {
        self.submit(NavigationMode::Replace, Location::with_state(url, state), false)
    }

    /// Replaces the current entry on behalf of a consumer that is still
    /// deciding on a pending navigation (a fallback, say).
    ///
    /// Unlike [`replace_state`](Self::replace_state), redirects count towards
    /// dead-loop detection: past `dead_loop_threshold` repetitions of a URL in
    /// one burst the redirect is refused with [`NavigationError::DeadLoop`] and
    /// the history is left untouched.
    pub fn redirect(&self, url: impl Into<String>, state: Value) -> NavigationHandle {
        self.submit(NavigationMode::Replace, Location::with_state(url, state), true)
    }

    /// Reports a native back/forward move; the backend already points at the
    /// new entry.
    pub fn handle_popstate(&self) -> NavigationHandle {
        self.submit(NavigationMode::Pop, self.inner.backend.location(), false)
    }

    /// Re-evaluates the current entry with every consumer.
    pub fn reroute(&self) -> NavigationHandle {
        self.submit(NavigationMode::Reroute, self.inner.backend.location(), false)
    }

    /// Waits until no navigation is pending.
    pub async fn idle(&self) {
        let mut rx = self.inner.idle.subscribe();
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    /// Stops the flusher and drops every consumer. Pending and later
    /// navigations resolve with [`NavigationError::Closed`].
    pub fn teardown(&self) {
        self.inner.cancel.cancel();
        let pending = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.tx = None;
            std::mem::take(&mut state.pending)
        };
        for p in pending {
            if let Some(tx) = p.reply.lock().take() {
                let _ = tx.send(Err(NavigationError::Closed));
            }
        }
        self.inner.idle.send_replace(0);
        self.inner.consumers.lock().clear();
    }

    fn submit(&self, mode: NavigationMode, target: Location, redirect: bool) -> NavigationHandle {
        let inner = &self.inner;
        let consumers: Vec<Arc<dyn NavigationConsumer>> = {
            let mut consumers = inner.consumers.lock();
            consumers.retain(|_, c| c.strong_count() > 0);
            consumers.values().filter_map(Weak::upgrade).collect()
        };

        let (reply_rx, descriptors) = {
            let mut state = inner.state.lock();
            if state.closed {
                return NavigationHandle::ready(target, Err(NavigationError::Closed));
            }
            if let Err((info, first)) = self.track_burst(&mut state, redirect, &target) {
                drop(state);
                return self.refuse(target, info, first);
            }
            let Some(tx) = self.flusher(&mut state) else {
                return NavigationHandle::ready(target, Err(NavigationError::Closed));
            };

            match mode {
                NavigationMode::Push => inner.backend.write(HistoryWrite::Push, target.clone()),
                NavigationMode::Replace => {
                    inner.backend.write(HistoryWrite::Replace, target.clone())
                }
                NavigationMode::Pop | NavigationMode::Reroute => {}
            }
            for p in &state.pending {
                p.navigation.advance(target.clone());
                p.superseded.cancel();
            }

            let (gate, votes) = VoteGate::new(consumers.len());
            let (barrier, counters) = ReadyBarrier::new(consumers.len());
            let navigation = RouterNavigation::new(state.committed.clone(), target.clone());
            let (reply, reply_rx) = oneshot::channel();
            let pending = Arc::new(Pending {
                seq: state.next_seq,
                mode,
                navigation: navigation.clone(),
                gate,
                barrier,
                superseded: CancellationToken::new(),
                reply: Mutex::new(Some(reply)),
            });
            state.next_seq += 1;
            state.pending.push(Arc::clone(&pending));
            inner.idle.send_replace(state.pending.len());
            // The flusher only exits on teardown, which also clears `tx`.
            let _ = tx.send(Arc::clone(&pending));

            let descriptors: Vec<_> = votes
                .into_iter()
                .zip(counters)
                .map(|(vote, ready)| NavigationDescriptor {
                    navigation: navigation.clone(),
                    mode,
                    vote,
                    ready,
                    gate: pending.gate.clone(),
                })
                .collect();
            (reply_rx, descriptors)
        };

        inner.bus.publish(
            Event::new(EventKind::NavigationProposed)
                .with_url(target.url.as_str())
                .with_reason(mode.as_str()),
        );
        for (consumer, descriptor) in consumers.into_iter().zip(descriptors) {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| consumer.accept(descriptor))) {
                tracing::warn!(
                    url = %target.url,
                    info = %panic_message(panic.as_ref()),
                    "navigation consumer panicked; counted as pass"
                );
            }
        }

        NavigationHandle {
            target,
            reply: HandleReply::Waiting(reply_rx),
        }
    }

    /// Counts a redirect to `target` in the current burst. A refusal carries
    /// whether it is the first one of the burst.
    fn track_burst(
        &self,
        state: &mut NavState,
        redirect: bool,
        target: &Location,
    ) -> Result<(), (DeadLoop, bool)> {
        if state.pending.is_empty() {
            state.burst.clear();
            state.burst_reported = false;
        }
        if !redirect {
            return Ok(());
        }
        let count = state.burst.entry(target.url.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        match self.inner.config.dead_loop_limit() {
            Some(limit) if count > limit => {
                let first = !std::mem::replace(&mut state.burst_reported, true);
                let info = DeadLoop {
                    url: target.url.clone(),
                    count,
                };
                Err((info, first))
            }
            _ => Ok(()),
        }
    }

    fn refuse(&self, target: Location, info: DeadLoop, first: bool) -> NavigationHandle {
        if first {
            tracing::warn!(url = %info.url, count = info.count, "navigation dead loop detected");
            self.inner.bus.publish(
                Event::new(EventKind::DeadLoopDetected)
                    .with_url(info.url.as_str())
                    .with_attempt(info.count),
            );
            self.inner.hooks.dead_loop.call(&info);
        }
        let DeadLoop { url, count } = info;
        NavigationHandle::ready(target, Err(NavigationError::DeadLoop { url, count }))
    }

    /// Sender of the flusher queue, spawning the flusher on first use.
    fn flusher(&self, state: &mut NavState) -> Option<mpsc::UnboundedSender<Arc<Pending>>> {
        if let Some(tx) = &state.tx {
            return Some(tx.clone());
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("navigation submitted outside of a tokio runtime");
            return None;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(flush(
            Arc::downgrade(&self.inner),
            rx,
            self.inner.cancel.clone(),
        ));
        state.tx = Some(tx.clone());
        Some(tx)
    }
}

impl std::fmt::Debug for NavigationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("NavigationCoordinator")
            .field("committed", &state.committed.url)
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// Resolves navigations one by one, in submission order.
async fn flush(
    inner: Weak<Inner>,
    mut rx: mpsc::UnboundedReceiver<Arc<Pending>>,
    cancel: CancellationToken,
) {
    loop {
        let pending = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(p) => p,
                None => break,
            },
        };
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = pending.superseded.cancelled() => None,
            o = pending.gate.outcome() => Some(o),
        };

        let result = match outcome {
            None => NavigationOutcome::Superseded,
            Some(GateOutcome::Vetoed) => {
                let Some(inner) = inner.upgrade() else { break };
                inner.revert(&pending)
            }
            Some(GateOutcome::Passed(_)) => {
                let settled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = pending.superseded.cancelled() => false,
                    _ = pending.barrier.wait() => true,
                };
                if settled {
                    let Some(inner) = inner.upgrade() else { break };
                    inner.commit(&pending)
                } else {
                    NavigationOutcome::Superseded
                }
            }
        };

        let Some(inner) = inner.upgrade() else { break };
        inner.finish(&pending, result);
    }
}

impl Inner {
    fn revert(&self, pending: &Pending) -> NavigationOutcome {
        let committed = {
            let state = self.state.lock();
            if pending.is_superseded() {
                return NavigationOutcome::Superseded;
            }
            self.backend
                .write(HistoryWrite::Replace, state.committed.clone());
            state.committed.clone()
        };
        let url = pending.navigation.new_url();
        tracing::debug!(%url, back_to = %committed.url, "navigation vetoed");
        self.bus
            .publish(Event::new(EventKind::NavigationVetoed).with_url(url));
        self.hooks.vetoed.call(&committed);
        NavigationOutcome::Vetoed
    }

    fn commit(&self, pending: &Pending) -> NavigationOutcome {
        let target = pending.navigation.new_location();
        let old = {
            let mut state = self.state.lock();
            if pending.is_superseded() {
                return NavigationOutcome::Superseded;
            }
            std::mem::replace(&mut state.committed, target.clone())
        };
        if pending.mode != NavigationMode::Reroute {
            self.backend.dispatch(NavEvent::PopState {
                url: target.url.clone(),
                state: target.state.clone(),
            });
            if old.fragment() != target.fragment() {
                self.backend.dispatch(NavEvent::HashChange {
                    old_url: old.url.clone(),
                    new_url: target.url.clone(),
                });
            }
        }
        tracing::debug!(url = %target.url, mode = pending.mode.as_str(), "navigation committed");
        self.bus
            .publish(Event::new(EventKind::NavigationCommitted).with_url(target.url.as_str()));
        self.hooks.committed.call(&target);
        NavigationOutcome::Committed
    }

    fn finish(&self, pending: &Pending, result: NavigationOutcome) {
        let remaining = {
            let mut state = self.state.lock();
            state.pending.retain(|p| p.seq != pending.seq);
            state.pending.len()
        };
        self.idle.send_replace(remaining);
        if let Some(tx) = pending.reply.lock().take() {
            let _ = tx.send(Ok(result));
        }
    }
}
