//! # History surface.
//!
//! [`HistoryBackend`] abstracts the process-wide navigation history: reading
//! the current location, writing entries and dispatching navigation events to
//! listeners. [`MemoryHistory`] is an in-memory implementation that records
//! every dispatched event, suitable for tests and headless hosts.

use parking_lot::Mutex;
use serde_json::Value;

/// A history entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    /// Full URL (path, query and fragment).
    pub url: String,
    /// Host-defined state attached to the entry.
    pub state: Value,
}

impl Location {
    /// Entry at `url` without state.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Value::Null,
        }
    }

    /// Entry at `url` with `state`.
    pub fn with_state(url: impl Into<String>, state: Value) -> Self {
        Self {
            url: url.into(),
            state,
        }
    }

    /// Fragment without the leading `#`, if any.
    pub fn fragment(&self) -> Option<&str> {
        self.url.split_once('#').map(|(_, f)| f)
    }
}

/// How an entry is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryWrite {
    /// Append a new entry.
    Push,
    /// Overwrite the current entry.
    Replace,
}

/// Event delivered to history listeners once a navigation commits.
#[derive(Clone, Debug, PartialEq)]
pub enum NavEvent {
    /// The current entry changed.
    PopState {
        /// New URL.
        url: String,
        /// New state.
        state: Value,
    },
    /// The fragment changed.
    HashChange {
        /// URL before the change.
        old_url: String,
        /// URL after the change.
        new_url: String,
    },
}

/// Process-wide navigation history.
pub trait HistoryBackend: Send + Sync + 'static {
    /// Current entry.
    fn location(&self) -> Location;

    /// Writes an entry without notifying listeners.
    fn write(&self, mode: HistoryWrite, location: Location);

    /// Notifies listeners.
    fn dispatch(&self, event: NavEvent);
}

struct Entries {
    stack: Vec<Location>,
    index: usize,
    events: Vec<NavEvent>,
}

/// In-memory history recording dispatched events.
pub struct MemoryHistory {
    inner: Mutex<Entries>,
}

impl MemoryHistory {
    /// History with a single entry at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Entries {
                stack: vec![Location::new(url)],
                index: 0,
                events: Vec::new(),
            }),
        }
    }

    /// Moves `delta` entries back (negative) or forward (positive), like a
    /// native traversal. No event is dispatched; the host reports the move
    /// with [`NavigationCoordinator::handle_popstate`](crate::NavigationCoordinator::handle_popstate).
    ///
    /// Returns the new current entry, or `None` when out of range.
    pub fn go(&self, delta: isize) -> Option<Location> {
        let mut inner = self.inner.lock();
        let index = inner.index.checked_add_signed(delta)?;
        let location = inner.stack.get(index)?.clone();
        inner.index = index;
        Some(location)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().stack.len()
    }

    /// Returns `true` when there are no entries (never, after construction).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events dispatched so far.
    pub fn events(&self) -> Vec<NavEvent> {
        self.inner.lock().events.clone()
    }

    /// Drains the recorded events.
    pub fn take_events(&self) -> Vec<NavEvent> {
        std::mem::take(&mut self.inner.lock().events)
    }

    /// Number of `PopState` events dispatched so far.
    pub fn popstate_count(&self) -> usize {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, NavEvent::PopState { .. }))
            .count()
    }
}

impl HistoryBackend for MemoryHistory {
    fn location(&self) -> Location {
        let inner = self.inner.lock();
        inner.stack[inner.index].clone()
    }

    fn write(&self, mode: HistoryWrite, location: Location) {
        let mut inner = self.inner.lock();
        match mode {
            HistoryWrite::Push => {
                let keep = inner.index + 1;
                inner.stack.truncate(keep);
                inner.stack.push(location);
                inner.index = keep;
            }
            HistoryWrite::Replace => {
                let index = inner.index;
                inner.stack[index] = location;
            }
        }
    }

    fn dispatch(&self, event: NavEvent) {
        self.inner.lock().events.push(event);
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_truncates_forward_entries() {
        let h = MemoryHistory::new("/a");
        h.write(HistoryWrite::Push, Location::new("/b"));
        h.write(HistoryWrite::Push, Location::new("/c"));
        assert_eq!(h.go(-2).map(|l| l.url), Some("/a".to_string()));
        h.write(HistoryWrite::Push, Location::new("/d"));
        assert_eq!(h.len(), 2);
        assert_eq!(h.go(1), None);
        assert_eq!(h.location().url, "/d");
    }

    #[test]
    fn replace_keeps_length() {
        let h = MemoryHistory::default();
        h.write(
            HistoryWrite::Replace,
            Location::with_state("/x#top", serde_json::json!({"k": 1})),
        );
        assert_eq!(h.len(), 1);
        assert_eq!(h.location().fragment(), Some("top"));
        assert!(h.events().is_empty());
    }
}
