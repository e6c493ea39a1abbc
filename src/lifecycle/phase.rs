use std::fmt;

/// Stage of an app's lifecycle.
///
/// `Load` is handled by the [`SourceLoader`](crate::SourceLoader); the other
/// phases run the arrays of a [`Lifecycle`](crate::Lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Fetching the lifecycle from the source loader.
    Load,
    /// One-time initialization after load.
    Bootstrap,
    /// Attaching the app to its root.
    Mount,
    /// Detaching the app from its root.
    Unmount,
    /// Pushing new props into a mounted app.
    Update,
}

impl Phase {
    /// All phases, in lifecycle order.
    pub const ALL: [Phase; 5] = [
        Phase::Load,
        Phase::Bootstrap,
        Phase::Mount,
        Phase::Unmount,
        Phase::Update,
    ];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Bootstrap => "bootstrap",
            Phase::Mount => "mount",
            Phase::Unmount => "unmount",
            Phase::Update => "update",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
