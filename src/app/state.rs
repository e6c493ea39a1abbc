use std::fmt;

/// Lifecycle state of an [`AppController`](crate::AppController).
///
/// ```text
/// NotLoaded ─► LoadingSourceCode ─┬─► NotBootstrapped ─► Bootstrapping ─► NotMounted
///                                 └─► LoadError                               │
///                                                                         Mounting
///                                                                             │
///     NotLoaded ◄─ Unloading ◄─ NotMounted ◄─ Stopping ◄─ Mounted ◄───────────┘
///                                                         │   ▲
///                                                     Updating
///
/// any bootstrap/mount/update failure ─► SkipBecauseBroken
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    /// Nothing loaded yet (initial, and again after unload).
    NotLoaded,
    /// The source loader is running.
    LoadingSourceCode,
    /// Loaded, bootstrap pending.
    NotBootstrapped,
    /// Bootstrap array running.
    Bootstrapping,
    /// Ready to mount.
    NotMounted,
    /// Mount array running.
    Mounting,
    /// Mounted (possibly partially, if a mount was suspended).
    Mounted,
    /// Update array running.
    Updating,
    /// Unmount array running.
    Stopping,
    /// Unload in progress.
    Unloading,
    /// Loading failed and no retry was granted.
    LoadError,
    /// A bootstrap, mount or update function failed.
    SkipBecauseBroken,
}

impl AppState {
    /// Stable uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::NotLoaded => "NOT_LOADED",
            AppState::LoadingSourceCode => "LOADING_SOURCE_CODE",
            AppState::NotBootstrapped => "NOT_BOOTSTRAPPED",
            AppState::Bootstrapping => "BOOTSTRAPPING",
            AppState::NotMounted => "NOT_MOUNTED",
            AppState::Mounting => "MOUNTING",
            AppState::Mounted => "MOUNTED",
            AppState::Updating => "UPDATING",
            AppState::Stopping => "STOPPING",
            AppState::Unloading => "UNLOADING",
            AppState::LoadError => "LOAD_ERROR",
            AppState::SkipBecauseBroken => "SKIP_BECAUSE_BROKEN",
        }
    }

    /// States from which `update` can never reach `Mounted`.
    pub fn rejects_update(&self) -> bool {
        matches!(
            self,
            AppState::NotLoaded
                | AppState::NotBootstrapped
                | AppState::NotMounted
                | AppState::LoadError
                | AppState::SkipBecauseBroken
        )
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level operation requested on a controller.
///
/// `Start` and `Update` move an app up (towards mounted), `Stop` and
/// `Unload` move it down. Operations of the same direction never interrupt
/// each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// `start()`
    Start,
    /// `stop()`
    Stop,
    /// `update(props)`
    Update,
    /// `unload()`
    Unload,
}

impl TaskKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Start => "start",
            TaskKind::Stop => "stop",
            TaskKind::Update => "update",
            TaskKind::Unload => "unload",
        }
    }

    /// Returns `true` for `Start` and `Update`.
    pub fn is_up(&self) -> bool {
        matches!(self, TaskKind::Start | TaskKind::Update)
    }

    /// Whether `other` can supersede `self` without interrupting it.
    pub fn compatible_with(&self, other: TaskKind) -> bool {
        self.is_up() == other.is_up()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions() {
        assert!(TaskKind::Start.compatible_with(TaskKind::Update));
        assert!(TaskKind::Stop.compatible_with(TaskKind::Unload));
        assert!(!TaskKind::Start.compatible_with(TaskKind::Stop));
        assert!(!TaskKind::Update.compatible_with(TaskKind::Unload));
    }

    #[test]
    fn update_rejecting_states() {
        assert!(AppState::NotMounted.rejects_update());
        assert!(AppState::SkipBecauseBroken.rejects_update());
        assert!(!AppState::Mounted.rejects_update());
        assert!(!AppState::Mounting.rejects_update());
        assert_eq!(AppState::SkipBecauseBroken.to_string(), "SKIP_BECAUSE_BROKEN");
    }
}
