//! Process-wide registry of mount roots: at most one container per root.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ContainerError;

static ROOTS: Mutex<BTreeSet<Arc<str>>> = Mutex::new(BTreeSet::new());

/// Exclusive claim on a mount root; released on drop.
#[derive(Debug)]
pub(crate) struct RootClaim {
    root: Arc<str>,
}

impl RootClaim {
    /// Claims `root`, failing with [`ContainerError::RootInUse`] when another
    /// container holds it.
    pub(crate) fn acquire(root: Arc<str>) -> Result<Self, ContainerError> {
        let mut roots = ROOTS.lock();
        if !roots.insert(Arc::clone(&root)) {
            return Err(ContainerError::RootInUse {
                root: root.to_string(),
            });
        }
        Ok(Self { root })
    }

    pub(crate) fn root(&self) -> Arc<str> {
        Arc::clone(&self.root)
    }

    /// Whether `root` is currently claimed.
    pub(crate) fn is_claimed(root: &str) -> bool {
        ROOTS.lock().contains(root)
    }
}

impl Drop for RootClaim {
    fn drop(&mut self) {
        ROOTS.lock().remove(&self.root);
    }
}
