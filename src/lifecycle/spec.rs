//! # Lifecycle: the phase arrays of one app.
//!
//! A [`Lifecycle`] is what a [`SourceLoader`](crate::SourceLoader) produces.
//! `mount` and `unmount` are required; `bootstrap` and `update` are optional.
//! Each phase is an ordered array of [`PhaseFn`]s run strictly in sequence.
//!
//! ## Example
//! ```rust
//! use mountvisor::{Lifecycle, MountProps, PhaseError};
//!
//! let lc = Lifecycle::builder()
//!     .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
//!     .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
//!     .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
//!     .build();
//!
//! assert_eq!(lc.mount().len(), 2);
//! assert!(lc.update().is_none());
//! assert!(lc.validate().is_ok());
//! ```

use std::fmt;
use std::sync::Arc;

use super::phase::Phase;
use super::phase_fn::{PhaseFn, PhaseFnRef};

/// Phase arrays of one app.
#[derive(Clone, Default)]
pub struct Lifecycle {
    bootstrap: Vec<PhaseFnRef>,
    mount: Vec<PhaseFnRef>,
    unmount: Vec<PhaseFnRef>,
    update: Option<Vec<PhaseFnRef>>,
}

impl Lifecycle {
    /// Starts an empty builder.
    pub fn builder() -> LifecycleBuilder {
        LifecycleBuilder::default()
    }

    /// Bootstrap array (may be empty).
    pub fn bootstrap(&self) -> &[PhaseFnRef] {
        &self.bootstrap
    }

    /// Mount array.
    pub fn mount(&self) -> &[PhaseFnRef] {
        &self.mount
    }

    /// Unmount array.
    pub fn unmount(&self) -> &[PhaseFnRef] {
        &self.unmount
    }

    /// Update array, if the app supports updates.
    pub fn update(&self) -> Option<&[PhaseFnRef]> {
        self.update.as_deref()
    }

    /// Returns the array for `phase`; `Load` and a missing update yield an empty slice.
    pub fn phase(&self, phase: Phase) -> &[PhaseFnRef] {
        match phase {
            Phase::Load => &[],
            Phase::Bootstrap => &self.bootstrap,
            Phase::Mount => &self.mount,
            Phase::Unmount => &self.unmount,
            Phase::Update => self.update.as_deref().unwrap_or(&[]),
        }
    }

    /// Checks that `mount` and `unmount` are present.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.mount.is_empty() {
            return Err("missing mount");
        }
        if self.unmount.is_empty() {
            return Err("missing unmount");
        }
        Ok(())
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("bootstrap", &self.bootstrap.len())
            .field("mount", &self.mount.len())
            .field("unmount", &self.unmount.len())
            .field("update", &self.update.as_ref().map(Vec::len))
            .finish()
    }
}

/// Builder appending functions to the phase arrays in call order.
#[derive(Default)]
pub struct LifecycleBuilder {
    inner: Lifecycle,
}

impl LifecycleBuilder {
    /// Appends a bootstrap function.
    pub fn bootstrap(mut self, f: impl PhaseFn) -> Self {
        self.inner.bootstrap.push(Arc::new(f));
        self
    }

    /// Appends a mount function.
    pub fn mount(mut self, f: impl PhaseFn) -> Self {
        self.inner.mount.push(Arc::new(f));
        self
    }

    /// Appends an unmount function.
    pub fn unmount(mut self, f: impl PhaseFn) -> Self {
        self.inner.unmount.push(Arc::new(f));
        self
    }

    /// Appends an update function (enables `update`).
    pub fn update(mut self, f: impl PhaseFn) -> Self {
        self.inner.update.get_or_insert_with(Vec::new).push(Arc::new(f));
        self
    }

    /// Appends an already shared function to `phase` (`Load` is ignored).
    pub fn push(mut self, phase: Phase, f: PhaseFnRef) -> Self {
        match phase {
            Phase::Load => {}
            Phase::Bootstrap => self.inner.bootstrap.push(f),
            Phase::Mount => self.inner.mount.push(f),
            Phase::Unmount => self.inner.unmount.push(f),
            Phase::Update => self.inner.update.get_or_insert_with(Vec::new).push(f),
        }
        self
    }

    /// Finishes the lifecycle. Validation happens when it is installed.
    pub fn build(self) -> Lifecycle {
        self.inner
    }
}
