//! # Phase functions.
//!
//! A [`PhaseFn`] produces a fresh future per invocation. Closures
//! `Fn(MountProps) -> Fut` implement it directly; shared state belongs in an
//! explicit `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use mountvisor::{MountProps, PhaseError, PhaseFn};
//!
//! let mount = |props: MountProps| async move {
//!     if props.root.is_empty() {
//!         return Err(PhaseError::fail("no root"));
//!     }
//!     Ok::<(), PhaseError>(())
//! };
//! fn assert_phase_fn(_: &impl PhaseFn) {}
//! assert_phase_fn(&mount);
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::PhaseError;

/// Boxed future returned by a [`PhaseFn`].
pub type BoxPhaseFuture = BoxFuture<'static, Result<(), PhaseError>>;

/// Shared handle to a phase function.
pub type PhaseFnRef = Arc<dyn PhaseFn>;

/// Arguments handed to every phase function.
#[derive(Clone, Debug)]
pub struct MountProps {
    /// App name.
    pub name: Arc<str>,
    /// Mount root the app renders into.
    pub root: Arc<str>,
    /// Host-provided props (replaced by `update`).
    pub props: Arc<Value>,
}

impl MountProps {
    /// Props for `name` rendering into `root`, with no host props.
    pub fn new(name: impl Into<Arc<str>>, root: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            props: Arc::new(Value::Null),
        }
    }

    /// Replaces the host props.
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = Arc::new(props);
        self
    }
}

/// One step of a phase array.
pub trait PhaseFn: Send + Sync + 'static {
    /// Creates the future performing this step.
    fn call(&self, props: MountProps) -> BoxPhaseFuture;
}

impl<F, Fut> PhaseFn for F
where
    F: Fn(MountProps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PhaseError>> + Send + 'static,
{
    fn call(&self, props: MountProps) -> BoxPhaseFuture {
        Box::pin((self)(props))
    }
}
