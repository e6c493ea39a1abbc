//! # Source loader: where lifecycles come from.
//!
//! The runtime never fetches code itself. An app's [`SourceLoader`] is asked
//! for its [`Lifecycle`] on the first `load()`, again on each granted retry,
//! and again when `start()` restarts after `LoadError`.
//!
//! [`LoaderFn`] adapts a closure `Fn(Arc<str>) -> Fut`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use mountvisor::{Lifecycle, LoaderFn, MountProps, PhaseError, SourceLoader};
//!
//! let loader: Arc<dyn SourceLoader> = LoaderFn::arc(|name: Arc<str>| async move {
//!     if name.is_empty() {
//!         return Err(PhaseError::fail("no entry"));
//!     }
//!     Ok(Lifecycle::builder()
//!         .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
//!         .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
//!         .build())
//! });
//! # let _ = loader;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::spec::Lifecycle;
use crate::error::PhaseError;

/// Produces an app's lifecycle.
#[async_trait]
pub trait SourceLoader: Send + Sync + 'static {
    /// Loads the lifecycle of `app`.
    async fn load(&self, app: &str) -> Result<Lifecycle, PhaseError>;
}

/// Closure-backed loader.
#[derive(Debug)]
pub struct LoaderFn<F> {
    f: F,
}

impl<F> LoaderFn<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps `f` and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> SourceLoader for LoaderFn<F>
where
    F: Fn(Arc<str>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Lifecycle, PhaseError>> + Send + 'static,
{
    async fn load(&self, app: &str) -> Result<Lifecycle, PhaseError> {
        (self.f)(Arc::from(app)).await
    }
}
