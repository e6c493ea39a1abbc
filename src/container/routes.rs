//! # Route-driven activation.
//!
//! A container built with a [`RouteConfig`] registers itself as a
//! [`NavigationConsumer`] when it runs. For every navigation:
//!
//! ```text
//! accept(nav) ─► spawn:
//!   url = nav.new_url()
//!   ├─ no app matches and fallback applies ─► redirect(fallback), pass, count
//!   │     (redirect refused: continue below, which unmounts)
//!   ├─ cancel_activate_app(url) == true     ─► veto
//!   └─ otherwise ─► pass ─► wait for the gate
//!                     ├─ vetoed   ─► count
//!                     └─ passed   ─► activate_app(match) ─► count
//! ```
//!
//! Panicking predicates count as "pass" (cancel) or "no match" (fallback).

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use super::orchestrator::Inner;
use crate::error::ContainerError;
use crate::navigation::{NavigationConsumer, NavigationDescriptor};
use crate::subscribers::panic_message;

type UrlPredicate = dyn Fn(&str) -> bool + Send + Sync;
type CancelPredicate = dyn Fn(&str) -> BoxFuture<'static, bool> + Send + Sync;

/// Route-mode settings of a container.
#[derive(Clone, Default)]
pub struct RouteConfig {
    fallback_url: Option<Arc<str>>,
    fallback_only_when: Option<Arc<UrlPredicate>>,
    cancel_activate_app: Option<Arc<CancelPredicate>>,
}

impl RouteConfig {
    /// Route mode without fallback or veto.
    pub fn new() -> Self {
        Self::default()
    }

    /// URL to redirect to when no app matches.
    pub fn fallback_url(mut self, url: impl Into<Arc<str>>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    /// Restricts the fallback redirect to URLs satisfying `f`.
    pub fn fallback_only_when<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.fallback_only_when = Some(Arc::new(f));
        self
    }

    /// Asynchronous veto: resolving to `true` cancels the navigation.
    pub fn cancel_activate_app<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.cancel_activate_app = Some(Arc::new(move |url: &str| f(url.to_owned()).boxed()));
        self
    }

    /// Fallback target for `url`, if the redirect applies.
    pub(crate) fn fallback_for(&self, url: &str) -> Option<Arc<str>> {
        let fallback = self.fallback_url.as_ref()?;
        if crate::app::path_of(url) == crate::app::path_of(fallback) {
            return None;
        }
        let applies = match &self.fallback_only_when {
            Some(f) => catch_unwind(AssertUnwindSafe(|| f(url))).unwrap_or(false),
            None => true,
        };
        applies.then(|| Arc::clone(fallback))
    }

    /// Runs the veto predicate; panics count as "do not cancel".
    pub(crate) async fn cancels(&self, url: &str) -> bool {
        let Some(f) = &self.cancel_activate_app else {
            return false;
        };
        let fut = match catch_unwind(AssertUnwindSafe(|| f(url))) {
            Ok(fut) => fut,
            Err(panic) => {
                tracing::warn!(%url, info = %panic_message(panic.as_ref()), "cancel_activate_app panicked");
                return false;
            }
        };
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(cancel) => cancel,
            Err(panic) => {
                tracing::warn!(%url, info = %panic_message(panic.as_ref()), "cancel_activate_app panicked");
                false
            }
        }
    }
}

impl fmt::Debug for RouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteConfig")
            .field("fallback_url", &self.fallback_url)
            .field("fallback_only_when", &self.fallback_only_when.is_some())
            .field("cancel_activate_app", &self.cancel_activate_app.is_some())
            .finish()
    }
}

/// The container's navigation consumer.
pub(crate) struct RouteConsumer {
    pub(crate) container: Weak<Inner>,
}

impl NavigationConsumer for RouteConsumer {
    fn accept(&self, nav: NavigationDescriptor) {
        // A destroyed container drops the descriptor: abstain and count.
        let Some(inner) = self.container.upgrade() else {
            return;
        };
        tokio::spawn(async move { route(inner, nav).await });
    }
}

async fn route(inner: Arc<Inner>, nav: NavigationDescriptor) {
    let Some(routes) = inner.routes.clone() else {
        return;
    };
    let url = nav.navigation.new_url();

    if inner.match_url(&url).is_none()
        && let Some(fallback) = routes.fallback_for(&url)
    {
        let redirect = inner.coordinator.redirect(fallback.as_ref(), Value::Null);
        match redirect.refusal() {
            None => {
                tracing::debug!(container = %inner.name, %url, %fallback, "no app matches; redirecting");
                nav.vote.pass(Arc::clone(&inner.name));
                nav.ready.count();
                return;
            }
            // Stay on the unmatched URL: nothing is mounted there.
            Some(e) => {
                tracing::warn!(container = %inner.name, %url, %fallback, error = %e, "fallback redirect refused");
            }
        }
    }

    if routes.cancels(&url).await {
        tracing::debug!(container = %inner.name, %url, "navigation cancelled");
        nav.vote.veto();
        return;
    }
    nav.vote.pass(Arc::clone(&inner.name));
    if nav.gate.is_final_vetoed().await {
        return;
    }

    // The target may have moved on while the votes were collected.
    let url = nav.navigation.new_url();
    let target = inner.match_url(&url);
    let name = target.as_ref().map(|app| app.name().to_owned());
    match Inner::activate(&inner, name.as_deref()).await {
        Ok(_) => {}
        Err(e @ ContainerError::Interrupted { .. }) => {
            tracing::debug!(container = %inner.name, %url, error = %e, "route activation superseded");
        }
        Err(e) => {
            tracing::warn!(container = %inner.name, %url, error = %e, "route activation failed");
        }
    }
    nav.ready.count();
}
