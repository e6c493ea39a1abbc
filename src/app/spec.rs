//! # App registration input.
//!
//! [`AppSpec`] bundles what a [`Container`](crate::Container) needs to create
//! an [`AppController`](crate::AppController): a name, a
//! [`SourceLoader`], optional activation rules and props, and optionally an
//! [`AppConfig`] overriding the container defaults.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use mountvisor::{ActiveWhen, AppSpec, Lifecycle, LoaderFn, PhaseError};
//!
//! let loader = LoaderFn::arc(|_name: Arc<str>| async {
//!     Err::<Lifecycle, _>(PhaseError::fail("not deployed"))
//! });
//! let spec = AppSpec::new("checkout", loader)
//!     .active_when(ActiveWhen::prefix("/checkout"))
//!     .props(serde_json::json!({ "currency": "EUR" }));
//!
//! assert_eq!(spec.name(), "checkout");
//! assert!(spec.matches("/checkout/cart"));
//! assert!(!spec.matches("/checkouts"));
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;

use crate::config::AppConfig;
use crate::lifecycle::SourceLoader;

type UrlPredicate = dyn Fn(&str) -> bool + Send + Sync;

/// Rule selecting the app for a URL.
#[derive(Clone)]
pub enum ActiveWhen {
    /// Path equal to the prefix or below it (`/foo` matches `/foo`, `/foo/x`,
    /// `/foo?q`, but not `/foobar`).
    Prefix(Arc<str>),
    /// Arbitrary predicate on the full URL. A panicking predicate does not match.
    Predicate(Arc<UrlPredicate>),
}

impl ActiveWhen {
    /// Path-prefix rule.
    pub fn prefix(prefix: impl Into<Arc<str>>) -> Self {
        ActiveWhen::Prefix(prefix.into())
    }

    /// Predicate rule.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        ActiveWhen::Predicate(Arc::new(f))
    }

    /// Whether `url` satisfies the rule.
    pub fn matches(&self, url: &str) -> bool {
        match self {
            ActiveWhen::Prefix(prefix) => {
                let path = path_of(url);
                let prefix = prefix.trim_end_matches('/');
                match path.strip_prefix(prefix) {
                    Some(rest) => rest.is_empty() || rest.starts_with('/'),
                    None => false,
                }
            }
            ActiveWhen::Predicate(f) => catch_unwind(AssertUnwindSafe(|| f(url))).unwrap_or(false),
        }
    }
}

impl fmt::Debug for ActiveWhen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveWhen::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            ActiveWhen::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Path component of `url` (query and fragment stripped).
pub(crate) fn path_of(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Everything needed to register one app.
#[derive(Clone)]
pub struct AppSpec {
    name: Arc<str>,
    loader: Arc<dyn SourceLoader>,
    active_when: Vec<ActiveWhen>,
    props: Value,
    config: Option<AppConfig>,
}

impl AppSpec {
    /// App `name` loaded by `loader`.
    pub fn new(name: impl Into<Arc<str>>, loader: Arc<dyn SourceLoader>) -> Self {
        Self {
            name: name.into(),
            loader,
            active_when: Vec::new(),
            props: Value::Null,
            config: None,
        }
    }

    /// Adds an activation rule; any matching rule selects the app.
    pub fn active_when(mut self, rule: ActiveWhen) -> Self {
        self.active_when.push(rule);
        self
    }

    /// Initial props handed to the phase functions.
    pub fn props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Overrides the container's app defaults.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// App name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any activation rule matches `url`.
    pub fn matches(&self, url: &str) -> bool {
        self.active_when.iter().any(|r| r.matches(url))
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn loader(&self) -> Arc<dyn SourceLoader> {
        Arc::clone(&self.loader)
    }

    pub(crate) fn initial_props(&self) -> &Value {
        &self.props
    }

    pub(crate) fn config_override(&self) -> Option<AppConfig> {
        self.config
    }
}

impl fmt::Debug for AppSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSpec")
            .field("name", &self.name)
            .field("active_when", &self.active_when)
            .finish_non_exhaustive()
    }
}
