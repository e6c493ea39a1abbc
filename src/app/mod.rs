//! # Hosted apps.
//!
//! - [`AppController`] drives one app through its lifecycle and arbitrates
//!   concurrent operations on it.
//! - [`AppState`] / [`TaskKind`] describe where an app is and what was last
//!   asked of it.
//! - [`AppSpec`] / [`ActiveWhen`] describe an app to register with a
//!   [`Container`](crate::Container).

mod controller;
mod spec;
mod state;

pub use controller::{AppController, AppHooks, AppId, AppStatus, LoadContext, LoadFailure};
pub(crate) use spec::path_of;
pub use spec::{ActiveWhen, AppSpec};
pub use state::{AppState, TaskKind};
