//! Retry policies.
//!
//! - [`RetryPolicy`] how many load retries are allowed and how they are spaced
//! - [`JitterPolicy`] randomization to avoid synchronized retries across apps
//!
//! ```text
//! AppConfig { retry: RetryPolicy, .. }
//!      └─► AppController::load():
//!           - load_error hook says "retry" && retry.allows(n) → sleep(retry.delay(n)) → loader again
//!           - otherwise → LoadError
//! ```

mod jitter;
mod retry;

pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
