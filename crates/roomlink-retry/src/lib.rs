//! Failure classification and reconnection policy for Roomlink.
//!
//! - [`classify`] turns whatever a transport reported into an
//!   [`ErrorCategory`]; that category alone decides retry-ability.
//! - [`ReconnectionPolicy`] counts attempts within a reconnect sequence
//!   and answers `Retry { delay }` or `GiveUp`.
//! - [`RetryTimer`] holds the one pending retry and the session
//!   generation it belongs to, so a retry that outlives its session is
//!   recognisably stale.
//!
//! ```ignore
//! match policy.on_transient_failure(classify(&raw)) {
//!     RetryDecision::Retry { delay, .. } => timer.schedule(delay, generation),
//!     RetryDecision::GiveUp(reason) => { /* end the session */ }
//! }
//! ```

mod classify;
mod policy;
mod timer;

pub use classify::{classify, ErrorCategory};
pub use policy::{
    base_delay, decide, DelayStrategy, GiveUpReason, ReconnectionPolicy, RetryConfig,
    RetryDecision,
};
pub use timer::RetryTimer;
