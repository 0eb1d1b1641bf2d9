//! The single pending retry, tagged with the generation that scheduled it.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

/// Holds at most one scheduled retry.
///
/// Like the token refresh deadline, it is polled from the session actor's
/// select loop through [`wait`](Self::wait), so cancelling is just
/// clearing the slot.
#[derive(Debug, Default)]
pub struct RetryTimer {
    pending: Option<(Instant, u64)>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a retry `delay` from now for `generation`, replacing any
    /// retry already pending.
    pub fn schedule(&mut self, delay: Duration, generation: u64) {
        self.pending = Some((Instant::now() + delay, generation));
    }

    /// Drops the pending retry. Returns `true` if there was one.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending retry fires.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(at, _)| at)
    }

    /// Waits for the pending retry and returns the generation it was
    /// scheduled under. Pends forever if nothing is scheduled.
    ///
    /// Cancel-safe: the slot is only cleared once the deadline passes.
    pub async fn wait(&mut self) -> u64 {
        let Some((deadline, generation)) = self.pending else {
            return std::future::pending().await;
        };
        time::sleep_until(deadline).await;
        self.pending = None;
        trace!(generation, "retry timer fired");
        generation
    }
}
