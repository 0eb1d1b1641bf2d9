//! Connector configuration.

use std::time::Duration;

use roomlink_retry::RetryConfig;
use roomlink_token::TokenConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where a session ends up when reconnection gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExhaustionOutcome {
    /// End quietly, as if the caller had disconnected.
    #[default]
    Disconnected,
    /// End as a failure.
    Failed,
}

/// Configuration for a [`SessionConnector`](crate::SessionConnector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Token acceptance and refresh timing.
    pub token: TokenConfig,

    /// Reconnect attempts, budget and delays.
    pub retry: RetryConfig,

    /// State applied when the retry budget runs out.
    pub on_exhausted: ExhaustionOutcome,

    /// How long a single connect attempt may take before it counts as a
    /// (retryable) network failure.
    pub connect_timeout: Duration,

    /// Capacity of the update broadcast. Slow subscribers that fall this
    /// far behind skip ahead.
    pub update_buffer: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            retry: RetryConfig::default(),
            on_exhausted: ExhaustionOutcome::default(),
            connect_timeout: Duration::from_secs(15),
            update_buffer: 64,
        }
    }
}

impl ConnectorConfig {
    /// Clamps out-of-range values, including the nested configs.
    pub fn validated(mut self) -> Self {
        self.token = self.token.validated();
        self.retry = self.retry.validated();
        if self.connect_timeout.is_zero() {
            warn!("connect_timeout is zero, raising to 1s");
            self.connect_timeout = Duration::from_secs(1);
        }
        if self.update_buffer == 0 {
            warn!("update_buffer is zero, raising to 1");
            self.update_buffer = 1;
        }
        self
    }
}
