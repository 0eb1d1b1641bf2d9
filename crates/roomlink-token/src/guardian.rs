//! Token acceptance and proactive refresh scheduling.
//!
//! The guardian holds at most one token and at most one refresh deadline.
//! It is meant to sit inside the session actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* ... */ }
//!         expired = guardian.wait_for_refresh() => {
//!             // fetch a replacement, then guardian.accept(new_raw)
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::{Token, TokenError};

/// Timing rules for accepting and refreshing tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Tokens with less than this left are rejected as expired.
    pub min_validity: Duration,
    /// Upper bound on how long before expiry a refresh fires.
    pub refresh_cap: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            min_validity: Duration::from_secs(10),
            refresh_cap: Duration::from_millis(60_000),
        }
    }
}

impl TokenConfig {
    /// Fixes values that would make refresh scheduling meaningless.
    ///
    /// A zero `refresh_cap` would schedule every refresh at the exact
    /// expiry instant; it is raised to one second.
    pub fn validated(mut self) -> Self {
        if self.refresh_cap.is_zero() {
            warn!("refresh_cap is zero, raising to 1s");
            self.refresh_cap = Duration::from_secs(1);
        }
        self
    }
}

/// How long to wait before refreshing a token with `remaining` left.
///
/// The refresh fires `min(cap, remaining / 2)` before expiry, so a short
/// token is refreshed halfway through and a long one `cap` early.
pub fn refresh_delay(remaining: Duration, cap: Duration) -> Duration {
    let buffer = cap.min(remaining / 2);
    remaining.saturating_sub(buffer)
}

/// Validates tokens and owns the single refresh deadline.
pub struct TokenGuardian {
    config: TokenConfig,
    current: Option<Token>,
    refresh_at: Option<Instant>,
}

impl TokenGuardian {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config: config.validated(),
            current: None,
            refresh_at: None,
        }
    }

    /// Accepts `raw` against the wall clock. See [`accept_at`](Self::accept_at).
    pub fn accept(&mut self, raw: &str) -> Result<&Token, TokenError> {
        self.accept_at(raw, SystemTime::now())
    }

    /// Validates `raw` as of `now` and, on success, makes it the current
    /// token and replaces any pending refresh with a new one.
    ///
    /// A rejected token leaves the previous token and deadline untouched.
    ///
    /// # Errors
    /// - [`TokenError::Invalid`]: malformed, or no `exp` claim
    /// - [`TokenError::Expired`]: less than `min_validity` left
    pub fn accept_at(&mut self, raw: &str, now: SystemTime) -> Result<&Token, TokenError> {
        let token = Token::parse(raw, now)?;
        let remaining = token.remaining_at(now);
        if remaining < self.config.min_validity {
            debug!(
                remaining_ms = remaining.as_millis() as u64,
                min_ms = self.config.min_validity.as_millis() as u64,
                "rejecting token close to expiry"
            );
            return Err(TokenError::Expired { remaining });
        }

        let delay = refresh_delay(remaining, self.config.refresh_cap);
        self.refresh_at = Some(Instant::now() + delay);
        debug!(
            identity = ?token.identity(),
            remaining_ms = remaining.as_millis() as u64,
            refresh_in_ms = delay.as_millis() as u64,
            "token accepted"
        );
        Ok(self.current.insert(token))
    }

    /// Waits for the refresh deadline, then invalidates the current token
    /// and returns it.
    ///
    /// Pends forever when nothing is scheduled. Cancel-safe: dropping the
    /// future before it resolves changes nothing.
    pub async fn wait_for_refresh(&mut self) -> Option<Token> {
        let Some(deadline) = self.refresh_at else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(deadline).await;
        trace!("token refresh deadline reached");
        self.invalidate()
    }

    /// Drops the current token and cancels its refresh.
    pub fn invalidate(&mut self) -> Option<Token> {
        self.refresh_at = None;
        self.current.take()
    }

    /// The token currently held, if any.
    pub fn current(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    /// When the pending refresh fires, if one is scheduled.
    pub fn refresh_at(&self) -> Option<Instant> {
        self.refresh_at
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::token::test_support::{at_secs, jwt};

    const NOW: u64 = 1_700_000_000;

    fn guardian_with_min(min_validity: Duration) -> TokenGuardian {
        TokenGuardian::new(TokenConfig {
            min_validity,
            ..TokenConfig::default()
        })
    }

    /// A token expiring `secs` after `NOW`.
    fn token_expiring_in(secs: u64) -> String {
        jwt(json!({ "exp": NOW + secs, "sub": "alice" }))
    }

    // =====================================================================
    // refresh_delay()
    // =====================================================================

    #[test]
    fn test_refresh_delay_short_token_refreshes_halfway() {
        let delay = refresh_delay(Duration::from_millis(5_000), Duration::from_millis(60_000));
        assert_eq!(delay, Duration::from_millis(2_500));
    }

    #[test]
    fn test_refresh_delay_long_token_refreshes_cap_early() {
        let delay = refresh_delay(Duration::from_secs(600), Duration::from_secs(60));
        assert_eq!(delay, Duration::from_secs(540));
    }

    #[test]
    fn test_refresh_delay_zero_remaining_is_zero() {
        assert_eq!(
            refresh_delay(Duration::ZERO, Duration::from_secs(60)),
            Duration::ZERO
        );
    }

    // =====================================================================
    // accept_at()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_accept_five_second_token_schedules_refresh_at_half() {
        let mut guardian = guardian_with_min(Duration::from_secs(1));
        let start = Instant::now();

        guardian
            .accept_at(&token_expiring_in(5), at_secs(NOW))
            .expect("should accept");

        assert_eq!(
            guardian.refresh_at(),
            Some(start + Duration::from_millis(2_500))
        );
    }

    #[test]
    fn test_accept_below_min_validity_is_expired() {
        let mut guardian = TokenGuardian::new(TokenConfig::default());

        let result = guardian.accept_at(&token_expiring_in(5), at_secs(NOW));

        assert!(
            matches!(result, Err(TokenError::Expired { remaining }) if remaining == Duration::from_secs(5)),
            "5s left against a 10s minimum should be expired"
        );
        assert!(guardian.current().is_none());
        assert!(guardian.refresh_at().is_none());
    }

    #[test]
    fn test_accept_already_expired_is_expired() {
        let mut guardian = TokenGuardian::new(TokenConfig::default());
        let raw = jwt(json!({ "exp": NOW - 30 }));

        let result = guardian.accept_at(&raw, at_secs(NOW));

        assert!(matches!(result, Err(TokenError::Expired { remaining }) if remaining.is_zero()));
    }

    #[test]
    fn test_accept_malformed_is_invalid() {
        let mut guardian = TokenGuardian::new(TokenConfig::default());
        assert!(matches!(
            guardian.accept_at("not-a-token", at_secs(NOW)),
            Err(TokenError::Invalid(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_replaces_previous_deadline() {
        let mut guardian = TokenGuardian::new(TokenConfig::default());
        let start = Instant::now();

        guardian.accept_at(&token_expiring_in(600), at_secs(NOW)).unwrap();
        guardian.accept_at(&token_expiring_in(40), at_secs(NOW)).unwrap();

        // Only the second token's deadline survives: 40s - 20s buffer.
        assert_eq!(guardian.refresh_at(), Some(start + Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_token_keeps_previous_schedule() {
        let mut guardian = TokenGuardian::new(TokenConfig::default());
        guardian.accept_at(&token_expiring_in(600), at_secs(NOW)).unwrap();
        let before = guardian.refresh_at();

        let _ = guardian.accept_at(&token_expiring_in(3), at_secs(NOW));

        assert_eq!(guardian.refresh_at(), before);
        assert!(guardian.current().is_some());
    }

    // =====================================================================
    // wait_for_refresh() / invalidate()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_refresh_fires_and_invalidates() {
        let mut guardian = guardian_with_min(Duration::from_secs(1));
        let start = Instant::now();
        guardian.accept_at(&token_expiring_in(5), at_secs(NOW)).unwrap();

        let expired = guardian.wait_for_refresh().await.expect("should hold a token");

        assert_eq!(start.elapsed(), Duration::from_millis(2_500));
        assert_eq!(expired.identity().map(|id| id.as_str()), Some("alice"));
        assert!(guardian.current().is_none());
        assert!(guardian.refresh_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_refresh_without_token_pends() {
        let mut guardian = TokenGuardian::new(TokenConfig::default());

        let result =
            tokio::time::timeout(Duration::from_secs(3_600), guardian.wait_for_refresh()).await;

        assert!(result.is_err(), "no token means no refresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_cancels_pending_refresh() {
        let mut guardian = TokenGuardian::new(TokenConfig::default());
        guardian.accept_at(&token_expiring_in(600), at_secs(NOW)).unwrap();

        assert!(guardian.invalidate().is_some());

        let result =
            tokio::time::timeout(Duration::from_secs(3_600), guardian.wait_for_refresh()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validated_raises_zero_cap() {
        let cfg = TokenConfig {
            refresh_cap: Duration::ZERO,
            ..TokenConfig::default()
        }
        .validated();
        assert_eq!(cfg.refresh_cap, Duration::from_secs(1));
    }
}
