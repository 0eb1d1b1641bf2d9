//! When (and whether) to try again after a transient failure.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::ErrorCategory;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How long to wait before each retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DelayStrategy {
    /// The same delay every time.
    Fixed { delay: Duration },
    /// `base * multiplier^(attempt - 1)`, capped at `max`, plus up to
    /// `jitter` (a fraction, 0.0–1.0) of extra random delay.
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
        jitter: f64,
    },
}

impl Default for DelayStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Limits for one reconnect sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Give up once the attempt number exceeds this.
    pub max_attempts: u32,
    /// Give up once this long has passed since the first failure of the
    /// sequence.
    pub budget: Duration,
    pub delay: DelayStrategy,
    /// Attempts charged for an `Unknown` failure (others cost 1), so
    /// unrecognised failures exhaust the budget sooner.
    pub unknown_attempt_cost: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            budget: Duration::from_secs(60),
            delay: DelayStrategy::default(),
            unknown_attempt_cost: 2,
        }
    }
}

impl RetryConfig {
    /// Clamp and fix out-of-range values. Called by [`ReconnectionPolicy::new`].
    ///
    /// - `multiplier` below 1.0 would shrink delays; raised to 1.0.
    /// - `jitter` clamped to `0.0..=1.0`.
    /// - `max` forced ≥ `base`.
    /// - `unknown_attempt_cost` at least 1.
    pub fn validated(mut self) -> Self {
        if let DelayStrategy::Exponential {
            base,
            max,
            multiplier,
            jitter,
        } = &mut self.delay
        {
            if multiplier.is_nan() || *multiplier < 1.0 {
                warn!(multiplier = *multiplier, "retry multiplier below 1.0, raising");
                *multiplier = 1.0;
            }
            *jitter = if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) };
            if *max < *base {
                warn!(?base, ?max, "retry max delay below base, raising");
                *max = *base;
            }
        }
        self.unknown_attempt_cost = self.unknown_attempt_cost.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Why a reconnect sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The failure category is never retried.
    Fatal(ErrorCategory),
    /// The attempt number went past `max_attempts`.
    AttemptsExhausted { attempts: u32 },
    /// The sequence ran past its time budget.
    BudgetExhausted { elapsed: Duration },
}

/// Outcome of [`ReconnectionPolicy::on_transient_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp(GiveUpReason),
}

/// The un-jittered delay before retry number `attempt` (1-based).
pub fn base_delay(strategy: &DelayStrategy, attempt: u32) -> Duration {
    match strategy {
        DelayStrategy::Fixed { delay } => *delay,
        DelayStrategy::Exponential {
            base,
            max,
            multiplier,
            ..
        } => {
            let exp = attempt.saturating_sub(1).min(63) as i32;
            let secs = base.as_secs_f64() * multiplier.powi(exp);
            if secs.is_finite() && secs < max.as_secs_f64() {
                Duration::from_secs_f64(secs)
            } else {
                *max
            }
        }
    }
}

/// The pure retry decision for failure number `attempt` (already charged),
/// `elapsed` after the first failure of the sequence.
///
/// The returned delay is the un-jittered base delay.
pub fn decide(
    config: &RetryConfig,
    attempt: u32,
    elapsed: Duration,
    category: ErrorCategory,
) -> RetryDecision {
    if category.is_fatal() {
        return RetryDecision::GiveUp(GiveUpReason::Fatal(category));
    }
    if attempt > config.max_attempts {
        return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted { attempts: attempt });
    }
    if elapsed > config.budget {
        return RetryDecision::GiveUp(GiveUpReason::BudgetExhausted { elapsed });
    }
    RetryDecision::Retry {
        attempt,
        delay: base_delay(&config.delay, attempt),
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Counts failures in the current reconnect sequence and decides what
/// happens next.
///
/// A sequence starts at the first transient failure after a successful
/// connection and ends at [`reset`](Self::reset) (connected again) or at
/// the first `GiveUp`.
pub struct ReconnectionPolicy {
    config: RetryConfig,
    attempts: u32,
    sequence_start: Option<Instant>,
    last_delay: Duration,
}

impl ReconnectionPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: config.validated(),
            attempts: 0,
            sequence_start: None,
            last_delay: Duration::ZERO,
        }
    }

    /// Records a failure of `category` and decides whether to retry.
    ///
    /// Delays never shrink within one sequence, jitter included.
    pub fn on_transient_failure(&mut self, category: ErrorCategory) -> RetryDecision {
        if category.is_fatal() {
            return RetryDecision::GiveUp(GiveUpReason::Fatal(category));
        }

        let now = Instant::now();
        let start = *self.sequence_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);

        let cost = match category {
            ErrorCategory::Unknown => self.config.unknown_attempt_cost,
            _ => 1,
        };
        self.attempts = self.attempts.saturating_add(cost);

        match decide(&self.config, self.attempts, elapsed, category) {
            RetryDecision::Retry { attempt, delay } => {
                let delay = self.jittered(delay).max(self.last_delay);
                self.last_delay = delay;
                RetryDecision::Retry { attempt, delay }
            }
            give_up => {
                debug!(
                    attempt = self.attempts,
                    max = self.config.max_attempts,
                    ?elapsed,
                    "reconnect sequence exhausted"
                );
                give_up
            }
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        match self.config.delay {
            DelayStrategy::Exponential { jitter, .. } if jitter > 0.0 => {
                let factor = 1.0 + rand::rng().random_range(0.0..jitter);
                delay.mul_f64(factor)
            }
            _ => delay,
        }
    }

    /// Ends the current sequence. Called on every successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.sequence_start = None;
        self.last_delay = Duration::ZERO;
    }

    /// Attempts charged in the current sequence.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(ms: u64) -> RetryConfig {
        RetryConfig {
            delay: DelayStrategy::Fixed {
                delay: Duration::from_millis(ms),
            },
            ..RetryConfig::default()
        }
    }

    fn exponential_no_jitter() -> RetryConfig {
        RetryConfig {
            delay: DelayStrategy::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_millis(1_000),
                multiplier: 2.0,
                jitter: 0.0,
            },
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_base_delay_exponential_doubles_then_caps() {
        let strategy = exponential_no_jitter().delay;
        let delays: Vec<u64> = (1..=6)
            .map(|a| base_delay(&strategy, a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn test_decide_is_pure_over_its_inputs() {
        let cfg = fixed(250);
        let within = decide(&cfg, 3, Duration::from_secs(1), ErrorCategory::Device);
        assert_eq!(
            within,
            RetryDecision::Retry {
                attempt: 3,
                delay: Duration::from_millis(250)
            }
        );
        assert_eq!(decide(&cfg, 3, Duration::from_secs(1), ErrorCategory::Device), within);
        assert_eq!(
            decide(&cfg, 1, Duration::from_secs(61), ErrorCategory::Network),
            RetryDecision::GiveUp(GiveUpReason::BudgetExhausted {
                elapsed: Duration::from_secs(61)
            })
        );
        assert_eq!(
            decide(&cfg, 1, Duration::ZERO, ErrorCategory::Permission),
            RetryDecision::GiveUp(GiveUpReason::Fatal(ErrorCategory::Permission))
        );
    }

    #[test]
    fn test_base_delay_huge_attempt_stays_at_max() {
        let strategy = exponential_no_jitter().delay;
        assert_eq!(base_delay(&strategy, u32::MAX), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_six_failures_with_max_five_retries_five_times() {
        let mut policy = ReconnectionPolicy::new(fixed(100));

        let decisions: Vec<_> = (0..6)
            .map(|_| policy.on_transient_failure(ErrorCategory::Network))
            .collect();

        let retries = decisions
            .iter()
            .filter(|d| matches!(d, RetryDecision::Retry { .. }))
            .count();
        assert_eq!(retries, 5);
        assert_eq!(
            decisions[5],
            RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted { attempts: 6 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_category_gives_up_without_counting() {
        let mut policy = ReconnectionPolicy::new(RetryConfig::default());

        let decision = policy.on_transient_failure(ErrorCategory::Auth);

        assert_eq!(
            decision,
            RetryDecision::GiveUp(GiveUpReason::Fatal(ErrorCategory::Auth))
        );
        assert_eq!(policy.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_failures_cost_more() {
        let mut policy = ReconnectionPolicy::new(fixed(10));

        // Cost 2 each: attempts 2, 4 retry; 6 exceeds 5.
        assert!(matches!(
            policy.on_transient_failure(ErrorCategory::Unknown),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.on_transient_failure(ErrorCategory::Unknown),
            RetryDecision::Retry { attempt: 4, .. }
        ));
        assert!(matches!(
            policy.on_transient_failure(ErrorCategory::Unknown),
            RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted { attempts: 6 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_after_elapsed_time() {
        let mut policy = ReconnectionPolicy::new(RetryConfig {
            budget: Duration::from_secs(5),
            max_attempts: 100,
            ..fixed(10)
        });

        assert!(matches!(
            policy.on_transient_failure(ErrorCategory::Network),
            RetryDecision::Retry { .. }
        ));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(matches!(
            policy.on_transient_failure(ErrorCategory::Network),
            RetryDecision::GiveUp(GiveUpReason::BudgetExhausted { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_never_decrease_with_jitter() {
        let mut policy = ReconnectionPolicy::new(RetryConfig {
            max_attempts: 50,
            delay: DelayStrategy::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_millis(400),
                multiplier: 2.0,
                jitter: 1.0,
            },
            ..RetryConfig::default()
        });

        let mut previous = Duration::ZERO;
        for _ in 0..20 {
            match policy.on_transient_failure(ErrorCategory::Device) {
                RetryDecision::Retry { delay, .. } => {
                    assert!(delay >= previous, "{delay:?} < {previous:?}");
                    previous = delay;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_starts_a_fresh_sequence() {
        let mut policy = ReconnectionPolicy::new(exponential_no_jitter());
        for _ in 0..4 {
            policy.on_transient_failure(ErrorCategory::Network);
        }

        policy.reset();

        assert_eq!(policy.attempts(), 0);
        assert_eq!(
            policy.on_transient_failure(ErrorCategory::Network),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );
    }

    #[test]
    fn test_validated_fixes_bad_exponential_values() {
        let cfg = RetryConfig {
            delay: DelayStrategy::Exponential {
                base: Duration::from_secs(2),
                max: Duration::from_secs(1),
                multiplier: 0.5,
                jitter: 3.0,
            },
            unknown_attempt_cost: 0,
            ..RetryConfig::default()
        }
        .validated();

        assert_eq!(
            cfg.delay,
            DelayStrategy::Exponential {
                base: Duration::from_secs(2),
                max: Duration::from_secs(2),
                multiplier: 1.0,
                jitter: 1.0,
            }
        );
        assert_eq!(cfg.unknown_attempt_cost, 1);
    }
}
