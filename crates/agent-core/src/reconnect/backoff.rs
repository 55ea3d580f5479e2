//! Bounded exponential backoff.
//!
//! The instrument connection is expected to live for months in the field, so
//! the connector never stops retrying.  What changes is how long it waits: the
//! delay starts at `base_delay`, grows by `factor` after every failed or
//! dropped attempt, never exceeds `max_delay`, and snaps back to `base_delay`
//! as soon as a connection succeeds.
//!
//! ```text
//! base=1s, factor=φ, max=30s
//!
//! fail → wait 1.000s
//! fail → wait 1.618s
//! fail → wait 2.618s
//! ok   → reset
//! drop → wait 1.000s
//! ```

use std::time::Duration;

use crate::error::RelayError;

/// The golden ratio.  Widens the retry cadence more gently than doubling.
pub const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Default first retry delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling on the retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Immutable reconnect parameters, handed to a connector at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            factor: GOLDEN_RATIO,
        }
    }
}

impl ReconnectPolicy {
    /// Checks that the policy can uphold `base <= current <= max`.
    ///
    /// # Errors
    ///
    /// - [`RelayError::ZeroBaseDelay`] if `base_delay` is zero.
    /// - [`RelayError::BaseExceedsMax`] if `base_delay > max_delay`.
    /// - [`RelayError::InvalidFactor`] if `factor` is below 1.0 or not finite.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.base_delay.is_zero() {
            return Err(RelayError::ZeroBaseDelay);
        }
        if self.base_delay > self.max_delay {
            return Err(RelayError::BaseExceedsMax {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(RelayError::InvalidFactor(self.factor));
        }
        Ok(())
    }
}

/// Running backoff state for one connector.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
    retries: u32,
}

impl Backoff {
    /// Creates backoff state sitting at the policy's base delay.
    ///
    /// # Errors
    ///
    /// Returns the policy's validation error, see [`ReconnectPolicy::validate`].
    pub fn new(policy: ReconnectPolicy) -> Result<Self, RelayError> {
        policy.validate()?;
        Ok(Self {
            policy,
            current: policy.base_delay,
            retries: 0,
        })
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// The delay the next retry will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Failed or dropped attempts since the last successful connection.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Records a failed or dropped attempt.
    ///
    /// Returns the delay to wait before the next attempt, then grows the
    /// stored delay by `factor`, capped at `max_delay`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.policy.factor)
            .unwrap_or(self.policy.max_delay);
        self.current = grown.min(self.policy.max_delay);
        self.retries = self.retries.saturating_add(1);
        delay
    }

    /// Records a successful connection.
    pub fn reset(&mut self) {
        self.current = self.policy.base_delay;
        self.retries = 0;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Duration, expected_secs: f64) {
        let diff = (actual.as_secs_f64() - expected_secs).abs();
        assert!(
            diff < 1e-6,
            "expected ~{expected_secs}s, got {:?}",
            actual
        );
    }

    #[test]
    fn test_default_policy_uses_golden_ratio() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.factor, GOLDEN_RATIO);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_new_backoff_starts_at_base_delay() {
        let backoff = Backoff::new(ReconnectPolicy::default()).unwrap();
        assert_eq!(backoff.current(), Duration::from_secs(1));
        assert_eq!(backoff.retries(), 0);
    }

    #[test]
    fn test_three_failures_follow_golden_ratio_schedule() {
        // Arrange
        let mut backoff = Backoff::new(ReconnectPolicy::default()).unwrap();

        // Act: each failure waits the current delay, then grows it
        let waits: Vec<Duration> = (0..3).map(|_| backoff.next_delay()).collect();

        // Assert
        assert_close(waits[0], 1.0);
        assert_close(waits[1], 1.618_034);
        assert_close(waits[2], 2.618_034);
        assert_close(backoff.current(), 4.236_068);
    }

    #[test]
    fn test_success_after_failures_resets_to_base() {
        // Arrange
        let mut backoff = Backoff::new(ReconnectPolicy::default()).unwrap();
        for _ in 0..3 {
            backoff.next_delay();
        }

        // Act
        backoff.reset();

        // Assert: the next scheduled wait is the base delay again
        assert_eq!(backoff.retries(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_delay_after_i_failures_matches_closed_form() {
        let policy = ReconnectPolicy::default();
        let mut backoff = Backoff::new(policy).unwrap();

        for i in 1..=20 {
            backoff.next_delay();
            let expected = (policy.base_delay.as_secs_f64() * policy.factor.powi(i))
                .min(policy.max_delay.as_secs_f64());
            let diff = (backoff.current().as_secs_f64() - expected).abs();
            assert!(diff < 1e-6, "failure {i}: expected {expected}, got {:?}", backoff.current());
        }
    }

    #[test]
    fn test_delay_never_exceeds_max() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            factor: 10.0,
        })
        .unwrap();

        for _ in 0..50 {
            let wait = backoff.next_delay();
            assert!(wait <= Duration::from_secs(3));
            assert!(backoff.current() >= Duration::from_millis(500));
            assert!(backoff.current() <= Duration::from_secs(3));
        }
        assert_eq!(backoff.current(), Duration::from_secs(3));
    }

    #[test]
    fn test_huge_max_delay_saturates_instead_of_panicking() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::MAX,
            factor: 1.0e12,
        })
        .unwrap();

        for _ in 0..10 {
            backoff.next_delay();
        }
        assert!(backoff.current() <= Duration::MAX);
    }

    #[test]
    fn test_factor_of_one_keeps_constant_delay() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            factor: 1.0,
            ..ReconnectPolicy::default()
        })
        .unwrap();

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_base_delay_is_rejected() {
        let result = Backoff::new(ReconnectPolicy {
            base_delay: Duration::ZERO,
            ..ReconnectPolicy::default()
        });
        assert_eq!(result.unwrap_err(), RelayError::ZeroBaseDelay);
    }

    #[test]
    fn test_base_above_max_is_rejected() {
        let result = ReconnectPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(30),
            factor: GOLDEN_RATIO,
        }
        .validate();
        assert!(matches!(result, Err(RelayError::BaseExceedsMax { .. })));
    }

    #[test]
    fn test_shrinking_or_nan_factor_is_rejected() {
        for factor in [0.5, f64::NAN, f64::INFINITY] {
            let result = ReconnectPolicy {
                factor,
                ..ReconnectPolicy::default()
            }
            .validate();
            assert!(matches!(result, Err(RelayError::InvalidFactor(_))), "factor {factor}");
        }
    }
}
