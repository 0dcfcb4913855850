//! Backoff for resubscribing after a reconnect.

use std::time::Duration;

/// Retry policy for subscriptions that fail to come back after a reconnect.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Whether failed resubscriptions are retried at all.
    pub enabled: bool,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Failures tolerated before the subscription is dropped (0 = unlimited).
    pub max_attempts: usize,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_attempts: 8,
        }
    }
}

/// Retry schedule of one alias whose resubscribe failed.
///
/// The n-th retry waits `initial_delay * backoff_multiplier^(n - 1)`, capped
/// at `max_delay`.
#[derive(Debug, Clone)]
pub struct ResubscribeBackoff {
    config: ReconnectConfig,
    attempts: usize,
}

impl ResubscribeBackoff {
    /// Creates a schedule with no failures recorded.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Counts a failed resubscribe and returns how long to wait before the
    /// next one, or `None` when the subscription should be given up.
    pub fn on_failure(&mut self) -> Option<Duration> {
        if !self.config.enabled {
            return None;
        }
        self.attempts += 1;
        let limit = self.config.max_attempts;
        if limit > 0 && self.attempts >= limit {
            return None;
        }
        Some(self.delay_for(self.attempts))
    }

    /// Failures recorded so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scale = self.config.backoff_multiplier.max(1.0).powi(exponent);
        let secs = self.config.initial_delay.as_secs_f64() * scale;
        let cap = self.config.max_delay;
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: usize) -> ReconnectConfig {
        ReconnectConfig {
            enabled: true,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
            max_attempts,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut backoff = ResubscribeBackoff::new(config(0));

        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn test_attempts_exhausted() {
        let mut backoff = ResubscribeBackoff::new(config(2));

        assert!(backoff.on_failure().is_some());
        assert!(backoff.on_failure().is_none());
    }

    #[test]
    fn test_delay_never_shrinks_below_initial() {
        let mut backoff = ResubscribeBackoff::new(ReconnectConfig {
            backoff_multiplier: 0.5,
            ..config(0)
        });

        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_long_outage_stays_at_cap() {
        let mut backoff = ResubscribeBackoff::new(config(0));
        let last = (0..2_000).filter_map(|_| backoff.on_failure()).last();
        assert_eq!(last, Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_disabled() {
        let mut backoff = ResubscribeBackoff::new(ReconnectConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(backoff.on_failure().is_none());
        assert_eq!(backoff.attempts(), 0);
    }
}
