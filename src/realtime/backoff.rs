use std::time::Duration;

use crate::config::RealtimeConfig;

/// Exponential reconnection schedule.
///
/// The delay before reconnect attempt `k` (1-based) is
/// `min(base * 2^k, max)`. With the defaults that is 2s, 4s, 8s, 16s, 30s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            base: Duration::from_millis(config.reconnect_base_ms),
            max: Duration::from_millis(config.reconnect_max_ms),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Attempt counter over a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Called when a connection opens.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Schedule the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.policy.delay_for(self.attempts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5).map(|k| policy.delay_for(k).as_millis() as u64).collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000]);
    }

    #[test]
    fn test_delay_is_capped_for_huge_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_exhausts_after_max_attempts() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        for n in 1..=5u32 {
            let (attempt, delay) = backoff.next_delay().unwrap();
            assert_eq!(attempt, n);
            let expected = (1000u64 * 2u64.pow(n)).min(30_000);
            assert_eq!(delay, Duration::from_millis(expected));
        }
        assert!(backoff.next_delay().is_none());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some((1, Duration::from_secs(2))));
    }

    #[test]
    fn test_zero_attempts_never_schedules() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert!(Backoff::new(policy).next_delay().is_none());
    }
}
