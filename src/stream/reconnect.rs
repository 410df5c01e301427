use std::time::Duration;

use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    Scheduled,
    /// Terminal until `reset()`.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Schedule { attempt: u32, delay: Duration },
    Exhausted,
}

/// Linear backoff: attempt k waits `base_delay * k`, at most `max_attempts`
/// consecutive attempts. One instance per channel; attempts are never shared.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    attempts: u32,
    phase: Phase,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay, attempts: 0, phase: Phase::Idle }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[cfg(test)]
    fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == Phase::Exhausted
    }

    pub fn on_connecting(&mut self) {
        self.phase = Phase::Connecting;
    }

    pub fn on_open(&mut self) {
        if self.attempts > 0 {
            debug!(attempts = self.attempts, "Reconnected, resetting attempt counter");
        }
        self.attempts = 0;
        self.phase = Phase::Open;
    }

    /// Exactly one call per observed close.
    pub fn on_close(&mut self) -> ReconnectDecision {
        if self.phase == Phase::Exhausted || self.attempts >= self.max_attempts {
            if self.phase != Phase::Exhausted {
                warn!(max_attempts = self.max_attempts, "Reconnect attempts exhausted");
            }
            self.phase = Phase::Exhausted;
            return ReconnectDecision::Exhausted;
        }
        self.attempts += 1;
        self.phase = Phase::Scheduled;
        ReconnectDecision::Schedule { attempt: self.attempts, delay: self.delay_for(self.attempts) }
    }

    /// External intervention: forget past failures and leave `Exhausted`.
    pub fn reset(&mut self) {
        self.attempts = 0;
        if self.phase == Phase::Exhausted {
            self.phase = Phase::Idle;
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linear_backoff_then_exhausted() {
        let mut policy = ReconnectPolicy::default();
        policy.on_connecting();
        let mut delays = Vec::new();
        for _ in 0..5 {
            match policy.on_close() {
                ReconnectDecision::Schedule { delay, .. } => delays.push(delay.as_millis()),
                ReconnectDecision::Exhausted => panic!("exhausted too early"),
            }
            policy.on_connecting();
        }
        assert_eq!(delays, vec![3000, 6000, 9000, 12000, 15000]);
        // sixth consecutive close
        assert_eq!(policy.on_close(), ReconnectDecision::Exhausted);
        assert!(policy.is_exhausted());
        // stays exhausted without a reset
        assert_eq!(policy.on_close(), ReconnectDecision::Exhausted);
        assert_eq!(policy.attempts(), 5);
    }

    #[test]
    fn test_open_resets_attempts() {
        let mut policy = ReconnectPolicy::new(5, Duration::from_millis(10));
        policy.on_close();
        policy.on_close();
        assert_eq!(policy.attempts(), 2);
        policy.on_open();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.phase(), Phase::Open);
        assert_eq!(
            policy.on_close(),
            ReconnectDecision::Schedule { attempt: 1, delay: Duration::from_millis(10) }
        );
    }

    #[test]
    fn test_reset_leaves_exhausted() {
        let mut policy = ReconnectPolicy::new(1, Duration::from_millis(10));
        policy.on_close();
        assert_eq!(policy.on_close(), ReconnectDecision::Exhausted);
        policy.reset();
        assert_eq!(policy.phase(), Phase::Idle);
        assert!(matches!(policy.on_close(), ReconnectDecision::Schedule { attempt: 1, .. }));
    }

    proptest! {
        #[test]
        fn prop_delay_is_base_times_attempt(base_ms in 1u64..10_000, max in 1u32..20) {
            let mut policy = ReconnectPolicy::new(max, Duration::from_millis(base_ms));
            for k in 1..=max {
                let decision = policy.on_close();
                prop_assert_eq!(
                    decision,
                    ReconnectDecision::Schedule { attempt: k, delay: Duration::from_millis(base_ms * k as u64) }
                );
            }
            prop_assert_eq!(policy.on_close(), ReconnectDecision::Exhausted);
        }
    }
}
