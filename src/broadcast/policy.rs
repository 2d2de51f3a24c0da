//! Flood wait handling policy.
//!
//! Telegram answers with `FLOOD_WAIT_N` when too many messages go out too
//! fast. The default policy honours every wait and retries forever.

use std::time::Duration;

/// Decides whether a flood-waited send is retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloodWaitPolicy {
    /// Maximum re-attempts per (row, group) pair. `None` means unbounded.
    pub max_retries: Option<u32>,

    /// Longest single wait that is honoured. `None` means any.
    pub max_wait: Option<Duration>,
}

/// What to do after a flood wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodDecision {
    /// Sleep for the duration, then resend.
    Retry(Duration),
    /// Give up on the pair.
    GiveUp,
}

impl FloodWaitPolicy {
    /// Policy with no limits.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_retries: None,
            max_wait: None,
        }
    }

    /// Limits re-attempts per (row, group) pair.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Gives up when Telegram asks for a wait longer than `wait`.
    #[must_use]
    pub const fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = Some(wait);
        self
    }

    /// Decides after a flood wait of `wait_seconds`, given `retries` already made for this pair.
    #[must_use]
    pub fn decide(&self, wait_seconds: u32, retries: u32) -> FloodDecision {
        let wait = Duration::from_secs(u64::from(wait_seconds));

        if self.max_retries.is_some_and(|max| retries >= max) {
            return FloodDecision::GiveUp;
        }
        if self.max_wait.is_some_and(|max| wait > max) {
            return FloodDecision::GiveUp;
        }

        FloodDecision::Retry(wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let policy = FloodWaitPolicy::default();
        assert_eq!(policy, FloodWaitPolicy::unbounded());
        assert_eq!(
            policy.decide(86_400, 10_000),
            FloodDecision::Retry(Duration::from_secs(86_400))
        );
    }

    #[test]
    fn test_retry_ceiling() {
        let policy = FloodWaitPolicy::unbounded().with_max_retries(2);
        assert_eq!(policy.decide(3, 0), FloodDecision::Retry(Duration::from_secs(3)));
        assert_eq!(policy.decide(3, 1), FloodDecision::Retry(Duration::from_secs(3)));
        assert_eq!(policy.decide(3, 2), FloodDecision::GiveUp);
    }

    #[test]
    fn test_wait_cap() {
        let policy = FloodWaitPolicy::unbounded().with_max_wait(Duration::from_secs(60));
        assert_eq!(policy.decide(60, 0), FloodDecision::Retry(Duration::from_secs(60)));
        assert_eq!(policy.decide(61, 0), FloodDecision::GiveUp);
    }

    #[test]
    fn test_zero_retries_never_waits() {
        let policy = FloodWaitPolicy::unbounded().with_max_retries(0);
        assert_eq!(policy.decide(1, 0), FloodDecision::GiveUp);
    }
}
