//! Reconnect backoff for the live channel.

use std::time::Duration;

/// Exponential reconnect policy with a ceiling.
///
/// The delay before attempt `n` (counting from zero) is
/// `min(base * 2^n, max)`. There is no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
}

impl ReconnectPolicy {
    /// Creates a policy.
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay to wait after `attempts` previous reconnect attempts.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}
