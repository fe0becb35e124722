//! Reconnect backoff.

use std::time::Duration;

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number, starting at zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(31) as i32;
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(exponent);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter = jitter(delay * self.jitter.clamp(0.0, 1.0));
        let final_delay = (delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

/// Uniform-ish value in `[-range, range]` from the clock and a fresh ULID.
fn jitter(range: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    let random = switchyard_id::Ulid::new().random() as u64;
    let normalized = (random as f64 / u64::MAX as f64) * 2.0 - 1.0;
    normalized * range
}
