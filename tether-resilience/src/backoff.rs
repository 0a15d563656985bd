//! Exponential backoff calculation

use std::time::Duration;

/// Exponential backoff clamped to a maximum delay.
///
/// `delay(n) = min(base_delay * factor^(n-1), max_delay)` for the 1-indexed
/// retry number `n`. Factors below 1 (or not finite) are treated as 1, so the
/// sequence is non-decreasing and never exceeds `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    /// Create a new backoff calculator
    pub fn new(base_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor >= 1.0 {
            factor
        } else {
            1.0
        };
        Self {
            base_delay,
            max_delay,
            factor,
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
        let nanos = self.base_delay.as_nanos() as f64 * self.factor.powi(exponent);

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }

        Duration::from_nanos(nanos as u64)
    }

    /// Delays for consecutive attempts starting at the first retry
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=u32::MAX).map(move |attempt| self.delay(attempt))
    }
}
