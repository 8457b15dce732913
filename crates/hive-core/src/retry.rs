//! Exponential backoff retry (spec §4.5.1, §4.8). No jitter — spec.md §1
//! Non-goals explicitly excludes jittered retries.

/// `delay(k)` is the sleep before attempt `k+1` after attempt `k` fails:
/// `min(maxNs, floor(initialNs * factor^(k-1)))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_ns: u64,
    pub factor: f64,
    pub max_attempts: u32,
    pub max_ns: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_ns: 1,
            factor: 1.0,
            max_attempts: 1,
            max_ns: u64::MAX,
        }
    }
}

impl RetryPolicy {
    pub fn exponential_backoff(initial_ns: u64, factor: f64, max_attempts: u32, max_ns: u64) -> Self {
        Self {
            initial_ns,
            factor,
            max_attempts,
            max_ns,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry policy maxAttempts must be >= 1".to_string());
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err("retry policy factor must be finite and >= 1.0".to_string());
        }
        Ok(())
    }

    /// Delay in nanoseconds before the attempt following failed attempt `k`
    /// (1-based). `k` must be `>= 1` and `< max_attempts`.
    pub fn delay_for_failed_attempt(&self, k: u32) -> u64 {
        let scaled = (self.initial_ns as f64) * self.factor.powi((k as i32) - 1);
        let clamped = scaled.min(self.max_ns as f64).floor();
        if clamped.is_finite() && clamped >= 0.0 {
            clamped as u64
        } else {
            self.max_ns
        }
    }
}
