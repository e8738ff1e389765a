use crate::client::error_classification::ClassifiedError;
use crate::config::ClientConfig;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Resend after `delay`. `attempt` is 1-based and already counts this retry.
    Retry { attempt: u32, delay: Duration },
    Terminal,
}

/// Retry knobs plus the pure decision function.
///
/// No I/O and no clocks here: sleeping and resending belong to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    /// Exponential backoff for the 1-based `attempt`: base, 2*base, 4*base, ...
    /// capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let exponent = attempt.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = Duration::from_millis(base.saturating_mul(factor));
        delay.min(self.max_delay)
    }

    /// Decide after a failure, given how many retries were already spent.
    pub fn decide(&self, error: &ClassifiedError, retry_count: u32) -> Decision {
        if !error.recoverable || retry_count >= self.max_retries {
            return Decision::Terminal;
        }
        let attempt = retry_count + 1;
        Decision::Retry {
            attempt,
            delay: self.backoff_delay(attempt),
        }
    }
}

/// Human-readable delay for reconnect notices ("500ms", "2s", "1.5s", "1m").
pub fn describe_delay(delay: Duration) -> String {
    let ms = delay.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}
