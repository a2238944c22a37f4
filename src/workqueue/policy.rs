use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::BucketRateLimiter;
use crate::Error;
use crate::ItemExponentialFailureRateLimiter;
use crate::MaxOfRateLimiter;
use crate::RateLimiter;
use crate::Result;
use crate::WorkItem;

/// Configuration for the composed controller retry strategy: per-item
/// exponential backoff bounded by an overall token bucket.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct RetryPolicy {
    /// Backoff base for the first failure (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum per-item backoff (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Overall sustained requeue rate (items per second)
    #[serde(default = "default_qps")]
    pub qps: f64,

    /// Overall burst size
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

impl RetryPolicy {
    /// Validates retry policy parameters.
    /// # Errors
    /// Returns `Error::InvalidPolicy` when:
    /// - Base delay is zero or not below the maximum delay
    /// - The token bucket rate or burst is zero
    pub fn validate(
        &self,
        policy_name: &str,
    ) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidPolicy(format!(
                "{policy_name}: base_delay_ms cannot be 0"
            )));
        }
        if self.base_delay_ms >= self.max_delay_ms {
            return Err(Error::InvalidPolicy(format!(
                "{}: base_delay_ms({}) must be less than max_delay_ms({})",
                policy_name, self.base_delay_ms, self.max_delay_ms
            )));
        }
        if !(self.qps > 0.0) {
            return Err(Error::InvalidPolicy(format!(
                "{}: qps({}) must be positive",
                policy_name, self.qps
            )));
        }
        if self.burst == 0 {
            return Err(Error::InvalidPolicy(format!(
                "{policy_name}: burst cannot be 0"
            )));
        }
        Ok(())
    }

    /// Build the composed limiter this policy describes.
    pub fn build<I: WorkItem>(&self) -> Arc<dyn RateLimiter<I>> {
        Arc::new(MaxOfRateLimiter::new(vec![
            Arc::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )),
            Arc::new(BucketRateLimiter::new(self.qps, self.burst)),
        ]))
    }
}

fn default_base_delay_ms() -> u64 {
    5
}
fn default_max_delay_ms() -> u64 {
    1_000_000
}
fn default_qps() -> f64 {
    10.0
}
fn default_burst() -> u32 {
    100
}
