//! Resilience configuration for the API client
//!
//! Bundles the request scheduler settings (spacing, concurrency, reservoir)
//! and the retry policy settings with defaults tuned for a Directus
//! instance whose rate limits are unknown.

use std::time::Duration;

/// Global resilience configuration for API operations
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
}

/// Request scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between consecutive request dispatches
    pub min_spacing: Duration,
    /// Maximum simultaneous in-flight requests
    pub max_concurrent: usize,
    /// Requests allowed per reservoir window
    pub reservoir: u32,
    /// How often the reservoir refills back to capacity
    pub refill_interval: Duration,
    /// Whether scheduling is enabled
    pub enabled: bool,
}

/// Retry policy configuration (fixed delay, not exponential)
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_millis(100),
            max_concurrent: 10,
            reservoir: 60,
            refill_interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Disable all resilience features (for tests)
    pub fn disabled() -> Self {
        Self {
            scheduler: SchedulerConfig {
                min_spacing: Duration::from_millis(0),
                max_concurrent: usize::MAX,
                reservoir: u32::MAX,
                refill_interval: Duration::from_secs(60),
                enabled: false,
            },
            retry: RetryConfig {
                max_attempts: 1,
                delay: Duration::from_millis(0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();

        assert_eq!(config.scheduler.min_spacing, Duration::from_millis(100));
        assert_eq!(config.scheduler.max_concurrent, 10);
        assert_eq!(config.scheduler.reservoir, 60);
        assert_eq!(config.scheduler.refill_interval, Duration::from_secs(60));
        assert!(config.scheduler.enabled);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay, Duration::from_secs(3));
    }

    #[test]
    fn test_disabled_config() {
        let config = ResilienceConfig::disabled();

        assert!(!config.scheduler.enabled);
        assert_eq!(config.retry.max_attempts, 1);
    }
}
