use std::time::Duration;

use crate::{
    reconciler::StoreRetryPolicy,
    retry::BackoffPolicy,
    SchedulerError, SchedulerResult,
};

/// Prefix for environment overrides, e.g. `SCHEDULER__RATE_LIMIT__MAX=100`
pub const ENV_PREFIX: &str = "SCHEDULER__";

/// Global action ceiling: at most `max` actions per rolling `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max: 50,
            window: Duration::from_secs(3600),
        }
    }
}

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Global rate ceiling shared by all workers
    pub rate_limit: RateLimit,
    /// Job-level retry backoff
    pub backoff: BackoffPolicy,
    /// Attempts before a job is marked failed
    pub max_attempts: u32,
    /// How far in the past a requested due time may be before it is rejected
    pub clock_skew_tolerance: Duration,
    /// Upper bound on how late a due job is noticed
    pub poll_interval: Duration,
    /// Retry policy for store writes, separate from job retries
    pub store_retry: StoreRetryPolicy,
    /// How long shutdown waits for in-flight workers
    pub drain_timeout: Duration,
    /// Optional ceiling on a single delivery action
    pub action_timeout: Option<Duration>,
    /// Sender address used by the built-in transports
    pub sender: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_limit: RateLimit::default(),
            backoff: BackoffPolicy::default(),
            max_attempts: 3,
            clock_skew_tolerance: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            store_retry: StoreRetryPolicy::default(),
            drain_timeout: Duration::from_secs(30),
            action_timeout: None,
            sender: "Scheduler <scheduler@localhost>".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_rate_limit(mut self, max: u32, window: Duration) -> Self {
        self.rate_limit = RateLimit::new(max, window);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the base backoff, keeping the rest of the policy
    pub fn with_base_backoff(mut self, base: Duration) -> Self {
        self.backoff.base = base;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_store_retry(mut self, policy: StoreRetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Defaults overlaid with process environment variables
    pub fn from_env() -> SchedulerResult<Self> {
        Self::default().apply_vars(std::env::vars())
    }

    /// Overlay configuration values from `(key, value)` pairs.
    ///
    /// Recognises `WORKER_CONCURRENCY` and `SCHEDULER__*` keys, where `__`
    /// separates nesting levels (`SCHEDULER__BACKOFF__BASE_MS` → `backoff.base_ms`).
    /// Unknown keys are ignored.
    pub fn apply_vars<I>(mut self, vars: I) -> SchedulerResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let normalized = if key == "WORKER_CONCURRENCY" {
                "concurrency".to_string()
            } else if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                stripped.to_lowercase().replace("__", ".")
            } else {
                continue;
            };

            match normalized.as_str() {
                "concurrency" => self.concurrency = parse(&key, &value)?,
                "rate_limit.max" => self.rate_limit.max = parse(&key, &value)?,
                "rate_limit.window_secs" => {
                    self.rate_limit.window = Duration::from_secs(parse(&key, &value)?)
                }
                "backoff.base_ms" => self.backoff.base = Duration::from_millis(parse(&key, &value)?),
                "backoff.max_ms" => {
                    self.backoff.max = Some(Duration::from_millis(parse(&key, &value)?))
                }
                "backoff.jitter" => self.backoff.jitter = parse(&key, &value)?,
                "max_attempts" => self.max_attempts = parse(&key, &value)?,
                "clock_skew_secs" => {
                    self.clock_skew_tolerance = Duration::from_secs(parse(&key, &value)?)
                }
                "poll_interval_ms" => {
                    self.poll_interval = Duration::from_millis(parse(&key, &value)?)
                }
                "drain_timeout_secs" => {
                    self.drain_timeout = Duration::from_secs(parse(&key, &value)?)
                }
                "action_timeout_ms" => {
                    self.action_timeout = Some(Duration::from_millis(parse(&key, &value)?))
                }
                "sender" => self.sender = value,
                _ => {}
            }
        }
        Ok(self)
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.concurrency == 0 {
            return Err(SchedulerError::InvalidConfig("concurrency must be at least 1".to_string()));
        }
        if self.rate_limit.max == 0 || self.rate_limit.window.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "rate limit needs a positive max and window".to_string(),
            ));
        }
        if self.backoff.base.is_zero() {
            return Err(SchedulerError::InvalidConfig("backoff base must be positive".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(SchedulerError::InvalidConfig("max_attempts must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig("poll_interval must be positive".to_string()));
        }
        if self.store_retry.max_attempts == 0 {
            return Err(SchedulerError::InvalidConfig(
                "store retry needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> SchedulerResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SchedulerError::InvalidConfig(format!("{key}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.rate_limit, RateLimit::new(50, Duration::from_secs(3600)));
        assert_eq!(config.backoff.base, Duration::from_secs(1));
        assert_eq!(config.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = SchedulerConfig::default()
            .apply_vars(vars(&[
                ("WORKER_CONCURRENCY", "8"),
                ("SCHEDULER__RATE_LIMIT__MAX", "10"),
                ("SCHEDULER__RATE_LIMIT__WINDOW_SECS", "60"),
                ("SCHEDULER__BACKOFF__BASE_MS", "250"),
                ("SCHEDULER__MAX_ATTEMPTS", "5"),
                ("HOME", "/root"),
            ]))
            .unwrap();

        assert_eq!(config.concurrency, 8);
        assert_eq!(config.rate_limit, RateLimit::new(10, Duration::from_secs(60)));
        assert_eq!(config.backoff.base, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn test_unparseable_override_is_rejected() {
        let result = SchedulerConfig::default().apply_vars(vars(&[("WORKER_CONCURRENCY", "many")]));
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let config = SchedulerConfig::default().with_concurrency(0);
        assert!(config.validate().is_err());
    }
}
