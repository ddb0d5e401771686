use std::time::Duration;

use crate::error::{Result, SdkError};

/// Shared configuration for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service endpoint URL, e.g. `https://storage.us-east-1.example.com`.
    pub endpoint: String,

    /// Signing region.
    pub region: String,

    /// Overall HTTP request timeout.
    pub timeout: Duration,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Total attempts per command (first try plus retries).
    pub retry_max_attempts: u32,

    /// Backoff delay before the first retry; doubles per retry.
    pub retry_base_delay: Duration,

    /// Upper bound on any single backoff delay.
    pub retry_max_delay: Duration,

    /// Overrides the catalog's waiter poll interval (seconds) when set.
    pub waiter_interval: Option<u64>,

    /// Overrides the catalog's waiter attempt budget when set.
    pub waiter_max_attempts: Option<u32>,

    /// Parallelism bound for batched execution.
    pub max_concurrent_requests: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(20),
            waiter_interval: None,
            waiter_max_attempts: None,
            max_concurrent_requests: 8,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration pointing at `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit.max(1);
        self
    }

    /// Applies one string-keyed option by its recognized name.
    ///
    /// Recognized names: `endpoint`, `region`, `retry.max_attempts`,
    /// `retry.base_delay` (seconds, fractional allowed), `waiter.interval`
    /// (seconds), `waiter.max_attempts`. Unrecognized names are ignored;
    /// malformed values for recognized names fail with `Config`.
    pub fn apply_option(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "endpoint" => self.endpoint = value.to_string(),
            "region" => self.region = value.to_string(),
            "retry.max_attempts" => {
                self.retry_max_attempts = parse_option(name, value)?;
            }
            "retry.base_delay" => {
                let secs: f64 = parse_option(name, value)?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(SdkError::Config(format!(
                        "option {} must be a non-negative number of seconds",
                        name
                    )));
                }
                self.retry_base_delay = Duration::from_secs_f64(secs);
            }
            "waiter.interval" => {
                self.waiter_interval = Some(parse_option(name, value)?);
            }
            "waiter.max_attempts" => {
                self.waiter_max_attempts = Some(parse_option(name, value)?);
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_option<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| SdkError::Config(format!("option {} has malformed value {:?}", name, value)))
}
