//! Upstream client configuration.

use deskgate_core::config::HttpSettings;
use rand::Rng;
use std::time::Duration;

/// Configuration for [`UpstreamClient`](super::UpstreamClient).
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    /// Versioned API root.
    pub base_url: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub retry_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Relative jitter in `[0, 1)`.
    pub jitter: f64,
    /// User agent string.
    pub user_agent: String,
}

fn default_user_agent() -> String {
    format!("deskgate/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self::from_settings(&HttpSettings::default())
    }
}

impl UpstreamConfig {
    /// Creates a new builder for `UpstreamConfig`.
    #[must_use]
    pub fn builder() -> UpstreamConfigBuilder {
        UpstreamConfigBuilder::default()
    }

    /// Builds the configuration from the `http` settings section.
    #[must_use]
    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            connect_timeout_ms: settings.connect_timeout_ms,
            timeout_ms: settings.timeout_ms,
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
            max_retry_delay_ms: settings.max_retry_delay_ms,
            jitter: settings.jitter,
            user_agent: default_user_agent(),
        }
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the backoff ceiling as a Duration.
    #[must_use]
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Calculates the retry delay for a given attempt using exponential backoff.
    #[must_use]
    pub fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let delay = self.retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_delay_ms))
    }

    /// Applies random jitter of up to `±jitter` to the backoff delay.
    #[must_use]
    pub fn jittered_retry_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.calculate_retry_delay(attempt).as_secs_f64();
        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(base);
        }
        let offset = base * self.jitter * rng.gen_range(-1.0..=1.0);
        Duration::from_secs_f64((base + offset).max(0.0))
    }

    /// Returns whether a retry should be attempted.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Builder for `UpstreamConfig`.
#[derive(Debug, Default)]
pub struct UpstreamConfigBuilder {
    base_url: Option<String>,
    connect_timeout_ms: Option<u64>,
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    max_retry_delay_ms: Option<u64>,
    jitter: Option<f64>,
    user_agent: Option<String>,
}

impl UpstreamConfigBuilder {
    /// Sets the base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Sets the maximum retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = Some(ms);
        self
    }

    /// Sets the retry delay ceiling.
    #[must_use]
    pub fn max_retry_delay_ms(mut self, ms: u64) -> Self {
        self.max_retry_delay_ms = Some(ms);
        self
    }

    /// Sets the relative jitter.
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> UpstreamConfig {
        let defaults = UpstreamConfig::default();
        UpstreamConfig {
            base_url: self.base_url.unwrap_or(defaults.base_url),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            max_retry_delay_ms: self.max_retry_delay_ms.unwrap_or(defaults.max_retry_delay_ms),
            jitter: self.jitter.unwrap_or(defaults.jitter),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
        }
    }
}
