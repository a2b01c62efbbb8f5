use std::fmt;
use std::time::Duration;

use crate::{GisError, Result};

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("featureserver-http/", env!("CARGO_PKG_VERSION"));

/// HTTP timeouts, one per phase of an exchange.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Longest stall while waiting for response bytes, reset on each read.
    pub read: Duration,
    /// Validated only: `reqwest` has no write timeout, and queries are
    /// bodyless GETs.
    pub write: Duration,
    /// Validated only: `reqwest` has no pool-acquire timeout. Waiting for
    /// a slot is bounded by the admission controller instead.
    pub pool_acquire: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(60),
            write: Duration::from_secs(10),
            pool_acquire: Duration::from_secs(30),
        }
    }
}

/// Connection pool limits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectionLimits {
    pub max_connections: usize,
    pub max_keep_alive: usize,
    pub keep_alive_expiry: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_keep_alive: 5,
            keep_alive_expiry: Duration::from_secs(30),
        }
    }
}

/// Retry behavior with exponential backoff and jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound, in seconds, of the uniform jitter added to each delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.5,
        }
    }
}

/// Admission ceilings shared by every request of a session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateLimit {
    pub requests_per_minute: u32,
    pub concurrent_requests: usize,
    /// Floor on the spacing between two dispatched requests.
    pub min_request_interval: Duration,
}

impl RateLimit {
    /// Derives the dispatch interval from a per-minute budget.
    ///
    /// A zero budget yields a zero interval; `build()` rejects it.
    pub fn per_minute(requests_per_minute: u32, concurrent_requests: usize) -> Self {
        let min_request_interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / requests_per_minute
        };
        Self {
            requests_per_minute,
            concurrent_requests,
            min_request_interval,
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
            concurrent_requests: 2,
            min_request_interval: Duration::from_millis(500),
        }
    }
}

/// Page sizing and the optional cap on records per fetch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pagination {
    pub page_size: u64,
    pub max_total_records: Option<u64>,
}

impl Pagination {
    /// Returns a copy with the record cap replaced when `max_total_records` is set.
    pub fn with_max_total_records(mut self, max_total_records: Option<u64>) -> Self {
        if max_total_records.is_some() {
            self.max_total_records = max_total_records;
        }
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_range("pagination.page_size", self.page_size, 1, 5_000)?;
        if self.max_total_records == Some(0) {
            return Err(GisError::InvalidConfig(
                "pagination.max_total_records must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_size: 1_000,
            max_total_records: None,
        }
    }
}

/// Validated, immutable client configuration.
///
/// Built through [`ClientConfig::builder`]; out-of-bounds values are
/// rejected by [`ClientConfigBuilder::build`].
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    token: Option<String>,
    user_agent: String,
    timeouts: Timeouts,
    limits: ConnectionLimits,
    retry: RetryPolicy,
    rate_limit: RateLimit,
    pagination: Pagination,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("timeouts", &self.timeouts)
            .field("limits", &self.limits)
            .field("retry", &self.retry)
            .field("rate_limit", &self.rate_limit)
            .field("pagination", &self.pagination)
            .finish()
    }
}

impl ClientConfig {
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            base_url: base_url.into(),
            token: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeouts: Timeouts::default(),
            limits: ConnectionLimits::default(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimit::default(),
            pagination: Pagination::default(),
        }
    }

    /// Builds a configuration from environment variables.
    ///
    /// Reads:
    /// - `GIS_BASE_URL`: REST services root (required)
    /// - `GIS_TOKEN`: access token appended as the `token` parameter
    /// - `GIS_USER_AGENT`
    /// - `GIS_PAGE_SIZE`, `GIS_MAX_RETRIES`, `GIS_CONCURRENT_REQUESTS`,
    ///   `GIS_REQUESTS_PER_MINUTE`
    ///
    /// Unset optional variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`ClientConfig::from_env`] with variables resolved through `lookup`.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = env_string(&lookup, "GIS_BASE_URL").ok_or_else(|| {
            GisError::InvalidConfig("missing GIS_BASE_URL environment variable".to_owned())
        })?;
        let mut builder = Self::builder(base_url);

        if let Some(token) = env_string(&lookup, "GIS_TOKEN") {
            builder = builder.token(token);
        }
        if let Some(user_agent) = env_string(&lookup, "GIS_USER_AGENT") {
            builder = builder.user_agent(user_agent);
        }
        if let Some(page_size) = env_number::<u64, _>(&lookup, "GIS_PAGE_SIZE")? {
            builder.pagination.page_size = page_size;
        }
        if let Some(max_retries) = env_number::<u32, _>(&lookup, "GIS_MAX_RETRIES")? {
            builder.retry.max_retries = max_retries;
        }
        let concurrent = env_number::<usize, _>(&lookup, "GIS_CONCURRENT_REQUESTS")?
            .unwrap_or(builder.rate_limit.concurrent_requests);
        builder.rate_limit.concurrent_requests = concurrent;
        if let Some(per_minute) = env_number::<u32, _>(&lookup, "GIS_REQUESTS_PER_MINUTE")? {
            builder.rate_limit = RateLimit::per_minute(per_minute, concurrent);
        }

        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn limits(&self) -> &ConnectionLimits {
        &self.limits
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn rate_limit(&self) -> &RateLimit {
        &self.rate_limit
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }
}

/// Builder for [`ClientConfig`].
#[derive(Clone, Debug)]
pub struct ClientConfigBuilder {
    base_url: String,
    token: Option<String>,
    user_agent: String,
    timeouts: Timeouts,
    limits: ConnectionLimits,
    retry: RetryPolicy,
    rate_limit: RateLimit,
    pagination: Pagination,
}

impl ClientConfigBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn limits(mut self, limits: ConnectionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Validates every bound and produces the immutable configuration.
    pub fn build(self) -> Result<ClientConfig> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(GisError::InvalidConfig("base_url must not be empty".to_owned()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(GisError::InvalidConfig(
                "user_agent must not be empty".to_owned(),
            ));
        }
        let token = self
            .token
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty());

        let t = &self.timeouts;
        check_duration("timeouts.connect", t.connect, false, 60.0)?;
        check_duration("timeouts.read", t.read, false, 300.0)?;
        check_duration("timeouts.write", t.write, false, 60.0)?;
        check_duration("timeouts.pool_acquire", t.pool_acquire, false, 60.0)?;

        let l = &self.limits;
        check_range("limits.max_connections", l.max_connections, 1, 100)?;
        check_range("limits.max_keep_alive", l.max_keep_alive, 1, 50)?;
        check_duration("limits.keep_alive_expiry", l.keep_alive_expiry, false, 300.0)?;

        let r = &self.retry;
        check_range("retry.max_retries", r.max_retries, 0, 10)?;
        check_duration("retry.base_delay", r.base_delay, false, 10.0)?;
        check_duration("retry.max_delay", r.max_delay, false, 300.0)?;
        if !(0.0..=1.0).contains(&r.jitter_factor) {
            return Err(GisError::InvalidConfig(format!(
                "retry.jitter_factor must be within [0, 1], got {}",
                r.jitter_factor
            )));
        }

        let rl = &self.rate_limit;
        check_range("rate_limit.requests_per_minute", rl.requests_per_minute, 1, 1_000)?;
        check_range("rate_limit.concurrent_requests", rl.concurrent_requests, 1, 10)?;
        check_duration(
            "rate_limit.min_request_interval",
            rl.min_request_interval,
            true,
            10.0,
        )?;

        self.pagination.validate()?;

        Ok(ClientConfig {
            base_url,
            token,
            user_agent: self.user_agent,
            timeouts: self.timeouts,
            limits: self.limits,
            retry: self.retry,
            rate_limit: self.rate_limit,
            pagination: self.pagination,
        })
    }
}

fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + fmt::Display,
{
    if value < min || value > max {
        return Err(GisError::InvalidConfig(format!(
            "{field} must be within [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}

fn check_duration(field: &str, value: Duration, allow_zero: bool, max_secs: f64) -> Result<()> {
    if !allow_zero && value.is_zero() {
        return Err(GisError::InvalidConfig(format!(
            "{field} must be greater than zero"
        )));
    }
    if value.as_secs_f64() > max_secs {
        return Err(GisError::InvalidConfig(format!(
            "{field} must be at most {max_secs}s, got {}s",
            value.as_secs_f64()
        )));
    }
    Ok(())
}

fn env_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn env_number<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match env_string(lookup, name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            GisError::InvalidConfig(format!("{name} must be a number, got '{raw}'"))
        }),
    }
}
