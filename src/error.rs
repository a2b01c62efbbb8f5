use std::fmt;
use std::time::Duration;

/// Phase of an HTTP exchange that exceeded its timeout.
///
/// `GisClient` only reports `Connect` and `Read`; `Write` and
/// `PoolAcquire` have no timer on the underlying `reqwest` client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeoutPhase {
    Connect,
    Read,
    Write,
    PoolAcquire,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
            Self::PoolAcquire => "pool acquire",
        };
        f.write_str(name)
    }
}

/// Error type returned by this crate.
///
/// The request-level variants form a closed taxonomy; callers decide
/// whether to alert, pause or abort by matching on the variant.
#[derive(Debug, thiserror::Error)]
pub enum GisError {
    /// HTTP 429 from the service.
    #[error("rate limit exceeded for {url}{}", describe_retry_after(.retry_after))]
    RateLimited {
        url: String,
        /// Server hint from the `Retry-After` header, in seconds.
        retry_after: Option<f64>,
    },
    /// HTTP 401/403, or an in-body token error.
    #[error("authentication failed for {url}: {status}")]
    AuthFailed { url: String, status: u16 },
    /// HTTP 404.
    #[error("resource not found: {url}")]
    NotFound { url: String },
    /// HTTP 5xx.
    #[error("server error {status} for {url}")]
    ServerFault { url: String, status: u16 },
    /// Other 4xx statuses and payloads that could not be decoded.
    #[error("invalid response from {url}{}: {body_excerpt}", describe_status(.status))]
    InvalidResponse {
        url: String,
        status: Option<u16>,
        /// At most the first 500 characters of the body.
        body_excerpt: String,
    },
    /// Transport-level timeout.
    #[error("request to {url} timed out ({phase})")]
    TimedOut { url: String, phase: TimeoutPhase },
    /// Any other transport failure (DNS, refused connection, reset).
    #[error("failed to reach {url}: {message}")]
    ConnectionFailed { url: String, message: String },
    /// Retries exhausted; wraps the last concrete failure.
    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last_error: Box<GisError>,
    },
    /// A request was attempted outside an active session.
    #[error("session not started; call start_session() first")]
    SessionNotStarted,
    /// A configuration value is out of bounds.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Bounding box coordinates are out of range or misordered.
    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),
}

impl GisError {
    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::AuthFailed { status, .. } | Self::ServerFault { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::InvalidResponse { status, .. } => *status,
            Self::MaxRetriesExceeded { last_error, .. } => last_error.status(),
            _ => None,
        }
    }

    /// Server-supplied delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after: Some(seconds),
                ..
            } => Duration::try_from_secs_f64(*seconds).ok(),
            _ => None,
        }
    }
}

fn describe_retry_after(retry_after: &Option<f64>) -> String {
    retry_after
        .map(|seconds| format!(" (retry after {seconds}s)"))
        .unwrap_or_default()
}

fn describe_status(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" (HTTP {status})"))
        .unwrap_or_default()
}
