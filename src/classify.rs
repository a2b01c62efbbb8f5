use reqwest::{header, header::HeaderMap, StatusCode};

use crate::{error::TimeoutPhase, GisError};

/// Longest body excerpt kept on [`GisError::InvalidResponse`].
pub const MAX_BODY_EXCERPT_CHARS: usize = 500;

// Worst case four UTF-8 bytes per character.
const MAX_BODY_EXCERPT_BYTES: usize = MAX_BODY_EXCERPT_CHARS * 4;

impl GisError {
    /// Whether another attempt may succeed.
    ///
    /// Throttling and connectivity failures are always retryable; server
    /// faults only for 500, 502, 503 and 504.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::TimedOut { .. } | Self::ConnectionFailed { .. } => {
                true
            }
            Self::ServerFault { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

/// Maps a non-success status to the error taxonomy.
///
/// `body_excerpt` is only consulted for statuses that become
/// [`GisError::InvalidResponse`].
pub(crate) fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body_excerpt: &str,
    url: &str,
) -> GisError {
    let url = url.to_owned();
    match status.as_u16() {
        429 => GisError::RateLimited {
            url,
            retry_after: parse_retry_after(headers),
        },
        code @ (401 | 403) => GisError::AuthFailed { url, status: code },
        404 => GisError::NotFound { url },
        code if code >= 500 => GisError::ServerFault { url, status: code },
        code => GisError::InvalidResponse {
            url,
            status: Some(code),
            body_excerpt: excerpt(body_excerpt),
        },
    }
}

/// Consumes a non-success response and classifies it.
///
/// The body is only read, and only up to the excerpt limit, when the
/// status needs it.
pub(crate) async fn classify_response(response: reqwest::Response, url: &str) -> GisError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = if needs_body_excerpt(status) {
        read_excerpt(response).await
    } else {
        String::new()
    };
    classify_status(status, &headers, &body, url)
}

/// Maps a `reqwest` failure to the error taxonomy.
///
/// Only connect and per-read timeouts are armed on the `reqwest` client,
/// so a timeout that is not a connect timeout is a read timeout.
pub(crate) fn classify_transport(err: &reqwest::Error, url: &str) -> GisError {
    let url = url.to_owned();
    if err.is_timeout() {
        let phase = if err.is_connect() {
            TimeoutPhase::Connect
        } else {
            TimeoutPhase::Read
        };
        return GisError::TimedOut { url, phase };
    }
    GisError::ConnectionFailed {
        url,
        message: err.to_string(),
    }
}

/// Classifies an in-body service error (`{"error": {"code": ..}}`) as if
/// `code` were the HTTP status.
///
/// Token codes 498 (invalid) and 499 (required) are authentication failures.
pub(crate) fn classify_service_error(code: i64, message: &str, url: &str) -> GisError {
    match code {
        498 | 499 => GisError::AuthFailed {
            url: url.to_owned(),
            status: code as u16,
        },
        _ => match u16::try_from(code).ok().and_then(|c| StatusCode::from_u16(c).ok()) {
            Some(status) if !status.is_success() => {
                classify_status(status, &HeaderMap::new(), message, url)
            }
            _ => GisError::InvalidResponse {
                url: url.to_owned(),
                status: None,
                body_excerpt: excerpt(message),
            },
        },
    }
}

/// Parses `Retry-After` as (fractional) seconds.
///
/// Missing, negative or unparseable values yield no hint.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<f64> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
}

pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(MAX_BODY_EXCERPT_CHARS).collect()
}

fn needs_body_excerpt(status: StatusCode) -> bool {
    status.is_client_error()
        && !matches!(status.as_u16(), 401 | 403 | 404 | 429)
}

async fn read_excerpt(mut response: reqwest::Response) -> String {
    let mut bytes = Vec::new();
    while bytes.len() < MAX_BODY_EXCERPT_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    bytes.truncate(MAX_BODY_EXCERPT_BYTES);
    excerpt(&String::from_utf8_lossy(&bytes))
}
