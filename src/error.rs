//! Error types for couchdb-check
//!
//! This module defines the error taxonomy surfaced by a check run.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while running the CouchDB check
#[derive(Error, Debug)]
pub enum CheckError {
    /// HTTP 클라이언트 초기화 실패
    #[error("Failed to initialize HTTP client: {0}")]
    ClientInit(#[source] reqwest::Error),

    /// 요청 타임아웃
    #[error("Request to {url} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { url: String, timeout: Duration },

    /// Non-2xx HTTP status
    #[error("HTTP error status {code} for {url}")]
    HttpStatus { url: String, code: u16 },

    /// Any other transport failure (connection refused, TLS, body read...)
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Instance has no `server` field
    #[error("A server must be specified")]
    MissingServer,

    /// CouchDB 2.x instance has no node `name`
    #[error("At least one name is required")]
    MissingName,

    /// Stats endpoint answered with an empty document
    #[error("No stats could be retrieved from {url}")]
    NoStats { url: String },

    /// Root endpoint reported a version we cannot extract
    #[error("Unknown version {0}")]
    UnsupportedVersion(String),

    /// Server URL could not be parsed or joined
    #[error("Invalid URL '{base}' + '{path}': {reason}")]
    InvalidUrl {
        base: String,
        path: String,
        reason: String,
    },

    /// Body was not JSON or lacked a required field
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
}

impl CheckError {
    /// HTTP 상태 코드 추출
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CheckError::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for 401/403, the only recoverable per-database failure
    pub fn is_access_denied(&self) -> bool {
        matches!(self.http_status(), Some(401) | Some(403))
    }

    /// True for the failures raised by the fetcher itself
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            CheckError::Timeout { .. } | CheckError::HttpStatus { .. } | CheckError::Transport { .. }
        )
    }

    /// Classify a reqwest failure for `url`
    ///
    /// reqwest does not expose the configured timeout, so the caller passes it in.
    pub fn from_reqwest(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CheckError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else if let Some(status) = err.status() {
            CheckError::HttpStatus {
                url: url.to_string(),
                code: status.as_u16(),
            }
        } else {
            CheckError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Result type alias for check errors
pub type CheckResult<T> = Result<T, CheckError>;
