use thiserror::Error;

/// Errors from the remote backend or speech provider
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection failed before a response arrived
    #[error("network connection failed: {0}")]
    Network(String),

    /// No response within the allotted time
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// 429 from the server
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// 5xx from the server
    #[error("server processing error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Other 4xx from the server
    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },

    /// The response body did not match the expected shape
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => ApiError::RateLimited(message),
            400..=499 => ApiError::Client { status, message },
            _ => ApiError::Server { status, message },
        }
    }

    /// Whether the caller may retry (with its own backoff)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_)
                | ApiError::Timeout(_)
                | ApiError::RateLimited(_)
                | ApiError::Server { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited(_) => Some(429),
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Map a transport error; `timeout_secs` is what the request was allowed
pub(crate) fn from_reqwest(e: reqwest::Error, timeout_secs: u64) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(timeout_secs)
    } else if e.is_decode() {
        ApiError::Parse(e.to_string())
    } else if e.is_builder() {
        ApiError::InvalidRequest(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}
