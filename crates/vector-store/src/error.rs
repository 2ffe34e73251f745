use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by service: {0}")]
    RateLimited(String),

    #[error("service error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("embedding count mismatch: got {got}, expected {expected}")]
    CountMismatch { got: usize, expected: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VectorStoreError {
    /// Transient faults the batch pipeline may retry: rate limits, server
    /// errors, and transport failures. Client errors (4xx) are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Http(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            _ => false,
        }
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(body)
        } else {
            Self::Api {
                status: status.as_u16(),
                body,
            }
        }
    }
}
