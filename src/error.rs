use thiserror::Error;

/// Everything that can go wrong while asking the completion service for an answer.
///
/// The lifecycle treats every variant the same way (a failed exchange), the
/// distinction only matters for the text shown to the user and for logs.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Unexpected(String),
}

impl ServiceError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed(detail.into())
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
