//! REST client error types.

/// Errors from the debugging backend's REST API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be sent or the response could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("{message} ({status})")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Rejected before any request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A success response did not have the expected shape.
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Result alias for REST operations.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        let err = ApiError::Status {
            status: 404,
            message: "class not found".into(),
        };
        assert_eq!(err.to_string(), "class not found (404)");
        assert_eq!(err.error_kind(), "status");
    }

    #[test]
    fn invalid_input_display() {
        let err = ApiError::InvalidInput("line must be positive".into());
        assert_eq!(err.to_string(), "invalid input: line must be positive");
    }
}
