//! Error types for the Hyperliquid integration.

use thiserror::Error;

/// Errors that can occur when talking to the venue.
#[derive(Debug, Error)]
pub enum HyperliquidError {
    /// Non-2xx response from the info endpoint.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// Network-level failure (connect, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the client timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Response body could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Websocket stream failure.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl HyperliquidError {
    /// Creates an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the call may succeed on retry: network faults,
    /// timeouts, 5xx, and 429 responses. 4xx semantic failures and decode
    /// errors are not retryable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::WebSocket(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for HyperliquidError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HyperliquidError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type alias for venue operations.
pub type Result<T> = std::result::Result<T, HyperliquidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_status() {
        let err = HyperliquidError::api(400, "bad request");
        assert!(matches!(err, HyperliquidError::Api { status: 400, .. }));
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("bad request"));
    }

    #[test]
    fn network_and_timeout_are_transient() {
        assert!(HyperliquidError::Network("connection refused".to_string()).is_transient());
        assert!(HyperliquidError::Timeout("deadline elapsed".to_string()).is_transient());
    }

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        assert!(HyperliquidError::api(500, "internal").is_transient());
        assert!(HyperliquidError::api(503, "unavailable").is_transient());
        assert!(HyperliquidError::api(429, "rate limited").is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        assert!(!HyperliquidError::api(400, "bad request").is_transient());
        assert!(!HyperliquidError::api(422, "unprocessable").is_transient());
    }

    #[test]
    fn decode_errors_are_not_transient() {
        assert!(!HyperliquidError::Decode("unexpected shape".to_string()).is_transient());
    }
}
