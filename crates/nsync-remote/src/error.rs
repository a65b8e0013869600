//! Error types for the remote graph client

/// Remote service errors
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Credential rejected by the remote service
    #[error("remote service rejected the credentials")]
    Unauthorized,

    /// Any other non-success response or transport failure
    #[error("remote service unavailable (status {status:?}): {message}")]
    Unavailable {
        status: Option<u16>,
        message: String,
    },

    /// Response body did not match the expected envelope
    #[error("invalid remote response: {0}")]
    Decode(String),

    /// Client could not be constructed
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// Create unavailable error
    pub fn unavailable(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            status,
            message: message.into(),
        }
    }

    /// Whether the caller must re-authenticate
    #[inline]
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        if e.status().map(|s| s.as_u16()) == Some(401) {
            return Self::Unauthorized;
        }
        Self::Unavailable {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}
