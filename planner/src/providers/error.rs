//! Errors raised by the external data sources.

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// The service could not be reached or answered with an error status.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete within the configured timeout.
    #[error("provider timed out: {0}")]
    Timeout(String),

    /// The ephemeris service reports the object as unobservable.
    #[error("object not observable: {0}")]
    NotObservable(String),

    /// The response arrived but could not be understood.
    #[error("malformed provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Transient failures get one more attempt; the rest are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_) | ProviderError::Timeout(_))
    }
}

#[cfg(feature = "mpc-client")]
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}
