use thiserror::Error;

/// Error type for JWT operations.
///
/// Verification failures stay distinguishable for diagnostics; callers that
/// answer requests should collapse them with [`JwtError::is_unauthorized`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("Signing secret must not be empty")]
    EmptySecret,

    #[error("Failed to encode token: {0}")]
    EncodingFailed(String),

    #[error("Token is malformed: {0}")]
    MalformedToken(String),

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token is expired")]
    Expired,
}

impl JwtError {
    /// Whether the error came from verifying a presented token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            JwtError::MalformedToken(_) | JwtError::BadSignature | JwtError::Expired
        )
    }
}
