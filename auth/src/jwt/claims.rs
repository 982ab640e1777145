use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Identity claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: String,

    /// Login email of the subject
    pub email: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create claims for an authenticated user.
    ///
    /// # Arguments
    /// * `user_id` - Unique user identifier
    /// * `email` - Email the user logged in with
    /// * `ttl` - Lifetime of the token from now
    ///
    /// # Returns
    /// Claims with sub, email, iat and exp set
    pub fn for_user(user_id: impl ToString, email: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id.to_string(),
            email: email.into(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// Check if token is expired.
    ///
    /// A token is valid strictly before its expiration instant.
    pub fn is_expired(&self, current_timestamp: i64) -> bool {
        self.exp <= current_timestamp
    }
}
