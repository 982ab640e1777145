use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use thiserror::Error;

use super::handlers::ApiError;
use crate::domain::user::models::UserId;
use crate::domain::user::ports::AuthServicePort;
use crate::inbound::http::router::AppState;

const BEARER_SCHEME: &str = "Bearer";

/// Identity of the caller, attached to the request once its token verified.
///
/// Handlers take it as an extractor; it only exists behind [`authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub email: String,
}

/// Why a request was turned away. Logged, never sent to the caller.
#[derive(Debug, Error)]
enum GateRejection {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("Authorization header is not valid ASCII")]
    InvalidHeader,

    #[error("Authorization header is not `Bearer <token>`")]
    InvalidScheme,

    #[error("token rejected: {0}")]
    Token(#[from] auth::JwtError),

    #[error("token subject is not a user id: {0}")]
    InvalidSubject(String),
}

/// Middleware that validates bearer tokens and adds the caller's identity
/// to request extensions. The downstream handler only runs on success.
pub async fn authenticate<S: AuthServicePort>(
    State(state): State<AppState<S>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = verify_request(&state, req.headers()).map_err(|rejection| {
        tracing::warn!(reason = %rejection, "Request rejected by auth gate");
        ApiError::unauthorized()
    })?;

    tracing::debug!(user_id = %user.user_id, "Request authenticated");
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

fn verify_request<S: AuthServicePort>(
    state: &AppState<S>,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, GateRejection> {
    let token = extract_bearer_token(headers)?;
    let claims = state.authenticator.validate_token(token)?;

    let user_id = UserId::from_string(&claims.sub)
        .map_err(|e| GateRejection::InvalidSubject(e.to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        email: claims.email,
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, GateRejection> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(GateRejection::MissingHeader)?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| GateRejection::InvalidHeader)?;

    let mut parts = auth_str.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(GateRejection::InvalidScheme),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(ApiError::unauthorized)
    }
}
