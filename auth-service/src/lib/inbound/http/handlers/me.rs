use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::user::models::User;
use crate::domain::user::ports::AuthServicePort;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

pub async fn me<S: AuthServicePort>(
    State(state): State<AppState<S>>,
    current_user: AuthenticatedUser,
) -> Result<ApiSuccess<MeResponseData>, ApiError> {
    state
        .auth_service
        .get_user(current_user.user_id)
        .await
        .map_err(ApiError::from)
        .map(|ref user| ApiSuccess::new(StatusCode::OK, user.into()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeResponseData {
    pub id: i64,
    pub email: String,
    pub username: String,
}

impl From<&User> for MeResponseData {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.0,
            email: user.email.as_str().to_string(),
            username: user.username.as_str().to_string(),
        }
    }
}
