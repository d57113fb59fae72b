//! Minimal account registration.
//!
//! The realtime core consumes authentication as a capability
//! ("verify token → user id"); this endpoint exists so the server is usable
//! end-to-end: it mints a user id and an access token in one step.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::auth::jwt;
use crate::db::users::{self, UserError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub username: String,
    pub access_token: String,
}

/// POST /api/auth/register — create a user and issue an access token.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), StatusCode> {
    let user = users::create_user(state.db.clone(), body.username)
        .await
        .map_err(|e| match e {
            UserError::UsernameTaken => StatusCode::CONFLICT,
            UserError::InvalidUsername => StatusCode::BAD_REQUEST,
            UserError::Db => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    let access_token = jwt::issue_access_token(&state.jwt_secret, &user.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            username: user.username,
            access_token,
        }),
    ))
}
