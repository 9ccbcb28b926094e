// POST /auth/login - authenticate credentials and receive a session token

use axum::{extract::State, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Credential;
use crate::error::ApiError;
use crate::middleware::GatewayState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub secret: String,
}

/// Authenticate a credential and return the opaque session token. The
/// token is shown here exactly once; only its digest is persisted.
pub async fn login_post(
    State(state): State<GatewayState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    if payload.identifier.is_empty() || payload.secret.is_empty() {
        return Err(ApiError::bad_request("identifier and secret are required"));
    }

    let credential = Credential {
        identifier: payload.identifier,
        secret: payload.secret,
    };

    let (token, session) = state.authenticator.authenticate(&credential).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "token": token,
            "expires_at": session.expires_at,
            "user": {
                "id": session.user_id,
                "username": session.username,
            }
        }
    })))
}
