// Session introspection and logout for authenticated users

use axum::{
    extract::{Extension, State},
    response::Json,
};
use serde_json::{json, Value};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::middleware::auth::SessionToken;
use crate::middleware::GatewayState;
use crate::tenant::TenantContext;

/// GET /api/auth/whoami - identity and resolved tenant for this session
pub async fn whoami_get(
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<TenantContext>,
) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "user": {
                "id": identity.user_id,
                "username": identity.username,
            },
            "tenant": {
                "id": context.tenant_id,
                "name": context.tenant_name,
            }
        }
    }))
}

/// DELETE /api/auth/session - revoke the current session (logout)
pub async fn session_logout(
    State(state): State<GatewayState>,
    Extension(token): Extension<SessionToken>,
) -> Result<Json<Value>, ApiError> {
    state.authenticator.revoke(&token.0).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "revoked": true }
    })))
}

/// DELETE /api/auth/sessions - revoke every session of the current user
pub async fn sessions_logout_all(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, ApiError> {
    let revoked = state.authenticator.revoke_all(identity.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "revoked_sessions": revoked }
    })))
}
