// Entitlement checks for the resolved tenant

use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::entitlement::Decision;
use crate::error::ApiError;
use crate::middleware::GatewayState;
use crate::tenant::TenantContext;

/// GET /api/features/:feature - entitlement check against the session's
/// own tenant
pub async fn feature_get(
    State(state): State<GatewayState>,
    Extension(context): Extension<TenantContext>,
    Path(feature): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let decision = state.entitlements.check(&context, &feature).await?;
    Ok(Json(decision_body(&feature, decision)))
}

/// GET /api/tenants/:tenant_id/features/:feature - entitlement check on
/// an explicit tenant. The isolation gate runs first, so asking about a
/// foreign tenant is a hard cross-tenant failure.
pub async fn tenant_feature_get(
    State(state): State<GatewayState>,
    Extension(context): Extension<TenantContext>,
    Path((tenant_id, feature)): Path<(Uuid, String)>,
) -> Result<Json<Value>, ApiError> {
    state.resolver.authorize_access(&context, tenant_id).await?;

    let decision = state.entitlements.check(&context, &feature).await?;
    Ok(Json(decision_body(&feature, decision)))
}

fn decision_body(feature: &str, decision: Decision) -> Value {
    match decision {
        Decision::Granted => json!({
            "success": true,
            "data": { "feature": feature, "granted": true }
        }),
        Decision::Denied(reason) => json!({
            "success": true,
            "data": {
                "feature": feature,
                "granted": false,
                "reason": reason.to_string(),
            }
        }),
    }
}
