// POST /billing/events - payment-provider notification intake

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::billing::ProviderEvent;
use crate::error::ApiError;
use crate::middleware::GatewayState;

/// Accept a provider notification and queue it for the single-writer
/// subscription updater. Duplicate event ids are dropped downstream, so
/// providers may redeliver freely.
pub async fn provider_event_post(
    State(state): State<GatewayState>,
    Json(event): Json<ProviderEvent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if event.event_id.is_empty() {
        return Err(ApiError::bad_request("event_id is required"));
    }

    state.billing.submit(event).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "data": { "accepted": true }
        })),
    ))
}
