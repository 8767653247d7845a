use axum::{Json, extract::State, http::HeaderMap, http::header, response::IntoResponse};
use tracing::info;

use mingle_types::api::BillingEvent;

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};

/// Billing webhook. Signature verification happens upstream; here a shared
/// bearer secret gates the endpoint, and the event's effect goes through
/// the ledger like every other mutation.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<BillingEvent>,
) -> Result<impl IntoResponse, ApiError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if state.billing_secret.is_empty() || presented != state.billing_secret {
        return Err(ApiError::Unauthorized);
    }

    let BillingEvent { user_id, event: kind } = event;
    let ledger = state.ledger.clone();
    let applied = run_blocking(move || ledger.apply_billing_event(user_id, kind)).await?;

    if applied {
        info!("Billing event {:?} applied to {}", kind, user_id);
    }

    // Unknown users are acknowledged, not retried: the billing provider's
    // user may have deleted their dating profile
    Ok(Json(serde_json::json!({ "applied": applied })))
}
