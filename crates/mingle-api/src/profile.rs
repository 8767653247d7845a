use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::info;

use mingle_db::parse_ts_opt;
use mingle_engine::geocell;
use mingle_engine::ledger;
use mingle_types::api::{Claims, MeResponse, UpdateLocationRequest};

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};

/// Engagement snapshot: passes, lock countdown, check-in state. The lock
/// countdown is derived from the stored absolute timestamp at read time.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let ledger_handle = state.ledger.clone();
    let row = run_blocking(move || ledger_handle.snapshot(claims.sub, now))
        .await?
        .ok_or(ApiError::ProfileMissing)?;

    let lock_remaining_secs = ledger::time_remaining_on_lock(&row, now).num_seconds();

    Ok(Json(MeResponse {
        user_id: claims.sub,
        display_name: row.display_name,
        is_premium: row.is_premium,
        passes_left: row.passes_left,
        matches_today: row.matches_today,
        lock_remaining_secs,
        checked_in_venue: row
            .checked_in_venue
            .as_deref()
            .and_then(|v| v.parse().ok()),
        checkin_expires_at: parse_ts_opt(row.checkin_expires_at.as_deref()),
    }))
}

pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateLocationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !(-90.0..=90.0).contains(&req.lat) || !(-180.0..=180.0).contains(&req.lng) {
        return Err(ApiError::BadRequest("coordinates out of range"));
    }

    let cell = geocell::encode(req.lat, req.lng, geocell::PRECISION);

    let db = state.db.clone();
    let id = claims.sub.to_string();
    let cell_for_db = cell.clone();
    let found =
        run_blocking(move || db.update_location(&id, req.lat, req.lng, &cell_for_db)).await?;
    if !found {
        return Err(ApiError::ProfileMissing);
    }

    Ok(Json(serde_json::json!({ "geocell": cell })))
}

/// Hard delete. Any live match the user was in resolves through the other
/// participant's timeout path; venue-side presence is reaped.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let id = claims.sub.to_string();
    let deleted = run_blocking(move || db.delete_user(&id)).await?;
    if !deleted {
        return Err(ApiError::ProfileMissing);
    }

    info!("Account {} deleted", claims.sub);
    Ok(StatusCode::NO_CONTENT)
}
