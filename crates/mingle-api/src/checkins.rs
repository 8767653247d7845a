use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use mingle_db::{to_ts, with_retry};
use mingle_types::api::{CheckinOutcome, CheckinResponse, Claims};
use mingle_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};

enum CheckinStage {
    NoVenue,
    NoProfile,
    Done { display_name: String, present: Vec<Uuid> },
}

/// Check into a venue. Sets the user-side pointer and the venue-side set
/// membership, and clears membership anywhere else — a user is present at
/// one venue at a time.
pub async fn check_in(
    State(state): State<AppState>,
    Path(venue_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let expires_at = now + state.ledger.config().checkin_ttl;

    let db = state.db.clone();
    let uid = claims.sub.to_string();
    let vid = venue_id.to_string();
    let now_ts = to_ts(now);
    let expires_ts = to_ts(expires_at);

    let stage = run_blocking(move || {
        if db.get_venue(&vid)?.is_none() {
            return Ok(CheckinStage::NoVenue);
        }
        let Some(user) = db.get_user_by_id(&uid)? else {
            return Ok(CheckinStage::NoProfile);
        };

        // Everyone already present hears about the arrival
        let present: Vec<Uuid> = db
            .venue_member_ids(&vid)?
            .iter()
            .filter(|m| *m != &uid)
            .filter_map(|m| m.parse().ok())
            .collect();

        with_retry(|| db.set_user_checkin(&uid, &vid, &expires_ts))?;
        db.remove_member_everywhere_except(&uid, Some(&vid))?;
        db.add_venue_member(&vid, &uid, &now_ts)?;
        db.bump_venue_checkin_count(&vid)?;

        Ok(CheckinStage::Done {
            display_name: user.display_name,
            present,
        })
    })
    .await?;

    let (display_name, notify) = match stage {
        CheckinStage::NoVenue => return Err(ApiError::NotFound),
        CheckinStage::NoProfile => return Err(ApiError::ProfileMissing),
        CheckinStage::Done { display_name, present } => (display_name, present),
    };

    info!("{} checked into venue {}", claims.sub, venue_id);

    state
        .dispatcher
        .send_to_users(
            &notify,
            GatewayEvent::VenueBroadcast {
                venue_id,
                user_id: claims.sub,
                display_name,
            },
        )
        .await;

    Ok(Json(CheckinResponse {
        outcome: CheckinOutcome::CheckedIn,
        venue_id: Some(venue_id),
        expires_at: Some(expires_at),
    }))
}

/// Check out of the current venue. `NotCheckedIn` is an expected outcome,
/// not an error.
pub async fn check_out(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let uid = claims.sub.to_string();

    let outcome = run_blocking(move || {
        let Some(user) = db.get_user_by_id(&uid)? else {
            return Ok(None);
        };

        let Some(venue) = user.checked_in_venue else {
            return Ok(Some(CheckinOutcome::NotCheckedIn));
        };

        // Conditional on the observed venue: a concurrent check-in
        // elsewhere wins and is left alone
        with_retry(|| db.clear_user_checkin(&uid, &venue))?;
        db.remove_venue_member(&venue, &uid)?;
        Ok(Some(CheckinOutcome::CheckedOut))
    })
    .await?
    .ok_or(ApiError::ProfileMissing)?;

    Ok(Json(CheckinResponse {
        outcome,
        venue_id: None,
        expires_at: None,
    }))
}
