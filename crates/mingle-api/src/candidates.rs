use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::Utc;

use mingle_db::parse_ts_opt;
use mingle_engine::proximity;
use mingle_types::api::{CandidateQuery, CandidateResponse, Claims};

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};

enum BrowseStage {
    NoProfile,
    NotCheckedIn,
    Found(Vec<proximity::Candidate>),
}

/// Nearby opted-in users, coarse-filtered by geocell and exactly filtered
/// by distance and mutual preferences.
pub async fn candidates(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<CandidateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(r) = query.radius_km {
        if !(0.1..=100.0).contains(&r) {
            return Err(ApiError::BadRequest("radius out of range"));
        }
    }

    let now = Utc::now();
    let db = state.db.clone();
    let uid = claims.sub.to_string();

    let stage = run_blocking(move || {
        let Some(viewer) = db.get_user_by_id(&uid)? else {
            return Ok(BrowseStage::NoProfile);
        };

        // Browsing requires a live check-in of your own
        let live_checkin = viewer.checked_in_venue.is_some()
            && parse_ts_opt(viewer.checkin_expires_at.as_deref())
                .map(|t| t > now)
                .unwrap_or(true);
        if !live_checkin {
            return Ok(BrowseStage::NotCheckedIn);
        }

        let candidates = proximity::find_candidates(&db, &viewer, query.radius_km, now)?;
        Ok(BrowseStage::Found(candidates))
    })
    .await?;

    let found = match stage {
        BrowseStage::NoProfile => return Err(ApiError::ProfileMissing),
        BrowseStage::NotCheckedIn => return Err(ApiError::Conflict("not checked in")),
        BrowseStage::Found(candidates) => candidates,
    };

    let out: Vec<CandidateResponse> = found
        .into_iter()
        .map(|c| CandidateResponse {
            user_id: c.user_id,
            display_name: c.display_name,
            gender: c.gender,
            age: c.age,
            venue_id: c.venue_id,
            distance_km: c.distance_km,
        })
        .collect();

    Ok(Json(out))
}
