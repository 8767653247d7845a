use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use mingle_db::{parse_ts_opt, to_ts};
use mingle_engine::session::SessionOutcome;
use mingle_types::api::{Claims, SwipeOutcome, SwipeRequest, SwipeResponse};
use mingle_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};
use crate::matches::view_for;

enum SwipeStage {
    NoProfile,
    Recorded,
    /// Mutual like: the session controller's verdict, plus the display
    /// names needed for the match-created events.
    Mutual {
        outcome: SessionOutcome,
        viewer_name: String,
        target_name: String,
    },
}

/// Record a swipe; a mutual like triggers match creation, which consumes
/// one of the swiper's passes.
pub async fn swipe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SwipeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.target_id == claims.sub {
        return Err(ApiError::BadRequest("cannot swipe yourself"));
    }

    let now = Utc::now();
    let db = state.db.clone();
    let sessions = state.sessions.clone();
    let uid = claims.sub.to_string();
    let tid = req.target_id.to_string();

    let stage = run_blocking(move || {
        let Some(viewer) = db.get_user_by_id(&uid)? else {
            return Ok(SwipeStage::NoProfile);
        };

        db.upsert_swipe(&uid, &tid, req.liked, &to_ts(now))?;
        if !req.liked {
            return Ok(SwipeStage::Recorded);
        }

        // A target that is gone, or hasn't liked back yet, ends here
        let Some(target) = db.get_user_by_id(&tid)? else {
            return Ok(SwipeStage::Recorded);
        };
        if db.get_swipe(&tid, &uid)? != Some(true) {
            return Ok(SwipeStage::Recorded);
        }

        // The session is anchored to the swiper's live venue, if any
        let venue_id: Option<Uuid> = match (
            viewer.checked_in_venue.as_deref(),
            parse_ts_opt(viewer.checkin_expires_at.as_deref()),
        ) {
            (Some(v), Some(expires)) if expires > now => v.parse().ok(),
            (Some(v), None) => v.parse().ok(),
            _ => None,
        };

        let outcome = sessions.create_session(claims.sub, req.target_id, venue_id, now)?;
        Ok(SwipeStage::Mutual {
            outcome,
            viewer_name: viewer.display_name,
            target_name: target.display_name,
        })
    })
    .await?;

    let (outcome, viewer_name, target_name) = match stage {
        SwipeStage::NoProfile => {
            return Ok(Json(SwipeResponse {
                outcome: SwipeOutcome::ProfileMissing,
                r#match: None,
                lock_remaining_secs: None,
            }));
        }
        SwipeStage::Recorded => {
            return Ok(Json(SwipeResponse {
                outcome: SwipeOutcome::Recorded,
                r#match: None,
                lock_remaining_secs: None,
            }));
        }
        SwipeStage::Mutual { outcome, viewer_name, target_name } => {
            (outcome, viewer_name, target_name)
        }
    };

    let response = match outcome {
        SessionOutcome::Created(m) => {
            info!("Match {} created between {} and {}", m.id, m.user_a, m.user_b);

            state
                .dispatcher
                .send_to_user(
                    claims.sub,
                    GatewayEvent::MatchCreate {
                        match_id: m.id,
                        partner_id: req.target_id,
                        partner_name: target_name,
                        venue_id: m.venue_id,
                        created_at: m.created_at,
                        expires_at: m.expires_at,
                    },
                )
                .await;
            state
                .dispatcher
                .send_to_user(
                    req.target_id,
                    GatewayEvent::MatchCreate {
                        match_id: m.id,
                        partner_id: claims.sub,
                        partner_name: viewer_name,
                        venue_id: m.venue_id,
                        created_at: m.created_at,
                        expires_at: m.expires_at,
                    },
                )
                .await;

            SwipeResponse {
                outcome: SwipeOutcome::Matched,
                r#match: view_for(&m, claims.sub, now),
                lock_remaining_secs: None,
            }
        }
        SessionOutcome::AlreadyActive => {
            let sessions = state.sessions.clone();
            let id = mingle_engine::session::match_id(claims.sub, req.target_id);
            let current = run_blocking(move || sessions.get(id)).await?;
            SwipeResponse {
                outcome: SwipeOutcome::AlreadyMatched,
                r#match: current.and_then(|m| view_for(&m, claims.sub, now)),
                lock_remaining_secs: None,
            }
        }
        SessionOutcome::NoPassesLeft => SwipeResponse {
            outcome: SwipeOutcome::NoPassesLeft,
            r#match: None,
            lock_remaining_secs: None,
        },
        SessionOutcome::StillLocked { until } => SwipeResponse {
            outcome: SwipeOutcome::StillLocked,
            r#match: None,
            lock_remaining_secs: Some((until - now).num_seconds().max(0)),
        },
        SessionOutcome::UnknownUser => SwipeResponse {
            outcome: SwipeOutcome::ProfileMissing,
            r#match: None,
            lock_remaining_secs: None,
        },
    };

    Ok(Json(response))
}
