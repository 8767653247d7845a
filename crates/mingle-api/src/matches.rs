use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use mingle_engine::session::{self, ResolveOutcome as EngineOutcome, Resolution};
use mingle_types::api::{Claims, MatchView, ResolveOutcome, ResolveResponse};
use mingle_types::events::GatewayEvent;
use mingle_types::models::Match;

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};

/// The match as one participant sees it; the countdown is recomputed from
/// `expires_at` on every read, never stored.
pub fn view_for(m: &Match, viewer: Uuid, now: DateTime<Utc>) -> Option<MatchView> {
    let partner_id = m.partner_of(viewer)?;
    Some(MatchView {
        match_id: m.id,
        partner_id,
        status: m.status,
        created_at: m.created_at,
        expires_at: m.expires_at,
        remaining_secs: session::remaining(m.expires_at, now).num_seconds(),
    })
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let sessions = state.sessions.clone();
    let m = run_blocking(move || sessions.get(match_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    let view = view_for(&m, claims.sub, now).ok_or(ApiError::Forbidden)?;
    Ok(Json(view))
}

pub async fn pass_match(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> Result<Json<ResolveResponse>, ApiError> {
    resolve(state, path, claims, Resolution::Pass).await
}

pub async fn meet_match(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> Result<Json<ResolveResponse>, ApiError> {
    resolve(state, path, claims, Resolution::Meet).await
}

async fn resolve(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    resolution: Resolution,
) -> Result<Json<ResolveResponse>, ApiError> {
    let now = Utc::now();
    let sessions = state.sessions.clone();
    let outcome =
        run_blocking(move || sessions.resolve_explicit(match_id, claims.sub, resolution, now))
            .await?;

    match outcome {
        EngineOutcome::Resolved(m) => {
            // Both participants observe the single terminal status
            let event = GatewayEvent::MatchResolved {
                match_id: m.id,
                status: m.status,
                resolved_at: now,
            };
            state.dispatcher.send_to_users(&[m.user_a, m.user_b], event).await;

            Ok(Json(ResolveResponse {
                outcome: ResolveOutcome::Resolved,
                r#match: view_for(&m, claims.sub, now),
            }))
        }
        EngineOutcome::AlreadyResolved => {
            let sessions = state.sessions.clone();
            let current = run_blocking(move || sessions.get(match_id)).await?;
            Ok(Json(ResolveResponse {
                outcome: ResolveOutcome::AlreadyResolved,
                r#match: current.and_then(|m| view_for(&m, claims.sub, now)),
            }))
        }
        EngineOutcome::Expired => Ok(Json(ResolveResponse {
            outcome: ResolveOutcome::Expired,
            r#match: None,
        })),
        EngineOutcome::NotFound => Err(ApiError::NotFound),
        EngineOutcome::NotParticipant => Err(ApiError::Forbidden),
        EngineOutcome::NotExpired => Err(ApiError::Internal(anyhow::anyhow!(
            "unexpected NotExpired from explicit resolution"
        ))),
    }
}
