use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Gender, LookingFor, MatchStatus};

// -- JWT Claims --

/// JWT claims shared across mingle-api (REST middleware) and mingle-gateway
/// (WebSocket authentication). Canonical definition lives here in
/// mingle-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub gender: Gender,
    pub looking_for: LookingFor,
    pub birth_year: i32,
    pub min_age: i32,
    pub max_age: i32,
    pub max_distance_km: f64,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Engagement snapshot (GET /me) --

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub is_premium: bool,
    pub passes_left: i64,
    pub matches_today: i64,
    pub lock_remaining_secs: i64,
    pub checked_in_venue: Option<Uuid>,
    pub checkin_expires_at: Option<DateTime<Utc>>,
}

// -- Location / check-in --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinOutcome {
    CheckedIn,
    CheckedOut,
    NotCheckedIn,
}

#[derive(Debug, Serialize)]
pub struct CheckinResponse {
    pub outcome: CheckinOutcome,
    pub venue_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

// -- Candidates --

#[derive(Debug, Deserialize)]
pub struct CandidateQuery {
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub gender: Gender,
    pub age: i32,
    pub venue_id: Uuid,
    /// Exact great-circle distance, annotated for display only.
    pub distance_km: f64,
}

// -- Swipes & matches --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwipeRequest {
    pub target_id: Uuid,
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeOutcome {
    /// Swipe stored; no mutual like yet.
    Recorded,
    /// Mutual like — a match session was created.
    Matched,
    /// A session for this pair is already live.
    AlreadyMatched,
    NoPassesLeft,
    StillLocked,
    ProfileMissing,
}

#[derive(Debug, Serialize)]
pub struct SwipeResponse {
    pub outcome: SwipeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#match: Option<MatchView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_remaining_secs: Option<i64>,
}

/// A match as one participant sees it: the partner plus the live countdown,
/// always derived from `expires_at` at read time.
#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub match_id: Uuid,
    pub partner_id: Uuid,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved,
    AlreadyResolved,
    /// The clock ran out before the action landed; the sweep owns it now.
    Expired,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub outcome: ResolveOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#match: Option<MatchView>,
}

// -- Billing webhook --

#[derive(Debug, Deserialize)]
pub struct BillingEvent {
    pub user_id: Uuid,
    pub event: BillingEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventKind {
    PaymentCompleted,
    SubscriptionRenewed,
    SubscriptionCancelled,
}
