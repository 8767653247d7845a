/// Database row types — these map directly to SQLite rows.
/// Distinct from mingle-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub gender: String,
    pub looking_for: String,
    pub birth_year: i64,
    pub min_age: i64,
    pub max_age: i64,
    pub max_distance_km: f64,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub geocell: Option<String>,
    pub is_premium: bool,
    pub passes_left: i64,
    pub matches_today: i64,
    pub lock_until: Option<String>,
    pub last_match_at: Option<String>,
    pub counters_date: String,
    pub checked_in_venue: Option<String>,
    pub checkin_expires_at: Option<String>,
    pub created_at: String,
}

/// Insert payload for a new user. Engagement counters start at the daily
/// allotment for the day of creation.
pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub display_name: &'a str,
    pub gender: &'a str,
    pub looking_for: &'a str,
    pub birth_year: i64,
    pub min_age: i64,
    pub max_age: i64,
    pub max_distance_km: f64,
    pub passes_left: i64,
    pub counters_date: &'a str,
}

pub struct MatchRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub venue_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub expires_at: String,
    pub resolved_at: Option<String>,
}

pub struct VenueRow {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub geocell: String,
    pub checkin_count: i64,
    pub match_count: i64,
}

/// One venue-side member row joined against the user it claims to be,
/// as the reaper sees it.
pub struct MemberState {
    pub user_id: String,
    pub user_exists: bool,
    pub checked_in_venue: Option<String>,
    pub checkin_expires_at: Option<String>,
}
