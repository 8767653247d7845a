use chrono::Duration;

/// Engagement tuning. Defaults match the shipped product configuration;
/// every knob is overridable from the environment in the server binary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Daily pass allotment for free accounts.
    pub daily_passes: i64,
    /// Timed-out matches per day before a free account is locked.
    pub daily_match_cap: i64,
    /// How long the lock holds once the cap is reached.
    pub lock_duration: Duration,
    /// Lifetime of a match session from creation to timeout.
    pub session_duration: Duration,
    /// Lifetime of a venue check-in.
    pub checkin_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            daily_passes: 5,
            daily_match_cap: 2,
            lock_duration: Duration::hours(2),
            session_duration: Duration::minutes(10),
            checkin_ttl: Duration::hours(3),
        }
    }
}
