use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Nonbinary,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Nonbinary => "nonbinary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "nonbinary" => Some(Self::Nonbinary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookingFor {
    Men,
    Women,
    Everyone,
}

impl LookingFor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Men => "men",
            Self::Women => "women",
            Self::Everyone => "everyone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "men" => Some(Self::Men),
            "women" => Some(Self::Women),
            "everyone" => Some(Self::Everyone),
            _ => None,
        }
    }

    /// Whether a preference admits a given gender.
    pub fn admits(&self, gender: Gender) -> bool {
        match self {
            Self::Everyone => true,
            Self::Men => gender == Gender::Male,
            Self::Women => gender == Gender::Female,
        }
    }
}

/// Terminal and live states of a match session.
/// `Active` is the only non-terminal state; exactly one terminal transition
/// ever lands on a given match row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Meet,
    Passed,
    Timeout,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Meet => "meet",
            Self::Passed => "passed",
            Self::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "meet" => Some(Self::Meet),
            "passed" => Some(Self::Passed),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A match session. `user_a` / `user_b` are stored in sorted order so the id
/// derivation is order-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub venue_id: Option<Uuid>,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Match {
    /// The other participant, or `None` if `user_id` is not in this match.
    pub fn partner_of(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.user_a {
            Some(self.user_b)
        } else if user_id == self.user_b {
            Some(self.user_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub geocell: String,
    pub checkin_count: i64,
    pub match_count: i64,
}
