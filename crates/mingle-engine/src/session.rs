//! Match Session Controller — owns the lifecycle of a match:
//! Created -> Active -> {Timeout | Meet | Passed}.
//!
//! There is no in-memory countdown state. Remaining time is always derived
//! from `(expires_at, now)`, and every terminal transition is a single
//! "resolve if still active" conditional write, so concurrent resolvers
//! (two clients, or a client racing the server sweep) observe exactly one
//! terminal status.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use mingle_db::models::MatchRow;
use mingle_db::{Database, parse_ts, parse_ts_opt, to_ts, with_retry};
use mingle_types::models::{Match, MatchStatus};

use crate::config::EngineConfig;
use crate::ledger::{PassLedger, PassOutcome};

/// Namespace for deriving match ids from participant pairs.
const MATCH_NAMESPACE: Uuid = Uuid::from_u128(0x8f1e_6a07_54c3_42b1_9d2e_03ab_76f4_c955);

/// Deterministic, order-independent match id: either participant can
/// recompute it without a lookup.
pub fn match_id(a: Uuid, b: Uuid) -> Uuid {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 32];
    buf[..16].copy_from_slice(lo.as_bytes());
    buf[16..].copy_from_slice(hi.as_bytes());
    Uuid::new_v5(&MATCH_NAMESPACE, &buf)
}

/// Remaining session time, derived at read time; never negative.
pub fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    if expires_at > now {
        expires_at - now
    } else {
        Duration::zero()
    }
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Created(Match),
    /// A session for this pair is already live (possibly created
    /// concurrently by the other participant's client).
    AlreadyActive,
    NoPassesLeft,
    StillLocked { until: DateTime<Utc> },
    UnknownUser,
}

#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Resolved(Match),
    /// Another resolver won the race; the terminal status is theirs.
    AlreadyResolved,
    /// Timeout attempted before the deadline.
    NotExpired,
    /// Explicit action attempted after the deadline; the sweep owns it.
    Expired,
    NotFound,
    NotParticipant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Pass,
    Meet,
}

impl Resolution {
    fn status(&self) -> MatchStatus {
        match self {
            Self::Pass => MatchStatus::Passed,
            Self::Meet => MatchStatus::Meet,
        }
    }
}

#[derive(Clone)]
pub struct SessionController {
    db: Arc<Database>,
    ledger: PassLedger,
    config: EngineConfig,
}

impl SessionController {
    pub fn new(db: Arc<Database>, ledger: PassLedger, config: EngineConfig) -> Self {
        Self { db, ledger, config }
    }

    /// Create the session for a mutual swipe. Pass consumption and the
    /// match write are two conditional writes; losing the pair race after
    /// consuming refunds the pass.
    pub fn create_session(
        &self,
        initiator: Uuid,
        other: Uuid,
        venue_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome> {
        let id = match_id(initiator, other);
        let id_s = id.to_string();

        // Cheap early exit; the upsert below is the authoritative check.
        if let Some(row) = self.db.get_match(&id_s)? {
            if row.status == MatchStatus::Active.as_str() {
                return Ok(SessionOutcome::AlreadyActive);
            }
        }

        let pass = self.ledger.consume_pass(initiator, now)?;
        match pass {
            PassOutcome::Unlimited | PassOutcome::Consumed { .. } => {}
            PassOutcome::NoPassesLeft => return Ok(SessionOutcome::NoPassesLeft),
            PassOutcome::StillLocked { until } => {
                return Ok(SessionOutcome::StillLocked { until });
            }
            PassOutcome::UnknownUser => return Ok(SessionOutcome::UnknownUser),
        }

        let (lo, hi) = if initiator <= other {
            (initiator, other)
        } else {
            (other, initiator)
        };
        let expires_at = now + self.config.session_duration;
        let venue_s = venue_id.map(|v| v.to_string());

        let created = with_retry(|| {
            self.db.upsert_active_match(
                &id_s,
                &lo.to_string(),
                &hi.to_string(),
                venue_s.as_deref(),
                &to_ts(now),
                &to_ts(expires_at),
            )
        })?;

        if !created {
            if matches!(pass, PassOutcome::Consumed { .. }) {
                self.ledger.refund_pass(initiator)?;
            }
            return Ok(SessionOutcome::AlreadyActive);
        }

        if let Some(v) = &venue_s {
            self.db.bump_venue_match_count(v)?;
        }

        Ok(SessionOutcome::Created(Match {
            id,
            user_a: lo,
            user_b: hi,
            venue_id,
            status: MatchStatus::Active,
            created_at: now,
            expires_at,
            resolved_at: None,
        }))
    }

    /// Time the session out once `now >= expires_at`. The winning caller
    /// also feeds the ledger: the daily match counter (and a possible lock)
    /// for each participant that still exists.
    pub fn resolve_timeout(&self, match_id: Uuid, now: DateTime<Utc>) -> Result<ResolveOutcome> {
        let id_s = match_id.to_string();
        let now_ts = to_ts(now);

        if with_retry(|| self.db.resolve_match_if_expired(&id_s, &now_ts))? {
            let Some(row) = self.db.get_match(&id_s)? else {
                return Ok(ResolveOutcome::NotFound);
            };
            let m = to_match(&row);
            for participant in [m.user_a, m.user_b] {
                // None = deleted account; the session must still resolve
                if self.ledger.record_match_created(participant, now)?.is_none() {
                    warn!("Timeout for {} skipped ledger update: participant {} is gone", m.id, participant);
                }
            }
            return Ok(ResolveOutcome::Resolved(m));
        }

        match self.db.get_match(&id_s)? {
            None => Ok(ResolveOutcome::NotFound),
            Some(row) if row.status != MatchStatus::Active.as_str() => {
                Ok(ResolveOutcome::AlreadyResolved)
            }
            Some(_) => Ok(ResolveOutcome::NotExpired),
        }
    }

    /// Explicit resolution by one participant. The partner observes the
    /// terminal state through its own subscription; only the status row is
    /// shared.
    pub fn resolve_explicit(
        &self,
        match_id: Uuid,
        acting_user: Uuid,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome> {
        let id_s = match_id.to_string();

        let Some(row) = self.db.get_match(&id_s)? else {
            return Ok(ResolveOutcome::NotFound);
        };
        let m = to_match(&row);
        if m.partner_of(acting_user).is_none() {
            return Ok(ResolveOutcome::NotParticipant);
        }

        let status = resolution.status();
        let now_ts = to_ts(now);
        if with_retry(|| self.db.resolve_match_if_live(&id_s, status.as_str(), &now_ts))? {
            return Ok(ResolveOutcome::Resolved(Match {
                status,
                resolved_at: Some(now),
                ..m
            }));
        }

        match self.db.get_match(&id_s)? {
            None => Ok(ResolveOutcome::NotFound),
            Some(row) if row.status != MatchStatus::Active.as_str() => {
                Ok(ResolveOutcome::AlreadyResolved)
            }
            // Still active but past the deadline: the sweep owns it now
            Some(_) => Ok(ResolveOutcome::Expired),
        }
    }

    /// Server-side timeout sweep. One match failing does not block the
    /// rest; matches resolved concurrently by a participant are skipped.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<Match>> {
        let rows = self.db.list_expired_active(&to_ts(now))?;
        let mut resolved = Vec::new();

        for row in rows {
            let Ok(id) = row.id.parse::<Uuid>() else {
                warn!("Corrupt match id '{}' in expiry sweep", row.id);
                continue;
            };
            match self.resolve_timeout(id, now) {
                Ok(ResolveOutcome::Resolved(m)) => resolved.push(m),
                Ok(_) => {} // lost the race to an explicit action
                Err(e) => warn!("Expiry sweep failed for match {}: {}", id, e),
            }
        }

        Ok(resolved)
    }

    pub fn get(&self, match_id: Uuid) -> Result<Option<Match>> {
        Ok(self.db.get_match(&match_id.to_string())?.map(|row| to_match(&row)))
    }
}

pub fn to_match(row: &MatchRow) -> Match {
    let parse_uuid = |s: &str| {
        s.parse::<Uuid>().unwrap_or_else(|e| {
            warn!("Corrupt uuid '{}' on match '{}': {}", s, row.id, e);
            Uuid::default()
        })
    };
    Match {
        id: parse_uuid(&row.id),
        user_a: parse_uuid(&row.user_a),
        user_b: parse_uuid(&row.user_b),
        venue_id: row.venue_id.as_deref().map(parse_uuid),
        status: MatchStatus::parse(&row.status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on match '{}'", row.status, row.id);
            MatchStatus::Timeout
        }),
        created_at: parse_ts(&row.created_at),
        expires_at: parse_ts(&row.expires_at),
        resolved_at: parse_ts_opt(row.resolved_at.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mingle_db::models::NewUser;

    const ANA: &str = "00000000-0000-0000-0000-00000000000a";
    const BEN: &str = "00000000-0000-0000-0000-00000000000b";

    fn setup() -> (Arc<Database>, SessionController) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for (id, name, gender, looking) in
            [(ANA, "ana", "female", "men"), (BEN, "ben", "male", "women")]
        {
            db.create_user(&NewUser {
                id,
                username: name,
                password_hash: "x",
                display_name: name,
                gender,
                looking_for: looking,
                birth_year: 1995,
                min_age: 18,
                max_age: 99,
                max_distance_km: 25.0,
                passes_left: 5,
                counters_date: "2025-06-01",
            })
            .unwrap();
        }
        let config = EngineConfig::default();
        let ledger = PassLedger::new(db.clone(), config.clone());
        let sessions = SessionController::new(db.clone(), ledger, config);
        (db, sessions)
    }

    fn ana() -> Uuid {
        ANA.parse().unwrap()
    }

    fn ben() -> Uuid {
        BEN.parse().unwrap()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn match_id_is_order_independent() {
        assert_eq!(match_id(ana(), ben()), match_id(ben(), ana()));
        assert_ne!(match_id(ana(), ben()), match_id(ana(), ana()));
    }

    #[test]
    fn create_consumes_a_pass_and_sets_deadline() {
        let (db, sessions) = setup();
        let outcome = sessions.create_session(ana(), ben(), None, noon()).unwrap();

        let SessionOutcome::Created(m) = outcome else {
            panic!("expected Created");
        };
        assert_eq!(m.status, MatchStatus::Active);
        assert_eq!(m.expires_at, noon() + Duration::minutes(10));

        let row = db.get_user_by_id(ANA).unwrap().unwrap();
        assert_eq!(row.passes_left, 4);
        // Only the initiator pays
        assert_eq!(db.get_user_by_id(BEN).unwrap().unwrap().passes_left, 5);
    }

    #[test]
    fn second_create_for_live_pair_is_already_active() {
        let (db, sessions) = setup();
        sessions.create_session(ana(), ben(), None, noon()).unwrap();

        let outcome = sessions.create_session(ben(), ana(), None, noon()).unwrap();
        assert!(matches!(outcome, SessionOutcome::AlreadyActive));
        // Ben's balance untouched by the refused attempt
        assert_eq!(db.get_user_by_id(BEN).unwrap().unwrap().passes_left, 5);
    }

    #[test]
    fn exhausted_initiator_cannot_create() {
        let (db, sessions) = setup();
        for _ in 0..5 {
            db.try_consume_pass(ANA).unwrap();
        }
        let outcome = sessions.create_session(ana(), ben(), None, noon()).unwrap();
        assert!(matches!(outcome, SessionOutcome::NoPassesLeft));
        assert!(sessions.get(match_id(ana(), ben())).unwrap().is_none());
    }

    #[test]
    fn remaining_is_monotone_and_hits_zero_at_deadline() {
        let expires = noon() + Duration::minutes(10);
        let samples = [
            remaining(expires, noon()),
            remaining(expires, noon() + Duration::seconds(90)),
            remaining(expires, noon() + Duration::minutes(9)),
            remaining(expires, expires),
            remaining(expires, expires + Duration::minutes(5)),
        ];
        for pair in samples.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert_eq!(samples[3], Duration::zero());
        assert_eq!(samples[4], Duration::zero());
    }

    #[test]
    fn timeout_fires_only_after_deadline_and_feeds_ledger() {
        let (db, sessions) = setup();
        sessions.create_session(ana(), ben(), None, noon()).unwrap();
        let id = match_id(ana(), ben());

        let early = sessions.resolve_timeout(id, noon() + Duration::seconds(599)).unwrap();
        assert!(matches!(early, ResolveOutcome::NotExpired));

        let late = sessions.resolve_timeout(id, noon() + Duration::seconds(601)).unwrap();
        let ResolveOutcome::Resolved(m) = late else {
            panic!("expected Resolved");
        };
        assert_eq!(m.status, MatchStatus::Timeout);

        // One timed-out match, below the cap of 2: counted, no lock
        for id in [ANA, BEN] {
            let row = db.get_user_by_id(id).unwrap().unwrap();
            assert_eq!(row.matches_today, 1);
            assert!(row.lock_until.is_none());
        }
    }

    #[test]
    fn second_timeout_locks_free_accounts() {
        let (db, sessions) = setup();
        let t0 = noon();
        sessions.create_session(ana(), ben(), None, t0).unwrap();
        let id = match_id(ana(), ben());
        let t1 = t0 + Duration::minutes(11);
        sessions.resolve_timeout(id, t1).unwrap();

        // Re-match the same pair and let it time out again
        sessions.create_session(ana(), ben(), None, t1).unwrap();
        let t2 = t1 + Duration::minutes(11);
        sessions.resolve_timeout(id, t2).unwrap();

        let row = db.get_user_by_id(ANA).unwrap().unwrap();
        assert_eq!(row.matches_today, 2);
        assert_eq!(row.lock_until.as_deref(), Some(to_ts(t2 + Duration::hours(2)).as_str()));
        assert!(!crate::ledger::can_match(&row, t2));
        assert!(crate::ledger::can_match(&row, t2 + Duration::hours(2)));
    }

    #[test]
    fn explicit_pass_resolves_once() {
        let (_db, sessions) = setup();
        sessions.create_session(ana(), ben(), None, noon()).unwrap();
        let id = match_id(ana(), ben());
        let t = noon() + Duration::minutes(2);

        let first = sessions.resolve_explicit(id, ana(), Resolution::Pass, t).unwrap();
        assert!(matches!(first, ResolveOutcome::Resolved(_)));

        let second = sessions.resolve_explicit(id, ben(), Resolution::Meet, t).unwrap();
        assert!(matches!(second, ResolveOutcome::AlreadyResolved));

        let m = sessions.get(id).unwrap().unwrap();
        assert_eq!(m.status, MatchStatus::Passed);
    }

    #[test]
    fn meet_does_not_extend_the_deadline() {
        let (_db, sessions) = setup();
        let SessionOutcome::Created(created) =
            sessions.create_session(ana(), ben(), None, noon()).unwrap()
        else {
            panic!();
        };
        let id = created.id;

        sessions
            .resolve_explicit(id, ben(), Resolution::Meet, noon() + Duration::minutes(3))
            .unwrap();
        let m = sessions.get(id).unwrap().unwrap();
        assert_eq!(m.status, MatchStatus::Meet);
        assert_eq!(m.expires_at, created.expires_at);
    }

    #[test]
    fn timeout_and_explicit_race_yields_one_terminal_state() {
        let (_db, sessions) = setup();
        sessions.create_session(ana(), ben(), None, noon()).unwrap();
        let id = match_id(ana(), ben());
        let deadline = noon() + Duration::minutes(10);

        // The user taps "meet" a breath before the deadline while the sweep
        // observer fires at it; both race on the same conditional write.
        let s1 = sessions.clone();
        let s2 = sessions.clone();
        let timeout = std::thread::spawn(move || s1.resolve_timeout(id, deadline).unwrap());
        let explicit = std::thread::spawn(move || {
            s2.resolve_explicit(id, ana(), Resolution::Meet, deadline - Duration::seconds(1))
                .unwrap()
        });

        let a = timeout.join().unwrap();
        let b = explicit.join().unwrap();

        let wins = [matches!(a, ResolveOutcome::Resolved(_)), matches!(b, ResolveOutcome::Resolved(_))]
            .iter()
            .filter(|w| **w)
            .count();
        assert_eq!(wins, 1, "exactly one resolver must win");

        let m = sessions.get(id).unwrap().unwrap();
        assert!(m.status.is_terminal());
    }

    #[test]
    fn late_explicit_action_is_expired_not_resolved() {
        let (_db, sessions) = setup();
        sessions.create_session(ana(), ben(), None, noon()).unwrap();
        let id = match_id(ana(), ben());

        let outcome = sessions
            .resolve_explicit(id, ana(), Resolution::Meet, noon() + Duration::minutes(10))
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::Expired));
    }

    #[test]
    fn sweep_resolves_expired_and_skips_live() {
        let (db, sessions) = setup();
        // A third user so two sessions can coexist
        db.create_user(&NewUser {
            id: "00000000-0000-0000-0000-00000000000c",
            username: "cyd",
            password_hash: "x",
            display_name: "cyd",
            gender: "nonbinary",
            looking_for: "everyone",
            birth_year: 1990,
            min_age: 18,
            max_age: 99,
            max_distance_km: 25.0,
            passes_left: 5,
            counters_date: "2025-06-01",
        })
        .unwrap();
        let cyd: Uuid = "00000000-0000-0000-0000-00000000000c".parse().unwrap();

        sessions.create_session(ana(), ben(), None, noon()).unwrap();
        sessions
            .create_session(cyd, ben(), None, noon() + Duration::minutes(5))
            .unwrap();

        let resolved = sessions.sweep_expired(noon() + Duration::minutes(11)).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, match_id(ana(), ben()));

        let live = sessions.get(match_id(cyd, ben())).unwrap().unwrap();
        assert_eq!(live.status, MatchStatus::Active);
    }

    #[test]
    fn session_with_deleted_participant_still_times_out() {
        let (db, sessions) = setup();
        sessions.create_session(ana(), ben(), None, noon()).unwrap();
        db.delete_user(BEN).unwrap();

        let outcome = sessions
            .resolve_timeout(match_id(ana(), ben()), noon() + Duration::minutes(11))
            .unwrap();
        let ResolveOutcome::Resolved(m) = outcome else {
            panic!("expected Resolved");
        };
        assert_eq!(m.status, MatchStatus::Timeout);

        // Survivor's ledger still updated
        assert_eq!(db.get_user_by_id(ANA).unwrap().unwrap().matches_today, 1);
    }

    #[test]
    fn resolution_by_non_participant_is_refused() {
        let (_db, sessions) = setup();
        sessions.create_session(ana(), ben(), None, noon()).unwrap();
        let stranger: Uuid = "00000000-0000-0000-0000-00000000beef".parse().unwrap();

        let outcome = sessions
            .resolve_explicit(match_id(ana(), ben()), stranger, Resolution::Pass, noon())
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::NotParticipant));
    }
}
