//! Pass/Lock Ledger — the single authority for "may this user create a
//! match right now", and for consuming a pass exactly once per match.
//!
//! Every mutation is a conditional write; `passes_left` and
//! `matches_today` are never overwritten unconditionally.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use mingle_db::models::UserRow;
use mingle_db::{Database, parse_ts_opt, to_date, to_ts, with_retry};
use mingle_types::api::BillingEventKind;

use crate::config::EngineConfig;

/// Outcome of a pass consumption attempt. Exhaustion and lock are expected
/// business results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Premium account — no pass consumed, no mutation.
    Unlimited,
    Consumed { remaining: i64 },
    NoPassesLeft,
    StillLocked { until: DateTime<Utc> },
    UnknownUser,
}

impl PassOutcome {
    pub fn allows_match(&self) -> bool {
        matches!(self, Self::Unlimited | Self::Consumed { .. })
    }
}

#[derive(Clone)]
pub struct PassLedger {
    db: Arc<Database>,
    config: EngineConfig,
}

impl PassLedger {
    pub fn new(db: Arc<Database>, config: EngineConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Roll the daily counter window if the stored day is stale. Applies at
    /// most once per day per user regardless of concurrent callers.
    fn roll_window(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let today = to_date(now);
        with_retry(|| self.db.roll_daily_window(user_id, &today, self.config.daily_passes))?;
        Ok(())
    }

    /// Current engagement row with the daily window already rolled.
    pub fn snapshot(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<UserRow>> {
        let id = user_id.to_string();
        self.roll_window(&id, now)?;
        self.db.get_user_by_id(&id)
    }

    /// Consume one pass, or explain why not. For free users this is a
    /// conditional decrement: the balance can never go negative, and
    /// concurrent attempts on the same account succeed at most
    /// `passes_left` times total.
    pub fn consume_pass(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<PassOutcome> {
        let id = user_id.to_string();
        self.roll_window(&id, now)?;

        let Some(user) = self.db.get_user_by_id(&id)? else {
            return Ok(PassOutcome::UnknownUser);
        };

        if user.is_premium {
            return Ok(PassOutcome::Unlimited);
        }

        if let Some(until) = parse_ts_opt(user.lock_until.as_deref()) {
            if now < until {
                return Ok(PassOutcome::StillLocked { until });
            }
        }

        match with_retry(|| self.db.try_consume_pass(&id))? {
            Some(remaining) => Ok(PassOutcome::Consumed { remaining }),
            None => Ok(PassOutcome::NoPassesLeft),
        }
    }

    /// Return the pass taken by a match creation that lost the pair race.
    pub fn refund_pass(&self, user_id: Uuid) -> Result<()> {
        with_retry(|| self.db.refund_pass(&user_id.to_string()))?;
        Ok(())
    }

    /// Count a finished match against the daily cap. The increment and the
    /// lock activation are one atomic statement. Returns the new count, or
    /// `None` for a deleted user.
    pub fn record_match_created(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<i64>> {
        let id = user_id.to_string();
        self.roll_window(&id, now)?;

        let lock_until = to_ts(now + self.config.lock_duration);
        with_retry(|| {
            self.db.record_match_and_maybe_lock(
                &id,
                &to_ts(now),
                &lock_until,
                self.config.daily_match_cap,
            )
        })
    }

    /// Apply a billing webhook's effect through the same conditional-write
    /// discipline as any other mutation.
    pub fn apply_billing_event(&self, user_id: Uuid, kind: BillingEventKind) -> Result<bool> {
        let id = user_id.to_string();
        match kind {
            BillingEventKind::PaymentCompleted | BillingEventKind::SubscriptionRenewed => {
                with_retry(|| self.db.apply_premium_upgrade(&id, self.config.daily_passes))
            }
            BillingEventKind::SubscriptionCancelled => {
                with_retry(|| self.db.apply_premium_downgrade(&id))
            }
        }
    }
}

/// `true` iff the user may create a match at `now`: premium, or has passes
/// and is not under a live lock.
pub fn can_match(user: &UserRow, now: DateTime<Utc>) -> bool {
    if user.is_premium {
        return true;
    }
    if user.passes_left <= 0 {
        return false;
    }
    match parse_ts_opt(user.lock_until.as_deref()) {
        Some(until) => now >= until,
        None => true,
    }
}

/// `max(0, lock_until - now)`; zero means unlocked.
pub fn time_remaining_on_lock(user: &UserRow, now: DateTime<Utc>) -> Duration {
    match parse_ts_opt(user.lock_until.as_deref()) {
        Some(until) if until > now => until - now,
        _ => Duration::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mingle_db::models::NewUser;

    fn setup(passes: i64) -> (Arc<Database>, PassLedger) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user(&NewUser {
            id: "00000000-0000-0000-0000-000000000001",
            username: "ana",
            password_hash: "x",
            display_name: "Ana",
            gender: "female",
            looking_for: "everyone",
            birth_year: 1995,
            min_age: 18,
            max_age: 99,
            max_distance_km: 25.0,
            passes_left: passes,
            counters_date: "2025-06-01",
        })
        .unwrap();
        let ledger = PassLedger::new(db.clone(), EngineConfig::default());
        (db, ledger)
    }

    fn uid() -> Uuid {
        "00000000-0000-0000-0000-000000000001".parse().unwrap()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn consumes_down_to_zero_then_refuses() {
        let (_db, ledger) = setup(2);
        assert_eq!(
            ledger.consume_pass(uid(), noon()).unwrap(),
            PassOutcome::Consumed { remaining: 1 }
        );
        assert_eq!(
            ledger.consume_pass(uid(), noon()).unwrap(),
            PassOutcome::Consumed { remaining: 0 }
        );
        assert_eq!(ledger.consume_pass(uid(), noon()).unwrap(), PassOutcome::NoPassesLeft);
    }

    #[test]
    fn concurrent_consumption_never_oversells() {
        let initial = 5;
        let (db, ledger) = setup(initial);

        let mut handles = vec![];
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(std::thread::spawn(move || {
                let mut wins: i64 = 0;
                for _ in 0..3 {
                    if matches!(
                        ledger.consume_pass(uid(), noon()).unwrap(),
                        PassOutcome::Consumed { .. }
                    ) {
                        wins += 1;
                    }
                }
                wins
            }));
        }

        let total: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // Exactly the initial allotment was consumed across all threads
        assert_eq!(total, initial);

        let row = db.get_user_by_id(&uid().to_string()).unwrap().unwrap();
        assert_eq!(row.passes_left, 0);
    }

    #[test]
    fn premium_is_unlimited_even_at_zero_balance() {
        let (db, ledger) = setup(0);
        db.apply_premium_upgrade(&uid().to_string(), 5).unwrap();
        // Upgrade refills, so drain back to zero first
        for _ in 0..5 {
            db.try_consume_pass(&uid().to_string()).unwrap();
        }
        assert_eq!(ledger.consume_pass(uid(), noon()).unwrap(), PassOutcome::Unlimited);
    }

    #[test]
    fn lock_blocks_until_it_elapses() {
        let (_db, ledger) = setup(5);
        // Reach the cap: two recorded matches
        ledger.record_match_created(uid(), noon()).unwrap();
        let count = ledger.record_match_created(uid(), noon()).unwrap();
        assert_eq!(count, Some(2));

        let until = noon() + Duration::hours(2);
        assert_eq!(
            ledger.consume_pass(uid(), noon()).unwrap(),
            PassOutcome::StillLocked { until }
        );
        // At the boundary the lock is over
        assert!(matches!(
            ledger.consume_pass(uid(), until).unwrap(),
            PassOutcome::Consumed { .. }
        ));
    }

    #[test]
    fn below_cap_leaves_lock_unset() {
        let (db, ledger) = setup(5);
        assert_eq!(ledger.record_match_created(uid(), noon()).unwrap(), Some(1));
        let row = db.get_user_by_id(&uid().to_string()).unwrap().unwrap();
        assert!(row.lock_until.is_none());
        assert!(can_match(&row, noon()));
    }

    #[test]
    fn lock_remaining_is_clamped_at_zero() {
        let (db, ledger) = setup(5);
        ledger.record_match_created(uid(), noon()).unwrap();
        ledger.record_match_created(uid(), noon()).unwrap();

        let row = db.get_user_by_id(&uid().to_string()).unwrap().unwrap();
        assert_eq!(time_remaining_on_lock(&row, noon()), Duration::hours(2));
        assert_eq!(
            time_remaining_on_lock(&row, noon() + Duration::hours(3)),
            Duration::zero()
        );
    }

    #[test]
    fn new_day_refills_passes_and_counter() {
        let (db, ledger) = setup(1);
        ledger.consume_pass(uid(), noon()).unwrap();
        assert_eq!(ledger.consume_pass(uid(), noon()).unwrap(), PassOutcome::NoPassesLeft);

        let tomorrow = noon() + Duration::days(1);
        assert!(matches!(
            ledger.consume_pass(uid(), tomorrow).unwrap(),
            PassOutcome::Consumed { remaining: 4 }
        ));
        let row = db.get_user_by_id(&uid().to_string()).unwrap().unwrap();
        assert_eq!(row.matches_today, 0);
    }

    #[test]
    fn billing_upgrade_clears_lock_and_refills() {
        let (db, ledger) = setup(5);
        ledger.record_match_created(uid(), noon()).unwrap();
        ledger.record_match_created(uid(), noon()).unwrap();

        ledger
            .apply_billing_event(uid(), BillingEventKind::PaymentCompleted)
            .unwrap();

        let row = db.get_user_by_id(&uid().to_string()).unwrap().unwrap();
        assert!(row.is_premium);
        assert!(row.lock_until.is_none());
        assert_eq!(row.passes_left, 5);
        assert_eq!(ledger.consume_pass(uid(), noon()).unwrap(), PassOutcome::Unlimited);
    }

    #[test]
    fn unknown_user_is_a_typed_outcome() {
        let (_db, ledger) = setup(5);
        let ghost: Uuid = "00000000-0000-0000-0000-00000000dead".parse().unwrap();
        assert_eq!(ledger.consume_pass(ghost, noon()).unwrap(), PassOutcome::UnknownUser);
    }
}
