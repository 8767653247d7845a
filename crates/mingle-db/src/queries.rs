use anyhow::Result;
use rusqlite::Row;

use crate::Database;
use crate::models::{MatchRow, MemberState, NewUser, UserRow, VenueRow};

const USER_COLS: &str = "id, username, password, display_name, gender, looking_for, birth_year, \
     min_age, max_age, max_distance_km, lat, lng, geocell, is_premium, passes_left, \
     matches_today, lock_until, last_match_at, counters_date, checked_in_venue, \
     checkin_expires_at, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        gender: row.get(4)?,
        looking_for: row.get(5)?,
        birth_year: row.get(6)?,
        min_age: row.get(7)?,
        max_age: row.get(8)?,
        max_distance_km: row.get(9)?,
        lat: row.get(10)?,
        lng: row.get(11)?,
        geocell: row.get(12)?,
        is_premium: row.get(13)?,
        passes_left: row.get(14)?,
        matches_today: row.get(15)?,
        lock_until: row.get(16)?,
        last_match_at: row.get(17)?,
        counters_date: row.get(18)?,
        checked_in_venue: row.get(19)?,
        checkin_expires_at: row.get(20)?,
        created_at: row.get(21)?,
    })
}

fn match_from_row(row: &Row) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        venue_id: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        expires_at: row.get(6)?,
        resolved_at: row.get(7)?,
    })
}

const MATCH_COLS: &str = "id, user_a, user_b, venue_id, status, created_at, expires_at, resolved_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, display_name, gender, looking_for,
                                    birth_year, min_age, max_age, max_distance_km,
                                    passes_left, counters_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.password_hash,
                    user.display_name,
                    user.gender,
                    user.looking_for,
                    user.birth_year,
                    user.min_age,
                    user.max_age,
                    user.max_distance_km,
                    user.passes_left,
                    user.counters_date,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE username = ?1"),
                [username],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn update_location(&self, id: &str, lat: f64, lng: f64, geocell: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET lat = ?2, lng = ?3, geocell = ?4 WHERE id = ?1",
                rusqlite::params![id, lat, lng, geocell],
            )?;
            Ok(n > 0)
        })
    }

    /// Hard account deletion. Membership and swipes go with the row; match
    /// records are left for the timeout sweep.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM venue_members WHERE user_id = ?1", [id])?;
            conn.execute(
                "DELETE FROM swipes WHERE swiper_id = ?1 OR target_id = ?1",
                [id],
            )?;
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Ledger --

    /// Reset the daily counters if the stored day is stale. Conditional on
    /// the old date so concurrent rolls apply at most once.
    pub fn roll_daily_window(&self, id: &str, today: &str, daily_passes: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET passes_left = ?3, matches_today = 0, counters_date = ?2
                 WHERE id = ?1 AND counters_date <> ?2",
                rusqlite::params![id, today, daily_passes],
            )?;
            Ok(n > 0)
        })
    }

    /// Conditional decrement: applies only while the pre-image is positive.
    /// Returns the new balance, or `None` on a lost race / exhaustion — the
    /// balance can never go negative.
    pub fn try_consume_pass(&self, id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "UPDATE users SET passes_left = passes_left - 1
                 WHERE id = ?1 AND passes_left > 0
                 RETURNING passes_left",
                [id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Compensating write for the pass consumed by a match creation that
    /// lost the pair race.
    pub fn refund_pass(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET passes_left = passes_left + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(n > 0)
        })
    }

    /// Increment the daily match counter and, if a free account reaches the
    /// cap, set the lock in the same statement — no window where the counter
    /// exceeds the cap without a lock. Returns the new count, or `None` if
    /// the user row is gone.
    pub fn record_match_and_maybe_lock(
        &self,
        id: &str,
        now_ts: &str,
        lock_until_ts: &str,
        daily_cap: i64,
    ) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "UPDATE users SET
                     matches_today = matches_today + 1,
                     last_match_at = ?2,
                     lock_until = CASE
                         WHEN is_premium = 0 AND matches_today + 1 >= ?4 THEN ?3
                         ELSE lock_until
                     END
                 WHERE id = ?1
                 RETURNING matches_today",
                rusqlite::params![id, now_ts, lock_until_ts, daily_cap],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Billing webhook effect: premium on, passes refilled, lock cleared.
    pub fn apply_premium_upgrade(&self, id: &str, daily_passes: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET is_premium = 1, passes_left = ?2, lock_until = NULL
                 WHERE id = ?1",
                rusqlite::params![id, daily_passes],
            )?;
            Ok(n > 0)
        })
    }

    pub fn apply_premium_downgrade(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("UPDATE users SET is_premium = 0 WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Check-ins --

    pub fn set_user_checkin(&self, id: &str, venue_id: &str, expires_ts: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET checked_in_venue = ?2, checkin_expires_at = ?3 WHERE id = ?1",
                rusqlite::params![id, venue_id, expires_ts],
            )?;
            Ok(n > 0)
        })
    }

    /// Clear the user-side pointer, conditional on the venue observed by the
    /// caller — a concurrent re-check-in elsewhere wins and is left intact.
    pub fn clear_user_checkin(&self, id: &str, observed_venue: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET checked_in_venue = NULL, checkin_expires_at = NULL
                 WHERE id = ?1 AND checked_in_venue = ?2",
                rusqlite::params![id, observed_venue],
            )?;
            Ok(n > 0)
        })
    }

    pub fn add_venue_member(&self, venue_id: &str, user_id: &str, now_ts: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO venue_members (venue_id, user_id, checked_in_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![venue_id, user_id, now_ts],
            )?;
            Ok(n > 0)
        })
    }

    pub fn remove_venue_member(&self, venue_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM venue_members WHERE venue_id = ?1 AND user_id = ?2",
                rusqlite::params![venue_id, user_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Remove the user from every venue set except (optionally) one — used
    /// when checking into a new venue to keep "at most one membership".
    pub fn remove_member_everywhere_except(
        &self,
        user_id: &str,
        keep_venue: Option<&str>,
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = match keep_venue {
                Some(keep) => conn.execute(
                    "DELETE FROM venue_members WHERE user_id = ?1 AND venue_id <> ?2",
                    rusqlite::params![user_id, keep],
                )?,
                None => conn.execute("DELETE FROM venue_members WHERE user_id = ?1", [user_id])?,
            };
            Ok(n)
        })
    }

    // -- Venues --

    pub fn create_venue(&self, id: &str, name: &str, lat: f64, lng: f64, geocell: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO venues (id, name, lat, lng, geocell) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, name, lat, lng, geocell],
            )?;
            Ok(())
        })
    }

    pub fn get_venue(&self, id: &str) -> Result<Option<VenueRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, lat, lng, geocell, checkin_count, match_count
                 FROM venues WHERE id = ?1",
                [id],
                |row| {
                    Ok(VenueRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        lat: row.get(2)?,
                        lng: row.get(3)?,
                        geocell: row.get(4)?,
                        checkin_count: row.get(5)?,
                        match_count: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn list_venue_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM venues")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn venue_member_ids(&self, venue_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM venue_members WHERE venue_id = ?1")?;
            let ids = stmt
                .query_map([venue_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn venue_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM venues", [], |r| r.get(0))?)
        })
    }

    /// Stats are counters only, not invariant-bearing.
    pub fn bump_venue_checkin_count(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE venues SET checkin_count = checkin_count + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    pub fn bump_venue_match_count(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE venues SET match_count = match_count + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    // -- Reaper --

    /// Venue-side member rows joined to the users they claim, so the sweep
    /// can apply its eviction rules in one read.
    pub fn venue_member_states(&self, venue_id: &str) -> Result<Vec<MemberState>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT vm.user_id, u.id IS NOT NULL, u.checked_in_venue, u.checkin_expires_at
                 FROM venue_members vm
                 LEFT JOIN users u ON u.id = vm.user_id
                 WHERE vm.venue_id = ?1",
            )?;
            let rows = stmt
                .query_map([venue_id], |row| {
                    Ok(MemberState {
                        user_id: row.get(0)?,
                        user_exists: row.get(1)?,
                        checked_in_venue: row.get(2)?,
                        checkin_expires_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Matches --

    /// Guarded upsert: creates (or re-creates over a resolved record) the
    /// pair's match, refusing to touch a row that is still active. The
    /// affected-row count is the race verdict — 0 means another client
    /// created this session first.
    pub fn upsert_active_match(
        &self,
        id: &str,
        user_a: &str,
        user_b: &str,
        venue_id: Option<&str>,
        created_ts: &str,
        expires_ts: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT INTO matches (id, user_a, user_b, venue_id, created_at, expires_at, status, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', NULL)
                 ON CONFLICT(id) DO UPDATE SET
                     venue_id = excluded.venue_id,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at,
                     status = 'active',
                     resolved_at = NULL
                 WHERE matches.status <> 'active'",
                rusqlite::params![id, user_a, user_b, venue_id, created_ts, expires_ts],
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_match(&self, id: &str) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {MATCH_COLS} FROM matches WHERE id = ?1"),
                [id],
                match_from_row,
            )
            .optional()
        })
    }

    /// The single terminal transition: resolve only while still active.
    /// Exactly one caller ever sees `true` for a given match.
    pub fn resolve_match_if_active(&self, id: &str, status: &str, resolved_ts: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE matches SET status = ?2, resolved_at = ?3
                 WHERE id = ?1 AND status = 'active'",
                rusqlite::params![id, status, resolved_ts],
            )?;
            Ok(n > 0)
        })
    }

    /// Explicit-resolution variant: additionally requires the deadline not to
    /// have passed, so a late tap loses to the timeout path.
    pub fn resolve_match_if_live(&self, id: &str, status: &str, now_ts: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE matches SET status = ?2, resolved_at = ?3
                 WHERE id = ?1 AND status = 'active' AND expires_at > ?3",
                rusqlite::params![id, status, now_ts],
            )?;
            Ok(n > 0)
        })
    }

    /// Timeout variant: only fires once the deadline has passed.
    pub fn resolve_match_if_expired(&self, id: &str, now_ts: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE matches SET status = 'timeout', resolved_at = ?2
                 WHERE id = ?1 AND status = 'active' AND expires_at <= ?2",
                rusqlite::params![id, now_ts],
            )?;
            Ok(n > 0)
        })
    }

    pub fn list_expired_active(&self, now_ts: &str) -> Result<Vec<MatchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLS} FROM matches
                 WHERE status = 'active' AND expires_at <= ?1"
            ))?;
            let rows = stmt
                .query_map([now_ts], match_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Swipes --

    pub fn upsert_swipe(&self, swiper: &str, target: &str, liked: bool, now_ts: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO swipes (swiper_id, target_id, liked, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(swiper_id, target_id) DO UPDATE SET liked = excluded.liked",
                rusqlite::params![swiper, target, liked, now_ts],
            )?;
            Ok(())
        })
    }

    /// `Some(liked)` if the swipe exists.
    pub fn get_swipe(&self, swiper: &str, target: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT liked FROM swipes WHERE swiper_id = ?1 AND target_id = ?2",
                rusqlite::params![swiper, target],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Coarse candidate pre-filter: checked-in users in the covering cell
    /// set, minus self and anyone already swiped. Exact distance and
    /// preference filtering happen in the engine.
    pub fn candidates_in_cells(&self, user_id: &str, cells: &[String]) -> Result<Vec<UserRow>> {
        if cells.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=cells.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLS} FROM users
                 WHERE checked_in_venue IS NOT NULL
                   AND geocell IN ({})
                   AND id <> ?1
                   AND NOT EXISTS (SELECT 1 FROM swipes
                                   WHERE swiper_id = ?1 AND target_id = users.id)",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&user_id];
            for cell in cells {
                params.push(cell);
            }

            let rows = stmt
                .query_map(params.as_slice(), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    fn test_user<'a>(id: &'a str, username: &'a str) -> NewUser<'a> {
        NewUser {
            id,
            username,
            password_hash: "x",
            display_name: username,
            gender: "female",
            looking_for: "everyone",
            birth_year: 1995,
            min_age: 18,
            max_age: 99,
            max_distance_km: 25.0,
            passes_left: 5,
            counters_date: "2025-06-01",
        }
    }

    #[test]
    fn consume_pass_stops_at_zero() {
        let db = Database::open_in_memory().unwrap();
        let mut user = test_user("u1", "ana");
        user.passes_left = 2;
        db.create_user(&user).unwrap();

        assert_eq!(db.try_consume_pass("u1").unwrap(), Some(1));
        assert_eq!(db.try_consume_pass("u1").unwrap(), Some(0));
        assert_eq!(db.try_consume_pass("u1").unwrap(), None);
        assert_eq!(db.try_consume_pass("u1").unwrap(), None);

        let row = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(row.passes_left, 0);
    }

    #[test]
    fn record_match_locks_at_cap_in_one_statement() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("u1", "ana")).unwrap();

        let count = db
            .record_match_and_maybe_lock("u1", "2025-06-01 12:00:00", "2025-06-01 14:00:00", 2)
            .unwrap();
        assert_eq!(count, Some(1));
        assert!(db.get_user_by_id("u1").unwrap().unwrap().lock_until.is_none());

        let count = db
            .record_match_and_maybe_lock("u1", "2025-06-01 12:30:00", "2025-06-01 14:30:00", 2)
            .unwrap();
        assert_eq!(count, Some(2));
        let row = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(row.lock_until.as_deref(), Some("2025-06-01 14:30:00"));
    }

    #[test]
    fn premium_never_locks() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("u1", "ana")).unwrap();
        db.apply_premium_upgrade("u1", 5).unwrap();

        for _ in 0..4 {
            db.record_match_and_maybe_lock("u1", "2025-06-01 12:00:00", "2025-06-01 14:00:00", 2)
                .unwrap();
        }
        assert!(db.get_user_by_id("u1").unwrap().unwrap().lock_until.is_none());
    }

    #[test]
    fn daily_roll_applies_once() {
        let db = Database::open_in_memory().unwrap();
        let mut user = test_user("u1", "ana");
        user.passes_left = 0;
        db.create_user(&user).unwrap();

        assert!(db.roll_daily_window("u1", "2025-06-02", 5).unwrap());
        assert!(!db.roll_daily_window("u1", "2025-06-02", 5).unwrap());

        let row = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(row.passes_left, 5);
        assert_eq!(row.matches_today, 0);
        assert_eq!(row.counters_date, "2025-06-02");
    }

    #[test]
    fn upsert_active_match_refuses_while_active() {
        let db = Database::open_in_memory().unwrap();

        assert!(db
            .upsert_active_match("m1", "a", "b", None, "2025-06-01 12:00:00", "2025-06-01 12:10:00")
            .unwrap());
        // Second creation loses while the first is live
        assert!(!db
            .upsert_active_match("m1", "a", "b", None, "2025-06-01 12:01:00", "2025-06-01 12:11:00")
            .unwrap());

        // After resolution the pair can re-match under the same id
        assert!(db
            .resolve_match_if_active("m1", "passed", "2025-06-01 12:05:00")
            .unwrap());
        assert!(db
            .upsert_active_match("m1", "a", "b", None, "2025-06-01 13:00:00", "2025-06-01 13:10:00")
            .unwrap());
    }

    #[test]
    fn exactly_one_terminal_transition() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_active_match("m1", "a", "b", None, "2025-06-01 12:00:00", "2025-06-01 12:10:00")
            .unwrap();

        assert!(db.resolve_match_if_live("m1", "meet", "2025-06-01 12:05:00").unwrap());
        assert!(!db.resolve_match_if_expired("m1", "2025-06-01 12:11:00").unwrap());
        assert!(!db.resolve_match_if_active("m1", "passed", "2025-06-01 12:06:00").unwrap());

        let row = db.get_match("m1").unwrap().unwrap();
        assert_eq!(row.status, "meet");
        assert_eq!(row.resolved_at.as_deref(), Some("2025-06-01 12:05:00"));
    }

    #[test]
    fn timeout_requires_deadline_passed() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_active_match("m1", "a", "b", None, "2025-06-01 12:00:00", "2025-06-01 12:10:00")
            .unwrap();

        assert!(!db.resolve_match_if_expired("m1", "2025-06-01 12:09:59").unwrap());
        assert!(db.resolve_match_if_expired("m1", "2025-06-01 12:10:00").unwrap());
    }

    #[test]
    fn explicit_resolution_loses_after_deadline() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_active_match("m1", "a", "b", None, "2025-06-01 12:00:00", "2025-06-01 12:10:00")
            .unwrap();

        assert!(!db.resolve_match_if_live("m1", "meet", "2025-06-01 12:10:00").unwrap());
        assert!(db.resolve_match_if_expired("m1", "2025-06-01 12:10:00").unwrap());
    }

    #[test]
    fn candidates_exclude_swiped_and_self() {
        let db = Database::open_in_memory().unwrap();
        for (id, name) in [("u1", "ana"), ("u2", "bo"), ("u3", "cy")] {
            db.create_user(&test_user(id, name)).unwrap();
            db.update_location(id, 40.0, -74.0, "dr5reg").unwrap();
            db.set_user_checkin(id, "v1", "2025-06-01 15:00:00").unwrap();
        }
        db.upsert_swipe("u1", "u2", false, "2025-06-01 12:00:00").unwrap();

        let cells = vec!["dr5reg".to_string()];
        let found = db.candidates_in_cells("u1", &cells).unwrap();
        let ids: Vec<&str> = found.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u3"]);
    }
}
