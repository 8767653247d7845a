//! Check-In Expiry Reaper — periodic sweep that evicts stale check-ins
//! from venue presence sets.
//!
//! Eviction is venue-side only: the user-side pointer is corrected by the
//! user's own next check-in/out. The sweep is idempotent and tolerates one
//! venue failing without blocking the rest.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use mingle_db::{Database, parse_ts_opt};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapStats {
    pub venues: usize,
    pub scanned: usize,
    pub evicted: usize,
    pub failed_venues: usize,
}

pub fn sweep(db: &Database, now: DateTime<Utc>) -> Result<ReapStats> {
    let mut stats = ReapStats::default();

    for venue_id in db.list_venue_ids()? {
        stats.venues += 1;
        match sweep_venue(db, &venue_id, now) {
            Ok((scanned, evicted)) => {
                stats.scanned += scanned;
                stats.evicted += evicted;
            }
            Err(e) => {
                stats.failed_venues += 1;
                warn!("Reaper failed on venue {}: {}", venue_id, e);
            }
        }
    }

    if stats.evicted > 0 {
        debug!(
            "Reaper evicted {} of {} check-ins across {} venues",
            stats.evicted, stats.scanned, stats.venues
        );
    }
    Ok(stats)
}

fn sweep_venue(db: &Database, venue_id: &str, now: DateTime<Utc>) -> Result<(usize, usize)> {
    let members = db.venue_member_states(venue_id)?;
    let scanned = members.len();
    let mut evicted = 0;

    for member in members {
        let evict = if !member.user_exists {
            true // stale reference
        } else if member.checked_in_venue.as_deref() != Some(venue_id) {
            true // checked out, or into another venue
        } else {
            match parse_ts_opt(member.checkin_expires_at.as_deref()) {
                Some(expires_at) => now > expires_at,
                None => false,
            }
        };

        if evict && db.remove_venue_member(venue_id, &member.user_id)? {
            evicted += 1;
        }
    }

    Ok((scanned, evicted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mingle_db::models::NewUser;
    use mingle_db::to_ts;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_venue("v1", "The Night Owl", 40.7589, -73.9851, "dr5ru6").unwrap();
        db.create_venue("v2", "Dive Bar", 40.7306, -73.9866, "dr5rsk").unwrap();
        db
    }

    fn add_user(db: &Database, id: &str, name: &str) {
        db.create_user(&NewUser {
            id,
            username: name,
            password_hash: "x",
            display_name: name,
            gender: "female",
            looking_for: "everyone",
            birth_year: 1995,
            min_age: 18,
            max_age: 99,
            max_distance_km: 25.0,
            passes_left: 5,
            counters_date: "2025-06-01",
        })
        .unwrap();
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn evicts_member_with_no_user_row() {
        let db = setup();
        db.add_venue_member("v1", "ghost", &to_ts(noon())).unwrap();

        let stats = sweep(&db, noon()).unwrap();
        assert_eq!(stats.evicted, 1);
        assert!(db.venue_member_ids("v1").unwrap().is_empty());
    }

    #[test]
    fn evicts_member_pointing_elsewhere() {
        let db = setup();
        add_user(&db, "u1", "ana");
        // Venue-side says v1, user-side says v2 — the disagreement the
        // reaper exists to correct
        db.add_venue_member("v1", "u1", &to_ts(noon())).unwrap();
        db.set_user_checkin("u1", "v2", &to_ts(noon() + chrono::Duration::hours(3))).unwrap();
        db.add_venue_member("v2", "u1", &to_ts(noon())).unwrap();

        let stats = sweep(&db, noon()).unwrap();
        assert_eq!(stats.evicted, 1);
        assert!(db.venue_member_ids("v1").unwrap().is_empty());
        assert_eq!(db.venue_member_ids("v2").unwrap(), vec!["u1".to_string()]);
    }

    #[test]
    fn evicts_expired_checkin_but_leaves_user_pointer() {
        let db = setup();
        add_user(&db, "u1", "ana");
        // Expired one second ago
        db.set_user_checkin("u1", "v1", &to_ts(noon() - chrono::Duration::seconds(1)))
            .unwrap();
        db.add_venue_member("v1", "u1", &to_ts(noon() - chrono::Duration::hours(3)))
            .unwrap();

        let stats = sweep(&db, noon()).unwrap();
        assert_eq!(stats.evicted, 1);
        assert!(db.venue_member_ids("v1").unwrap().is_empty());

        // User-side pointer is deliberately left for the user's own next
        // check-in/out to fix
        let row = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(row.checked_in_venue.as_deref(), Some("v1"));
    }

    #[test]
    fn keeps_live_checkins() {
        let db = setup();
        add_user(&db, "u1", "ana");
        db.set_user_checkin("u1", "v1", &to_ts(noon() + chrono::Duration::hours(1)))
            .unwrap();
        db.add_venue_member("v1", "u1", &to_ts(noon())).unwrap();

        let stats = sweep(&db, noon()).unwrap();
        assert_eq!(stats.evicted, 0);
        assert_eq!(db.venue_member_ids("v1").unwrap(), vec!["u1".to_string()]);
    }

    #[test]
    fn second_sweep_is_a_no_op() {
        let db = setup();
        add_user(&db, "u1", "ana");
        db.set_user_checkin("u1", "v1", &to_ts(noon() - chrono::Duration::seconds(1)))
            .unwrap();
        db.add_venue_member("v1", "u1", &to_ts(noon() - chrono::Duration::hours(3)))
            .unwrap();
        db.add_venue_member("v2", "ghost", &to_ts(noon())).unwrap();

        let first = sweep(&db, noon()).unwrap();
        assert_eq!(first.evicted, 2);

        let second = sweep(&db, noon()).unwrap();
        assert_eq!(second.evicted, 0);
        assert_eq!(second.scanned, 0);
    }

    #[test]
    fn boundary_expiry_is_not_yet_evicted() {
        let db = setup();
        add_user(&db, "u1", "ana");
        db.set_user_checkin("u1", "v1", &to_ts(noon())).unwrap();
        db.add_venue_member("v1", "u1", &to_ts(noon())).unwrap();

        // `now > expires_at` is strict: at the boundary the check-in holds
        let stats = sweep(&db, noon()).unwrap();
        assert_eq!(stats.evicted, 0);
    }
}
