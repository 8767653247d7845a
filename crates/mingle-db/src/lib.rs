pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}

// -- Timestamps --

/// SQLite's `datetime('now')` format. Lexicographic order equals time order,
/// so expiry predicates compare directly inside SQL.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn to_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

pub fn to_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

pub fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|ndt| ndt.and_utc())
        .or_else(|_| s.parse::<DateTime<Utc>>())
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}

pub fn parse_ts_opt(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.map(parse_ts)
}

// -- Bounded retry --

const RETRY_ATTEMPTS: u32 = 3;

/// Retry a store operation a bounded number of times on SQLITE_BUSY /
/// SQLITE_LOCKED, with backoff. Anything else propagates immediately.
pub fn with_retry<T>(mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Err(e) if attempt + 1 < RETRY_ATTEMPTS && is_busy(&e) => {
                attempt += 1;
                let delay = Duration::from_millis(10 << (2 * attempt));
                warn!("Store busy (attempt {}), retrying in {:?}", attempt, delay);
                std::thread::sleep(delay);
            }
            other => return other,
        }
    }
}

fn is_busy(e: &anyhow::Error) -> bool {
    e.downcast_ref::<rusqlite::Error>()
        .and_then(|e| e.sqlite_error_code())
        .map(|code| {
            matches!(
                code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ts_round_trip() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 1, 13, 45, 9).unwrap();
        assert_eq!(to_ts(dt), "2025-06-01 13:45:09");
        assert_eq!(parse_ts(&to_ts(dt)), dt);
    }

    #[test]
    fn ts_order_is_lexicographic() {
        let early = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert!(to_ts(early) < to_ts(late));
    }

    #[test]
    fn parse_accepts_rfc3339_fallback() {
        let dt = parse_ts("2025-06-01T13:45:09Z");
        assert_eq!(to_ts(dt), "2025-06-01 13:45:09");
    }
}
