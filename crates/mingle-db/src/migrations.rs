use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE,
                password            TEXT NOT NULL,
                display_name        TEXT NOT NULL,
                gender              TEXT NOT NULL,
                looking_for         TEXT NOT NULL,
                birth_year          INTEGER NOT NULL,
                min_age             INTEGER NOT NULL DEFAULT 18,
                max_age             INTEGER NOT NULL DEFAULT 99,
                max_distance_km     REAL NOT NULL DEFAULT 25.0,
                lat                 REAL,
                lng                 REAL,
                geocell             TEXT,
                is_premium          INTEGER NOT NULL DEFAULT 0,
                passes_left         INTEGER NOT NULL DEFAULT 0 CHECK (passes_left >= 0),
                matches_today       INTEGER NOT NULL DEFAULT 0,
                lock_until          TEXT,
                last_match_at       TEXT,
                counters_date       TEXT NOT NULL,
                checked_in_venue    TEXT,
                checkin_expires_at  TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_users_geocell
                ON users(geocell) WHERE checked_in_venue IS NOT NULL;

            CREATE TABLE venues (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                lat             REAL NOT NULL,
                lng             REAL NOT NULL,
                geocell         TEXT NOT NULL,
                checkin_count   INTEGER NOT NULL DEFAULT 0,
                match_count     INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Venue-side presence set. user_id is deliberately not a foreign
            -- key: a member row may outlive its user, and the reaper is the
            -- process that corrects that.
            CREATE TABLE venue_members (
                venue_id        TEXT NOT NULL REFERENCES venues(id),
                user_id         TEXT NOT NULL,
                checked_in_at   TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (venue_id, user_id)
            );

            CREATE TABLE matches (
                id          TEXT PRIMARY KEY,
                user_a      TEXT NOT NULL,
                user_b      TEXT NOT NULL,
                venue_id    TEXT,
                status      TEXT NOT NULL DEFAULT 'active',
                created_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE INDEX idx_matches_active_expiry
                ON matches(expires_at) WHERE status = 'active';

            CREATE TABLE swipes (
                swiper_id   TEXT NOT NULL,
                target_id   TEXT NOT NULL,
                liked       INTEGER NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (swiper_id, target_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
