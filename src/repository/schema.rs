//! Schema creation and forward migrations.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::{now_timestamp, RepositoryError, Result};

/// Version written by this build.
pub const SCHEMA_VERSION: i64 = 1;

/// Statements that bring a database from `version - 1` to `version`.
///
/// Version 1 is the base schema and has no entry.
const MIGRATIONS: &[(i64, &[&str])] = &[];

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id             INTEGER PRIMARY KEY CHECK (id = 1),
    version        INTEGER NOT NULL,
    applied_at     TEXT NOT NULL,
    description    TEXT
);

CREATE TABLE IF NOT EXISTS places (
    place_id       TEXT PRIMARY KEY,
    place_name     TEXT,
    original_url   TEXT NOT NULL,
    resolved_url   TEXT,
    latitude       REAL,
    longitude      REAL,
    first_seen     TEXT NOT NULL,
    last_scraped   TEXT,
    total_reviews  INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS place_aliases (
    alias_id       TEXT PRIMARY KEY,
    canonical_id   TEXT NOT NULL,
    original_url   TEXT,
    created_at     TEXT NOT NULL,
    FOREIGN KEY (canonical_id) REFERENCES places(place_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS scrape_sessions (
    session_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    place_id        TEXT NOT NULL,
    action          TEXT NOT NULL DEFAULT 'scrape',
    started_at      TEXT NOT NULL,
    completed_at    TEXT,
    status          TEXT NOT NULL DEFAULT 'running',
    reviews_found   INTEGER DEFAULT 0,
    reviews_new     INTEGER DEFAULT 0,
    reviews_updated INTEGER DEFAULT 0,
    sort_by         TEXT,
    error_message   TEXT,
    FOREIGN KEY (place_id) REFERENCES places(place_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS reviews (
    review_id            TEXT NOT NULL,
    place_id             TEXT NOT NULL,
    author               TEXT,
    rating               REAL,
    review_text          TEXT,
    review_date          TEXT,
    raw_date             TEXT,
    likes                INTEGER DEFAULT 0,
    user_images          TEXT,
    s3_images            TEXT,
    profile_url          TEXT,
    profile_picture      TEXT,
    s3_profile_picture   TEXT,
    owner_responses      TEXT,
    created_date         TEXT NOT NULL,
    last_modified        TEXT NOT NULL,
    last_seen_session    INTEGER,
    last_changed_session INTEGER,
    is_deleted           INTEGER DEFAULT 0,
    content_hash         TEXT,
    engagement_hash      TEXT,
    row_version          INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (review_id, place_id),
    FOREIGN KEY (place_id) REFERENCES places(place_id) ON DELETE CASCADE,
    FOREIGN KEY (last_seen_session) REFERENCES scrape_sessions(session_id) ON DELETE SET NULL,
    FOREIGN KEY (last_changed_session) REFERENCES scrape_sessions(session_id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS review_history (
    history_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    review_id           TEXT NOT NULL,
    place_id            TEXT NOT NULL,
    session_id          INTEGER,
    actor               TEXT NOT NULL DEFAULT 'scraper',
    action              TEXT NOT NULL,
    changed_fields      TEXT,
    old_content_hash    TEXT,
    new_content_hash    TEXT,
    old_engagement_hash TEXT,
    new_engagement_hash TEXT,
    timestamp           TEXT NOT NULL,
    FOREIGN KEY (review_id, place_id) REFERENCES reviews(review_id, place_id) ON DELETE CASCADE,
    FOREIGN KEY (place_id) REFERENCES places(place_id) ON DELETE CASCADE,
    FOREIGN KEY (session_id) REFERENCES scrape_sessions(session_id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS sync_checkpoints (
    place_id            TEXT NOT NULL,
    target              TEXT NOT NULL,
    last_synced_at      TEXT,
    last_synced_session INTEGER,
    cursor_review_id    TEXT,
    cursor_updated_at   TEXT,
    attempt_count       INTEGER DEFAULT 0,
    status              TEXT DEFAULT 'ok',
    error_message       TEXT,
    PRIMARY KEY (place_id, target),
    FOREIGN KEY (place_id) REFERENCES places(place_id) ON DELETE CASCADE,
    FOREIGN KEY (last_synced_session) REFERENCES scrape_sessions(session_id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_reviews_place ON reviews(place_id);
CREATE INDEX IF NOT EXISTS idx_reviews_date ON reviews(place_id, review_date);
CREATE INDEX IF NOT EXISTS idx_reviews_hash ON reviews(place_id, content_hash);
CREATE INDEX IF NOT EXISTS idx_reviews_deleted ON reviews(place_id, is_deleted);
CREATE INDEX IF NOT EXISTS idx_reviews_modified ON reviews(place_id, last_modified);
CREATE INDEX IF NOT EXISTS idx_reviews_changed_session ON reviews(last_changed_session);
CREATE INDEX IF NOT EXISTS idx_sessions_place ON scrape_sessions(place_id);
CREATE INDEX IF NOT EXISTS idx_sessions_action ON scrape_sessions(action);
CREATE INDEX IF NOT EXISTS idx_aliases_canonical ON place_aliases(canonical_id);
CREATE INDEX IF NOT EXISTS idx_history_review ON review_history(review_id, place_id);
CREATE INDEX IF NOT EXISTS idx_history_session ON review_history(session_id);
CREATE INDEX IF NOT EXISTS idx_history_action ON review_history(action);
CREATE INDEX IF NOT EXISTS idx_sync_target ON sync_checkpoints(target);
"#;

/// Create missing tables, then stamp or migrate the version marker.
pub(crate) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = init_schema_locked(conn, MIGRATIONS);
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn init_schema_locked(conn: &Connection, migrations: &[(i64, &[&str])]) -> Result<()> {
    conn.execute_batch(SCHEMA_DDL)?;

    match read_version(conn)? {
        None => {
            conn.execute(
                "INSERT INTO schema_version (id, version, applied_at, description)
                 VALUES (1, ?1, ?2, ?3)",
                params![
                    SCHEMA_VERSION,
                    now_timestamp(),
                    format!("Initial schema v{}", SCHEMA_VERSION)
                ],
            )?;
            info!(version = SCHEMA_VERSION, "Initialized review database schema");
        }
        Some(found) if found > SCHEMA_VERSION => {
            return Err(RepositoryError::SchemaTooNew {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        Some(found) if found < SCHEMA_VERSION => {
            apply_migrations(conn, found, SCHEMA_VERSION, migrations)?;
        }
        Some(_) => {}
    }
    Ok(())
}

fn apply_migrations(
    conn: &Connection,
    from: i64,
    to: i64,
    migrations: &[(i64, &[&str])],
) -> Result<()> {
    for version in (from + 1)..=to {
        let statements = migrations
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, stmts)| *stmts)
            .ok_or(RepositoryError::MissingMigration(version))?;

        for sql in statements {
            conn.execute_batch(sql)?;
        }
        conn.execute(
            "UPDATE schema_version SET version = ?1, applied_at = ?2, description = ?3
             WHERE id = 1",
            params![version, now_timestamp(), format!("Migration to v{}", version)],
        )?;
        info!(version, "Applied schema migration");
    }
    Ok(())
}

pub(crate) fn read_version(conn: &Connection) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?)
}
