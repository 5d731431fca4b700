//! Persistent per-(IP, user) success-count store
//!
//! SQLite-backed accumulator. Counts only ever increase, and the ingestion
//! cursor advances in the same transaction that applies them, so an
//! interrupted run recovers to the pre-merge state and a re-run of the
//! same log slice cannot double-count.

use crate::error::{Result, WhitelistError};
use crate::extract::{LoginEvent, Outcome};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS login_counts (
    ip            TEXT NOT NULL,
    username      TEXT NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 0,
    last_seen     TEXT NOT NULL,
    PRIMARY KEY (ip, username)
);
CREATE TABLE IF NOT EXISTS ingest_cursor (
    id     INTEGER PRIMARY KEY CHECK (id = 0),
    offset INTEGER NOT NULL
);
";

/// Timestamp format used in the database
const DB_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// How long to wait on a concurrent writer before giving up with
/// [`WhitelistError::StoreBusy`]
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One persisted (IP, username) success tally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpUserCount {
    pub source_ip: String,
    pub username: String,
    pub success_count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Handle to the whitelist database
///
/// Single-writer discipline: `merge` runs under an immediate transaction,
/// so a second concurrent invocation fails fast with a retriable busy
/// error instead of corrupting state.
pub struct AggregateStore {
    conn: Connection,
}

impl AggregateStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, BUSY_TIMEOUT)
    }

    /// Open with an explicit lock wait, for callers that need to fail
    /// faster than the default
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn, busy_timeout)
    }

    /// In-memory store for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, BUSY_TIMEOUT)
    }

    fn init(conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// The persisted ingestion cursor, 0 for a fresh store
    pub fn cursor(&self) -> Result<u64> {
        let offset: Option<i64> = self
            .conn
            .query_row("SELECT offset FROM ingest_cursor WHERE id = 0", [], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(offset.unwrap_or(0).max(0) as u64)
    }

    /// Apply a batch of events and advance the cursor, atomically
    ///
    /// Failure events are ignored; each success increments its (ip, user)
    /// tally by one. Either the counts and the cursor both commit, or
    /// neither does. Returns the number of events applied.
    pub fn merge(&mut self, events: &[LoginEvent], new_cursor: u64) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut applied = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO login_counts (ip, username, success_count, last_seen)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT (ip, username) DO UPDATE SET
                     success_count = success_count + 1,
                     last_seen = MAX(last_seen, excluded.last_seen)",
            )?;

            for event in events.iter().filter(|e| e.outcome == Outcome::Success) {
                stmt.execute(params![
                    event.source_ip,
                    event.username,
                    event.timestamp.format(DB_TIME_FORMAT).to_string(),
                ])?;
                applied += 1;
            }
        }

        tx.execute(
            "INSERT INTO ingest_cursor (id, offset) VALUES (0, ?1)
             ON CONFLICT (id) DO UPDATE SET offset = excluded.offset",
            params![new_cursor as i64],
        )?;

        tx.commit()?;
        Ok(applied)
    }

    /// All persisted tallies, ordered by (ip, username)
    pub fn all_counts(&self) -> Result<Vec<IpUserCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT ip, username, success_count, last_seen
             FROM login_counts
             ORDER BY ip, username",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (source_ip, username, success_count, last_seen) = row?;
            let last_seen = parse_db_time(&last_seen)?;
            counts.push(IpUserCount {
                source_ip,
                username,
                success_count: success_count.max(0) as u64,
                last_seen,
            });
        }

        Ok(counts)
    }
}

fn parse_db_time(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, DB_TIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| WhitelistError::InvalidData(format!("bad timestamp {:?}", s)))
}
