//! SQLite storage backend.
//!
//! A single connection behind an async mutex; a [`StoreTx`] owns the lock
//! for its lifetime, so `BEGIN IMMEDIATE` plus the mutex gives one writer
//! at a time and read-your-writes inside the transaction. States are stored
//! in explicit relational columns rather than JSON blobs.
//!
//! # Schema Versioning
//!
//! The database uses SQLite's `user_version` pragma to track schema
//! versions. When the schema changes, increment `SCHEMA_VERSION` and add a
//! migration step in `run_migrations`.


use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use super::{LockMode, Store, StoreTx};
use crate::domain::{
    DomainError, PullRequest, PullRequestId, PullRequestStatus, Team, TeamName, User, UserId,
};
use crate::error::Error;
use crate::idempotency::{
    hash_key, IdempotencyRecord, IdempotencyStore, StoredRequest, StoredResponse,
};

/// Current schema version. Increment when making schema changes.
const SCHEMA_VERSION: i32 = 1;

/// SQLite-backed [`Store`] (and [`IdempotencyStore`]).
///
/// `rusqlite::Connection` is not `Sync`, so the connection lives behind a
/// `tokio::sync::Mutex`; transactions take the lock as an owned guard and
/// carry it across awaits.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database file at the given path and run any
    /// pending migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {:?}", path))?;
        Self::from_connection(conn)
    }

    /// In-memory database, for testing.
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_pragmas(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn init_pragmas(conn: &Connection) -> Result<()> {
    // In-memory databases report "memory" instead of "wal".
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get(0)
    })?;
    if mode != "wal" && mode != "memory" {
        anyhow::bail!("unexpected journal mode {mode:?}");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;
    Ok(())
}

/// Initialize the schema, running migrations from the persisted
/// `user_version` up to [`SCHEMA_VERSION`].
fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current_version > SCHEMA_VERSION {
        anyhow::bail!(
            "Database schema version {} is newer than supported version {}. \
             Please upgrade the application.",
            current_version,
            SCHEMA_VERSION
        );
    }

    if current_version < SCHEMA_VERSION {
        run_migrations(conn, current_version)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

fn run_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    if from_version < 1 {
        migrate_v0_to_v1(conn)?;
    }

    // Future migrations go here:
    // if from_version < 2 {
    //     migrate_v1_to_v2(conn)?;
    // }

    Ok(())
}

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            team_name TEXT PRIMARY KEY,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            team_name TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_team ON users(team_name);

        CREATE TABLE IF NOT EXISTS pull_requests (
            pull_request_id TEXT PRIMARY KEY,
            pull_request_name TEXT NOT NULL,
            author_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('OPEN', 'MERGED')),
            created_at TEXT NOT NULL,
            merged_at TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pull_request_reviewers (
            pull_request_id TEXT NOT NULL,
            reviewer_id TEXT NOT NULL,
            slot INTEGER NOT NULL,
            PRIMARY KEY (pull_request_id, reviewer_id)
        );
        CREATE INDEX IF NOT EXISTS idx_reviewers_reviewer
        ON pull_request_reviewers(reviewer_id);

        CREATE TABLE IF NOT EXISTS idempotency_keys (
            key_hash BLOB PRIMARY KEY,
            method TEXT NOT NULL,
            path TEXT NOT NULL,
            request_body BLOB NOT NULL,
            status_code INTEGER NOT NULL,
            response_body BLOB NOT NULL,
            response_headers TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_idempotency_expiry
        ON idempotency_keys(expires_at);
        "#,
    )
    .context("Failed to create initial schema (v0 -> v1)")?;

    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, Error> {
        let conn = Arc::clone(&self.conn).lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| Error::storage("begin transaction", e.to_string()))?;
        Ok(Box::new(SqliteTx {
            conn,
            finished: false,
        }))
    }

    async fn ping(&self) -> Result<(), Error> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| Error::storage("ping", e.to_string()))
    }
}

struct SqliteTx {
    conn: OwnedMutexGuard<Connection>,
    finished: bool,
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn save_team(&mut self, team: &Team) -> Result<(), Error> {
        let now = encode_ts(Utc::now());
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO teams (team_name, updated_at) VALUES (?1, ?2)",
                params![team.name().as_str(), now],
            )
            .map_err(|e| Error::storage("save_team", e.to_string()))?;
        if inserted == 0 {
            return Err(DomainError::TeamExists.into());
        }

        for member in team.members() {
            upsert_user(&self.conn, &member, &now)?;
        }
        Ok(())
    }

    async fn get_team(&mut self, name: &TeamName) -> Result<Team, Error> {
        match self.conn.query_row(
            "SELECT 1 FROM teams WHERE team_name = ?1",
            params![name.as_str()],
            |_| Ok(()),
        ) {
            Ok(()) => {}
            Err(rusqlite::Error::QueryReturnedNoRows) => return Err(Error::NotFound("team")),
            Err(e) => return Err(Error::storage("get_team", e.to_string())),
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT user_id, username, is_active FROM users WHERE team_name = ?1",
            )
            .map_err(|e| Error::storage("get_team", e.to_string()))?;
        let rows = stmt
            .query_map(params![name.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })
            .map_err(|e| Error::storage("get_team", e.to_string()))?;

        let mut members = Vec::new();
        for row in rows {
            let (user_id, username, is_active) =
                row.map_err(|e| Error::storage("get_team", e.to_string()))?;
            let user = User::new(UserId::new(user_id), &username, name.clone(), is_active)
                .map_err(|e| Error::storage("get_team", e.to_string()))?;
            members.push(user);
        }
        Team::new(name.clone(), members).map_err(|e| Error::storage("get_team", e.to_string()))
    }

    async fn get_user(&mut self, id: &UserId) -> Result<User, Error> {
        fetch_user(&self.conn, id)
    }

    async fn set_user_activity(&mut self, id: &UserId, active: bool) -> Result<User, Error> {
        let updated = self
            .conn
            .execute(
                "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![active, encode_ts(Utc::now()), id.as_str()],
            )
            .map_err(|e| Error::storage("set_user_activity", e.to_string()))?;
        if updated == 0 {
            return Err(Error::NotFound("user"));
        }
        fetch_user(&self.conn, id)
    }

    async fn insert_pull_request(&mut self, pr: &PullRequest) -> Result<(), Error> {
        let result = self.conn.execute(
            "INSERT INTO pull_requests \
             (pull_request_id, pull_request_name, author_id, status, created_at, merged_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                pr.id().as_str(),
                pr.name(),
                pr.author_id().as_str(),
                pr.status().as_str(),
                encode_ts(pr.created_at()),
                pr.merged_at().map(encode_ts),
                encode_ts(pr.last_update()),
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(DomainError::PullRequestExists.into());
            }
            Err(e) => return Err(Error::storage("insert_pull_request", e.to_string())),
        }
        replace_reviewers(&self.conn, pr)
    }

    async fn get_pull_request(
        &mut self,
        id: &PullRequestId,
        _lock: LockMode,
    ) -> Result<PullRequest, Error> {
        // BEGIN IMMEDIATE plus the connection mutex already serialize
        // writers, which subsumes the per-row lock request.
        fetch_pull_request(&self.conn, id)
    }

    async fn update_pull_request(&mut self, pr: &PullRequest) -> Result<(), Error> {
        let updated = self
            .conn
            .execute(
                "UPDATE pull_requests SET pull_request_name = ?1, status = ?2, \
                 merged_at = ?3, updated_at = ?4 WHERE pull_request_id = ?5",
                params![
                    pr.name(),
                    pr.status().as_str(),
                    pr.merged_at().map(encode_ts),
                    encode_ts(pr.last_update()),
                    pr.id().as_str(),
                ],
            )
            .map_err(|e| Error::storage("update_pull_request", e.to_string()))?;
        if updated == 0 {
            return Err(Error::NotFound("pull request"));
        }
        replace_reviewers(&self.conn, pr)
    }

    async fn pull_requests_by_reviewer(
        &mut self,
        reviewer: &UserId,
    ) -> Result<Vec<PullRequest>, Error> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT pr.pull_request_id \
                 FROM pull_requests pr \
                 JOIN pull_request_reviewers r ON r.pull_request_id = pr.pull_request_id \
                 WHERE r.reviewer_id = ?1 \
                 ORDER BY pr.created_at DESC, pr.pull_request_id",
            )
            .map_err(|e| Error::storage("pull_requests_by_reviewer", e.to_string()))?;
        let ids: Vec<String> = stmt
            .query_map(params![reviewer.as_str()], |row| row.get(0))
            .and_then(Iterator::collect)
            .map_err(|e| Error::storage("pull_requests_by_reviewer", e.to_string()))?;
        drop(stmt);

        let mut assigned = Vec::with_capacity(ids.len());
        for id in ids {
            assigned.push(fetch_pull_request(&self.conn, &PullRequestId::new(id))?);
        }
        Ok(assigned)
    }

    async fn assignments_per_user(&mut self) -> Result<HashMap<UserId, u64>, Error> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT reviewer_id, COUNT(*) FROM pull_request_reviewers GROUP BY reviewer_id",
            )
            .map_err(|e| Error::storage("assignments_per_user", e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })
            .map_err(|e| Error::storage("assignments_per_user", e.to_string()))?;

        let mut counts = HashMap::new();
        for row in rows {
            let (reviewer, count) =
                row.map_err(|e| Error::storage("assignments_per_user", e.to_string()))?;
            counts.insert(UserId::new(reviewer), count);
        }
        Ok(counts)
    }

    async fn assignments_per_pull_request(
        &mut self,
    ) -> Result<HashMap<PullRequestId, u64>, Error> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT pull_request_id, COUNT(*) FROM pull_request_reviewers \
                 GROUP BY pull_request_id",
            )
            .map_err(|e| Error::storage("assignments_per_pull_request", e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })
            .map_err(|e| Error::storage("assignments_per_pull_request", e.to_string()))?;

        let mut counts = HashMap::new();
        for row in rows {
            let (id, count) =
                row.map_err(|e| Error::storage("assignments_per_pull_request", e.to_string()))?;
            counts.insert(PullRequestId::new(id), count);
        }
        Ok(counts)
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let mut this = self;
        this.conn
            .execute_batch("COMMIT")
            .map_err(|e| Error::storage("commit", e.to_string()))?;
        this.finished = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        let mut this = self;
        this.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| Error::storage("rollback", e.to_string()))?;
        this.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

fn upsert_user(conn: &Connection, user: &User, now: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO users (user_id, username, team_name, is_active, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(user_id) DO UPDATE SET \
         username = excluded.username, team_name = excluded.team_name, \
         is_active = excluded.is_active, updated_at = excluded.updated_at",
        params![
            user.id().as_str(),
            user.username(),
            user.team_name().as_str(),
            user.is_active(),
            now,
        ],
    )
    .map_err(|e| Error::storage("save_team", e.to_string()))?;
    Ok(())
}

fn fetch_user(conn: &Connection, id: &UserId) -> Result<User, Error> {
    let row = conn.query_row(
        "SELECT username, team_name, is_active FROM users WHERE user_id = ?1",
        params![id.as_str()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        },
    );
    let (username, team_name, is_active) = match row {
        Ok(r) => r,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Err(Error::NotFound("user")),
        Err(e) => return Err(Error::storage("get_user", e.to_string())),
    };
    User::new(id.clone(), &username, TeamName::new(team_name), is_active)
        .map_err(|e| Error::storage("get_user", e.to_string()))
}

fn fetch_pull_request(conn: &Connection, id: &PullRequestId) -> Result<PullRequest, Error> {
    let row = conn.query_row(
        "SELECT pull_request_name, author_id, status, created_at, merged_at, updated_at \
         FROM pull_requests WHERE pull_request_id = ?1",
        params![id.as_str()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        },
    );
    let (name, author_id, status, created_at, merged_at, updated_at) = match row {
        Ok(r) => r,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(Error::NotFound("pull request"))
        }
        Err(e) => return Err(Error::storage("get_pull_request", e.to_string())),
    };

    let mut stmt = conn
        .prepare(
            "SELECT reviewer_id FROM pull_request_reviewers \
             WHERE pull_request_id = ?1 ORDER BY slot",
        )
        .map_err(|e| Error::storage("get_pull_request", e.to_string()))?;
    let reviewers: Vec<String> = stmt
        .query_map(params![id.as_str()], |row| row.get(0))
        .and_then(Iterator::collect)
        .map_err(|e| Error::storage("get_pull_request", e.to_string()))?;

    let status = PullRequestStatus::parse(&status)
        .ok_or_else(|| Error::storage("get_pull_request", format!("unknown status {status:?}")))?;
    let merged_at = merged_at.as_deref().map(decode_ts).transpose()?;

    PullRequest::restore(
        id.clone(),
        &name,
        UserId::new(author_id),
        status,
        reviewers.into_iter().map(UserId::new).collect(),
        decode_ts(&created_at)?,
        merged_at,
        decode_ts(&updated_at)?,
    )
    .map_err(|e| Error::storage("get_pull_request", e.to_string()))
}

fn replace_reviewers(conn: &Connection, pr: &PullRequest) -> Result<(), Error> {
    conn.execute(
        "DELETE FROM pull_request_reviewers WHERE pull_request_id = ?1",
        params![pr.id().as_str()],
    )
    .map_err(|e| Error::storage("save reviewers", e.to_string()))?;
    for (slot, reviewer) in pr.assigned_reviewers().iter().enumerate() {
        conn.execute(
            "INSERT INTO pull_request_reviewers (pull_request_id, reviewer_id, slot) \
             VALUES (?1, ?2, ?3)",
            params![pr.id().as_str(), reviewer.as_str(), slot as i64],
        )
        .map_err(|e| Error::storage("save reviewers", e.to_string()))?;
    }
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::ConstraintViolation)
    )
}

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::storage("decode timestamp", format!("{raw:?}: {e}")))
}

#[async_trait]
impl IdempotencyStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, Error> {
        let conn = self.conn.lock().await;
        let row = conn.query_row(
            "SELECT method, path, request_body, status_code, response_body, response_headers \
             FROM idempotency_keys WHERE key_hash = ?1 AND expires_at > ?2",
            params![hash_key(key), Utc::now().timestamp()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, u16>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        );
        let (method, path, request_body, status, response_body, headers) = match row {
            Ok(r) => r,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(Error::storage("get idempotency record", e.to_string())),
        };
        let headers: HashMap<String, String> = serde_json::from_str(&headers)
            .map_err(|e| Error::storage("get idempotency record", e.to_string()))?;
        Ok(Some(IdempotencyRecord {
            request: StoredRequest {
                method,
                path,
                body: request_body,
            },
            response: StoredResponse {
                status,
                body: response_body,
                headers,
            },
        }))
    }

    async fn save(
        &self,
        key: &str,
        record: IdempotencyRecord,
        ttl: Duration,
    ) -> Result<(), Error> {
        let headers = serde_json::to_string(&record.response.headers)
            .map_err(|e| Error::storage("save idempotency record", e.to_string()))?;
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO idempotency_keys \
             (key_hash, method, path, request_body, status_code, response_body, \
              response_headers, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(key_hash) DO UPDATE SET \
             method = excluded.method, path = excluded.path, \
             request_body = excluded.request_body, status_code = excluded.status_code, \
             response_body = excluded.response_body, \
             response_headers = excluded.response_headers, expires_at = excluded.expires_at",
            params![
                hash_key(key),
                record.request.method,
                record.request.path,
                record.request.body,
                record.response.status,
                record.response.body,
                headers,
                expires_at,
            ],
        )
        .map_err(|e| Error::storage("save idempotency record", e.to_string()))?;
        Ok(())
    }
}
