//! Endpoint State Storage Module
//!
//! SQLite-backed bookkeeping for endpoints seen across capture runs:
//! - content_hash for change detection between runs
//! - first_seen / last_seen / hit_count
//! - last analyzer score and confidence tier

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Mutex;

/// State of one observed endpoint
#[derive(Debug, Clone)]
pub struct EndpointState {
    pub url: String,
    pub method: String,
    pub content_hash: String,
    pub first_seen: String,
    pub last_seen: String,
    pub hit_count: i64,
    pub last_score: i64,
    pub confidence: String,
}

/// Endpoint State Storage Manager
pub struct EndpointStateStore {
    conn: Mutex<Connection>,
}

impl EndpointStateStore {
    /// Initialize or open the endpoint state database
    pub fn new(root: &str) -> Result<Self> {
        let db_path = PathBuf::from(root).join("tracking").join("endpoint_state.db");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create tracking directory")?;
        }

        let conn = Connection::open(&db_path).context("Failed to open endpoint state database")?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS endpoint_states (
                url TEXT NOT NULL,
                method TEXT NOT NULL,
                content_hash TEXT,
                first_seen TEXT,
                last_seen TEXT,
                hit_count INTEGER DEFAULT 0,
                last_score INTEGER DEFAULT 0,
                confidence TEXT,
                PRIMARY KEY (url, method)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_endpoint_last_seen ON endpoint_states(last_seen)",
            [],
        )?;

        Ok(())
    }

    /// Get the stored state for an endpoint
    pub fn get(&self, url: &str, method: &str) -> Result<Option<EndpointState>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT content_hash, first_seen, last_seen, hit_count, last_score, confidence
             FROM endpoint_states WHERE url = ?1 AND method = ?2",
        )?;

        let state = stmt
            .query_row(params![url, method], |row| {
                Ok(EndpointState {
                    url: url.to_string(),
                    method: method.to_string(),
                    content_hash: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    first_seen: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    last_seen: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    hit_count: row.get(3)?,
                    last_score: row.get(4)?,
                    confidence: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            })
            .optional()?;

        Ok(state)
    }

    /// Record an observation and report whether the body changed since the
    /// last run
    pub fn record_observation(
        &self,
        url: &str,
        method: &str,
        body: &str,
        score: i32,
        confidence: &str,
    ) -> Result<bool> {
        let hash = content_hash(body);
        let now = Utc::now().to_rfc3339();

        let previous = self.get(url, method)?;
        let changed = previous
            .as_ref()
            .map(|p| p.content_hash != hash)
            .unwrap_or(true);

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO endpoint_states
                (url, method, content_hash, first_seen, last_seen, hit_count, last_score, confidence)
             VALUES (?1, ?2, ?3, ?4, ?4, 1, ?5, ?6)
             ON CONFLICT(url, method) DO UPDATE SET
                content_hash = ?3,
                last_seen = ?4,
                hit_count = hit_count + 1,
                last_score = ?5,
                confidence = ?6",
            params![url, method, hash, now, score, confidence],
        )?;

        Ok(changed)
    }

    /// Delete rows not seen within the given number of days
    pub fn prune_stale(&self, days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM endpoint_states WHERE last_seen < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    /// Total tracked endpoints
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM endpoint_states", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// SHA-256 hex digest of a response body
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
