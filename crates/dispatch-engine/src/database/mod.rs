//! # Async Persistence Module (sqlx + SQLite)
//!
//! Optional write-through persistence for emergency calls and dispatch
//! attempts. The engine runs fully in memory when no database is
//! configured; when one is attached, every admitted call and transition is
//! mirrored here and non-terminal calls are recovered into the ledger at
//! startup.
//!
//! Persistence is never the concurrency authority: claim decisions happen
//! in the in-memory ledger, and a failed write is logged, not propagated
//! into a transition. The original system drove status flips from database
//! triggers; here every transition is an explicit ledger method and the
//! database only records what already happened.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::dispatch::{
    AttemptOutcome, CallStatus, Cancellation, DispatchAttempt, EmergencyCall,
};
use crate::error::{DispatchError, Result};
use crate::types::{Actor, CallId, ClientId, GeoPoint, LawyerId};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS emergency_calls (
        call_id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        lawyer_id TEXT,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        address TEXT NOT NULL,
        status TEXT NOT NULL,
        is_urgent INTEGER NOT NULL DEFAULT 0,
        notes TEXT,
        attempt_count INTEGER NOT NULL DEFAULT 0,
        escalated INTEGER NOT NULL DEFAULT 0,
        cancelled_by TEXT,
        cancel_reason TEXT,
        created_at TEXT NOT NULL,
        accepted_at TEXT,
        completed_at TEXT,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_emergency_calls_status
        ON emergency_calls(status)",
    "CREATE TABLE IF NOT EXISTS dispatch_attempts (
        call_id TEXT NOT NULL,
        attempt_no INTEGER NOT NULL,
        lawyer_id TEXT NOT NULL,
        offered_at TEXT NOT NULL,
        outcome TEXT NOT NULL,
        PRIMARY KEY (call_id, attempt_no)
    )",
];

/// Async database manager over a SQLite connection pool.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (creating if missing) a database at `path` and bootstrap the
    /// schema.
    pub async fn new(path: &str) -> Result<Self> {
        info!("🗄️ opening dispatch database at {}", path);
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))
            .map_err(|e| DispatchError::database(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::bootstrap(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests.
    ///
    /// Pinned to a single pooled connection: every `:memory:` connection
    /// is its own database, so a larger pool would scatter the schema.
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DispatchError::database(e.to_string()))?;
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::bootstrap(&pool).await?;
        Ok(Self { pool })
    }

    async fn bootstrap(pool: &SqlitePool) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a freshly admitted call.
    pub async fn insert_call(&self, call: &EmergencyCall) -> Result<()> {
        sqlx::query(
            "INSERT INTO emergency_calls (
                call_id, client_id, lawyer_id, latitude, longitude, address,
                status, is_urgent, notes, attempt_count, escalated,
                cancelled_by, cancel_reason, created_at, accepted_at,
                completed_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(call.id.as_ref())
        .bind(call.client_id.as_ref())
        .bind(call.lawyer_id.as_ref().map(|l| l.as_ref().to_string()))
        .bind(call.location.latitude)
        .bind(call.location.longitude)
        .bind(&call.address)
        .bind(call.status.to_string())
        .bind(call.is_urgent)
        .bind(&call.notes)
        .bind(call.attempt_count as i64)
        .bind(call.escalated)
        .bind(call.cancellation.as_ref().map(|c| c.actor.to_string()))
        .bind(call.cancellation.as_ref().and_then(|c| c.reason.clone()))
        .bind(call.created_at)
        .bind(call.accepted_at)
        .bind(call.completed_at)
        .bind(call.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mirror the current state of a call after a transition.
    pub async fn update_call(&self, call: &EmergencyCall) -> Result<()> {
        sqlx::query(
            "UPDATE emergency_calls SET
                lawyer_id = ?,
                status = ?,
                attempt_count = ?,
                escalated = ?,
                cancelled_by = ?,
                cancel_reason = ?,
                accepted_at = ?,
                completed_at = ?,
                updated_at = ?
             WHERE call_id = ?",
        )
        .bind(call.lawyer_id.as_ref().map(|l| l.as_ref().to_string()))
        .bind(call.status.to_string())
        .bind(call.attempt_count as i64)
        .bind(call.escalated)
        .bind(call.cancellation.as_ref().map(|c| c.actor.to_string()))
        .bind(call.cancellation.as_ref().and_then(|c| c.reason.clone()))
        .bind(call.accepted_at)
        .bind(call.completed_at)
        .bind(call.updated_at)
        .bind(call.id.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a freshly issued offer.
    pub async fn record_attempt(&self, attempt: &DispatchAttempt, attempt_no: usize) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO dispatch_attempts
                (call_id, attempt_no, lawyer_id, offered_at, outcome)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(attempt.call_id.as_ref())
        .bind(attempt_no as i64)
        .bind(attempt.lawyer_id.as_ref())
        .bind(attempt.offered_at)
        .bind(attempt.outcome.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the outcome of a recorded offer.
    pub async fn update_attempt_outcome(
        &self,
        attempt: &DispatchAttempt,
        attempt_no: usize,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE dispatch_attempts SET outcome = ?
             WHERE call_id = ? AND attempt_no = ?",
        )
        .bind(attempt.outcome.to_string())
        .bind(attempt.call_id.as_ref())
        .bind(attempt_no as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List calls, newest first, optionally filtered by status.
    pub async fn list_calls(
        &self,
        status: Option<CallStatus>,
        limit: usize,
    ) -> Result<Vec<EmergencyCall>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM emergency_calls WHERE status = ?
                     ORDER BY created_at DESC LIMIT ?",
                )
                .bind(status.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM emergency_calls
                     ORDER BY created_at DESC LIMIT ?",
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(row_to_call).collect()
    }

    /// Non-terminal calls, for ledger recovery at startup.
    pub async fn load_open_calls(&self) -> Result<Vec<EmergencyCall>> {
        let rows = sqlx::query(
            "SELECT * FROM emergency_calls
             WHERE status IN ('pending', 'assigned', 'active')
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_call).collect()
    }

    /// Attempt history of one call, in offer order.
    pub async fn load_attempts(&self, call_id: &CallId) -> Result<Vec<DispatchAttempt>> {
        let rows = sqlx::query(
            "SELECT * FROM dispatch_attempts WHERE call_id = ?
             ORDER BY attempt_no ASC",
        )
        .bind(call_id.as_ref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let outcome: String = r.try_get("outcome")?;
                Ok(DispatchAttempt {
                    call_id: CallId::from(r.try_get::<String, _>("call_id")?),
                    lawyer_id: LawyerId::from(r.try_get::<String, _>("lawyer_id")?),
                    offered_at: r.try_get("offered_at")?,
                    outcome: outcome
                        .parse::<AttemptOutcome>()
                        .map_err(DispatchError::database)?,
                })
            })
            .collect()
    }
}

fn row_to_call(r: &sqlx::sqlite::SqliteRow) -> Result<EmergencyCall> {
    let status: String = r.try_get("status")?;
    let cancelled_by: Option<String> = r.try_get("cancelled_by")?;
    let cancellation = match cancelled_by {
        Some(actor) => Some(Cancellation {
            actor: actor
                .parse::<Actor>()
                .map_err(DispatchError::database)?,
            reason: r.try_get("cancel_reason")?,
        }),
        None => None,
    };
    let attempt_count: i64 = r.try_get("attempt_count")?;

    Ok(EmergencyCall {
        id: CallId::from(r.try_get::<String, _>("call_id")?),
        client_id: ClientId::from(r.try_get::<String, _>("client_id")?),
        lawyer_id: r
            .try_get::<Option<String>, _>("lawyer_id")?
            .map(LawyerId::from),
        location: GeoPoint {
            latitude: r.try_get("latitude")?,
            longitude: r.try_get("longitude")?,
        },
        address: r.try_get("address")?,
        status: status.parse::<CallStatus>().map_err(DispatchError::database)?,
        is_urgent: r.try_get("is_urgent")?,
        notes: r.try_get("notes")?,
        attempt_count: attempt_count as u32,
        escalated: r.try_get("escalated")?,
        cancellation,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        accepted_at: r.try_get("accepted_at")?,
        completed_at: r.try_get("completed_at")?,
        updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}
