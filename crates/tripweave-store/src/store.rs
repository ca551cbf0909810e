use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::itinerary::ItineraryDocument;
use tripweave_core::traits::SessionStore;
use tripweave_core::types::{
    AgentResult, AgentTask, BudgetAllocation, CurrencyConversion, NegotiationRound, RunStatus,
    Session, SessionId, SessionSummary, TravelRequest,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        document TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);";

/// Fixed-width timestamps so `ORDER BY updated_at` sorts chronologically.
fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn db_err(e: impl std::fmt::Display) -> TripweaveError {
    TripweaveError::Persistence(e.to_string())
}

/// SQLite-backed session store. One row per session holds the full session
/// document; every mutation is a read-modify-write inside one transaction.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open or create a session database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| db_err(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL with FULL sync: a committed write survives power loss.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Session store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply `f` to the stored session and write it back atomically.
    ///
    /// Sealed sessions are rejected before `f` runs.
    fn mutate<F>(&self, sid: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let document: Option<String> = tx
            .query_row(
                "SELECT document FROM sessions WHERE id = ?1",
                params![sid],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let document = document.ok_or_else(|| TripweaveError::SessionNotFound(sid.to_string()))?;

        let mut session: Session = serde_json::from_str(&document).map_err(db_err)?;
        if session.is_sealed() {
            return Err(TripweaveError::SessionSealed(sid.to_string()));
        }

        f(&mut session)?;
        session.updated_at = Utc::now();

        let document = serde_json::to_string(&session).map_err(db_err)?;
        tx.execute(
            "UPDATE sessions SET status = ?2, document = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                sid,
                session.status.as_str(),
                document,
                ts(&session.updated_at)
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    fn load(&self, sid: &str) -> Result<Session> {
        let conn = self.conn.lock().map_err(db_err)?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM sessions WHERE id = ?1",
                params![sid],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let document = document.ok_or_else(|| TripweaveError::SessionNotFound(sid.to_string()))?;
        serde_json::from_str(&document).map_err(db_err)
    }
}

/// Insert a result unless the stored one is newer.
fn place_result(session: &mut Session, result: AgentResult) {
    if let Some(existing) = session.results.get(&result.role) {
        if existing.timestamp > result.timestamp {
            debug!(role = %result.role, "Ignoring stale result");
            return;
        }
    }
    session.results.insert(result.role, result);
}

/// Insert or replace a role's negotiation round, dropping rounds after it.
fn place_round(rounds: &mut Vec<NegotiationRound>, round: NegotiationRound) {
    if let Some(pos) = rounds.iter().position(|r| r.seq >= round.seq) {
        rounds.truncate(pos);
    }
    rounds.push(round);
}

impl SessionStore for SqliteSessionStore {
    fn create(&self, request: &TravelRequest) -> BoxFuture<'_, Result<SessionId>> {
        let session = Session::new(request.clone());

        Box::pin(async move {
            let document = serde_json::to_string(&session).map_err(db_err)?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO sessions (id, status, document, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.id.0,
                    session.status.as_str(),
                    document,
                    ts(&session.created_at),
                    ts(&session.updated_at)
                ],
            )
            .map_err(db_err)?;
            debug!(session_id = %session.id, "Session created");
            Ok(session.id)
        })
    }

    fn update_task(&self, sid: &SessionId, task: &AgentTask) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let task = task.clone();

        Box::pin(async move {
            self.mutate(&sid, |session| {
                session.tasks.insert(task.role, task);
                Ok(())
            })
        })
    }

    fn record(&self, sid: &SessionId, result: &AgentResult) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let result = result.clone();

        Box::pin(async move {
            self.mutate(&sid, |session| {
                place_result(session, result);
                Ok(())
            })
        })
    }

    fn complete_task(
        &self,
        sid: &SessionId,
        task: &AgentTask,
        result: &AgentResult,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let task = task.clone();
        let result = result.clone();

        Box::pin(async move {
            self.mutate(&sid, |session| {
                place_result(session, result);
                session.tasks.insert(task.role, task);
                Ok(())
            })
        })
    }

    fn append_negotiation(
        &self,
        sid: &SessionId,
        round: &NegotiationRound,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let round = round.clone();

        Box::pin(async move {
            self.mutate(&sid, |session| {
                let rounds = session.negotiations.entry(round.role).or_default();
                place_round(rounds, round);
                Ok(())
            })
        })
    }

    fn set_allocation(
        &self,
        sid: &SessionId,
        allocation: &BudgetAllocation,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let allocation = allocation.clone();

        Box::pin(async move {
            self.mutate(&sid, |session| {
                session.allocation = Some(allocation);
                Ok(())
            })
        })
    }

    fn record_conversion(
        &self,
        sid: &SessionId,
        conversion: &CurrencyConversion,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let conversion = conversion.clone();

        Box::pin(async move {
            self.mutate(&sid, |session| {
                session.conversions.push(conversion);
                Ok(())
            })
        })
    }

    fn finalize(
        &self,
        sid: &SessionId,
        itinerary: &ItineraryDocument,
        status: RunStatus,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let itinerary = itinerary.clone();

        Box::pin(async move {
            if !status.is_terminal() {
                return Err(TripweaveError::NotTerminal(sid));
            }
            self.mutate(&sid, |session| {
                session.itinerary = Some(itinerary);
                session.status = status;
                session.finalized_at = Some(Utc::now());
                Ok(())
            })?;
            debug!(session_id = %sid, %status, "Session finalized");
            Ok(())
        })
    }

    fn get(&self, sid: &SessionId) -> BoxFuture<'_, Result<Session>> {
        let sid = sid.0.clone();
        Box::pin(async move { self.load(&sid) })
    }

    fn list(&self, limit: usize) -> BoxFuture<'_, Result<Vec<SessionSummary>>> {
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let mut stmt = conn
                .prepare(
                    "SELECT document FROM sessions
                     ORDER BY updated_at DESC
                     LIMIT ?1",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![limit as i64], |row| row.get::<_, String>(0))
                .map_err(db_err)?;

            let mut summaries = Vec::new();
            for row in rows {
                let document = row.map_err(db_err)?;
                let session: Session = serde_json::from_str(&document).map_err(db_err)?;
                summaries.push(session.summary());
            }
            Ok(summaries)
        })
    }
}
