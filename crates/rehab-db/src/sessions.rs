//! Durable history of coaching sessions.

use rehab_types::{SessionEnd, SessionState};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while reading or writing session history.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state {0} is not terminal")]
    NotTerminal(SessionState),
}

/// A stored coaching session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    /// Internal database ID.
    #[serde(skip)]
    pub id: i64,
    /// Public session identifier (UUID).
    pub session_id: String,
    pub call_id: String,
    pub call_type: String,
    pub exercise: String,
    #[serde(flatten)]
    pub state: SessionState,
    pub end_reason: Option<SessionEnd>,
    /// Stable failure code, set when the session failed.
    pub error_code: Option<String>,
    pub error: Option<String>,
    /// Provider names the session ran with.
    pub providers: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Parameters for recording a newly launched session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: String,
    pub call_id: String,
    pub call_type: String,
    pub exercise: String,
}

/// How a session ended.
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    pub end_reason: Option<SessionEnd>,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub providers: Option<serde_json::Value>,
}

const SELECT_COLUMNS: &str = "SELECT
    id, session_id, call_id, call_type, exercise, state, interrupted,
    end_reason, error_code, error, providers_json, created_at, updated_at,
    completed_at
FROM coaching_sessions";

/// Records a new session in the `created` state and returns its row id.
pub fn insert_session(conn: &Connection, session: &NewSession) -> Result<i64, SessionStoreError> {
    conn.execute(
        "INSERT INTO coaching_sessions (session_id, call_id, call_type, exercise, state)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            session.session_id,
            session.call_id,
            session.call_type,
            session.exercise,
            SessionState::Created.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Moves a session to a new lifecycle state.
pub fn update_state(
    conn: &Connection,
    session_id: &str,
    state: SessionState,
) -> Result<(), SessionStoreError> {
    let count = conn.execute(
        "UPDATE coaching_sessions
         SET state = ?1, updated_at = datetime('now')
         WHERE session_id = ?2",
        params![state.as_str(), session_id],
    )?;
    if count == 0 {
        return Err(SessionStoreError::NotFound(session_id.to_string()));
    }
    Ok(())
}

/// Stores the terminal state of a session together with its outcome.
pub fn complete_session(
    conn: &Connection,
    session_id: &str,
    state: SessionState,
    outcome: &SessionOutcome,
) -> Result<(), SessionStoreError> {
    if !state.is_terminal() {
        return Err(SessionStoreError::NotTerminal(state));
    }
    let interrupted = matches!(state, SessionState::Completed { interrupted: true });
    let end_reason = outcome
        .end_reason
        .map(|end| serde_json::to_string(&end))
        .transpose()?;
    let providers = outcome
        .providers
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let count = conn.execute(
        "UPDATE coaching_sessions
         SET state = ?1, interrupted = ?2, end_reason = ?3, error_code = ?4,
             error = ?5, providers_json = ?6, updated_at = datetime('now'),
             completed_at = datetime('now')
         WHERE session_id = ?7",
        params![
            state.as_str(),
            interrupted,
            end_reason,
            outcome.error_code,
            outcome.error,
            providers,
            session_id,
        ],
    )?;
    if count == 0 {
        return Err(SessionStoreError::NotFound(session_id.to_string()));
    }
    Ok(())
}

/// Retrieves a session by its public ID.
pub fn get_session(conn: &Connection, session_id: &str) -> Result<SessionRecord, SessionStoreError> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE session_id = ?1"),
        [session_id],
        map_row_to_session,
    )
    .optional()?
    .ok_or_else(|| SessionStoreError::NotFound(session_id.to_string()))
}

/// Returns the most recent session recorded for a call, if any.
pub fn latest_session_for_call(
    conn: &Connection,
    call_id: &str,
) -> Result<Option<SessionRecord>, SessionStoreError> {
    let record = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE call_id = ?1 ORDER BY id DESC LIMIT 1"),
            [call_id],
            map_row_to_session,
        )
        .optional()?;
    Ok(record)
}

/// Lists the most recently launched sessions, newest first.
pub fn list_recent_sessions(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<SessionRecord>, SessionStoreError> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"))?;

    let rows = stmt.query_map([limit], map_row_to_session)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn map_row_to_session(row: &Row) -> rusqlite::Result<SessionRecord> {
    let state_str: String = row.get(5)?;
    let interrupted: bool = row.get(6)?;
    let state = match state_str.parse::<SessionState>() {
        Ok(SessionState::Completed { .. }) => SessionState::Completed { interrupted },
        Ok(state) => state,
        Err(e) => return Err(conversion_error(5, e)),
    };

    let end_reason = row
        .get::<_, Option<String>>(7)?
        .map(|raw| serde_json::from_str::<SessionEnd>(&raw))
        .transpose()
        .map_err(|e| conversion_error(7, e))?;

    let providers = row
        .get::<_, Option<String>>(10)?
        .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
        .transpose()
        .map_err(|e| conversion_error(10, e))?;

    Ok(SessionRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        call_id: row.get(2)?,
        call_type: row.get(3)?,
        exercise: row.get(4)?,
        state,
        end_reason,
        error_code: row.get(8)?,
        error: row.get(9)?,
        providers,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}
