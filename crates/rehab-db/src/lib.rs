//! Database layer for the rehab coaching server.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and the coaching session history store.
//!
//! Live session state is held in memory by the server; this crate only keeps
//! the durable record of each session: when it started, which providers it
//! ran with and how it ended.

mod migrations;
mod pool;
pub mod sessions;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use sessions::{
    complete_session, get_session, insert_session, latest_session_for_call,
    list_recent_sessions, update_state, NewSession, SessionOutcome, SessionRecord,
    SessionStoreError,
};
