//! In-process launcher and registry of live coaching sessions.
//!
//! Each accepted start request becomes one tokio task that waits out the
//! launch delay, runs the orchestrator and records the outcome. The registry
//! holds at most one live session per call id. Session tasks are tracked so
//! shutdown can wait for them to leave their calls.

use chrono::Utc;
use rehab_agent::{
    finish_signal, media_channel, FinishHandle, FinishListener, MediaReceiver, MediaSender,
    PatientMedia, SessionOrchestrator, TurnError, TurnOutcome,
};
use rehab_db::{DbPool, NewSession, SessionOutcome};
use rehab_types::{InvalidStartRequest, SessionEnd, SessionState, StartRequest};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use uuid::Uuid;

/// Why a start request was not launched.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid start request: {0}")]
    Invalid(#[from] InvalidStartRequest),
    #[error("a coaching session is already running for call {0}")]
    AlreadyActive(String),
}

/// Why patient media did not reach a session.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("no live coaching session for call {0}")]
    NotLive(String),
    #[error("session for call {call_id} is {state}, not accepting media")]
    NotReady { call_id: String, state: SessionState },
    #[error(transparent)]
    Turn(#[from] TurnError),
}

/// Point-in-time view of a live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub call_id: String,
    pub call_type: String,
    pub exercise: String,
    #[serde(flatten)]
    pub state: SessionState,
    pub started_at: String,
    pub finish_requested: bool,
}

struct LiveSession {
    session_id: String,
    request: StartRequest,
    started_at: String,
    state: watch::Receiver<SessionState>,
    finish: FinishHandle,
    media: MediaSender,
}

impl LiveSession {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            call_id: self.request.call_id.clone(),
            call_type: self.request.call_type.clone(),
            exercise: self.request.exercise.clone(),
            state: *self.state.borrow(),
            started_at: self.started_at.clone(),
            finish_requested: self.finish.is_requested(),
        }
    }
}

struct Inner {
    orchestrator: SessionOrchestrator,
    pool: DbPool,
    launch_delay: Duration,
    /// Live sessions keyed by call id.
    ///
    /// Lock acquisitions are brief map operations that never span an
    /// `.await`, so a synchronous lock is sufficient.
    sessions: RwLock<HashMap<String, LiveSession>>,
    /// Running session tasks. Finished ones are reaped on each launch.
    tasks: Mutex<JoinSet<()>>,
}

/// Removes a session's registry entry when its task ends, including by
/// panic or abort.
struct Registration {
    inner: Arc<Inner>,
    call_id: String,
    session_id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut sessions = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if sessions
            .get(&self.call_id)
            .is_some_and(|live| live.session_id == self.session_id)
        {
            sessions.remove(&self.call_id);
        }
    }
}

/// Launches sessions and tracks the ones still running.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(orchestrator: SessionOrchestrator, pool: DbPool, launch_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                pool,
                launch_delay,
                sessions: RwLock::new(HashMap::new()),
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Registers a session for the request and spawns it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Invalid` for an empty call id and
    /// `LaunchError::AlreadyActive` if the call already has a live session.
    pub fn launch(&self, request: StartRequest) -> Result<SessionSnapshot, LaunchError> {
        let request = request.normalized()?;
        let (finish, listener) = finish_signal();
        let (media, inbox) = media_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Created);
        let session_id = Uuid::new_v4().to_string();

        let live = LiveSession {
            session_id: session_id.clone(),
            request: request.clone(),
            started_at: Utc::now().to_rfc3339(),
            state: state_rx,
            finish,
            media,
        };
        let snapshot = live.snapshot();

        {
            let mut sessions = self
                .inner
                .sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if sessions.contains_key(&request.call_id) {
                return Err(LaunchError::AlreadyActive(request.call_id));
            }
            sessions.insert(request.call_id.clone(), live);
        }

        tracing::info!(
            call_id = %request.call_id,
            session_id = %session_id,
            exercise = %request.exercise,
            delay_ms = self.inner.launch_delay.as_millis() as u64,
            "coaching session launching"
        );

        let manager = self.clone();
        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while let Some(done) = tasks.try_join_next() {
            log_task_exit(done);
        }
        tasks.spawn(async move {
            manager
                .drive(session_id, request, listener, inbox, state_tx)
                .await;
        });

        Ok(snapshot)
    }

    /// Hands patient media to the live session for `call_id` and waits for
    /// the session's answer.
    ///
    /// # Errors
    ///
    /// Returns `ForwardError::NotLive` if the call has no live session,
    /// `ForwardError::NotReady` until the session has greeted the patient,
    /// and `ForwardError::Turn` if the turn itself failed.
    pub async fn forward(
        &self,
        call_id: &str,
        media: PatientMedia,
    ) -> Result<TurnOutcome, ForwardError> {
        let sender = {
            let sessions = self
                .inner
                .sessions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let live = sessions
                .get(call_id)
                .ok_or_else(|| ForwardError::NotLive(call_id.to_string()))?;
            let state = *live.state.borrow();
            if state != SessionState::GreetingSent {
                return Err(ForwardError::NotReady {
                    call_id: call_id.to_string(),
                    state,
                });
            }
            live.media.clone()
        };
        Ok(sender.send(media).await?)
    }

    /// Waits up to `grace` for every session task to end. Returns `false`
    /// if some were still running and had to be abandoned.
    pub async fn drain(&self, grace: Duration) -> bool {
        let mut tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let drained = tokio::time::timeout(grace, async {
            while let Some(done) = tasks.join_next().await {
                log_task_exit(done);
            }
        })
        .await
        .is_ok();
        if !drained {
            tracing::warn!(
                remaining = tasks.len(),
                grace_ms = grace.as_millis() as u64,
                "coaching sessions still running after shutdown grace; aborting them"
            );
        }
        drained
    }

    /// Requests a cooperative finish of the live session for `call_id`.
    pub fn finish(&self, call_id: &str) -> Option<SessionSnapshot> {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let live = sessions.get(call_id)?;
        live.finish.finish();
        tracing::info!(call_id, session_id = %live.session_id, "finish requested");
        Some(live.snapshot())
    }

    /// Requests a finish of every live session and returns how many there were.
    pub fn finish_all(&self) -> usize {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for live in sessions.values() {
            live.finish.finish();
        }
        sessions.len()
    }

    pub fn snapshot(&self, call_id: &str) -> Option<SessionSnapshot> {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.get(call_id).map(LiveSession::snapshot)
    }

    /// All live sessions, oldest first.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut snapshots: Vec<_> = sessions.values().map(LiveSession::snapshot).collect();
        snapshots.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        snapshots
    }

    pub fn is_active(&self, call_id: &str) -> bool {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(call_id)
    }

    async fn drive(
        self,
        session_id: String,
        request: StartRequest,
        mut finish: FinishListener,
        inbox: MediaReceiver,
        state_tx: watch::Sender<SessionState>,
    ) {
        let call_id = request.call_id.clone();
        let _registration = Registration {
            inner: Arc::clone(&self.inner),
            call_id: call_id.clone(),
            session_id: session_id.clone(),
        };
        self.record_launch(&session_id, &request).await;

        let recorder = tokio::spawn(record_transitions(
            self.inner.pool.clone(),
            session_id.clone(),
            state_tx.subscribe(),
        ));

        let cancelled = tokio::select! {
            _ = tokio::time::sleep(self.inner.launch_delay) => false,
            _ = finish.requested() => true,
        };

        let (state, outcome) = if cancelled {
            tracing::info!(call_id = %call_id, "session finished before it started");
            let state = SessionState::Completed { interrupted: false };
            state_tx.send_replace(state);
            let outcome = SessionOutcome {
                end_reason: Some(SessionEnd::FinishRequested),
                ..SessionOutcome::default()
            };
            (state, outcome)
        } else {
            let result = self
                .inner
                .orchestrator
                .run(request, finish, inbox, &state_tx)
                .await;
            let state = *state_tx.borrow();
            let outcome = match result {
                Ok(report) => SessionOutcome {
                    end_reason: Some(report.end),
                    providers: serde_json::to_value(&report.providers).ok(),
                    ..SessionOutcome::default()
                },
                Err(e) => SessionOutcome {
                    error_code: Some(e.code().to_string()),
                    error: Some(e.to_string()),
                    ..SessionOutcome::default()
                },
            };
            (state, outcome)
        };

        // Let the recorder drain before writing the terminal row.
        drop(state_tx);
        if let Err(e) = recorder.await {
            tracing::warn!(call_id = %call_id, "state recorder task failed: {}", e);
        }
        self.record_outcome(&session_id, state, outcome).await;

        tracing::info!(
            call_id = %call_id,
            session_id = %session_id,
            state = %state,
            "coaching session ended"
        );
    }

    async fn record_launch(&self, session_id: &str, request: &StartRequest) {
        let pool = self.inner.pool.clone();
        let record = NewSession {
            session_id: session_id.to_string(),
            call_id: request.call_id.clone(),
            call_type: request.call_type.clone(),
            exercise: request.exercise.clone(),
        };
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            rehab_db::insert_session(&conn, &record).map_err(|e| e.to_string())
        })
        .await;
        log_store_failure(session_id, "insert", result);
    }

    async fn record_outcome(&self, session_id: &str, state: SessionState, outcome: SessionOutcome) {
        let pool = self.inner.pool.clone();
        let id = session_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            rehab_db::complete_session(&conn, &id, state, &outcome).map_err(|e| e.to_string())
        })
        .await;
        log_store_failure(session_id, "complete", result);
    }
}

/// Mirrors non-terminal state changes into the session history until the
/// sender is dropped.
async fn record_transitions(
    pool: DbPool,
    session_id: String,
    mut state: watch::Receiver<SessionState>,
) {
    while state.changed().await.is_ok() {
        let next = *state.borrow_and_update();
        if next.is_terminal() {
            continue;
        }
        let pool = pool.clone();
        let id = session_id.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            rehab_db::update_state(&conn, &id, next).map_err(|e| e.to_string())
        })
        .await;
        log_store_failure(&session_id, "update", result);
    }
}

fn log_task_exit(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_panic() => tracing::error!("coaching session task panicked: {}", e),
        Err(e) => tracing::warn!("coaching session task ended abnormally: {}", e),
    }
}

/// History writes never affect the session itself; failures are logged.
fn log_store_failure<T>(
    session_id: &str,
    operation: &str,
    result: Result<Result<T, String>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!(session_id, operation, "session history write failed: {}", e),
        Err(e) => tracing::warn!(session_id, operation, "session history task failed: {}", e),
    }
}
