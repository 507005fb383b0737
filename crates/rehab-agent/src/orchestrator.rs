//! The coaching session state machine.

use crate::error::SessionError;
use crate::pipeline::{AgentPipeline, ProviderSelection};
use crate::turns::{media_channel, take_turn, MediaReceiver};
use rehab_types::{greeting, SessionEnd, SessionState, StartRequest};
use rehab_voice::{AgentIdentity, AgentMedia, CapabilityResolver, Membership, ResolveContext};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Creates a connected finish handle and listener.
pub fn finish_signal() -> (FinishHandle, FinishListener) {
    let (tx, rx) = watch::channel(false);
    (FinishHandle { tx: Arc::new(tx) }, FinishListener { rx })
}

/// Requests a cooperative finish of a running session.
#[derive(Debug, Clone)]
pub struct FinishHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl FinishHandle {
    /// Signals the session to finish. Idempotent.
    pub fn finish(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The session side of a [`FinishHandle`].
#[derive(Debug, Clone)]
pub struct FinishListener {
    rx: watch::Receiver<bool>,
}

impl FinishListener {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a finish is requested. Never resolves if every handle
    /// is dropped without finishing.
    pub async fn requested(&mut self) {
        if self.rx.wait_for(|finished| *finished).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Outcome of a session that reached `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub call_id: String,
    pub exercise: String,
    pub end: SessionEnd,
    pub interrupted: bool,
    pub providers: ProviderSelection,
}

/// Drives one coaching session from capability assembly to a terminal state.
#[derive(Debug, Clone)]
pub struct SessionOrchestrator {
    resolver: CapabilityResolver,
    context: ResolveContext,
    agent: AgentIdentity,
}

impl SessionOrchestrator {
    pub fn new(resolver: CapabilityResolver, context: ResolveContext) -> Self {
        Self {
            resolver,
            context,
            agent: AgentIdentity::default(),
        }
    }

    /// Overrides the identity the agent joins calls with.
    pub fn with_agent(mut self, agent: AgentIdentity) -> Self {
        self.agent = agent;
        self
    }

    /// Runs a session to completion without external finish, patient media
    /// or state observation.
    pub async fn start(&self, request: StartRequest) -> Result<SessionReport, SessionError> {
        let (_finish, listener) = finish_signal();
        let (_media, inbox) = media_channel();
        let (state, _) = watch::channel(SessionState::Created);
        self.run(request, listener, inbox, &state).await
    }

    /// Runs a session, publishing every state transition on `state`.
    ///
    /// Failures before `Joined` go straight to `Failed`. Once joined, every
    /// path passes through `Finishing`, where the membership is left exactly
    /// once. Patient media arriving on `inbox` is served between
    /// `GreetingSent` and `Finishing`.
    ///
    /// # Errors
    ///
    /// Returns the `SessionError` that moved the session to `Failed`.
    pub async fn run(
        &self,
        request: StartRequest,
        finish: FinishListener,
        inbox: MediaReceiver,
        state: &watch::Sender<SessionState>,
    ) -> Result<SessionReport, SessionError> {
        transition(state, &request.call_id, SessionState::Created);

        let raw_call_id = request.call_id.clone();
        let request = match request.normalized() {
            Ok(request) => request,
            Err(e) => return Err(fail(state, &raw_call_id, e.into())),
        };
        let call_id = request.call_id.as_str();

        let pipeline = match AgentPipeline::assemble(
            &self.resolver,
            &self.context,
            self.agent.clone(),
            &request.exercise,
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => return Err(fail(state, call_id, e.into())),
        };
        transition(state, call_id, SessionState::Assembled);

        let AgentPipeline {
            transport,
            media,
            providers,
        } = pipeline;

        let call = match transport.create_call(&request.call_type, call_id).await {
            Ok(call) => call,
            Err(e) => {
                let err = SessionError::CallCreationFailed {
                    call_id: call_id.to_string(),
                    reason: e.to_string(),
                };
                return Err(fail(state, call_id, err));
            }
        };
        transition(state, call_id, SessionState::CallCreated);

        // Nothing to leave if the join fails; the capabilities are dropped
        // with the transport on return.
        let membership = match transport.join(&call, media.clone()).await {
            Ok(membership) => membership,
            Err(e) => {
                let err = SessionError::JoinFailed {
                    call_id: call_id.to_string(),
                    reason: e.to_string(),
                };
                return Err(fail(state, call_id, err));
            }
        };
        transition(state, call_id, SessionState::Joined);

        let session = Conversation {
            media: &media,
            membership: &*membership,
            call_id,
            state,
        };
        let outcome = session.converse(&request.exercise, finish, inbox).await;

        transition(state, call_id, SessionState::Finishing);
        if let Err(e) = membership.leave().await {
            warn!(call_id, "failed to leave call cleanly: {}", e);
        }
        drop(membership);
        drop(transport);

        match outcome {
            Ok(end) => {
                let interrupted = end.is_interruption();
                transition(state, call_id, SessionState::Completed { interrupted });
                Ok(SessionReport {
                    call_id: call_id.to_string(),
                    exercise: request.exercise.clone(),
                    end,
                    interrupted,
                    providers,
                })
            }
            Err(e) => Err(fail(state, call_id, e)),
        }
    }
}

struct Conversation<'a> {
    media: &'a AgentMedia,
    membership: &'a dyn Membership,
    call_id: &'a str,
    state: &'a watch::Sender<SessionState>,
}

impl Conversation<'_> {
    /// Greets the patient, then serves patient media until the call ends or
    /// a finish is requested.
    async fn converse(
        &self,
        exercise: &str,
        mut finish: FinishListener,
        mut inbox: MediaReceiver,
    ) -> Result<SessionEnd, SessionError> {
        let call_id = self.call_id;
        let text = self.opening_line(exercise).await;
        self.membership
            .send_utterance(&text)
            .await
            .map_err(|e| SessionError::Transport {
                call_id: call_id.to_string(),
                stage: "greeting",
                reason: e.to_string(),
            })?;
        transition(self.state, call_id, SessionState::GreetingSent);

        let ended = self.membership.await_session_end();
        tokio::pin!(ended);
        loop {
            tokio::select! {
                biased;
                _ = finish.requested() => {
                    info!(call_id, "finish requested");
                    return Ok(SessionEnd::FinishRequested);
                }
                end = &mut ended => {
                    return end.map_err(|e| SessionError::Transport {
                        call_id: call_id.to_string(),
                        stage: "monitor",
                        reason: e.to_string(),
                    });
                }
                Some(request) = inbox.next() => {
                    let outcome = take_turn(self.media, self.membership, request.media).await;
                    if let Err(e) = &outcome {
                        warn!(call_id, "patient turn failed: {}", e);
                    }
                    if request.reply.send(outcome).is_err() {
                        debug!(call_id, "turn requester went away");
                    }
                }
            }
        }
    }

    /// Asks the language model to open the session under the coaching
    /// instructions, falling back to the scripted greeting.
    async fn opening_line(&self, exercise: &str) -> String {
        let scripted = greeting(exercise);
        match self
            .media
            .llm
            .respond(&self.media.instructions, &scripted)
            .await
        {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => scripted,
            Err(e) => {
                warn!(
                    call_id = self.call_id,
                    model = self.media.llm.model(),
                    "greeting generation failed, using scripted greeting: {}",
                    e
                );
                scripted
            }
        }
    }
}

fn transition(state: &watch::Sender<SessionState>, call_id: &str, next: SessionState) {
    state.send_replace(next);
    info!(call_id, state = %next, "session state changed");
}

fn fail(state: &watch::Sender<SessionState>, call_id: &str, err: SessionError) -> SessionError {
    error!(call_id, code = err.code(), "session failed: {}", err);
    transition(state, call_id, SessionState::Failed);
    err
}
