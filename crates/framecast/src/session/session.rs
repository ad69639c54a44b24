//! Live session state and the process-wide session registry

use crate::media::Frame;
use crate::signaling::CloseReason;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Session identifier, chosen by the caller
pub type SessionId = String;

/// Handshake state machine for one session
///
/// `Failed` is reachable from any non-terminal state; `Closed` and
/// `Failed` are terminal and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Session registered, signaling channel not yet readable
    Idle,
    /// Waiting for the first client message
    AwaitingOffer,
    /// Well-formed offer received, negotiation in progress
    Negotiating,
    /// Answer sent, transport usable for frame delivery
    Ready,
    /// Transport closed cleanly
    Closed,
    /// Handshake or transport error
    Failed,
}

impl HandshakeState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Closed | HandshakeState::Failed)
    }
}

/// Outbound messages queued for the session's transport writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Serialized `answer` signaling message
    Answer(String),

    /// One binary frame payload
    Frame(bytes::Bytes),

    /// Close the channel with the given reason; writer stops afterwards
    Close(CloseReason),
}

/// Live state for one streaming session
///
/// Owns the outbound half of the transport while live; a session never
/// outlives its transport handle because teardown closes the channel as
/// part of registry removal.
pub struct Session {
    session_id: SessionId,
    state: RwLock<HandshakeState>,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    torn_down: AtomicBool,
}

impl Session {
    /// Create a new session in `Idle`
    pub fn new(session_id: SessionId, outbound: mpsc::Sender<Outbound>) -> Self {
        info!("Creating session: {}", session_id);

        Self {
            session_id,
            state: RwLock::new(HandshakeState::Idle),
            outbound,
            cancel: CancellationToken::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Get the session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the current handshake state
    pub async fn state(&self) -> HandshakeState {
        *self.state.read().await
    }

    /// Transition the handshake state
    ///
    /// Terminal states are sticky: a transition out of `Closed` or
    /// `Failed` is ignored.
    pub async fn set_state(&self, new_state: HandshakeState) {
        let mut state = self.state.write().await;
        let old_state = *state;

        if old_state.is_terminal() {
            debug!(
                "Session {} already {:?}, ignoring transition to {:?}",
                self.session_id, old_state, new_state
            );
            return;
        }

        if old_state != new_state {
            debug!(
                "Session {} state transition: {:?} -> {:?}",
                self.session_id, old_state, new_state
            );
            *state = new_state;
        }
    }

    /// Send the serialized answer message
    pub async fn send_answer(&self, json: String) -> Result<()> {
        self.send(Outbound::Answer(json)).await
    }

    /// Send one frame as a binary transport message
    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        self.send(Outbound::Frame(frame.data)).await
    }

    /// Request a close frame with the given reason
    ///
    /// Never blocks: teardown must be able to proceed even when the
    /// outbound channel is full because the peer stopped reading.
    pub fn send_close(&self, reason: CloseReason) -> Result<()> {
        self.outbound
            .try_send(Outbound::Close(reason))
            .map_err(|_| {
                Error::Transport(format!(
                    "signaling channel closed or congested for session {}",
                    self.session_id
                ))
            })
    }

    async fn send(&self, message: Outbound) -> Result<()> {
        self.outbound.send(message).await.map_err(|_| {
            Error::Transport(format!(
                "signaling channel closed for session {}",
                self.session_id
            ))
        })
    }

    /// Cancellation token observed by the streaming loop and readers
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Raise the cancellation signal
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been raised
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Claim the teardown latch
    ///
    /// Returns true exactly once per session; later callers observe the
    /// teardown as already done.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }
}

/// Process-wide mapping of session id to live session
///
/// Empty at process start; entries are inserted on session creation and
/// removed on teardown. No persistence across restarts.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Create a registry with a session limit (0 = unlimited)
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Create and insert a session
    ///
    /// Fails when a live session already exists for the id or the
    /// capacity limit is reached.
    pub async fn create(
        &self,
        session_id: SessionId,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&session_id) {
            return Err(Error::Session(format!(
                "session {} already exists",
                session_id
            )));
        }

        if self.max_sessions > 0 && sessions.len() >= self.max_sessions {
            return Err(Error::Session(format!(
                "maximum number of sessions reached ({})",
                self.max_sessions
            )));
        }

        let session = Arc::new(Session::new(session_id.clone(), outbound));
        sessions.insert(session_id, session.clone());

        Ok(session)
    }

    /// Look up a live session
    pub async fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::Session(format!("session {} not found", session_id)))
    }

    /// Remove a session, returning it if it was present
    ///
    /// Removing an absent id is a no-op, which keeps teardown idempotent.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(session_id);

        if removed.is_some() {
            info!("Removed session: {}", session_id);
        }

        removed
    }

    /// Check whether a live session exists for the id
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Number of live sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ids of all live sessions
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }
}
