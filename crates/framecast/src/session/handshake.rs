//! Signaling handshake state machine
//!
//! Drives one session from its first signaling message to `Ready`. The
//! asset must already be uploaded before the offer arrives; only one
//! offer/answer exchange is supported per session.

use crate::negotiate::Negotiator;
use crate::session::session::{HandshakeState, Session};
use crate::signaling::SignalingMessage;
use crate::store::{AssetLocation, AssetStore};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Drives the signaling state machine for sessions
pub struct HandshakeCoordinator {
    assets: Arc<AssetStore>,
    negotiator: Arc<dyn Negotiator>,
}

impl HandshakeCoordinator {
    /// Create a coordinator over the given asset store and negotiator
    pub fn new(assets: Arc<AssetStore>, negotiator: Arc<dyn Negotiator>) -> Self {
        Self { assets, negotiator }
    }

    /// Feed one signaling message into the session's state machine
    ///
    /// Returns the asset location when the session just entered `Ready`
    /// (the single trigger for starting the streaming loop), `None` when
    /// the message was ignored. Any error leaves the session in `Failed`;
    /// the caller is responsible for teardown.
    pub async fn handle_message(
        &self,
        session: &Arc<Session>,
        text: &str,
    ) -> Result<Option<AssetLocation>> {
        let state = session.state().await;

        match state {
            HandshakeState::Idle | HandshakeState::AwaitingOffer => {}
            // One offer/answer exchange per session: later messages are
            // logged and ignored, never treated as renegotiation.
            HandshakeState::Negotiating | HandshakeState::Ready => {
                warn!(
                    "Ignoring signaling message for session {} in state {:?}",
                    session.session_id(),
                    state
                );
                return Ok(None);
            }
            HandshakeState::Closed | HandshakeState::Failed => {
                warn!(
                    "Ignoring signaling message for terminated session {}",
                    session.session_id()
                );
                return Ok(None);
            }
        }

        match self.drive_offer(session, text).await {
            Ok(location) => Ok(Some(location)),
            Err(e) => {
                session.set_state(HandshakeState::Failed).await;
                Err(e)
            }
        }
    }

    async fn drive_offer(&self, session: &Arc<Session>, text: &str) -> Result<AssetLocation> {
        let sdp = match SignalingMessage::from_json(text)? {
            SignalingMessage::Offer { sdp } => sdp,
            SignalingMessage::Answer { .. } => {
                return Err(Error::Protocol(format!(
                    "unexpected answer from client for session {}",
                    session.session_id()
                )));
            }
        };

        // Asset existence is checked before negotiation so that a session
        // with no upload never produces an answer.
        let location = self.assets.get(session.session_id()).await?;

        session.set_state(HandshakeState::Negotiating).await;

        let answer_sdp = self
            .negotiator
            .negotiate(session.session_id(), &sdp)
            .await?;

        let answer = SignalingMessage::Answer { sdp: answer_sdp }.to_json()?;
        session.send_answer(answer).await?;

        session.set_state(HandshakeState::Ready).await;
        info!("Session {} handshake ready", session.session_id());

        Ok(location)
    }
}
