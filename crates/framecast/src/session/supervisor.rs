//! Session supervision
//!
//! Accepts new sessions, wires the handshake to the streaming loop, and
//! guarantees teardown (cancel, close, deregister) exactly once per
//! session on every exit path. Errors stay local to their session.

use crate::media::FrameDecoder;
use crate::negotiate::Negotiator;
use crate::session::handshake::HandshakeCoordinator;
use crate::session::session::{HandshakeState, Outbound, Session, SessionRegistry};
use crate::session::streaming::{StreamOutcome, StreamingLoop};
use crate::signaling::CloseReason;
use crate::store::AssetStore;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Top-level orchestration for all streaming sessions
pub struct SessionSupervisor {
    registry: Arc<SessionRegistry>,
    coordinator: HandshakeCoordinator,
    decoder: Arc<dyn FrameDecoder>,
    frame_interval: Option<Duration>,
}

impl SessionSupervisor {
    /// Create a supervisor over the given collaborators
    pub fn new(
        registry: Arc<SessionRegistry>,
        assets: Arc<AssetStore>,
        decoder: Arc<dyn FrameDecoder>,
        negotiator: Arc<dyn Negotiator>,
        frame_interval: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            coordinator: HandshakeCoordinator::new(assets, negotiator),
            decoder,
            frame_interval,
        }
    }

    /// Session registry (shared with the transport layer and tests)
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Accept a new signaling channel for a session id
    ///
    /// Registers the session and moves it to `AwaitingOffer`. Fails when
    /// a live session already exists for the id.
    pub async fn on_connect(
        &self,
        session_id: &str,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<Arc<Session>> {
        let session = self.registry.create(session_id.to_string(), outbound).await?;
        session.set_state(HandshakeState::AwaitingOffer).await;

        info!("Session {} connected, awaiting offer", session_id);

        Ok(session)
    }

    /// Feed one signaling message into the session's handshake
    ///
    /// When the handshake reaches `Ready`, opens the frame source and
    /// spawns the streaming loop for the session. On error the session is
    /// torn down with an indicative close reason before returning.
    pub async fn on_message(self: &Arc<Self>, session_id: &str, text: &str) -> Result<()> {
        let session = match self.registry.get(session_id).await {
            Ok(session) => session,
            Err(e) => {
                debug!("Dropping message for unknown session {}", session_id);
                return Err(e);
            }
        };

        let location = match self.coordinator.handle_message(&session, text).await {
            Ok(Some(location)) => location,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Session {} handshake failed: {}", session_id, e);
                self.teardown(session_id, CloseReason::from_error(&e)).await;
                return Err(e);
            }
        };

        let frames = match self.decoder.open(&location).await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Session {} asset unreadable: {}", session_id, e);
                session.set_state(HandshakeState::Failed).await;
                self.teardown(session_id, CloseReason::from_error(&e)).await;
                return Err(e);
            }
        };

        let supervisor = Arc::clone(self);
        let loop_session = Arc::clone(&session);
        let session_id = session_id.to_string();
        let frame_interval = self.frame_interval;

        tokio::spawn(async move {
            let outcome = StreamingLoop::new(loop_session, frames, frame_interval)
                .run()
                .await;

            match outcome {
                StreamOutcome::Completed(_) => {
                    supervisor
                        .teardown(&session_id, CloseReason::EndOfStream)
                        .await;
                }
                StreamOutcome::Cancelled => {
                    // Teardown raised the cancellation signal and is
                    // already closing the session.
                    debug!("Session {} streaming loop cancelled", session_id);
                }
                StreamOutcome::Failed(e) => {
                    error!("Session {} streaming failed: {}", session_id, e);
                    supervisor
                        .teardown(&session_id, CloseReason::from_error(&e))
                        .await;
                }
            }
        });

        Ok(())
    }

    /// Handle an abrupt disconnect or transport error on the channel
    pub async fn on_disconnect_or_error(&self, session_id: &str) {
        self.teardown(session_id, CloseReason::TransportFailed).await;
    }

    /// Tear a session down exactly once
    ///
    /// Raises the cancellation signal, requests transport close with an
    /// indicative reason, and removes the session from the registry.
    /// Duplicate calls for the same session are no-ops.
    pub async fn teardown(&self, session_id: &str, reason: CloseReason) {
        let Some(session) = self.registry.remove(session_id).await else {
            debug!("Session {} already torn down", session_id);
            return;
        };

        if !session.begin_teardown() {
            return;
        }

        session.cancel();

        let final_state = if reason.is_clean() {
            HandshakeState::Closed
        } else {
            HandshakeState::Failed
        };
        session.set_state(final_state).await;

        // A failed send means the writer is already gone or congested,
        // which is a valid teardown path (abrupt disconnect).
        if session.send_close(reason).is_err() {
            debug!("Session {} transport already closed", session_id);
        }

        info!(
            "Session {} torn down ({}: {})",
            session_id,
            reason.code(),
            reason.text()
        );
    }

    /// Tear down every live session (server shutdown)
    pub async fn shutdown(&self) {
        for session_id in self.registry.session_ids().await {
            self.teardown(&session_id, CloseReason::ServerShutdown).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MjpegDecoder;
    use crate::negotiate::DirectNegotiator;
    use crate::store::{BlobStore, DiskBlobStore};
    use bytes::Bytes;
    use tokio::time::{timeout, Duration};

    async fn supervisor_with_store() -> (Arc<SessionSupervisor>, Arc<AssetStore>, tempfile::TempDir)
    {
        let dir = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(
            DiskBlobStore::new(dir.path().to_path_buf(), String::new())
                .await
                .unwrap(),
        );
        let assets = Arc::new(AssetStore::new(blobs));
        let supervisor = Arc::new(SessionSupervisor::new(
            Arc::new(SessionRegistry::new(0)),
            assets.clone(),
            Arc::new(MjpegDecoder),
            Arc::new(DirectNegotiator),
            None,
        ));
        (supervisor, assets, dir)
    }

    fn mjpeg(frames: u8) -> Bytes {
        let mut bytes = Vec::new();
        for i in 0..frames {
            bytes.extend_from_slice(&[0xFF, 0xD8, i, 0x00, 0xFF, 0xD9]);
        }
        Bytes::from(bytes)
    }

    #[tokio::test]
    async fn test_connect_registers_awaiting_offer() {
        let (supervisor, _assets, _dir) = supervisor_with_store().await;
        let (tx, _rx) = mpsc::channel(8);

        let session = supervisor.on_connect("s1", tx).await.unwrap();

        assert_eq!(session.state().await, HandshakeState::AwaitingOffer);
        assert!(supervisor.registry().contains("s1").await);
    }

    #[tokio::test]
    async fn test_duplicate_connect_rejected() {
        let (supervisor, _assets, _dir) = supervisor_with_store().await;
        let (tx, _rx) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        supervisor.on_connect("s1", tx).await.unwrap();

        let result = supervisor.on_connect("s1", tx2).await;
        assert!(matches!(result, Err(Error::Session(_))));
    }

    #[tokio::test]
    async fn test_full_session_streams_then_tears_down() {
        let (supervisor, assets, _dir) = supervisor_with_store().await;
        assets.put("s1", "clip.mjpeg", mjpeg(3)).await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        supervisor.on_connect("s1", tx).await.unwrap();
        supervisor
            .on_message("s1", r#"{"type":"offer","sdp":"v=0"}"#)
            .await
            .unwrap();

        // Answer first, then exactly 3 frames in order, then a clean close.
        match timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
            Some(Outbound::Answer(_)) => {}
            other => panic!("expected answer, got {:?}", other),
        }
        for i in 0..3u8 {
            match timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
                Some(Outbound::Frame(data)) => assert_eq!(data[2], i),
                other => panic!("expected frame, got {:?}", other),
            }
        }
        match timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
            Some(Outbound::Close(reason)) => assert_eq!(reason, CloseReason::EndOfStream),
            other => panic!("expected close, got {:?}", other),
        }

        assert!(!supervisor.registry().contains("s1").await);
    }

    #[tokio::test]
    async fn test_offer_without_upload_closes_with_not_found() {
        let (supervisor, _assets, _dir) = supervisor_with_store().await;

        let (tx, mut rx) = mpsc::channel(8);
        supervisor.on_connect("s2", tx).await.unwrap();

        let result = supervisor
            .on_message("s2", r#"{"type":"offer","sdp":"v=0"}"#)
            .await;
        assert!(matches!(result, Err(Error::AssetNotFound(_))));

        // Close with a NotFound-indicative reason, no answer before it.
        match rx.recv().await.unwrap() {
            Outbound::Close(reason) => assert_eq!(reason, CloseReason::AssetNotFound),
            other => panic!("expected close, got {:?}", other),
        }
        assert!(!supervisor.registry().contains("s2").await);
    }

    #[tokio::test]
    async fn test_malformed_message_tears_down_without_frame_source() {
        let (supervisor, _assets, _dir) = supervisor_with_store().await;

        let (tx, mut rx) = mpsc::channel(8);
        supervisor.on_connect("s1", tx).await.unwrap();

        let result = supervisor.on_message("s1", r#"{"kind":"hello"}"#).await;
        assert!(matches!(result, Err(Error::Protocol(_))));

        match rx.recv().await.unwrap() {
            Outbound::Close(reason) => assert_eq!(reason, CloseReason::ProtocolError),
            other => panic!("expected close, got {:?}", other),
        }
        assert!(!supervisor.registry().contains("s1").await);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let (supervisor, _assets, _dir) = supervisor_with_store().await;

        let (tx, mut rx) = mpsc::channel(8);
        supervisor.on_connect("s1", tx).await.unwrap();

        supervisor.on_disconnect_or_error("s1").await;
        assert!(!supervisor.registry().contains("s1").await);

        // Duplicate teardown is a no-op: no second close, still absent.
        supervisor.on_disconnect_or_error("s1").await;
        supervisor.teardown("s1", CloseReason::EndOfStream).await;

        match rx.recv().await.unwrap() {
            Outbound::Close(reason) => assert_eq!(reason, CloseReason::TransportFailed),
            other => panic!("expected close, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreadable_asset_closes_with_decode_reason() {
        let (supervisor, assets, _dir) = supervisor_with_store().await;
        assets
            .put("s1", "clip.bin", Bytes::from_static(b"not jpeg data"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        supervisor.on_connect("s1", tx).await.unwrap();

        let result = supervisor
            .on_message("s1", r#"{"type":"offer","sdp":"v=0"}"#)
            .await;
        assert!(matches!(result, Err(Error::Decode(_))));

        // The handshake answered before open failed; skip to the close.
        loop {
            match rx.recv().await.unwrap() {
                Outbound::Close(reason) => {
                    assert_eq!(reason, CloseReason::DecodeFailed);
                    break;
                }
                Outbound::Answer(_) => continue,
                other => panic!("unexpected message {:?}", other),
            }
        }
        assert!(!supervisor.registry().contains("s1").await);
    }

    #[tokio::test]
    async fn test_shutdown_clears_all_sessions() {
        let (supervisor, _assets, _dir) = supervisor_with_store().await;

        let (tx, _rx) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        supervisor.on_connect("s1", tx).await.unwrap();
        supervisor.on_connect("s2", tx2).await.unwrap();

        supervisor.shutdown().await;

        assert_eq!(supervisor.registry().count().await, 0);
    }
}
