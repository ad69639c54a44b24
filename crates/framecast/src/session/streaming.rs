//! Per-session frame streaming loop
//!
//! Pulls frames from an opened frame stream and pushes them through the
//! session's transport in strict presentation order, one frame in flight.
//! Unpaced by default; an optional frame interval applies pacing.
//! Cancellation is observed at every frame step.

use crate::media::FrameStream;
use crate::session::session::Session;
use crate::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How a streaming loop ended
#[derive(Debug)]
pub enum StreamOutcome {
    /// Frame source exhausted; all frames delivered in order
    Completed(u64),

    /// Cancellation signal observed; remaining frames never sent
    Cancelled,

    /// Decode or transport failure stopped the loop
    Failed(Error),
}

/// Streaming loop for one `Ready` session
pub struct StreamingLoop {
    session: Arc<Session>,
    frames: Box<dyn FrameStream>,
    frame_interval: Option<Duration>,
}

impl StreamingLoop {
    /// Create a loop over an opened frame stream
    pub fn new(
        session: Arc<Session>,
        frames: Box<dyn FrameStream>,
        frame_interval: Option<Duration>,
    ) -> Self {
        Self {
            session,
            frames,
            frame_interval,
        }
    }

    /// Run until the source is exhausted, the transport fails, or
    /// cancellation fires
    pub async fn run(mut self) -> StreamOutcome {
        let cancel = self.session.cancel_token();
        let mut ticker = self.frame_interval.map(tokio::time::interval);
        let mut sent: u64 = 0;

        debug!(
            "Streaming loop started for session {} (pacing: {:?})",
            self.session.session_id(),
            self.frame_interval
        );

        loop {
            if let Some(ticker) = ticker.as_mut() {
                tokio::select! {
                    _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                    _ = ticker.tick() => {}
                }
            }

            let frame = tokio::select! {
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                next = self.frames.next() => match next {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        info!(
                            "Session {} stream complete after {} frames",
                            self.session.session_id(),
                            sent
                        );
                        return StreamOutcome::Completed(sent);
                    }
                    Err(e) => return StreamOutcome::Failed(e),
                },
            };

            debug!(
                "Session {} sending frame {} ({} bytes)",
                self.session.session_id(),
                frame.index,
                frame.len()
            );

            // The send races cancellation too, so a loop blocked on a
            // congested transport still stops within one frame step.
            tokio::select! {
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                result = self.session.send_frame(frame) => {
                    if let Err(e) = result {
                        return StreamOutcome::Failed(e);
                    }
                }
            }

            sent += 1;
        }
    }
}
