//! Negotiation capability
//!
//! Converts a client offer into an answer. Full peer-connection
//! negotiation (ICE, DTLS, separate data channels) lives behind this
//! trait; the in-tree implementation accepts the connection directly and
//! answers for frame delivery on the same signaling channel.

use crate::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

/// Converts an offer into an answer for one session
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Negotiate an answer for the given offer payload
    async fn negotiate(&self, session_id: &str, offer_sdp: &str) -> Result<String>;
}

/// Negotiator that accepts the signaling channel itself as the transport
///
/// No separate peer connection is established: frames are delivered as
/// binary messages on the channel the offer arrived on.
pub struct DirectNegotiator;

#[async_trait]
impl Negotiator for DirectNegotiator {
    async fn negotiate(&self, session_id: &str, offer_sdp: &str) -> Result<String> {
        if offer_sdp.trim().is_empty() {
            return Err(Error::Negotiation(format!(
                "empty offer for session {}",
                session_id
            )));
        }

        debug!(
            "Direct negotiation accepted for session {} ({} byte offer)",
            session_id,
            offer_sdp.len()
        );

        Ok(format!("direct/{}", session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_negotiator_answers() {
        let negotiator = DirectNegotiator;

        let answer = negotiator.negotiate("s1", "v=0\r\no=- ...").await.unwrap();
        assert_eq!(answer, "direct/s1");
    }

    #[tokio::test]
    async fn test_direct_negotiator_rejects_blank_offer() {
        let negotiator = DirectNegotiator;

        let result = negotiator.negotiate("s1", "   ").await;
        assert!(matches!(result, Err(Error::Negotiation(_))));
    }
}
