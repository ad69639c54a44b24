//! Upload-then-stream video server
//!
//! framecast accepts an uploaded media asset, registers it under a
//! caller-chosen session id, negotiates a streaming session with one
//! remote client over a persistent WebSocket signaling channel, and then
//! delivers the asset's frames to that client in order until the asset
//! is exhausted or the session terminates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  HTTP/WS surface (axum)                                  │
//! │  ├─ POST /uploadfile/:id  → AssetStore (+ BlobStore)     │
//! │  └─ GET  /ws/signaling/:id                               │
//! │       ↓                                                  │
//! │  SessionSupervisor                                       │
//! │  ├─ SessionRegistry (id → live Session)                  │
//! │  ├─ HandshakeCoordinator (offer → answer, Negotiator)    │
//! │  └─ StreamingLoop (FrameDecoder → ordered frames → ws)   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! One session serves one client; sessions are one-shot and share no
//! state beyond the registry and the asset store. Teardown (cancel,
//! close, deregister) runs exactly once per session on every exit path.
//!
//! # Example
//!
//! ```no_run
//! use framecast::{Server, ServerConfig};
//!
//! # async fn example() -> framecast::Result<()> {
//! let config = ServerConfig {
//!     port: 8000,
//!     ..Default::default()
//! };
//!
//! let server = Server::new(config).await?;
//! server.bind().await?.serve().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod negotiate;
pub mod server;
pub mod signaling;
pub mod store;

mod session;

// Re-exports for public API
pub use config::{ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};
pub use error::{Error, Result};
pub use media::{Frame, FrameDecoder, FrameStream, MjpegDecoder};
pub use negotiate::{DirectNegotiator, Negotiator};
pub use server::{BoundServer, Server};
pub use session::{
    HandshakeState, Outbound, Session, SessionId, SessionRegistry, SessionSupervisor,
    StreamOutcome,
};
pub use signaling::{CloseReason, SignalingMessage};
pub use store::{AssetLocation, AssetStore, BlobStore, DiskBlobStore};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
