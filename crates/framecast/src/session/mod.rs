//! Session lifecycle: registry, handshake, streaming, supervision

pub mod handshake;
pub mod session;
pub mod streaming;
pub mod supervisor;

pub use handshake::HandshakeCoordinator;
pub use session::{HandshakeState, Outbound, Session, SessionId, SessionRegistry};
pub use streaming::{StreamOutcome, StreamingLoop};
pub use supervisor::SessionSupervisor;
