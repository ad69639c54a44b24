//! Signaling message types and close reasons

pub mod protocol;

pub use protocol::{CloseReason, SignalingMessage};
