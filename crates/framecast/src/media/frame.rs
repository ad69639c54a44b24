//! Decoded frame type

use bytes::Bytes;

/// One decoded frame with its presentation position
///
/// Produced by a [`super::FrameStream`], consumed exactly once by the
/// streaming loop, and not retained after transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Zero-based presentation index, strictly increasing per source
    pub index: u64,

    /// Encoded frame payload sent as one binary transport message
    pub data: Bytes,
}

impl Frame {
    /// Create a frame
    pub fn new(index: u64, data: Bytes) -> Self {
        Self { index, data }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
