//! Frame production from uploaded assets

pub mod decoder;
pub mod frame;

pub use decoder::{FrameDecoder, FrameStream, MjpegDecoder};
pub use frame::Frame;
