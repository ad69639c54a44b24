//! Frame decoding capability
//!
//! `FrameDecoder` turns an asset location into a lazy, finite,
//! non-restartable sequence of frames in presentation order. The in-tree
//! implementation handles MJPEG streams (concatenated JPEG images), which
//! matches the JPEG-per-frame wire format; container/codec decoders plug
//! in behind the same traits.

use crate::media::Frame;
use crate::store::AssetLocation;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::debug;

/// JPEG start-of-image marker
const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Read granularity for the frame scanner
const READ_CHUNK: usize = 8 * 1024;

/// Opens an asset for frame production
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    /// Open the asset at `location`
    ///
    /// Fails with [`Error::Decode`] when the asset is missing or not a
    /// recognized stream; no streaming loop is started in that case.
    async fn open(&self, location: &AssetLocation) -> Result<Box<dyn FrameStream>>;
}

/// Lazy, finite sequence of frames in presentation order
///
/// Never rewinds. `next()` returns `Ok(None)` at end of stream and on
/// every call after it. A mid-stream decode error is terminal: callers
/// stop and tear down rather than skipping the bad frame.
#[async_trait]
pub trait FrameStream: Send {
    /// Produce the next frame, or `None` at end of stream
    async fn next(&mut self) -> Result<Option<Frame>>;
}

/// Decoder for MJPEG streams (concatenated JPEG images)
pub struct MjpegDecoder;

#[async_trait]
impl FrameDecoder for MjpegDecoder {
    async fn open(&self, location: &AssetLocation) -> Result<Box<dyn FrameStream>> {
        let file = File::open(&location.path).await.map_err(|e| {
            Error::Decode(format!(
                "cannot open asset {}: {}",
                location.path.display(),
                e
            ))
        })?;

        let mut stream = MjpegStream {
            reader: BufReader::new(file),
            buf: Vec::new(),
            offset: 0,
            eof: false,
            next_index: 0,
            done: false,
        };

        // The stream prefix is validated here so a non-MJPEG asset fails
        // the session before any streaming loop starts.
        stream.fill_to(SOI.len()).await?;
        if stream.buf.len() < SOI.len() || stream.buf[..SOI.len()] != SOI {
            return Err(Error::Decode(format!(
                "asset {} is not an MJPEG stream",
                location.path.display()
            )));
        }

        debug!("Opened MJPEG asset {}", location.path.display());

        Ok(Box::new(stream))
    }
}

/// Frame stream scanning a file for JPEG markers, one image per `next()`
///
/// Only the bytes of the frame under construction are held in memory;
/// the rest of the asset stays on disk until pulled.
struct MjpegStream {
    reader: BufReader<File>,
    /// Bytes read ahead of the current frame boundary
    buf: Vec<u8>,
    /// Stream offset of `buf[0]`
    offset: u64,
    eof: bool,
    next_index: u64,
    done: bool,
}

impl MjpegStream {
    /// Read until the buffer holds at least `want` bytes or input ends
    async fn fill_to(&mut self, want: usize) -> Result<()> {
        while !self.eof && self.buf.len() < want {
            self.fill_more().await?;
        }
        Ok(())
    }

    /// Grow the buffer by one read
    async fn fill_more(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self
            .reader
            .read(&mut chunk)
            .await
            .map_err(|e| Error::Decode(format!("read failed at offset {}: {}", self.offset, e)))?;

        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Find the end (exclusive) of the first EOI at or after `scan`
    fn find_image_end(&self, scan: usize) -> Option<usize> {
        self.buf
            .get(scan..)?
            .windows(EOI.len())
            .position(|w| w == EOI)
            .map(|off| scan + off + EOI.len())
    }

    async fn next_image(&mut self) -> Result<Option<Frame>> {
        self.fill_to(SOI.len()).await?;

        if self.buf.is_empty() {
            self.done = true;
            return Ok(None);
        }

        if self.buf.len() < SOI.len() || self.buf[..SOI.len()] != SOI {
            return Err(Error::Decode(format!(
                "corrupt frame boundary at offset {}",
                self.offset
            )));
        }

        let mut scan = SOI.len();
        let end = loop {
            if let Some(end) = self.find_image_end(scan) {
                break end;
            }
            if self.eof {
                return Err(Error::Decode(format!(
                    "truncated frame at offset {}",
                    self.offset
                )));
            }
            // The marker may straddle the next read.
            scan = self
                .buf
                .len()
                .saturating_sub(EOI.len() - 1)
                .max(SOI.len());
            self.fill_more().await?;
        };

        let segment: Vec<u8> = self.buf.drain(..end).collect();
        self.offset += end as u64;

        let frame = Frame::new(self.next_index, Bytes::from(segment));
        self.next_index += 1;

        Ok(Some(frame))
    }
}

#[async_trait]
impl FrameStream for MjpegStream {
    async fn next(&mut self) -> Result<Option<Frame>> {
        if self.done {
            return Ok(None);
        }

        // Any error is terminal; the fuse also latches on it.
        let result = self.next_image().await;
        if result.is_err() {
            self.done = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Minimal well-formed JPEG segment with a distinguishing payload byte
    fn jpeg(payload: u8) -> Vec<u8> {
        vec![0xFF, 0xD8, payload, 0x00, 0xFF, 0xD9]
    }

    async fn open_bytes(bytes: &[u8]) -> Result<Box<dyn FrameStream>> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asset");
        std::fs::write(&path, bytes).unwrap();

        let location = AssetLocation {
            path,
            filename: "asset.mjpeg".to_string(),
        };

        // The open file handle keeps the asset readable after the
        // tempdir is removed.
        let result = MjpegDecoder.open(&location).await;
        drop(dir);
        result
    }

    #[tokio::test]
    async fn test_frames_in_presentation_order() {
        let mut bytes = Vec::new();
        for i in 0..3u8 {
            bytes.extend_from_slice(&jpeg(i));
        }

        let mut stream = open_bytes(&bytes).await.unwrap();

        for i in 0..3u64 {
            let frame = stream.next().await.unwrap().unwrap();
            assert_eq!(frame.index, i);
            assert_eq!(frame.data[2], i as u8);
        }

        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_spanning_multiple_reads() {
        let mut bytes = vec![0xFF, 0xD8];
        bytes.resize(bytes.len() + 3 * READ_CHUNK, 0x00);
        bytes.extend_from_slice(&EOI);
        bytes.extend_from_slice(&jpeg(1));

        let mut stream = open_bytes(&bytes).await.unwrap();

        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame.data.len(), 3 * READ_CHUNK + 4);
        assert_eq!(frame.data[..2], SOI);
        assert_eq!(frame.data[frame.data.len() - 2..], EOI);

        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame.index, 1);
        assert_eq!(frame.data[2], 1);

        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_end_of_stream_is_fused() {
        let mut stream = open_bytes(&jpeg(7)).await.unwrap();

        assert!(stream.next().await.unwrap().is_some());
        assert!(stream.next().await.unwrap().is_none());
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_missing_file_is_decode_error() {
        let location = AssetLocation {
            path: PathBuf::from("/nonexistent/asset"),
            filename: "asset.mjpeg".to_string(),
        };

        let result = MjpegDecoder.open(&location).await;
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_open_unrecognized_stream_is_decode_error() {
        let result = open_bytes(b"RIFF....").await;
        assert!(matches!(result.err(), Some(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_garbage_between_frames_is_terminal() {
        let mut bytes = jpeg(0);
        bytes.extend_from_slice(b"garbage");
        bytes.extend_from_slice(&jpeg(1));

        let mut stream = open_bytes(&bytes).await.unwrap();

        assert!(stream.next().await.unwrap().is_some());
        assert!(matches!(stream.next().await, Err(Error::Decode(_))));
        // Terminal: the bad frame is never skipped.
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_terminal() {
        let mut bytes = jpeg(0);
        bytes.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02]);

        let mut stream = open_bytes(&bytes).await.unwrap();

        assert!(stream.next().await.unwrap().is_some());
        assert!(matches!(stream.next().await, Err(Error::Decode(_))));
    }
}
