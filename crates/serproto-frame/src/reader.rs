use serproto_transport::Link;
use tracing::debug;

use crate::codec::{Frame, FrameConfig};
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::Result;

/// Pulls whatever a link has buffered through a [`FrameDecoder`].
///
/// The reader never owns the link; the caller lends it for each poll. Partial
/// frames carry over between polls.
pub struct FrameReader {
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl FrameReader {
    /// Create a new frame reader with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
        }
    }

    /// Decode every byte the link reports as available right now.
    ///
    /// Reads are bounded by [`Link::bytes_available`] at entry, so this never
    /// waits on bytes that have not arrived. Nothing available is a no-op.
    ///
    /// A read error after some frames were decoded ends the poll early and
    /// returns those frames; the error is left for the next poll to report.
    pub fn poll<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut remaining = link.bytes_available()?;

        while remaining > 0 {
            let want = remaining.min(self.chunk.len());
            let read = match link.read_available(&mut self.chunk[..want]) {
                Ok(read) => read,
                Err(err) if !frames.is_empty() => {
                    debug!(error = %err, decoded = frames.len(), "read failed mid-poll");
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                break;
            }
            remaining -= read.min(remaining);
            self.decoder
                .decode(&self.chunk[..read], |frame| frames.push(frame));
        }

        Ok(frames)
    }

    /// Decoder counters accumulated across polls.
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Borrow the underlying decoder.
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
