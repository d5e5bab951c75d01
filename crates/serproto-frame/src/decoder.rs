use tracing::{debug, trace};

use crate::codec::{Frame, HEADER_1, HEADER_2};

/// Position of the decoder within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeState {
    #[default]
    AwaitHeader1,
    AwaitHeader2,
    AwaitCommand,
    AwaitValue,
    AwaitChecksum,
}

/// Running totals kept by a [`FrameDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderStats {
    /// Frames that passed the checksum.
    pub frames_decoded: u64,
    /// Complete frames dropped because the checksum did not match.
    pub checksum_errors: u64,
    /// Bytes skipped while hunting for a header.
    pub bytes_discarded: u64,
}

/// Byte-at-a-time frame decoder.
///
/// Synchronization is only ever regained on a fresh `0xFF 0xFE` pair. A
/// header byte that turns up inside the id or value field is not
/// distinguishable from a real header; that ambiguity is part of the wire
/// format.
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    state: DecodeState,
    command_id: u8,
    value: u8,
    checksum: u8,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns a frame when this byte completes a valid one.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecodeState::AwaitHeader1 => {
                if byte == HEADER_1 {
                    self.state = DecodeState::AwaitHeader2;
                } else {
                    self.stats.bytes_discarded += 1;
                }
                None
            }
            DecodeState::AwaitHeader2 => {
                if byte == HEADER_2 {
                    self.state = DecodeState::AwaitCommand;
                } else {
                    // The pending 0xFF goes too.
                    self.stats.bytes_discarded += 2;
                    self.state = DecodeState::AwaitHeader1;
                }
                None
            }
            DecodeState::AwaitCommand => {
                self.command_id = byte;
                self.checksum = byte;
                self.state = DecodeState::AwaitValue;
                None
            }
            DecodeState::AwaitValue => {
                self.value = byte;
                self.checksum = self.checksum.wrapping_add(byte);
                self.state = DecodeState::AwaitChecksum;
                None
            }
            DecodeState::AwaitChecksum => {
                self.state = DecodeState::AwaitHeader1;
                if byte == self.checksum {
                    self.stats.frames_decoded += 1;
                    let frame = Frame::new(self.command_id, self.value);
                    trace!(command_id = frame.command_id, value = frame.value, "frame decoded");
                    Some(frame)
                } else {
                    self.stats.checksum_errors += 1;
                    debug!(
                        command_id = self.command_id,
                        value = self.value,
                        expected = self.checksum,
                        actual = byte,
                        "checksum mismatch, frame dropped"
                    );
                    None
                }
            }
        }
    }

    /// Feed a run of bytes, calling `on_frame` for each valid frame in order.
    pub fn decode(&mut self, bytes: &[u8], mut on_frame: impl FnMut(Frame)) {
        for &byte in bytes {
            if let Some(frame) = self.push(byte) {
                on_frame(frame);
            }
        }
    }

    /// Feed a run of bytes and collect the valid frames.
    pub fn decode_all(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        self.decode(bytes, |frame| frames.push(frame));
        frames
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop any partial frame and wait for a header again. Stats are kept.
    pub fn reset(&mut self) {
        self.state = DecodeState::AwaitHeader1;
    }
}
