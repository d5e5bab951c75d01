use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, Frame};
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::FrameError;

/// `tokio_util` codec over the same state machine as [`FrameDecoder`].
#[derive(Debug, Clone, Default)]
pub struct SimpleCodec {
    decoder: FrameDecoder,
}

impl SimpleCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl Decoder for SimpleCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        while src.has_remaining() {
            let byte = src.get_u8();
            if let Some(frame) = self.decoder.push(byte) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl Encoder<Frame> for SimpleCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(&item, dst);
        Ok(())
    }
}
