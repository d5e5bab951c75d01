//! Fixed five-byte command framing for serial links.
//!
//! Every message is one frame:
//! - Two header bytes `0xFF 0xFE` for stream synchronization
//! - A one-byte command id, resolved through a [`CommandTable`]
//! - A one-byte value
//! - A one-byte checksum, `(id + value) mod 256`
//!
//! Decoding is a byte-at-a-time state machine that drops bad frames and
//! resynchronizes on the next header pair.

pub mod codec;
pub mod command;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    checksum, encode_command, encode_frame, frame_for_command, truncate_value, Frame, FrameConfig,
    FRAME_SIZE, HEADER_1, HEADER_2,
};
pub use command::{CommandBinding, CommandKey, CommandTable};
pub use decoder::{DecodeState, DecoderStats, FrameDecoder};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::SimpleCodec;
