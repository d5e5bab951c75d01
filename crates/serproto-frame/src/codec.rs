use bytes::{BufMut, BytesMut};

use crate::command::CommandTable;
use crate::error::Result;

/// First header byte of every frame.
pub const HEADER_1: u8 = 0xFF;

/// Second header byte of every frame.
pub const HEADER_2: u8 = 0xFE;

/// Wire size of a frame: header (2) + command id (1) + value (1) + checksum (1).
pub const FRAME_SIZE: usize = 5;

/// Default number of bytes pulled from a link per read call.
pub const DEFAULT_READ_CHUNK: usize = 256;

/// A decoded or to-be-encoded command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Numeric command id.
    pub command_id: u8,
    /// Single-byte payload.
    pub value: u8,
}

impl Frame {
    pub fn new(command_id: u8, value: u8) -> Self {
        Self { command_id, value }
    }

    /// Trailing checksum byte for this frame.
    pub fn checksum(&self) -> u8 {
        checksum(self.command_id, self.value)
    }

    /// The five wire bytes of this frame.
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        [
            HEADER_1,
            HEADER_2,
            self.command_id,
            self.value,
            self.checksum(),
        ]
    }
}

/// `(command_id + value) mod 256`.
pub fn checksum(command_id: u8, value: u8) -> u8 {
    command_id.wrapping_add(value)
}

/// Reduce any integer to the single payload byte, modulo 256.
///
/// Out-of-range values are never rejected; negative values wrap the same
/// way (`-1` becomes `255`).
pub fn truncate_value(value: i64) -> u8 {
    value.rem_euclid(256) as u8
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬──────┬────────────┬───────┬──────────────────────┐
/// │ 0xFF │ 0xFE │ command id │ value │ (id + value) mod 256 │
/// └──────┴──────┴────────────┴───────┴──────────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(FRAME_SIZE);
    dst.put_slice(&frame.to_bytes());
}

/// Resolve `name` through `table` and build its frame, truncating `value`.
pub fn frame_for_command(table: &CommandTable, name: &str, value: i64) -> Result<Frame> {
    let command_id = table.id_for(name)?;
    Ok(Frame::new(command_id, truncate_value(value)))
}

/// Encode a named command with an integer value into its five wire bytes.
///
/// Fails only if `name` is not in `table`.
pub fn encode_command(table: &CommandTable, name: &str, value: i64) -> Result<[u8; FRAME_SIZE]> {
    Ok(frame_for_command(table, name, value)?.to_bytes())
}

/// Configuration for reading frames off a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Bytes pulled from the link per read call. Default: 256.
    pub read_chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;

    fn demo_table() -> CommandTable {
        CommandTable::new([("CMD_HEARTBEAT", 0), ("CMD_ACK", 1), ("CMD_TEST1", 4)]).unwrap()
    }

    #[test]
    fn test_encode_known_command() {
        let bytes = encode_command(&demo_table(), "CMD_TEST1", 123).unwrap();
        assert_eq!(bytes, [0xFF, 0xFE, 4, 123, 127]);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(200, 100), 44);
        assert_eq!(Frame::new(255, 1).checksum(), 0);
    }

    #[test]
    fn test_value_truncated_not_rejected() {
        let table = demo_table();
        assert_eq!(encode_command(&table, "CMD_ACK", 256).unwrap(), [0xFF, 0xFE, 1, 0, 1]);
        assert_eq!(encode_command(&table, "CMD_ACK", 300).unwrap()[3], 44);
        assert_eq!(encode_command(&table, "CMD_ACK", -1).unwrap()[3], 255);
    }

    #[test]
    fn test_encode_unknown_command() {
        let err = encode_command(&demo_table(), "CMD_MISSING", 1).unwrap_err();
        assert!(matches!(err, FrameError::UnknownCommand(_)));
    }

    #[test]
    fn test_encode_frame_appends() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::new(0, 2), &mut buf);
        encode_frame(&Frame::new(4, 123), &mut buf);
        assert_eq!(buf.len(), 2 * FRAME_SIZE);
        assert_eq!(&buf[..], &[0xFF, 0xFE, 0, 2, 2, 0xFF, 0xFE, 4, 123, 127]);
    }
}
