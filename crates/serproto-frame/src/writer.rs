use bytes::BytesMut;
use serproto_transport::Link;
use tracing::trace;

use crate::codec::{encode_frame, frame_for_command, Frame, FRAME_SIZE};
use crate::command::CommandTable;
use crate::error::Result;

/// Encodes frames and writes them whole to a borrowed link.
pub struct FrameWriter {
    buf: BytesMut,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(FRAME_SIZE),
        }
    }

    /// Write one complete frame.
    pub fn write_frame<L: Link + ?Sized>(&mut self, link: &mut L, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf);
        link.write_all(&self.buf)?;
        trace!(command_id = frame.command_id, value = frame.value, "frame written");
        Ok(())
    }

    /// Resolve `name` through `table`, encode it with `value`, and write it.
    pub fn send<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        table: &CommandTable,
        name: &str,
        value: i64,
    ) -> Result<Frame> {
        let frame = frame_for_command(table, name, value)?;
        self.write_frame(link, &frame)?;
        Ok(frame)
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}
