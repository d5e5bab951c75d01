use crate::error::Result;

/// An open, bidirectional byte-stream link such as a serial port.
///
/// Reads are bounded by what the link has already buffered: callers ask
/// [`Link::bytes_available`] first and never read more than that, so a read
/// never waits for bytes that may not arrive.
pub trait Link: Send {
    /// Number of received bytes buffered and ready to read.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` already-buffered bytes, returning how many were read.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write every byte of `bytes` and flush.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Release the link. Dropping the link must also release it.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Short transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_available(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

/// Opens links by identifier (e.g. `/dev/ttyUSB0`) and baud rate.
///
/// `open` blocks until the link is ready or fails.
pub trait LinkOpener: Send + Sync {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Link>>;
}
