use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Link, LinkOpener};

/// Serial port settings applied on open. Framing is always 8N1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// Timeout for a single read or write on the device.
    pub timeout: Duration,
    /// Discard whatever the OS buffered before the port was opened.
    pub clear_input_on_open: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(100),
            clear_input_on_open: false,
        }
    }
}

/// A serial device opened through the `serialport` crate.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialLink {
    /// Open `path` at `baud` with the given settings (blocking).
    pub fn open(path: &str, baud: u32, config: SerialConfig) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(config.timeout)
            .open()
            .map_err(|err| TransportError::Open {
                port: path.to_string(),
                baud,
                source: err.into(),
            })?;

        if config.clear_input_on_open {
            port.clear(ClearBuffer::Input)
                .map_err(|err| TransportError::Io(err.into()))?;
        }

        info!(port = path, baud, "opened serial port");
        Ok(Self {
            port,
            name: path.to_string(),
        })
    }

    /// Device path this link was opened on.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Link for SerialLink {
    fn bytes_available(&mut self) -> Result<usize> {
        let count = self
            .port
            .bytes_to_read()
            .map_err(|err| TransportError::Io(err.into()))?;
        Ok(count as usize)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.port.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(0),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!(port = %self.name, "closing serial port");
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "serial"
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink").field("port", &self.name).finish()
    }
}

/// Opens [`SerialLink`]s with a fixed [`SerialConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener {
    config: SerialConfig,
}

impl SerialOpener {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl LinkOpener for SerialOpener {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Link>> {
        Ok(Box::new(SerialLink::open(port, baud, self.config)?))
    }
}
