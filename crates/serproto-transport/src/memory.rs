use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Link, LinkOpener};

#[derive(Default)]
struct Pipe {
    buf: Mutex<VecDeque<u8>>,
    closed: AtomicBool,
}

impl Pipe {
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<u8>> {
        self.buf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One end of an in-process loopback link.
///
/// Bytes written on one end become available on the other. Closing or
/// dropping either end closes both directions.
pub struct MemoryLink {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
}

impl MemoryLink {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        (
            Self {
                rx: Arc::clone(&b_to_a),
                tx: Arc::clone(&a_to_b),
            },
            Self {
                rx: a_to_b,
                tx: b_to_a,
            },
        )
    }

    /// Take everything currently buffered for this end.
    pub fn drain(&mut self) -> Vec<u8> {
        self.rx.lock().drain(..).collect()
    }

    /// Whether either end has been closed.
    pub fn is_closed(&self) -> bool {
        self.rx.closed.load(Ordering::SeqCst) || self.tx.closed.load(Ordering::SeqCst)
    }
}

impl Link for MemoryLink {
    fn bytes_available(&mut self) -> Result<usize> {
        let buf = self.rx.lock();
        if buf.is_empty() && self.rx.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(buf.len())
    }

    fn read_available(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut buf = self.rx.lock();
        let n = buf.len().min(out.len());
        for (slot, byte) in out.iter_mut().zip(buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if self.tx.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.tx.lock().extend(bytes.iter().copied());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.rx.closed.store(true, Ordering::SeqCst);
        self.tx.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for MemoryLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLink")
            .field("pending", &self.rx.lock().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Hands out prepared [`MemoryLink`] ends, one per `open` call.
///
/// An `open` with nothing queued fails like a missing device would.
#[derive(Default)]
pub struct MemoryOpener {
    links: Mutex<VecDeque<MemoryLink>>,
    opened: Mutex<Vec<(String, u32)>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an opener holding one end of a fresh pair; returns the other end.
    pub fn with_pair() -> (Self, MemoryLink) {
        let (local, remote) = MemoryLink::pair();
        let opener = Self::new();
        opener.push(local);
        (opener, remote)
    }

    /// Queue a link for a later `open`.
    pub fn push(&self, link: MemoryLink) {
        self.links
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(link);
    }

    /// `(port, baud)` of every successful `open`, oldest first.
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LinkOpener for MemoryOpener {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Link>> {
        let link = self
            .links
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| TransportError::Open {
                port: port.to_string(),
                baud,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no memory link queued for this port",
                ),
            })?;
        debug!(port, baud, "opened memory link");
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((port.to_string(), baud));
        Ok(Box::new(link))
    }
}
