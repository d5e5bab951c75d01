//! Byte-stream link abstraction for serproto.
//!
//! The protocol layers above never touch a device directly. They talk to a
//! [`Link`] obtained from a [`LinkOpener`]:
//! - [`SerialOpener`] opens a real serial port (feature `serial`)
//! - [`MemoryOpener`] hands out one end of an in-process loopback pair
//!
//! This is the lowest layer of serproto.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use error::{Result, TransportError};
pub use memory::{MemoryLink, MemoryOpener};
pub use traits::{Link, LinkOpener};

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialLink, SerialOpener};
