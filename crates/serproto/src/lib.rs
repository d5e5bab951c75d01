//! Simple framed command protocol over serial links.
//!
//! serproto exchanges named one-byte commands, each carrying a one-byte
//! value, over a serial port. Frames are five bytes: `0xFF 0xFE id value
//! checksum`.
//!
//! # Crate Structure
//!
//! - [`transport`]: Link abstraction (serial ports, in-memory loopback)
//! - [`frame`]: Command table, frame codec and decoder state machine
//! - [`conn`]: Connection lifecycle, callbacks and outbound queue (behind `conn` feature)

/// Re-export transport types.
pub mod transport {
    pub use serproto_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serproto_frame::*;
}

/// Re-export connection types (requires `conn` feature).
#[cfg(feature = "conn")]
pub mod conn {
    pub use serproto_conn::*;
}
