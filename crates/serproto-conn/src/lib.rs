//! Connection lifecycle for serproto links.
//!
//! A [`Connection`] owns a command table, a callback registry and an outbound
//! queue. `open` spawns one background loop that owns the link: each
//! iteration it decodes whatever input is buffered, dispatches complete
//! frames to callbacks, and writes at most one queued command.

pub mod callbacks;
pub mod config;
pub mod connection;
pub mod error;
pub mod queue;
pub mod state;

pub use callbacks::{handler, CallbackRegistry, Handler};
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionBuilder, ScopedConnection};
pub use error::{ConnError, Result};
pub use queue::{OutboundQueue, PendingOutput};
pub use state::{ConnectionState, LinkStats};

pub use serproto_frame::{CommandBinding, CommandKey, CommandTable};
