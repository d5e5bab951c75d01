use serproto_frame::FrameError;
use serproto_transport::TransportError;

use crate::state::ConnectionState;

/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// The command name is not bound in the connection's command table.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Two command bindings share a name or an id.
    #[error("duplicate command binding {name}={id}: {reason}")]
    DuplicateCommandBinding { name: String, id: u8, reason: String },

    /// A send was attempted while the connection was neither connecting nor connected.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// `open` was called while a communication loop is still live.
    #[error("connection already open (state: {0})")]
    AlreadyOpen(ConnectionState),

    /// No link opener was configured and no default transport is compiled in.
    #[error("no link opener configured")]
    NoTransport,

    /// The communication loop thread could not be started.
    #[error("failed to spawn communication loop: {0}")]
    Spawn(std::io::Error),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(FrameError),
}

impl From<FrameError> for ConnError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::UnknownCommand(name) => ConnError::UnknownCommand(name),
            FrameError::DuplicateCommandBinding { name, id, reason } => {
                ConnError::DuplicateCommandBinding { name, id, reason }
            }
            FrameError::Transport(err) => ConnError::Transport(err),
            other => ConnError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnError>;
