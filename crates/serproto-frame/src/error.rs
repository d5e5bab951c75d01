use serproto_transport::TransportError;

/// Errors that can occur while building command tables or encoding/decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The command name is not bound in the command table.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Two bindings share a name or an id.
    #[error("duplicate command binding {name}={id}: {reason}")]
    DuplicateCommandBinding { name: String, id: u8, reason: String },

    /// A `NAME=ID` binding could not be parsed.
    #[error("invalid command binding {input:?}: {reason}")]
    InvalidBinding { input: String, reason: String },

    /// The link failed while reading or writing frames.
    #[error("frame transport error: {0}")]
    Transport(#[from] TransportError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
