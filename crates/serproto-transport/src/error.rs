/// Errors that can occur in link transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the link at the given identifier.
    #[error("failed to open {port} at {baud} baud: {source}")]
    Open {
        port: String,
        baud: u32,
        source: std::io::Error,
    },

    /// An I/O error occurred on an open link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed, either locally or by the remote end.
    #[error("link closed")]
    Closed,
}

impl TransportError {
    /// Whether the link is unusable after this error.
    ///
    /// Timeouts and interrupted calls are transient; a vanished device or a
    /// closed link is not.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Open { .. } | TransportError::Closed => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
