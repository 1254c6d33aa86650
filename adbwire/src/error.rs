//! Error types for adbwire operations.

/// Alias for `Result<T, adbwire::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by ADB client operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The server answered `FAIL`, at host or sync level.
    #[error("command failed: {0}")]
    Protocol(String),

    /// A status code was neither `OKAY` nor `FAIL`.
    #[error("unknown response: {0}")]
    UnknownResponse(String),

    /// A remote TCP connect/disconnect was refused.
    ///
    /// Carries the text after the last colon of the server's status line.
    #[error("remote connection failed:{0}")]
    RemoteConnection(String),

    /// A caller-supplied argument cannot be put on the wire.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stream failure or malformed framing.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
