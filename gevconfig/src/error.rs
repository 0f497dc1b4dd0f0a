use std::io::Error as IoError;
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IoError(#[from] IoError),

    #[error(transparent)]
    Protocol(#[from] crate::protocol::Error),

    #[error("data parse error: {0}")]
    BinRwError(#[from] binrw::Error),

    #[error("channel unavailable, likely dropped")]
    ChannelUnavailable,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("unexpected response from device")]
    UnexpectedResponse,

    /// An operation on the camera bus failed.
    #[error("{context}: {source}")]
    Failed {
        context: String,
        source: Box<Error>,
    },
}

/// Attaches an operation-specific message to an [`Error`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn context(self, context: impl Into<String>) -> Result<T, Error> {
        self.map_err(|source| Error::Failed {
            context: context.into(),
            source: Box::new(source),
        })
    }
}
