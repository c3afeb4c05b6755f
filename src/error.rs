//! Error types for xferline.

use thiserror::Error;

/// Result type alias using xferline's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xferline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Pipeline configuration is invalid (e.g., no compatible mechanism
    /// between adjacent elements). Raised before the transfer starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transfer was cancelled deliberately. Not a failure.
    #[error("transfer cancelled")]
    Cancelled,

    /// An element hit a hard I/O failure mid-transfer.
    #[error("element '{element}' failed: {message}")]
    Element {
        /// Name of the element that reported the failure.
        element: String,
        /// The element's error message.
        message: String,
    },

    /// Malformed data received from a peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an element-local error with the reporting element's name.
    ///
    /// Errors that already carry an element name are passed through, so
    /// a failure is attributed to the element closest to its origin.
    pub fn in_element(self, element: &str) -> Self {
        match self {
            Self::Element { .. } | Self::Cancelled => self,
            other => Self::Element {
                element: element.to_string(),
                message: other.to_string(),
            },
        }
    }
}
