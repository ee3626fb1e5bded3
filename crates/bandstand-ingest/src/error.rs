//! Ingestion error types.

use bandstand_core::PublicError;
use thiserror::Error;

/// Errors that can occur while ingesting or serving documents.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The upload carried no `file` part.
    #[error("upload is missing the file part")]
    MissingFile,

    /// The upload carried no `info` part.
    #[error("upload is missing the info part")]
    MissingMetadata,

    /// The upload did not consist of exactly two parts.
    #[error("upload must contain exactly 2 parts, got {count}")]
    WrongPartCount { count: usize },

    /// The `info` part could not be decoded.
    #[error("malformed upload info: {0}")]
    MalformedMetadata(#[source] serde_json::Error),

    /// An error propagated from the core domain layer.
    #[error(transparent)]
    Core(#[from] bandstand_core::Error),

    /// Staging, promotion, or cleanup failed on the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Returns `true` for failures the caller cannot correct.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Core(e) => e.is_infrastructure(),
            _ => false,
        }
    }

    /// HTTP status an adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingFile
            | Self::MissingMetadata
            | Self::WrongPartCount { .. }
            | Self::MalformedMetadata(_) => 400,
            Self::Core(e) => e.status_code(),
            Self::Io(_) => 500,
        }
    }

    /// Convert into the shape an adapter renders.
    pub fn report(&self) -> PublicError {
        match self {
            Self::Core(e) => e.report(),
            Self::Io(e) => {
                log::error!("{e}");
                PublicError::server_error()
            }
            e => PublicError {
                status: e.status_code(),
                message: e.to_string(),
                fields: None,
            },
        }
    }
}

/// Convenience alias for ingestion results.
pub type IngestResult<T> = std::result::Result<T, IngestError>;
