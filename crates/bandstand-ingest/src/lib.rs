//! Document ingestion and configuration for bandstand.
//!
//! Uploads are staged, validated, authorized, and then promoted into the
//! served directory with a single rename, so a document's bytes and its
//! catalog row become visible together or not at all.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod documents;
pub mod error;
pub mod pipeline;
pub mod staging;

pub use config::Config;
pub use documents::{delete_document, open_document};
pub use error::{IngestError, IngestResult};
pub use pipeline::{IngestionPipeline, UploadInfo, UploadPart};
pub use staging::{StagedFile, StagingArea};

use bandstand_core::Database;

/// Open the configured database, creating its directory if needed.
pub fn open_database(config: &Config) -> IngestResult<Database> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Database::open_with_timeout(
        &config.database_path,
        config.busy_timeout(),
    )?)
}
