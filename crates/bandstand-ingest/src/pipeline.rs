//! Two-phase document ingestion.
//!
//! An upload is two parts: `info` (JSON metadata) and `file` (the bytes).
//! The file is staged, the metadata is validated and authorized, and only
//! then is the staged file renamed into the served directory and its row
//! inserted. If the insert fails the promoted file is deleted again.
//!
//! A crash between the rename and the insert leaves a file with no row.
//! Nothing here reconciles that; it is a known, bounded window.

use std::fmt;
use std::fs;
use std::io::Read;
use std::time::Duration;

use bandstand_core::model::{Document, FileType, TuneId, UserId};
use bandstand_core::{Database, FieldErrors, Validate, Validator, VersionedStore};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::staging::{StagedFile, StagingArea};

/// One named part of a multipart upload body.
pub struct UploadPart<'a> {
    name: String,
    body: Box<dyn Read + 'a>,
}

impl<'a> UploadPart<'a> {
    pub fn new(name: impl Into<String>, body: impl Read + 'a) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for UploadPart<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadPart")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The `info` part. Unknown fields are rejected; missing ones are left
/// empty and reported by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadInfo {
    pub tune_id: i64,
    pub file_type: String,
    pub title: String,
}

impl Validate for UploadInfo {
    fn validate(&self, v: &mut Validator) {
        v.check(self.tune_id > 0, "tune_id", "must be a positive integer");

        v.check(!self.file_type.is_empty(), "file_type", "must be provided");
        v.check(
            self.file_type.parse::<FileType>().is_ok(),
            "file_type",
            "invalid file type",
        );

        v.check(!self.title.is_empty(), "title", "must be provided");
        v.check(self.title.len() <= 500, "title", "must not be more than 500 bytes long");
    }
}

/// Metadata that passed validation and authorization.
#[derive(Debug)]
struct Accepted {
    tune_id: TuneId,
    file_type: FileType,
    title: String,
}

#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    staging: StagingArea,
    staging_max_age: Duration,
}

impl IngestionPipeline {
    pub fn new(staging: StagingArea, staging_max_age: Duration) -> Self {
        Self {
            staging,
            staging_max_age,
        }
    }

    pub fn from_config(config: &Config) -> IngestResult<Self> {
        let staging = StagingArea::new(&config.staging_dir, &config.documents_dir)?;
        Ok(Self::new(staging, config.staging_max_age()))
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Ingest one upload on behalf of `uploader`.
    ///
    /// On success exactly one file exists at the final path and exactly one
    /// row references it. On failure nothing is visible at the final path.
    /// A sweep of stale staged files is started either way.
    pub fn ingest<'a, I>(
        &self,
        db: &Database,
        uploader: UserId,
        parts: I,
    ) -> IngestResult<Document>
    where
        I: IntoIterator<Item = UploadPart<'a>>,
    {
        let upload_id = Uuid::new_v4();
        let result = self.receive(db, uploader, upload_id, parts);
        self.staging.spawn_sweep(self.staging_max_age);

        if let Err(e) = &result {
            log::debug!("Upload {upload_id} from user {uploader} rejected: {e}");
        }
        result
    }

    /// Remove stale staged files now, on the calling thread.
    pub fn sweep_staging(&self) -> IngestResult<usize> {
        Ok(self.staging.sweep(self.staging_max_age)?)
    }

    fn receive<'a, I>(
        &self,
        db: &Database,
        uploader: UserId,
        upload_id: Uuid,
        parts: I,
    ) -> IngestResult<Document>
    where
        I: IntoIterator<Item = UploadPart<'a>>,
    {
        let mut count = 0;
        let mut staged: Option<StagedFile> = None;
        let mut accepted: Option<Accepted> = None;

        for mut part in parts {
            count += 1;
            match part.name.as_str() {
                "info" if accepted.is_none() => {
                    accepted = Some(Self::accept_info(db, uploader, &mut *part.body)?);
                }
                "file" if staged.is_none() => {
                    staged = Some(self.staging.stage(upload_id, &mut *part.body)?);
                }
                name => log::debug!("Ignoring upload part {name:?}"),
            }
        }

        if count != 2 {
            return Err(IngestError::WrongPartCount { count });
        }
        let Some(staged) = staged else {
            return Err(IngestError::MissingFile);
        };
        let Some(info) = accepted else {
            return Err(IngestError::MissingMetadata);
        };

        let final_path = staged.promote(&self.staging.final_path(upload_id))?;
        let mut doc = Document::new(
            info.tune_id,
            uploader,
            final_path,
            info.file_type,
            info.title,
        );

        if let Err(e) = db.documents().insert(&mut doc) {
            // The insert failure is what the caller hears about
            if let Err(cleanup) = fs::remove_file(&doc.file_path) {
                log::error!(
                    "Orphaned document file {} after failed insert: {cleanup}",
                    doc.file_path.display()
                );
            }
            return Err(e.into());
        }

        log::info!(
            "User {uploader} uploaded document {} for tune {}",
            doc.id,
            doc.tune_id
        );
        Ok(doc)
    }

    /// Decode, validate, and authorize the `info` part.
    fn accept_info(
        db: &Database,
        uploader: UserId,
        body: &mut dyn Read,
    ) -> IngestResult<Accepted> {
        let info: UploadInfo =
            serde_json::from_reader(body).map_err(IngestError::MalformedMetadata)?;
        info.ensure_valid()?;

        let file_type = info.file_type.parse::<FileType>().map_err(|_| {
            bandstand_core::Error::Validation(FieldErrors::single("file_type", "invalid file type"))
        })?;

        let tune = db.tunes().get(TuneId::new(info.tune_id))?;
        db.memberships().require_member(uploader, tune.band_id)?;

        Ok(Accepted {
            tune_id: tune.id,
            file_type,
            title: info.title,
        })
    }
}
