//! Document operations that touch the served files.

use std::fs::{self, File};

use bandstand_core::model::{Document, DocumentId, UserId};
use bandstand_core::{Database, Error, VersionedStore};

use crate::error::IngestResult;

/// Document metadata plus an open handle on its bytes, for members of the
/// owning band.
pub fn open_document(
    db: &Database,
    id: DocumentId,
    caller: UserId,
) -> IngestResult<(Document, File)> {
    let doc = db.catalog().get_document(id, caller)?;
    let file = File::open(&doc.file_path)?;
    Ok((doc, file))
}

/// Delete a document. Only its uploader or the band owner may.
///
/// The row goes first, so a reader never finds a row without its file. If
/// the file then cannot be removed it is logged as an orphan and the
/// deletion still counts as done.
pub fn delete_document(db: &Database, id: DocumentId, caller: UserId) -> IngestResult<Document> {
    let doc = db.catalog().get_document(id, caller)?;

    if doc.owner_id != caller {
        let tune = db.tunes().get(doc.tune_id)?;
        let band = db.bands().get(tune.band_id)?;
        if band.owner_id != caller {
            return Err(Error::NotPermitted(
                "only the uploader or the band owner can delete a document".to_string(),
            )
            .into());
        }
    }

    let doc = db.documents().delete(id)?;
    match fs::remove_file(&doc.file_path) {
        Ok(()) => log::info!("User {caller} deleted document {id}"),
        Err(e) => log::error!(
            "Deleted document {id} but could not remove {}: {e}",
            doc.file_path.display()
        ),
    }
    Ok(doc)
}
