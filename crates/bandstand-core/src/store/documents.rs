use rusqlite::OptionalExtension;
use std::path::PathBuf;

use crate::error::{ConstraintKind, Error, Result};
use crate::model::{Document, DocumentId, TuneId};
use crate::schema::Database;
use crate::store::parse_timestamp;
use crate::validate::Validate;

const DOCUMENT_COLUMNS: &str = "documents.id, documents.tune_id, documents.owner_id, \
     documents.created_at, documents.file_path, documents.file_type, documents.title";

/// Documents repository. Only metadata rows; the bytes are the ingest
/// crate's concern.
#[derive(Debug, Clone, Copy)]
pub struct DocumentStore<'a> {
    db: &'a Database,
}

impl<'a> DocumentStore<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a metadata row and fill in its id.
    pub fn insert(&self, doc: &mut Document) -> Result<()> {
        doc.ensure_valid()?;
        let path = doc
            .file_path
            .to_str()
            .ok_or_else(|| Error::InvalidData("document path is not valid UTF-8".to_string()))?
            .to_string();

        let tx = self.db.write_transaction()?;
        let inserted = tx.query_row(
            "INSERT INTO documents (tune_id, owner_id, created_at, file_path, file_type, title)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id",
            rusqlite::params![
                doc.tune_id,
                doc.owner_id,
                doc.created_at.to_rfc3339(),
                path,
                doc.file_type,
                doc.title,
            ],
            |row| row.get(0),
        );

        let id = match inserted {
            Ok(id) => id,
            Err(e) => {
                return Err(match ConstraintKind::of(&e) {
                    Some(ConstraintKind::ForeignKey) => {
                        let tune_exists: bool = tx.query_row(
                            "SELECT EXISTS(SELECT 1 FROM tunes WHERE id = ?1)",
                            [doc.tune_id],
                            |row| row.get(0),
                        )?;
                        if tune_exists {
                            Error::UserNotFound(doc.owner_id)
                        } else {
                            Error::not_found("tune", doc.tune_id)
                        }
                    }
                    Some(kind) if kind.is_duplicate() => Error::AlreadyExists {
                        entity: "document",
                        field: "file_path",
                    },
                    _ => Error::from(e),
                });
            }
        };
        tx.commit()?;

        doc.id = id;
        Ok(())
    }

    pub fn get(&self, id: DocumentId) -> Result<Document> {
        if !id.is_valid() {
            return Err(Error::not_found("document", id));
        }

        self.db
            .conn()
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                [id],
                row_to_document,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("document", id))
    }

    /// Documents attached to a tune, oldest first.
    pub fn list_for_tune(&self, tune_id: TuneId) -> Result<Vec<Document>> {
        if !tune_id.is_valid() {
            return Err(Error::not_found("tune", tune_id));
        }

        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE tune_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([tune_id], row_to_document)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete the metadata row and return it, so the caller can remove the
    /// file it pointed at.
    pub fn delete(&self, id: DocumentId) -> Result<Document> {
        if !id.is_valid() {
            return Err(Error::not_found("document", id));
        }

        self.db
            .conn()
            .query_row(
                &format!("DELETE FROM documents WHERE id = ?1 RETURNING {DOCUMENT_COLUMNS}"),
                [id],
                row_to_document,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("document", id))
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let created_at: String = row.get(3)?;
    let file_path: String = row.get(4)?;
    Ok(Document {
        id: row.get(0)?,
        tune_id: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
        file_path: PathBuf::from(file_path),
        file_type: row.get(5)?,
        title: row.get(6)?,
    })
}
