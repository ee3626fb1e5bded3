use rusqlite::ffi;
use serde::Serialize;
use thiserror::Error;

use crate::model::{BandId, UserId};
use crate::validate::FieldErrors;

/// Message returned to callers in place of infrastructure error detail.
const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("already exists: {entity} ({field})")]
    AlreadyExists {
        entity: &'static str,
        field: &'static str,
    },

    #[error("user {0} does not exist")]
    UserNotFound(UserId),

    #[error("band {0} does not exist")]
    BandNotFound(BandId),

    #[error("edit conflict: {entity} {id} was modified concurrently")]
    EditConflict { entity: &'static str, id: i64 },

    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("user {user_id} owns band {band_id} and cannot be removed from it")]
    CannotRemoveOwner { band_id: BandId, user_id: UserId },

    #[error("{entity} {id} still has dependent records")]
    HasDependents { entity: &'static str, id: i64 },

    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` for store and filesystem failures the caller cannot
    /// correct; their detail must never reach the caller.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) | Self::InvalidData(_)
        )
    }

    pub fn is_edit_conflict(&self) -> bool {
        matches!(self, Self::EditConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// HTTP status an adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::NotPermitted(_) => 403,
            Self::EditConflict { .. } | Self::CannotRemoveOwner { .. } | Self::HasDependents { .. } => {
                409
            }
            Self::Validation(_)
            | Self::AlreadyExists { .. }
            | Self::UserNotFound(_)
            | Self::BandNotFound(_) => 422,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) | Self::InvalidData(_) => 500,
        }
    }

    /// Caller-safe message. Infrastructure errors collapse to a generic text.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound { .. } => "the requested resource could not be found".to_string(),
            Self::EditConflict { .. } => {
                "unable to update the record due to an edit conflict, please try again".to_string()
            }
            Self::Validation(_)
            | Self::AlreadyExists { .. }
            | Self::UserNotFound(_)
            | Self::BandNotFound(_) => "the request failed validation".to_string(),
            e if e.is_infrastructure() => SERVER_ERROR_MESSAGE.to_string(),
            e => e.to_string(),
        }
    }

    /// Field-level detail for user-correctable errors.
    pub fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            Self::Validation(errors) => Some(errors.clone()),
            Self::AlreadyExists { entity, field } => Some(FieldErrors::single(
                field,
                format!("this {entity} already exists"),
            )),
            Self::UserNotFound(_) => Some(FieldErrors::single("user_id", "this user does not exist")),
            Self::BandNotFound(_) => Some(FieldErrors::single("band_id", "this band does not exist")),
            _ => None,
        }
    }

    /// Convert into the shape an adapter renders. Infrastructure errors are
    /// logged here with full detail, since the result carries none of it.
    pub fn report(&self) -> PublicError {
        if self.is_infrastructure() {
            log::error!("{self}");
        }
        PublicError {
            status: self.status_code(),
            message: self.public_message(),
            fields: self.field_errors(),
        }
    }
}

/// What a caller is allowed to see of an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicError {
    #[serde(skip)]
    pub status: u16,
    #[serde(rename = "error")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl PublicError {
    /// The opaque reply for store and filesystem failures.
    pub fn server_error() -> Self {
        Self {
            status: 500,
            message: SERVER_ERROR_MESSAGE.to_string(),
            fields: None,
        }
    }
}

/// The integrity constraint a failed statement violated, taken from
/// SQLite's extended result code rather than its message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    NotNull,
    Check,
    Other,
}

impl ConstraintKind {
    /// Classify a rusqlite error. Returns `None` when the error is not a
    /// constraint violation at all.
    pub fn of(err: &rusqlite::Error) -> Option<Self> {
        match err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Some(match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Self::PrimaryKey,
                    ffi::SQLITE_CONSTRAINT_UNIQUE => Self::Unique,
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Self::ForeignKey,
                    ffi::SQLITE_CONSTRAINT_NOTNULL => Self::NotNull,
                    ffi::SQLITE_CONSTRAINT_CHECK => Self::Check,
                    _ => Self::Other,
                })
            }
            _ => None,
        }
    }

    /// Primary-key and unique collisions both mean "this row already exists".
    pub fn is_duplicate(self) -> bool {
        matches!(self, Self::PrimaryKey | Self::Unique)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn violation(sql: &str) -> rusqlite::Error {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);
             CREATE TABLE child (parent_id INTEGER NOT NULL REFERENCES parent(id),
                                 n INTEGER CHECK (n > 0));
             INSERT INTO parent (id, name) VALUES (1, 'a');",
        )
        .unwrap();
        conn.execute_batch(sql).unwrap_err()
    }

    #[test]
    fn test_constraint_kind_from_extended_code() {
        assert_eq!(
            ConstraintKind::of(&violation("INSERT INTO parent (id, name) VALUES (1, 'b')")),
            Some(ConstraintKind::PrimaryKey)
        );
        assert_eq!(
            ConstraintKind::of(&violation("INSERT INTO parent (id, name) VALUES (2, 'a')")),
            Some(ConstraintKind::Unique)
        );
        assert_eq!(
            ConstraintKind::of(&violation("INSERT INTO child (parent_id, n) VALUES (9, 1)")),
            Some(ConstraintKind::ForeignKey)
        );
        assert_eq!(
            ConstraintKind::of(&violation("INSERT INTO child (parent_id, n) VALUES (1, 0)")),
            Some(ConstraintKind::Check)
        );
        assert_eq!(
            ConstraintKind::of(&violation("INSERT INTO parent (id, name) VALUES (3, NULL)")),
            Some(ConstraintKind::NotNull)
        );
    }

    #[test]
    fn test_non_constraint_error_is_unclassified() {
        let err = violation("SELECT * FROM missing_table");
        assert_eq!(ConstraintKind::of(&err), None);
    }

    #[test]
    fn test_infrastructure_errors_are_opaque() {
        let err = Error::InvalidData("/srv/docs/secret-path".to_string());
        let public = err.report();
        assert_eq!(public.status, 500);
        assert!(!public.message.contains("secret-path"));
        assert!(public.fields.is_none());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::not_found("band", 3).status_code(), 404);
        assert_eq!(
            Error::EditConflict {
                entity: "tune",
                id: 1
            }
            .status_code(),
            409
        );
        assert_eq!(Error::NotPermitted("x".into()).status_code(), 403);
        assert_eq!(Error::UserNotFound(UserId::new(4)).status_code(), 422);
    }

    #[test]
    fn test_user_not_found_has_field_detail() {
        let fields = Error::UserNotFound(UserId::new(4)).field_errors().unwrap();
        assert_eq!(fields.get("user_id"), Some("this user does not exist"));
    }
}
