use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::model::ids::{DocumentId, TuneId, UserId};
use crate::model::UnknownVariant;
use crate::validate::{Validate, Validator};

/// Permitted document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
}

impl FileType {
    pub const ALL: [Self; 1] = [Self::Pdf];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("file type", s))
    }
}

impl ToSql for FileType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FileType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A binary artifact (e.g. a score) attached to a tune.
///
/// A row exists if and only if the bytes at `file_path` are fully present.
/// The path is storage detail and never serialized to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub tune_id: TuneId,

    /// The uploading user.
    pub owner_id: UserId,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing)]
    pub file_path: PathBuf,

    pub file_type: FileType,
    pub title: String,
}

impl Document {
    #[must_use]
    pub fn new(
        tune_id: TuneId,
        owner_id: UserId,
        file_path: PathBuf,
        file_type: FileType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: DocumentId::new(0),
            tune_id,
            owner_id,
            created_at: Utc::now(),
            file_path,
            file_type,
            title: title.into(),
        }
    }
}

impl Validate for Document {
    fn validate(&self, v: &mut Validator) {
        v.check(self.tune_id.is_valid(), "tune_id", "must be a positive integer");
        v.check(!self.title.is_empty(), "title", "must be provided");
        v.check(self.title.len() <= 500, "title", "must not be more than 500 bytes long");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_is_never_serialized() {
        let doc = Document::new(
            TuneId::new(1),
            UserId::new(2),
            PathBuf::from("/srv/documents/abc"),
            FileType::Pdf,
            "Lead sheet",
        );
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("file_path").is_none());
        assert_eq!(json["file_type"], "pdf");
        assert_eq!(json["title"], "Lead sheet");
    }

    #[test]
    fn test_file_type_parsing() {
        assert_eq!("pdf".parse::<FileType>().unwrap(), FileType::Pdf);
        assert!("docx".parse::<FileType>().is_err());
    }
}
