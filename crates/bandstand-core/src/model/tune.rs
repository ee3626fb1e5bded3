use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::ids::{BandId, TuneId};
use crate::model::UnknownVariant;
use crate::store::Versioned;
use crate::validate::{unique, Validate, Validator};

/// A musical key, e.g. "D major" or "E dorian".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Split text into lowercase alphanumeric words, first occurrence kept.
///
/// Titles are indexed and searched with the same split, so a search term
/// matches a whole title word and never part of one.
pub fn title_words(text: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let word = word.to_lowercase();
        if !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

/// How far along a tune is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TuneStatus {
    Germinating,
    Seedling,
    Flowering,
}

impl TuneStatus {
    pub const ALL: [Self; 3] = [Self::Germinating, Self::Seedling, Self::Flowering];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Germinating => "germinating",
            Self::Seedling => "seedling",
            Self::Flowering => "flowering",
        }
    }
}

impl fmt::Display for TuneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TuneStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("status", s))
    }
}

impl ToSql for TuneStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TuneStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A versioned creative-work record owned by a band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tune {
    pub id: TuneId,
    pub band_id: BandId,
    pub title: String,

    /// Non-empty, duplicate-free.
    pub keys: Vec<Key>,

    pub time_signature_upper: u8,

    /// Must be a power of two.
    pub time_signature_lower: u8,

    pub status: TuneStatus,

    /// Optimistic concurrency stamp; 1 on creation, +1 per update.
    pub version: i32,

    pub created_at: DateTime<Utc>,
}

impl Tune {
    #[must_use]
    pub fn new(band_id: BandId, title: impl Into<String>, keys: Vec<Key>) -> Self {
        Self {
            id: TuneId::new(0),
            band_id,
            title: title.into(),
            keys,
            time_signature_upper: 4,
            time_signature_lower: 4,
            status: TuneStatus::Germinating,
            version: 1,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_time_signature(mut self, upper: u8, lower: u8) -> Self {
        self.time_signature_upper = upper;
        self.time_signature_lower = lower;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: TuneStatus) -> Self {
        self.status = status;
        self
    }
}

impl Validate for Tune {
    fn validate(&self, v: &mut Validator) {
        v.check(!self.title.is_empty(), "title", "must be provided");
        v.check(self.title.len() <= 500, "title", "must not be more than 500 bytes long");

        v.check(!self.keys.is_empty(), "keys", "must contain at least 1 key");
        v.check(unique(&self.keys), "keys", "must not contain duplicate values");
        v.check(
            self.keys.iter().all(|k| !k.as_str().trim().is_empty()),
            "keys",
            "must not contain blank values",
        );

        v.check(self.time_signature_upper != 0, "time_signature_upper", "must be provided");
        v.check(self.time_signature_upper > 1, "time_signature_upper", "must be greater than 1");

        v.check(self.time_signature_lower != 0, "time_signature_lower", "must be provided");
        v.check(self.time_signature_lower > 1, "time_signature_lower", "must be at least 2");
        v.check(
            self.time_signature_lower.is_power_of_two(),
            "time_signature_lower",
            "must be a power of 2",
        );

        v.check(self.band_id.is_valid(), "band_id", "must be a positive integer");
    }
}

impl Versioned for Tune {
    const ENTITY: &'static str = "tune";

    fn id(&self) -> i64 {
        self.id.get()
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

/// Partial update for a tune; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunePatch {
    pub title: Option<String>,
    pub keys: Option<Vec<Key>>,
    pub time_signature_upper: Option<u8>,
    pub time_signature_lower: Option<u8>,
    pub status: Option<TuneStatus>,
    pub band_id: Option<BandId>,
}

impl TunePatch {
    pub fn apply(self, tune: &mut Tune) {
        if let Some(title) = self.title {
            tune.title = title;
        }
        if let Some(keys) = self.keys {
            tune.keys = keys;
        }
        if let Some(upper) = self.time_signature_upper {
            tune.time_signature_upper = upper;
        }
        if let Some(lower) = self.time_signature_lower {
            tune.time_signature_lower = lower;
        }
        if let Some(status) = self.status {
            tune.status = status;
        }
        if let Some(band_id) = self.band_id {
            tune.band_id = band_id;
        }
    }
}
