//! Repositories and the version-stamped compare-and-swap primitive.
//!
//! Bands and tunes carry a `version` column. An update only applies when
//! the stored version still equals the version the caller read, and it
//! advances the version by exactly one in the same statement. When no row
//! matches the caller gets [`Error::EditConflict`] and must re-read; the
//! store itself never retries.

pub(crate) mod bands;
mod documents;
mod tunes;
pub(crate) mod users;

pub use bands::BandStore;
pub use documents::DocumentStore;
pub use tunes::TuneStore;
pub use users::UserStore;

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::validate::Validate;

/// A record guarded by an optimistic-concurrency version stamp.
pub trait Versioned {
    /// Entity name used in errors and logs.
    const ENTITY: &'static str;

    fn id(&self) -> i64;
    fn version(&self) -> i32;
    fn set_version(&mut self, version: i32);
}

/// Fetch and compare-and-swap update for a versioned record type.
pub trait VersionedStore<T: Versioned> {
    type Id: Copy;

    /// `NotFound` for ids below 1 or absent rows; never a default value.
    fn get(&self, id: Self::Id) -> Result<T>;

    /// Persist `record` if its `version` is still current, then store the
    /// new version back into it.
    fn update(&self, record: &mut T) -> Result<()>;
}

/// What to do when a read-modify-write cycle loses a version race.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Retry {
    /// Surface the conflict to the caller.
    #[default]
    Never,
    /// Re-run the whole cycle at most this many more times.
    UpTo(u32),
}

impl Retry {
    fn allows(self, retries_so_far: u32) -> bool {
        match self {
            Self::Never => false,
            Self::UpTo(max) => retries_so_far < max,
        }
    }
}

/// Fetch a record, merge the caller's changes, re-validate, and CAS-update.
///
/// `merge` runs against the freshly fetched record on every attempt, so a
/// retry re-applies the caller's intent to the newer state rather than
/// overwriting it. It may also reject the change by returning an error.
pub fn read_modify_write<T, S, F>(store: &S, id: S::Id, retry: Retry, mut merge: F) -> Result<T>
where
    T: Versioned + Validate,
    S: VersionedStore<T>,
    F: FnMut(&mut T) -> Result<()>,
{
    let mut retries = 0;
    loop {
        let mut record = store.get(id)?;
        merge(&mut record)?;
        record.ensure_valid()?;

        match store.update(&mut record) {
            Ok(()) => return Ok(record),
            Err(e) if e.is_edit_conflict() && retry.allows(retries) => {
                retries += 1;
                log::debug!(
                    "Retrying {} {} after edit conflict (attempt {})",
                    T::ENTITY,
                    record.id(),
                    retries + 1
                );
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run `UPDATE {table} SET {assignments}, version = version + 1
/// WHERE id = ? AND version = ?` and write the new version into `record`.
///
/// `table` and the column names are compile-time constants of the calling
/// repository; only values are bound.
pub(crate) fn compare_and_swap<T: Versioned>(
    conn: &Connection,
    table: &'static str,
    assignments: &[(&'static str, &dyn ToSql)],
    record: &mut T,
) -> Result<()> {
    let mut set_clause = String::new();
    for (i, (column, _)) in assignments.iter().enumerate() {
        set_clause.push_str(column);
        set_clause.push_str(" = ?");
        set_clause.push_str(&(i + 1).to_string());
        set_clause.push_str(", ");
    }
    let n = assignments.len();
    let sql = format!(
        "UPDATE {table} SET {set_clause}version = version + 1 \
         WHERE id = ?{} AND version = ?{} RETURNING version",
        n + 1,
        n + 2
    );

    let id = record.id();
    let expected = record.version();
    let mut params: Vec<&dyn ToSql> = assignments.iter().map(|(_, value)| *value).collect();
    params.push(&id);
    params.push(&expected);

    let new_version: Option<i32> = conn
        .query_row(&sql, params.as_slice(), |row| row.get(0))
        .optional()?;

    match new_version {
        Some(version) => {
            record.set_version(version);
            Ok(())
        }
        None => {
            log::warn!(
                "Edit conflict on {} {} (expected version {})",
                T::ENTITY,
                id,
                expected
            );
            Err(Error::EditConflict {
                entity: T::ENTITY,
                id,
            })
        }
    }
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(Into::into)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
