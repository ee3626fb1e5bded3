use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{ConstraintKind, Error, Result};
use crate::model::{title_words, BandId, Key, Tune, TuneId};
use crate::query::{Metadata, QueryPlan};
use crate::schema::Database;
use crate::store::{compare_and_swap, parse_timestamp, Versioned, VersionedStore};

const TUNE_COLUMNS: &str = "tunes.id, tunes.band_id, tunes.title, tunes.keys, \
     tunes.time_signature_upper, tunes.time_signature_lower, tunes.status, \
     tunes.version, tunes.created_at";

// ?1 band id, ?2 title terms, ?3 required keys, ?4 statuses (all JSON arrays).
// An empty array leaves its condition vacuously true.
const TUNE_LIST_WHERE: &str = "tunes.band_id = ?1
    AND NOT EXISTS (
        SELECT 1 FROM json_each(?2) AS term
        WHERE term.value NOT IN (SELECT value FROM json_each(tunes.title_words)))
    AND NOT EXISTS (
        SELECT 1 FROM json_each(?3) AS wanted
        WHERE wanted.value NOT IN (SELECT value FROM json_each(tunes.keys)))
    AND (json_array_length(?4) = 0
        OR tunes.status IN (SELECT value FROM json_each(?4)))";

/// Tunes repository.
#[derive(Debug, Clone, Copy)]
pub struct TuneStore<'a> {
    db: &'a Database,
}

impl<'a> TuneStore<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a tune and fill in its id and version. A missing band is
    /// `BandNotFound`.
    pub fn insert(&self, tune: &mut Tune) -> Result<()> {
        Self::insert_on(self.db.conn(), tune)
    }

    pub(crate) fn insert_on(conn: &Connection, tune: &mut Tune) -> Result<()> {
        let keys = serde_json::to_string(&tune.keys)?;
        let words = serde_json::to_string(&title_words(&tune.title))?;
        let (id, version) = conn
            .query_row(
                "INSERT INTO tunes (band_id, title, title_words, keys, time_signature_upper,
                                    time_signature_lower, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 RETURNING id, version",
                rusqlite::params![
                    tune.band_id,
                    tune.title,
                    words,
                    keys,
                    tune.time_signature_upper,
                    tune.time_signature_lower,
                    tune.status,
                    tune.created_at.to_rfc3339(),
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match ConstraintKind::of(&e) {
                Some(ConstraintKind::ForeignKey) => Error::BandNotFound(tune.band_id),
                _ => Error::from(e),
            })?;

        tune.id = id;
        tune.version = version;
        log::debug!("Inserted tune {} in band {}", tune.id, tune.band_id);
        Ok(())
    }

    /// Delete a tune. Refused with `HasDependents` while documents remain.
    pub fn delete(&self, id: TuneId) -> Result<()> {
        if !id.is_valid() {
            return Err(Error::not_found(Tune::ENTITY, id));
        }

        let affected = self
            .db
            .conn()
            .execute("DELETE FROM tunes WHERE id = ?1", [id])
            .map_err(|e| match ConstraintKind::of(&e) {
                Some(ConstraintKind::ForeignKey) => Error::HasDependents {
                    entity: Tune::ENTITY,
                    id: id.get(),
                },
                _ => Error::from(e),
            })?;

        if affected == 0 {
            return Err(Error::not_found(Tune::ENTITY, id));
        }
        log::info!("Deleted tune {id}");
        Ok(())
    }

    /// One page of a band's tunes plus pagination metadata.
    pub fn list(&self, band_id: BandId, plan: &QueryPlan) -> Result<(Vec<Tune>, Metadata)> {
        let terms = serde_json::to_string(&plan.title_terms)?;
        let keys = serde_json::to_string(&plan.keys)?;
        let statuses = serde_json::to_string(&plan.statuses)?;

        let sql = format!(
            "SELECT {TUNE_COLUMNS}, count(*) OVER() FROM tunes
             WHERE {TUNE_LIST_WHERE}
             ORDER BY {}
             LIMIT ?5 OFFSET ?6",
            plan.order_by()
        );

        let mut total = 0_i64;
        let tunes = {
            let mut stmt = self.db.conn().prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params![
                    band_id,
                    terms,
                    keys,
                    statuses,
                    plan.limit(),
                    plan.offset()
                ],
                |row| {
                    total = row.get(9)?;
                    row_to_tune(row)
                },
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        // A page past the end has no rows to carry the window count
        if tunes.is_empty() && plan.offset() > 0 {
            total = self.db.conn().query_row(
                &format!("SELECT count(*) FROM tunes WHERE {TUNE_LIST_WHERE}"),
                rusqlite::params![band_id, terms, keys, statuses],
                |row| row.get(0),
            )?;
        }

        Ok((tunes, plan.metadata(total)))
    }
}

impl VersionedStore<Tune> for TuneStore<'_> {
    type Id = TuneId;

    fn get(&self, id: TuneId) -> Result<Tune> {
        if !id.is_valid() {
            return Err(Error::not_found(Tune::ENTITY, id));
        }

        self.db
            .conn()
            .query_row(
                &format!("SELECT {TUNE_COLUMNS} FROM tunes WHERE id = ?1"),
                [id],
                row_to_tune,
            )
            .optional()?
            .ok_or_else(|| Error::not_found(Tune::ENTITY, id))
    }

    fn update(&self, tune: &mut Tune) -> Result<()> {
        let title = tune.title.clone();
        let words = serde_json::to_string(&title_words(&title))?;
        let keys = serde_json::to_string(&tune.keys)?;
        let upper = tune.time_signature_upper;
        let lower = tune.time_signature_lower;
        let status = tune.status;
        let band_id = tune.band_id;

        compare_and_swap(
            self.db.conn(),
            "tunes",
            &[
                ("title", &title),
                ("title_words", &words),
                ("keys", &keys),
                ("time_signature_upper", &upper),
                ("time_signature_lower", &lower),
                ("status", &status),
                ("band_id", &band_id),
            ],
            tune,
        )
        .map_err(|e| match e {
            Error::Database(ref db_err)
                if ConstraintKind::of(db_err) == Some(ConstraintKind::ForeignKey) =>
            {
                Error::BandNotFound(band_id)
            }
            e => e,
        })
    }
}

fn row_to_tune(row: &rusqlite::Row) -> rusqlite::Result<Tune> {
    let keys: String = row.get(3)?;
    let keys: Vec<Key> = serde_json::from_str(&keys)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(8)?;

    Ok(Tune {
        id: row.get(0)?,
        band_id: row.get(1)?,
        title: row.get(2)?,
        keys,
        time_signature_upper: row.get(4)?,
        time_signature_lower: row.get(5)?,
        status: row.get(6)?,
        version: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
    })
}
