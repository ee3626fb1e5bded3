use rusqlite::{Connection, OptionalExtension};

use crate::error::{ConstraintKind, Error, Result};
use crate::model::{Band, BandId};
use crate::schema::Database;
use crate::store::{compare_and_swap, parse_timestamp, Versioned, VersionedStore};

pub(crate) const BAND_COLUMNS: &str =
    "bands.id, bands.owner_id, bands.name, bands.version, bands.created_at";

/// Bands repository.
///
/// Band rows are only created through
/// [`MembershipManager::create_band`](crate::MembershipManager::create_band),
/// which pairs the insert with the owner's membership.
#[derive(Debug, Clone, Copy)]
pub struct BandStore<'a> {
    db: &'a Database,
}

impl<'a> BandStore<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert on `conn` (normally an open transaction), filling in the id
    /// and initial version.
    pub(crate) fn insert_on(conn: &Connection, band: &mut Band) -> Result<()> {
        let (id, version) = conn
            .query_row(
                "INSERT INTO bands (owner_id, name, created_at) VALUES (?1, ?2, ?3)
                 RETURNING id, version",
                rusqlite::params![band.owner_id, band.name, band.created_at.to_rfc3339()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match ConstraintKind::of(&e) {
                Some(ConstraintKind::ForeignKey) => Error::UserNotFound(band.owner_id),
                _ => Error::from(e),
            })?;

        band.id = id;
        band.version = version;
        Ok(())
    }

    pub(crate) fn exists_on(conn: &Connection, id: BandId) -> Result<bool> {
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM bands WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?)
    }

    /// Delete a band. Memberships and tunes cascade; a band whose tunes
    /// still have documents is refused with `HasDependents`.
    pub fn delete(&self, id: BandId) -> Result<()> {
        if !id.is_valid() {
            return Err(Error::not_found(Band::ENTITY, id));
        }

        let affected = self
            .db
            .conn()
            .execute("DELETE FROM bands WHERE id = ?1", [id])
            .map_err(|e| match ConstraintKind::of(&e) {
                Some(ConstraintKind::ForeignKey) => Error::HasDependents {
                    entity: Band::ENTITY,
                    id: id.get(),
                },
                _ => Error::from(e),
            })?;

        if affected == 0 {
            return Err(Error::not_found(Band::ENTITY, id));
        }
        log::info!("Deleted band {id}");
        Ok(())
    }
}

impl VersionedStore<Band> for BandStore<'_> {
    type Id = BandId;

    fn get(&self, id: BandId) -> Result<Band> {
        if !id.is_valid() {
            return Err(Error::not_found(Band::ENTITY, id));
        }

        self.db
            .conn()
            .query_row(
                &format!("SELECT {BAND_COLUMNS} FROM bands WHERE id = ?1"),
                [id],
                row_to_band,
            )
            .optional()?
            .ok_or_else(|| Error::not_found(Band::ENTITY, id))
    }

    fn update(&self, band: &mut Band) -> Result<()> {
        let name = band.name.clone();
        compare_and_swap(self.db.conn(), "bands", &[("name", &name)], band)
    }
}

pub(crate) fn row_to_band(row: &rusqlite::Row) -> rusqlite::Result<Band> {
    let created_at: String = row.get(4)?;
    Ok(Band {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        version: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;

    fn setup() -> (Database, Band) {
        let db = Database::open_in_memory().unwrap();
        let mut owner = User::new("Owner", "owner@example.com");
        db.users().insert(&mut owner).unwrap();
        let band = db.memberships().create_band("Riverbend", owner.id).unwrap();
        (db, band)
    }

    #[test]
    fn test_get_returns_not_found_for_invalid_and_missing_ids() {
        let (db, _) = setup();
        assert!(db.bands().get(BandId::new(0)).unwrap_err().is_not_found());
        assert!(db.bands().get(BandId::new(-5)).unwrap_err().is_not_found());
        assert!(db.bands().get(BandId::new(404)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_increments_version_by_one() {
        let (db, band) = setup();
        let mut fetched = db.bands().get(band.id).unwrap();
        assert_eq!(fetched.version, 1);

        fetched.name = "Riverbend Ramblers".to_string();
        db.bands().update(&mut fetched).unwrap();
        assert_eq!(fetched.version, 2);

        let stored = db.bands().get(band.id).unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.name, "Riverbend Ramblers");
    }

    #[test]
    fn test_stale_update_is_edit_conflict_and_changes_nothing() {
        let (db, band) = setup();
        let mut first = db.bands().get(band.id).unwrap();
        let mut second = db.bands().get(band.id).unwrap();

        first.name = "First".to_string();
        db.bands().update(&mut first).unwrap();

        second.name = "Second".to_string();
        let err = db.bands().update(&mut second).unwrap_err();
        assert!(err.is_edit_conflict());
        assert_eq!(second.version, 1);

        let stored = db.bands().get(band.id).unwrap();
        assert_eq!(stored.name, "First");
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn test_delete_missing_band() {
        let (db, _) = setup();
        assert!(db.bands().delete(BandId::new(77)).unwrap_err().is_not_found());
    }
}
