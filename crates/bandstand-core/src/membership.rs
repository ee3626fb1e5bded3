//! Band membership and the invariants that tie it to band ownership.
//!
//! - A band and its owner's membership are created in one transaction.
//! - The owner's membership can never be removed.
//! - Constraint failures on insert are classified by result code into
//!   `AlreadyExists`, `UserNotFound`, or `BandNotFound`.

use rusqlite::OptionalExtension;

use crate::error::{ConstraintKind, Error, Result};
use crate::model::{Band, BandId, Membership, User, UserId};
use crate::schema::Database;
use crate::store::bands::{row_to_band, BAND_COLUMNS};
use crate::store::users::{row_to_user, USER_COLUMNS};
use crate::store::BandStore;
use crate::validate::Validate;

/// Owns the band/user many-to-many relation.
#[derive(Debug, Clone, Copy)]
pub struct MembershipManager<'a> {
    db: &'a Database,
}

impl<'a> MembershipManager<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a band owned by `owner_id` together with the owner's
    /// membership. Either both rows are committed or neither is.
    pub fn create_band(&self, name: &str, owner_id: UserId) -> Result<Band> {
        let mut band = Band::new(name, owner_id);
        band.ensure_valid()?;

        let tx = self.db.write_transaction()?;
        BandStore::insert_on(&tx, &mut band)?;
        tx.execute(
            "INSERT INTO band_members (band_id, user_id) VALUES (?1, ?2)",
            rusqlite::params![band.id, owner_id],
        )?;
        tx.commit()?;

        log::info!("Created band {} ({}) owned by user {owner_id}", band.id, band.name);
        Ok(band)
    }

    /// Add `user_id` to `band_id`.
    pub fn add_member(&self, band_id: BandId, user_id: UserId) -> Result<Membership> {
        let membership = Membership { band_id, user_id };
        membership.ensure_valid()?;

        let tx = self.db.write_transaction()?;
        let inserted = tx.execute(
            "INSERT INTO band_members (band_id, user_id) VALUES (?1, ?2)",
            rusqlite::params![band_id, user_id],
        );

        if let Err(e) = inserted {
            return Err(match ConstraintKind::of(&e) {
                Some(kind) if kind.is_duplicate() => Error::AlreadyExists {
                    entity: "membership",
                    field: "user_id",
                },
                // Either parent may be missing; ask which one
                Some(ConstraintKind::ForeignKey) => {
                    if BandStore::exists_on(&tx, band_id)? {
                        Error::UserNotFound(user_id)
                    } else {
                        Error::BandNotFound(band_id)
                    }
                }
                _ => Error::from(e),
            });
        }
        tx.commit()?;

        log::info!("Added user {user_id} to band {band_id}");
        Ok(membership)
    }

    /// Remove `user_id` from `band_id` on behalf of `requester_id`.
    ///
    /// The owner is never removable, whoever asks. Otherwise only the member
    /// themself or the band owner may remove a membership.
    pub fn remove_member(
        &self,
        band_id: BandId,
        user_id: UserId,
        requester_id: UserId,
    ) -> Result<()> {
        if !band_id.is_valid() || !user_id.is_valid() {
            return Err(Error::not_found("membership", format!("{band_id}/{user_id}")));
        }

        let tx = self.db.write_transaction()?;
        let owner_id: UserId = tx
            .query_row("SELECT owner_id FROM bands WHERE id = ?1", [band_id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| Error::not_found("band", band_id))?;

        if user_id == owner_id {
            return Err(Error::CannotRemoveOwner { band_id, user_id });
        }
        if requester_id != user_id && requester_id != owner_id {
            return Err(Error::NotPermitted(
                "only the member or the band owner can remove a membership".to_string(),
            ));
        }

        let affected = tx.execute(
            "DELETE FROM band_members WHERE band_id = ?1 AND user_id = ?2",
            rusqlite::params![band_id, user_id],
        )?;
        if affected == 0 {
            return Err(Error::not_found("membership", format!("{band_id}/{user_id}")));
        }
        tx.commit()?;

        log::info!("Removed user {user_id} from band {band_id} (requested by {requester_id})");
        Ok(())
    }

    /// Whether `user_id` belongs to `band_id`. Ids below 1 are `NotFound`,
    /// not `false`.
    pub fn is_member(&self, user_id: UserId, band_id: BandId) -> Result<bool> {
        if !user_id.is_valid() || !band_id.is_valid() {
            return Err(Error::not_found("membership", format!("{band_id}/{user_id}")));
        }

        Ok(self.db.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM band_members WHERE user_id = ?1 AND band_id = ?2)",
            rusqlite::params![user_id, band_id],
            |row| row.get(0),
        )?)
    }

    /// `NotPermitted` unless `user_id` belongs to `band_id`. A caller id
    /// below 1 can belong to nothing, so it is refused the same way.
    pub fn require_member(&self, user_id: UserId, band_id: BandId) -> Result<()> {
        if user_id.is_valid() && self.is_member(user_id, band_id)? {
            Ok(())
        } else {
            Err(Error::NotPermitted(
                "you must be a member of this band to access this resource".to_string(),
            ))
        }
    }

    pub fn list_bands_for_user(&self, user_id: UserId) -> Result<Vec<Band>> {
        if !user_id.is_valid() {
            return Err(Error::not_found("user", user_id));
        }

        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {BAND_COLUMNS} FROM bands
             JOIN band_members ON band_members.band_id = bands.id
             WHERE band_members.user_id = ?1
             ORDER BY bands.id"
        ))?;
        let rows = stmt.query_map([user_id], row_to_band)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_members_for_band(&self, band_id: BandId) -> Result<Vec<User>> {
        if !band_id.is_valid() {
            return Err(Error::not_found("band", band_id));
        }

        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             JOIN band_members ON band_members.user_id = users.id
             WHERE band_members.band_id = ?1
             ORDER BY users.id"
        ))?;
        let rows = stmt.query_map([band_id], row_to_user)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
