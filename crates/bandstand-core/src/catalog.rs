//! Member-scoped band, tune, and document operations.
//!
//! Every operation takes the caller's id explicitly. Tunes and documents
//! are only visible to members of the owning band; to anyone else they
//! do not exist.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::membership::MembershipManager;
use crate::model::{
    Band, BandId, BandPatch, Document, DocumentId, Tune, TuneId, TunePatch, UserId,
};
use crate::query::{Metadata, TuneQuery};
use crate::schema::Database;
use crate::store::{read_modify_write, Retry, VersionedStore};
use crate::validate::Validate;

/// One page of a tune listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunePage {
    pub tunes: Vec<Tune>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a> {
    db: &'a Database,
}

impl<'a> Catalog<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn members(&self) -> MembershipManager<'a> {
        self.db.memberships()
    }

    /// `NotFound` unless `caller` belongs to `band_id`.
    fn ensure_visible(
        &self,
        caller: UserId,
        band_id: BandId,
        entity: &'static str,
        id: i64,
    ) -> Result<()> {
        if caller.is_valid() && self.members().is_member(caller, band_id)? {
            Ok(())
        } else {
            Err(Error::not_found(entity, id))
        }
    }

    // Bands

    pub fn get_band(&self, id: BandId, caller: UserId) -> Result<Band> {
        let band = self.db.bands().get(id)?;
        self.ensure_visible(caller, band.id, "band", id.get())?;
        Ok(band)
    }

    /// Merge `patch` onto the current band and CAS-update it. Any member
    /// may rename a band.
    pub fn update_band(
        &self,
        id: BandId,
        patch: &BandPatch,
        caller: UserId,
        retry: Retry,
    ) -> Result<Band> {
        let members = self.members();
        read_modify_write(&self.db.bands(), id, retry, |band: &mut Band| {
            if !caller.is_valid() || !members.is_member(caller, band.id)? {
                return Err(Error::not_found("band", id));
            }
            patch.clone().apply(band);
            Ok(())
        })
    }

    /// Only the owner may delete a band.
    pub fn delete_band(&self, id: BandId, caller: UserId) -> Result<()> {
        let band = self.get_band(id, caller)?;
        if band.owner_id != caller {
            return Err(Error::NotPermitted(
                "only the band owner can delete a band".to_string(),
            ));
        }
        self.db.bands().delete(id)
    }

    // Tunes

    pub fn create_tune(&self, mut tune: Tune, caller: UserId) -> Result<Tune> {
        tune.ensure_valid()?;
        self.members().require_member(caller, tune.band_id)?;
        self.db.tunes().insert(&mut tune)?;
        log::info!("User {caller} created tune {} in band {}", tune.id, tune.band_id);
        Ok(tune)
    }

    pub fn get_tune(&self, id: TuneId, caller: UserId) -> Result<Tune> {
        let tune = self.db.tunes().get(id)?;
        self.ensure_visible(caller, tune.band_id, "tune", id.get())?;
        Ok(tune)
    }

    /// Merge `patch` onto the current tune and CAS-update it.
    ///
    /// Moving a tune to another band requires membership of that band too.
    pub fn update_tune(
        &self,
        id: TuneId,
        patch: &TunePatch,
        caller: UserId,
        retry: Retry,
    ) -> Result<Tune> {
        let members = self.members();
        read_modify_write(&self.db.tunes(), id, retry, |tune: &mut Tune| {
            if !caller.is_valid() || !members.is_member(caller, tune.band_id)? {
                return Err(Error::not_found("tune", id));
            }
            patch.clone().apply(tune);
            if tune.band_id.is_valid() {
                members.require_member(caller, tune.band_id)?;
            }
            Ok(())
        })
    }

    pub fn delete_tune(&self, id: TuneId, caller: UserId) -> Result<()> {
        let tune = self.get_tune(id, caller)?;
        self.db.tunes().delete(tune.id)
    }

    /// List a band's tunes. The query is validated before membership is
    /// checked or any SQL is built.
    pub fn list_tunes(
        &self,
        band_id: BandId,
        query: &TuneQuery,
        caller: UserId,
    ) -> Result<TunePage> {
        let plan = query.plan()?;
        self.members().require_member(caller, band_id)?;
        let (tunes, metadata) = self.db.tunes().list(band_id, &plan)?;
        Ok(TunePage { tunes, metadata })
    }

    // Documents (metadata only)

    pub fn list_documents(&self, tune_id: TuneId, caller: UserId) -> Result<Vec<Document>> {
        let tune = self.get_tune(tune_id, caller)?;
        self.db.documents().list_for_tune(tune.id)
    }

    pub fn get_document(&self, id: DocumentId, caller: UserId) -> Result<Document> {
        let doc = self.db.documents().get(id)?;
        let tune = self.db.tunes().get(doc.tune_id)?;
        self.ensure_visible(caller, tune.band_id, "document", id.get())?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Key, TuneStatus, User};

    struct Fixture {
        db: Database,
        owner: UserId,
        member: UserId,
        outsider: UserId,
        band: BandId,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for name in ["owner", "member", "outsider"] {
            let mut user = User::new(name, format!("{name}@example.com"));
            db.users().insert(&mut user).unwrap();
            ids.push(user.id);
        }
        let band = db.memberships().create_band("Riverbend", ids[0]).unwrap();
        db.memberships().add_member(band.id, ids[1]).unwrap();
        Fixture {
            db,
            owner: ids[0],
            member: ids[1],
            outsider: ids[2],
            band: band.id,
        }
    }

    fn new_tune(band: BandId) -> Tune {
        Tune::new(band, "Salt Creek", vec![Key::from("A major")])
    }

    #[test]
    fn test_non_members_cannot_see_tunes() {
        let f = fixture();
        let tune = f.db.catalog().create_tune(new_tune(f.band), f.member).unwrap();

        assert!(f.db.catalog().get_tune(tune.id, f.owner).is_ok());
        assert!(f
            .db
            .catalog()
            .get_tune(tune.id, f.outsider)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_outsider_cannot_create_tune() {
        let f = fixture();
        let err = f
            .db
            .catalog()
            .create_tune(new_tune(f.band), f.outsider)
            .unwrap_err();
        assert!(matches!(err, Error::NotPermitted(_)));
    }

    #[test]
    fn test_invalid_tune_is_rejected_before_permission_check() {
        let f = fixture();
        let err = f
            .db
            .catalog()
            .create_tune(Tune::new(f.band, "", vec![]), f.outsider)
            .unwrap_err();
        let fields = err.field_errors().unwrap();
        assert!(fields.contains("title"));
        assert!(fields.contains("keys"));
    }

    #[test]
    fn test_update_tune_merges_only_present_fields() {
        let f = fixture();
        let tune = f.db.catalog().create_tune(new_tune(f.band), f.member).unwrap();

        let patch = TunePatch {
            status: Some(TuneStatus::Flowering),
            ..TunePatch::default()
        };
        let updated = f
            .db
            .catalog()
            .update_tune(tune.id, &patch, f.member, Retry::Never)
            .unwrap();
        assert_eq!(updated.status, TuneStatus::Flowering);
        assert_eq!(updated.title, "Salt Creek");
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn test_update_tune_revalidates_merged_record() {
        let f = fixture();
        let tune = f.db.catalog().create_tune(new_tune(f.band), f.member).unwrap();

        let patch = TunePatch {
            time_signature_lower: Some(3),
            ..TunePatch::default()
        };
        let err = f
            .db
            .catalog()
            .update_tune(tune.id, &patch, f.member, Retry::Never)
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains("time_signature_lower"));
        assert_eq!(f.db.tunes().get(tune.id).unwrap().version, 1);
    }

    #[test]
    fn test_moving_tune_requires_target_membership() {
        let f = fixture();
        let other = f.db.memberships().create_band("Elsewhere", f.outsider).unwrap();
        let tune = f.db.catalog().create_tune(new_tune(f.band), f.member).unwrap();

        let patch = TunePatch {
            band_id: Some(other.id),
            ..TunePatch::default()
        };
        let err = f
            .db
            .catalog()
            .update_tune(tune.id, &patch, f.member, Retry::Never)
            .unwrap_err();
        assert!(matches!(err, Error::NotPermitted(_)));

        f.db.memberships().add_member(other.id, f.member).unwrap();
        let moved = f
            .db
            .catalog()
            .update_tune(tune.id, &patch, f.member, Retry::Never)
            .unwrap();
        assert_eq!(moved.band_id, other.id);
    }

    #[test]
    fn test_update_band_and_delete_band() {
        let f = fixture();
        let patch = BandPatch {
            name: Some("Riverbend Ramblers".to_string()),
        };
        let band = f
            .db
            .catalog()
            .update_band(f.band, &patch, f.member, Retry::Never)
            .unwrap();
        assert_eq!(band.version, 2);

        assert!(f
            .db
            .catalog()
            .update_band(f.band, &patch, f.outsider, Retry::Never)
            .unwrap_err()
            .is_not_found());

        assert!(matches!(
            f.db.catalog().delete_band(f.band, f.member).unwrap_err(),
            Error::NotPermitted(_)
        ));
        f.db.catalog().delete_band(f.band, f.owner).unwrap();
        assert!(f.db.bands().get(f.band).unwrap_err().is_not_found());
        assert!(!f.db.memberships().is_member(f.member, f.band).unwrap());
    }

    #[test]
    fn test_list_tunes_requires_membership_and_valid_query() {
        let f = fixture();
        f.db.catalog().create_tune(new_tune(f.band), f.member).unwrap();

        let page = f
            .db
            .catalog()
            .list_tunes(f.band, &TuneQuery::default(), f.member)
            .unwrap();
        assert_eq!(page.tunes.len(), 1);
        assert_eq!(page.metadata.total_records, 1);

        assert!(matches!(
            f.db
                .catalog()
                .list_tunes(f.band, &TuneQuery::default(), f.outsider)
                .unwrap_err(),
            Error::NotPermitted(_)
        ));

        let bad = TuneQuery::from_pairs([("sort", "password")]);
        assert!(matches!(bad, Err(Error::Validation(_))));
    }
}
