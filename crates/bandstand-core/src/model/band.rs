use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{BandId, UserId};
use crate::store::Versioned;
use crate::validate::{Validate, Validator};

/// A named group of users collaborating on tunes.
///
/// `owner_id` always has a membership row in the band; the owner's
/// membership is created in the same transaction as the band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub id: BandId,
    pub owner_id: UserId,
    pub name: String,

    /// Optimistic concurrency stamp; 1 on creation, +1 per update.
    pub version: i32,

    pub created_at: DateTime<Utc>,
}

impl Band {
    #[must_use]
    pub fn new(name: impl Into<String>, owner_id: UserId) -> Self {
        Self {
            id: BandId::new(0),
            owner_id,
            name: name.into(),
            version: 1,
            created_at: Utc::now(),
        }
    }
}

impl Validate for Band {
    fn validate(&self, v: &mut Validator) {
        v.check(!self.name.is_empty(), "name", "must be provided");
        v.check(self.name.len() <= 500, "name", "must not be more than 500 bytes long");
    }
}

impl Versioned for Band {
    const ENTITY: &'static str = "band";

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

/// Partial update for a band; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BandPatch {
    pub name: Option<String>,
}

impl BandPatch {
    pub fn apply(self, band: &mut Band) {
        if let Some(name) = self.name {
            band.name = name;
        }
    }
}

/// A user's membership in a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
    pub band_id: BandId,
    pub user_id: UserId,
}

impl Validate for Membership {
    fn validate(&self, v: &mut Validator) {
        v.check(self.band_id.is_valid(), "band_id", "must be a positive integer");
        v.check(self.user_id.is_valid(), "user_id", "must be a positive integer");
    }
}
