use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::UserId;
use crate::validate::{Validate, Validator};

/// A registered user. Credentials live with the authentication layer,
/// not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A user that has not been stored yet; `id` is assigned on insert.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(0),
            name: name.into(),
            email: email.into(),
            created_at: Utc::now(),
        }
    }
}

impl Validate for User {
    fn validate(&self, v: &mut Validator) {
        v.check(!self.name.is_empty(), "name", "must be provided");
        v.check(self.name.len() <= 500, "name", "must not be more than 500 bytes long");
        v.check(!self.email.is_empty(), "email", "must be provided");
        v.check(self.email.contains('@'), "email", "must be a valid email address");
    }
}
