pub mod band;
pub mod document;
pub mod ids;
pub mod tune;
pub mod user;

pub use band::{Band, BandPatch, Membership};
pub use document::{Document, FileType};
pub use ids::{BandId, DocumentId, TuneId, UserId};
pub use tune::{title_words, Key, Tune, TunePatch, TuneStatus};
pub use user::User;

/// A string that names none of an enum's variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
