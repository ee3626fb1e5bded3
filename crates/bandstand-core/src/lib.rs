//! Core domain model and consistency layer for bandstand.
//!
//! This crate defines the band/tune/document data model, the SQLite
//! schema, and the mechanisms that keep multi-table state correct under
//! concurrent mutation: version-stamped compare-and-swap updates,
//! transactional membership invariants, and the validated query planner
//! used for listing tunes.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod catalog;
pub mod error;
pub mod membership;
pub mod model;
pub mod query;
pub mod schema;
pub mod store;
pub mod validate;

pub use catalog::{Catalog, TunePage};
pub use error::{ConstraintKind, Error, PublicError, Result};
pub use membership::MembershipManager;
pub use query::{calculate_metadata, Filters, Metadata, QueryPlan, TuneFilter, TuneQuery};
pub use schema::Database;
pub use store::{read_modify_write, Retry, Versioned, VersionedStore};
pub use validate::{FieldErrors, Validate, Validator};
