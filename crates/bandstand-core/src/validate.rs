//! Field-level validation.
//!
//! A [`Validator`] collects one message per field; the first failed check
//! for a field wins. Errors are kept in a `BTreeMap` so rendering order is
//! stable across runs.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::Hash;

use serde::Serialize;

use crate::error::{Error, Result};

/// Field name to message, for user-correctable errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.0.insert(field.to_string(), message.into());
        errors
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Accumulates field errors across a series of checks.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record `message` for `field` unless the field already has one.
    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// `Ok(())` when every check passed, otherwise [`Error::Validation`].
    pub fn finish(self) -> Result<()> {
        if self.valid() {
            Ok(())
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}

/// Types that can check their own field invariants.
pub trait Validate {
    fn validate(&self, v: &mut Validator);

    fn ensure_valid(&self) -> Result<()> {
        let mut v = Validator::new();
        self.validate(&mut v);
        v.finish()
    }
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|value| seen.insert(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "title", "must be provided");
        v.check(false, "title", "must not be more than 500 bytes long");
        assert_eq!(v.errors().get("title"), Some("must be provided"));
        assert_eq!(v.errors().len(), 1);
    }

    #[test]
    fn test_finish() {
        assert!(Validator::new().finish().is_ok());

        let mut v = Validator::new();
        v.check(1 > 2, "n", "must be larger");
        match v.finish() {
            Err(Error::Validation(errors)) => assert!(errors.contains("n")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unique() {
        assert!(unique(&["C major", "A minor"]));
        assert!(!unique(&["C major", "C major"]));
        assert!(unique::<u8>(&[]));
    }

    #[test]
    fn test_display_is_ordered() {
        let mut v = Validator::new();
        v.add_error("title", "must be provided");
        v.add_error("keys", "must contain at least 1 key");
        assert_eq!(
            v.errors().to_string(),
            "keys: must contain at least 1 key; title: must be provided"
        );
    }
}
