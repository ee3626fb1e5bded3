use rusqlite::OptionalExtension;

use crate::error::{ConstraintKind, Error, Result};
use crate::model::{User, UserId};
use crate::schema::Database;
use crate::store::parse_timestamp;
use crate::validate::Validate;

pub(crate) const USER_COLUMNS: &str = "users.id, users.name, users.email, users.created_at";

/// Users repository.
#[derive(Debug, Clone, Copy)]
pub struct UserStore<'a> {
    db: &'a Database,
}

impl<'a> UserStore<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a user and fill in its id. A taken email is `AlreadyExists`.
    pub fn insert(&self, user: &mut User) -> Result<()> {
        user.ensure_valid()?;

        let id = self
            .db
            .conn()
            .query_row(
                "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3) RETURNING id",
                rusqlite::params![user.name, user.email, user.created_at.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(|e| match ConstraintKind::of(&e) {
                Some(kind) if kind.is_duplicate() => Error::AlreadyExists {
                    entity: "user",
                    field: "email",
                },
                _ => Error::from(e),
            })?;

        user.id = id;
        log::debug!("Inserted user {}", user.id);
        Ok(())
    }

    pub fn get(&self, id: UserId) -> Result<User> {
        if !id.is_valid() {
            return Err(Error::not_found("user", id));
        }

        self.db
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                row_to_user,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("user", id))
    }
}

pub(crate) fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let created_at: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
    })
}
