use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::membership::MembershipManager;
use crate::store::{BandStore, DocumentStore, TuneStore, UserStore};

use super::migrations::MIGRATIONS;

/// Per-call deadline for lock waits when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(3);

/// One connection to the catalog database.
///
/// Each worker opens its own `Database` on the shared file; the database
/// is the only state workers share.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open with an explicit busy timeout. A statement that waits longer
    /// than `busy_timeout` for a lock fails instead of hanging.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!(
            "Opened {} (journal_mode={mode}, busy_timeout={}ms)",
            path.as_ref().display(),
            busy_timeout.as_millis()
        );
        Self::init(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction that takes the write lock up front, so a
    /// read-then-write sequence inside it cannot be invalidated by another
    /// writer.
    pub(crate) fn write_transaction(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn apply_migrations(&self) -> Result<()> {
        // Concurrent openers of a fresh file serialize here
        let tx = self.write_transaction()?;

        tx.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let applied: Vec<u32> = {
            let mut stmt = tx.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                tx.execute_batch(migration.sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

// Repository handles
impl Database {
    #[must_use]
    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(self)
    }

    #[must_use]
    pub fn bands(&self) -> BandStore<'_> {
        BandStore::new(self)
    }

    #[must_use]
    pub fn tunes(&self) -> TuneStore<'_> {
        TuneStore::new(self)
    }

    #[must_use]
    pub fn documents(&self) -> DocumentStore<'_> {
        DocumentStore::new(self)
    }

    #[must_use]
    pub fn memberships(&self) -> MembershipManager<'_> {
        MembershipManager::new(self)
    }

    #[must_use]
    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(self)
    }
}
