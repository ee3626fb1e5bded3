mod db;
mod migrations;

pub use db::{Database, DEFAULT_BUSY_TIMEOUT};
pub use migrations::{Migration, MIGRATIONS};
