/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Users (credentials are managed by the authentication layer)
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Bands
CREATE TABLE IF NOT EXISTS bands (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bands_owner_id ON bands(owner_id);

-- Band membership (many-to-many)
CREATE TABLE IF NOT EXISTS band_members (
    band_id INTEGER NOT NULL REFERENCES bands(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (band_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_band_members_user_id ON band_members(user_id);

-- Tunes (keys is a JSON array of key names; title_words is the JSON array
-- of lowercase title words used by title search)
CREATE TABLE IF NOT EXISTS tunes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    band_id INTEGER NOT NULL REFERENCES bands(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    title_words TEXT NOT NULL,
    keys TEXT NOT NULL,
    time_signature_upper INTEGER NOT NULL CHECK (time_signature_upper > 1),
    time_signature_lower INTEGER NOT NULL CHECK (time_signature_lower > 1),
    status TEXT NOT NULL CHECK (status IN ('germinating', 'seedling', 'flowering')),
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tunes_band_id ON tunes(band_id);

-- Documents (no cascade: a row is only removed together with its file)
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tune_id INTEGER NOT NULL REFERENCES tunes(id),
    owner_id INTEGER NOT NULL REFERENCES users(id),
    file_path TEXT NOT NULL UNIQUE,
    file_type TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_tune_id ON documents(tune_id);
"#;

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: MIGRATION_001,
}];
