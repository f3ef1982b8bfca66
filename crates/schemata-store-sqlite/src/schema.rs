//! SQL schema for the schemata SQLite store.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The current working document of each schema.
CREATE TABLE IF NOT EXISTS schemas (
    schema_id   TEXT PRIMARY KEY,
    document    TEXT NOT NULL,   -- raw JSON, stored verbatim
    updated_at  TEXT NOT NULL    -- ISO 8601 UTC
);

-- Version history is append-only; only `status` is ever updated.
CREATE TABLE IF NOT EXISTS versions (
    version_id  TEXT PRIMARY KEY,
    schema_id   TEXT NOT NULL REFERENCES schemas(schema_id),
    number      INTEGER NOT NULL,
    status      TEXT NOT NULL DEFAULT 'draft',   -- 'draft' | 'active' | 'deprecated'
    created_at  TEXT NOT NULL,
    notes       TEXT,
    document    TEXT NOT NULL,
    UNIQUE (schema_id, number)
);

-- At most one active version per schema.
CREATE UNIQUE INDEX IF NOT EXISTS versions_one_active
    ON versions(schema_id) WHERE status = 'active';

PRAGMA user_version = 1;
";
