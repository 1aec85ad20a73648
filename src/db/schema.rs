/// Schema for the offline layer's persistent tables.
///
/// The cache tables and the outbox tables share one database file but are
/// fully independent: dropping a cache generation never touches queued
/// writes, and draining the outbox never touches cached responses.
pub const SCHEMA: &str = r#"
-- Named cache generations. A row exists for every generation that has been
-- opened, even before any entry is written, so garbage collection can see
-- empty generations too.
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request fingerprint, scoped per generation.
CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_generation
    ON cache_entries(generation);

-- Pending write operations. rowid preserves insertion order, which is the
-- replay order.
CREATE TABLE IF NOT EXISTS outbox (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    body BLOB,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

-- Permanently failed writes, kept so the UI can tell the user what was lost.
CREATE TABLE IF NOT EXISTS dead_letters (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    body BLOB,
    created_at TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    last_error TEXT,
    failed_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
