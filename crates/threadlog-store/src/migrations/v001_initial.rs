//! v001 -- Initial schema creation.
//!
//! Creates `threads`, `blocks`, `thread_peers`, `profile`, `cafe_sessions`
//! and `consumed_invites`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Threads
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS threads (
    id         TEXT PRIMARY KEY NOT NULL,   -- hex-encoded thread public key
    key        TEXT NOT NULL,
    name       TEXT NOT NULL,
    secret     TEXT NOT NULL,               -- hex-encoded 32-byte Ed25519 secret
    sym_key    TEXT NOT NULL,               -- hex-encoded 32-byte symmetric key
    schema     TEXT,                        -- hex content hash
    initiator  TEXT NOT NULL,               -- hex-encoded peer id
    kind       TEXT NOT NULL,
    head       TEXT,                        -- hex content hash, NULL when empty
    created_at TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Block index
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    hash      TEXT PRIMARY KEY NOT NULL,    -- hex content hash
    thread_id TEXT NOT NULL,                -- FK -> threads(id)
    kind      INTEGER NOT NULL,             -- block type tag
    parent    TEXT,                         -- hex content hash
    author    TEXT NOT NULL,                -- hex-encoded peer id
    date      TEXT NOT NULL,                -- RFC-3339, from the block header

    FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_blocks_thread ON blocks(thread_id);
CREATE INDEX IF NOT EXISTS idx_blocks_parent ON blocks(parent);

-- ----------------------------------------------------------------
-- Roster
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS thread_peers (
    id         TEXT NOT NULL,               -- hex-encoded peer id
    thread_id  TEXT NOT NULL,               -- FK -> threads(id)
    username   TEXT,
    inboxes    TEXT NOT NULL DEFAULT '[]',  -- JSON array of cafe ids
    updated_at TEXT NOT NULL,

    PRIMARY KEY (id, thread_id),
    FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Profile (key/value)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profile (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Cafe sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cafe_sessions (
    cafe_id    TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- External invites redeemed by this node
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS consumed_invites (
    id          TEXT PRIMARY KEY NOT NULL,  -- hex content hash of the invite block
    consumed_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
