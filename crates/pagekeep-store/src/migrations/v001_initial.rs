//! v001 -- Initial schema creation.
//!
//! Creates `profiles` and `pages`, the `auth_context` table that carries the
//! caller identity of the open transaction, and the row-security layer on
//! top of them: triggers that refuse foreign writes and views that only
//! expose the caller's rows.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (one per subject)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY NOT NULL,     -- verified token subject
    email       TEXT NOT NULL,
    username    TEXT NOT NULL,
    avatar_url  TEXT,                          -- always supplied by the store
    created_at  TEXT NOT NULL,                 -- RFC-3339, UTC, microseconds
    updated_at  TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Pages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pages (
    id          TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    owner_id    TEXT NOT NULL,                 -- FK -> profiles(id)
    title       TEXT NOT NULL DEFAULT 'Untitled', -- same as DEFAULT_PAGE_TITLE
    icon        TEXT,
    content     TEXT NOT NULL DEFAULT '[]',    -- JSON block array
    is_favorite INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES profiles(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_pages_owner_created
    ON pages(owner_id, created_at DESC);

-- ----------------------------------------------------------------
-- Transaction-local caller identity. Written right after BEGIN and
-- removed before COMMIT, so a committed database never holds a row.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS auth_context (
    slot    INTEGER PRIMARY KEY NOT NULL CHECK (slot = 1),
    subject TEXT NOT NULL,
    role    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Row security: writes
-- ----------------------------------------------------------------
CREATE TRIGGER IF NOT EXISTS profiles_insert_policy
BEFORE INSERT ON profiles
WHEN NOT EXISTS (
    SELECT 1 FROM auth_context
    WHERE subject = NEW.id AND role = 'authenticated'
)
BEGIN
    SELECT RAISE(ABORT, 'row security: profile insert not permitted');
END;

CREATE TRIGGER IF NOT EXISTS profiles_update_policy
BEFORE UPDATE ON profiles
WHEN NEW.id IS NOT OLD.id OR NOT EXISTS (
    SELECT 1 FROM auth_context
    WHERE subject = OLD.id AND role = 'authenticated'
)
BEGIN
    SELECT RAISE(ABORT, 'row security: profile update not permitted');
END;

CREATE TRIGGER IF NOT EXISTS pages_insert_policy
BEFORE INSERT ON pages
WHEN NOT EXISTS (
    SELECT 1 FROM auth_context
    WHERE subject = NEW.owner_id AND role = 'authenticated'
)
BEGIN
    SELECT RAISE(ABORT, 'row security: page insert not permitted');
END;

CREATE TRIGGER IF NOT EXISTS pages_update_policy
BEFORE UPDATE ON pages
WHEN NEW.owner_id IS NOT OLD.owner_id OR NOT EXISTS (
    SELECT 1 FROM auth_context
    WHERE subject = OLD.owner_id AND role = 'authenticated'
)
BEGIN
    SELECT RAISE(ABORT, 'row security: page update not permitted');
END;

CREATE TRIGGER IF NOT EXISTS pages_delete_policy
BEFORE DELETE ON pages
WHEN NOT EXISTS (
    SELECT 1 FROM auth_context
    WHERE subject = OLD.owner_id AND role = 'authenticated'
)
BEGIN
    SELECT RAISE(ABORT, 'row security: page delete not permitted');
END;

-- ----------------------------------------------------------------
-- Row security: reads
-- ----------------------------------------------------------------
CREATE VIEW IF NOT EXISTS visible_profiles AS
SELECT p.id, p.email, p.username, p.avatar_url, p.created_at, p.updated_at
FROM profiles p
JOIN auth_context a ON a.subject = p.id AND a.role = 'authenticated';

CREATE VIEW IF NOT EXISTS visible_pages AS
SELECT p.rowid AS seq, p.id, p.owner_id, p.title, p.icon, p.content,
       p.is_favorite, p.created_at, p.updated_at
FROM pages p
JOIN auth_context a ON a.subject = p.owner_id AND a.role = 'authenticated';
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
