//! Page records owned by the session subject.
//!
//! Reads go through the `visible_pages` view and writes hit `pages` under the
//! row-security triggers; every statement also filters on `owner_id`
//! explicitly. A page owned by someone else therefore behaves exactly like a
//! page that does not exist.

use pagekeep_shared::constants::DEFAULT_PAGE_TITLE;
use pagekeep_shared::{BlockDocument, Identity};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    now_micros, parse_db_timestamp, to_db_timestamp, Page, PagePatch, PageWindow,
};
use crate::session::ScopedSession;

const PAGE_COLUMNS: &str =
    "id, owner_id, title, icon, content, is_favorite, created_at, updated_at";

impl ScopedSession<'_> {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a page seeded with a single empty paragraph.
    pub fn create_page(&self) -> Result<Page> {
        let now = now_micros();
        let page = Page {
            id: Uuid::new_v4(),
            owner_id: self.subject().to_string(),
            title: DEFAULT_PAGE_TITLE.to_string(),
            icon: None,
            content: BlockDocument::seed(),
            is_favorite: false,
            created_at: now,
            updated_at: now,
        };

        self.conn().execute(
            "INSERT INTO pages (id, owner_id, title, icon, content, is_favorite, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                page.id.to_string(),
                page.owner_id,
                page.title,
                page.icon,
                serde_json::to_string(&page.content)?,
                page.is_favorite,
                to_db_timestamp(&page.created_at),
                to_db_timestamp(&page.updated_at),
            ],
        )?;

        tracing::debug!(page = %page.id, owner = %page.owner_id, "page created");
        Ok(page)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch one of the caller's pages.
    ///
    /// Missing and foreign pages both yield [`StoreError::NotFound`].
    pub fn get_page(&self, id: Uuid) -> Result<Page> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS}
             FROM visible_pages
             WHERE id = ?1 AND owner_id = ?2"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![id.to_string(), self.subject()], row_to_page)?)
    }

    /// List the caller's pages, newest first.
    pub fn list_pages(&self, window: PageWindow) -> Result<Vec<Page>> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS}
             FROM visible_pages
             WHERE owner_id = ?1
             ORDER BY created_at DESC, seq DESC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = self.conn().prepare(&sql)?;

        let rows = stmt.query_map(
            params![self.subject(), window.limit(), window.offset()],
            row_to_page,
        )?;

        let mut pages = Vec::new();
        for row in rows {
            pages.push(row?);
        }
        Ok(pages)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the fields present in `patch`.
    ///
    /// `content`, when present, replaces the stored document wholesale.
    /// There is no concurrency token: the last committed update wins.
    pub fn update_page(&self, id: Uuid, patch: PagePatch) -> Result<Page> {
        let mut page = self.get_page(id)?;
        if patch.is_empty() {
            return Ok(page);
        }

        patch.apply(&mut page);
        page.updated_at = now_micros();

        let affected = self.conn().execute(
            "UPDATE pages
             SET title = ?1, icon = ?2, content = ?3, is_favorite = ?4, updated_at = ?5
             WHERE id = ?6 AND owner_id = ?7",
            params![
                page.title,
                page.icon,
                serde_json::to_string(&page.content)?,
                page.is_favorite,
                to_db_timestamp(&page.updated_at),
                page.id.to_string(),
                self.subject(),
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        tracing::debug!(page = %page.id, blocks = page.content.len(), "page updated");
        Ok(page)
    }
}

impl Database {
    /// One-shot [`ScopedSession::create_page`] in its own transaction.
    pub fn create_page(&mut self, identity: &Identity) -> Result<Page> {
        self.with_identity(identity, |session| session.create_page())
    }

    /// One-shot [`ScopedSession::get_page`] in its own transaction.
    pub fn get_page(&mut self, identity: &Identity, id: Uuid) -> Result<Page> {
        self.with_identity(identity, |session| session.get_page(id))
    }

    /// One-shot [`ScopedSession::list_pages`] in its own transaction.
    pub fn list_pages(&mut self, identity: &Identity, window: PageWindow) -> Result<Vec<Page>> {
        self.with_identity(identity, |session| session.list_pages(window))
    }

    /// One-shot [`ScopedSession::update_page`] in its own transaction.
    pub fn update_page(&mut self, identity: &Identity, id: Uuid, patch: PagePatch) -> Result<Page> {
        self.with_identity(identity, |session| session.update_page(id, patch))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` selected with [`PAGE_COLUMNS`] to a [`Page`].
fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<Page> {
    let id_str: String = row.get(0)?;
    let content_str: String = row.get(4)?;
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let content: BlockDocument = serde_json::from_str(&content_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = parse_db_timestamp(&created_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let updated_at = parse_db_timestamp(&updated_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Page {
        id,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        icon: row.get(3)?,
        content,
        is_favorite: row.get(5)?,
        created_at,
        updated_at,
    })
}
