//! Domain model structs persisted in the database.
//!
//! `Profile` and `Page` serialize straight into the HTTP response bodies, so
//! their serde attributes define the JSON the client sees.

use chrono::{DateTime, SecondsFormat, Utc};
use pagekeep_shared::constants::{DEFAULT_PAGE_LIST_LIMIT, MAX_PAGE_LIST_LIMIT};
use pagekeep_shared::BlockDocument;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// The single profile record of a subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Verified token subject; never derived from anything else.
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(rename = "profile_picture")]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`ScopedSession::create_profile`](crate::ScopedSession::create_profile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub email: String,
    pub username: String,
    /// `None` stores the placeholder avatar.
    pub avatar_url: Option<String>,
}

impl NewProfile {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(StoreError::Validation("username is required".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// A page and its full block document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: Uuid,
    /// Owning profile id. Immutable after creation.
    #[serde(rename = "userId")]
    pub owner_id: String,
    pub title: String,
    pub icon: Option<String>,
    pub content: BlockDocument,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial page update. Absent fields keep their stored value.
///
/// `icon` distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`), which clears the icon. `content` replaces the whole
/// document; blocks are never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub icon: Option<Option<String>>,
    #[serde(default)]
    pub content: Option<BlockDocument>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
}

impl PagePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.icon.is_none()
            && self.content.is_none()
            && self.is_favorite.is_none()
    }

    /// Overwrite the supplied fields of `page`.
    pub fn apply(self, page: &mut Page) {
        if let Some(title) = self.title {
            page.title = title;
        }
        if let Some(icon) = self.icon {
            page.icon = icon;
        }
        if let Some(content) = self.content {
            page.content = content;
        }
        if let Some(is_favorite) = self.is_favorite {
            page.is_favorite = is_favorite;
        }
    }
}

fn present_or_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Bounds of a page listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    limit: u32,
    offset: u32,
}

impl PageWindow {
    /// Missing limit means the default; limits are clamped to `1..=1000`.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIST_LIMIT)
                .clamp(1, MAX_PAGE_LIST_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(None, None)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC-3339 so that text ordering matches time ordering.
pub(crate) fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_db_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Drop sub-microsecond precision so a value survives a database round trip.
pub(crate) fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    parse_db_timestamp(&to_db_timestamp(&now)).unwrap_or(now)
}
