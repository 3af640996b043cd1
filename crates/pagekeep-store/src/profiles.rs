//! Profile records: one per subject, keyed by the verified subject.

use pagekeep_shared::constants::DEFAULT_AVATAR_URL;
use pagekeep_shared::Identity;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::{now_micros, parse_db_timestamp, to_db_timestamp, NewProfile, Profile};
use crate::session::ScopedSession;

impl ScopedSession<'_> {
    /// Insert the caller's profile.
    ///
    /// The id is always the session subject. A second call for the same
    /// subject fails with [`StoreError::AlreadyExists`].
    ///
    /// [`StoreError::AlreadyExists`]: crate::StoreError::AlreadyExists
    pub fn create_profile(&self, new: &NewProfile) -> Result<Profile> {
        new.validate()?;

        let now = now_micros();
        let profile = Profile {
            id: self.subject().to_string(),
            email: new.email.clone(),
            username: new.username.trim().to_string(),
            avatar_url: Some(
                new.avatar_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string()),
            ),
            created_at: now,
            updated_at: now,
        };

        self.conn().execute(
            "INSERT INTO profiles (id, email, username, avatar_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                profile.id,
                profile.email,
                profile.username,
                profile.avatar_url,
                to_db_timestamp(&profile.created_at),
                to_db_timestamp(&profile.updated_at),
            ],
        )?;

        tracing::info!(subject = %profile.id, "profile created");
        Ok(profile)
    }

    /// Fetch the caller's profile.
    pub fn get_profile(&self) -> Result<Profile> {
        Ok(self.conn().query_row(
            "SELECT id, email, username, avatar_url, created_at, updated_at
             FROM visible_profiles
             WHERE id = ?1",
            params![self.subject()],
            row_to_profile,
        )?)
    }
}

impl Database {
    /// One-shot [`ScopedSession::create_profile`] in its own transaction.
    pub fn create_profile(&mut self, identity: &Identity, new: &NewProfile) -> Result<Profile> {
        self.with_identity(identity, |session| session.create_profile(new))
    }

    /// One-shot [`ScopedSession::get_profile`] in its own transaction.
    pub fn get_profile(&mut self, identity: &Identity) -> Result<Profile> {
        self.with_identity(identity, |session| session.get_profile())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Profile`].
fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;

    let created_at = parse_db_timestamp(&created_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let updated_at = parse_db_timestamp(&updated_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Profile {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at,
        updated_at,
    })
}
