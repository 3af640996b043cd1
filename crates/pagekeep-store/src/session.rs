//! Identity-scoped access to the tables.
//!
//! A [`ScopedSession`] only exists inside [`Database::with_identity`], while
//! the transaction's `auth_context` row names the caller. Profile and page
//! operations are methods on it, so there is no way to issue them outside a
//! scoped transaction.
//!
//! [`Database::with_identity`]: crate::Database::with_identity

use pagekeep_shared::Identity;
use rusqlite::Connection;

/// Handle to an open, identity-scoped transaction.
pub struct ScopedSession<'a> {
    conn: &'a Connection,
    identity: &'a Identity,
}

impl<'a> ScopedSession<'a> {
    pub(crate) fn new(conn: &'a Connection, identity: &'a Identity) -> Self {
        Self { conn, identity }
    }

    /// The caller every statement in this session runs as.
    pub fn identity(&self) -> &Identity {
        self.identity
    }

    pub fn subject(&self) -> &str {
        self.identity.subject()
    }

    pub(crate) fn conn(&self) -> &Connection {
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use pagekeep_shared::Identity;
    use rusqlite::params;

    use crate::error::StoreError;
    use crate::models::NewProfile;
    use crate::Database;

    fn new_profile(name: &str) -> NewProfile {
        NewProfile {
            email: format!("{name}@example.com"),
            username: name.to_string(),
            avatar_url: None,
        }
    }

    fn db_with_users(subjects: &[&str]) -> Database {
        let mut db = Database::open_in_memory().unwrap();
        for subject in subjects {
            db.create_profile(&Identity::authenticated(*subject), &new_profile(subject))
                .unwrap();
        }
        db
    }

    fn context_rows(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM auth_context", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn context_is_cleared_after_commit() {
        let mut db = db_with_users(&["alice"]);
        let alice = Identity::authenticated("alice");

        let seen: String = db
            .with_identity(&alice, |session| {
                Ok(session.conn().query_row(
                    "SELECT subject FROM auth_context",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();

        assert_eq!(seen, "alice");
        assert_eq!(context_rows(&db), 0);
    }

    #[test]
    fn failed_work_rolls_back_everything() {
        let mut db = db_with_users(&["alice"]);
        let alice = Identity::authenticated("alice");

        let result: Result<(), StoreError> = db.with_identity(&alice, |session| {
            session.create_page()?;
            Err(StoreError::Validation("abort".into()))
        });
        assert!(result.is_err());

        assert_eq!(context_rows(&db), 0);
        let pages = db.list_pages(&alice, Default::default()).unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn views_are_empty_outside_a_session() {
        let mut db = db_with_users(&["alice"]);
        db.create_page(&Identity::authenticated("alice")).unwrap();

        let visible: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM visible_pages", [], |row| row.get(0))
            .unwrap();
        let stored: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
            .unwrap();

        assert_eq!(visible, 0);
        assert_eq!(stored, 1);
    }

    #[test]
    fn writes_outside_a_session_are_rejected() {
        let db = db_with_users(&["alice"]);

        let err = db
            .conn()
            .execute(
                "INSERT INTO pages (id, owner_id, created_at, updated_at)
                 VALUES ('p1', 'alice', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
                [],
            )
            .map_err(StoreError::from)
            .unwrap_err();

        assert!(matches!(err, StoreError::PolicyViolation(_)), "{err}");
    }

    #[test]
    fn engine_rejects_rows_for_another_subject() {
        let mut db = db_with_users(&["alice", "bob"]);
        let alice = Identity::authenticated("alice");

        let err = db
            .with_identity(&alice, |session| {
                session.conn().execute(
                    "INSERT INTO pages (id, owner_id, created_at, updated_at)
                     VALUES ('p1', 'bob', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::PolicyViolation(_)), "{err}");
    }

    #[test]
    fn engine_rejects_owner_reassignment() {
        let mut db = db_with_users(&["alice", "bob"]);
        let alice = Identity::authenticated("alice");
        let page = db.create_page(&alice).unwrap();

        let err = db
            .with_identity(&alice, |session| {
                session.conn().execute(
                    "UPDATE pages SET owner_id = 'bob' WHERE id = ?1",
                    params![page.id.to_string()],
                )?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::PolicyViolation(_)), "{err}");
    }

    #[test]
    fn engine_ignores_foreign_rows_on_unfiltered_update() {
        let mut db = db_with_users(&["alice", "bob"]);
        let bob = Identity::authenticated("bob");
        let page = db.create_page(&bob).unwrap();

        // Alice issues an update with no owner filter at all; the policy
        // trigger aborts it instead of letting it touch Bob's row.
        let result = db.with_identity(&Identity::authenticated("alice"), |session| {
            session.conn().execute(
                "UPDATE pages SET title = 'pwned' WHERE id = ?1",
                params![page.id.to_string()],
            )?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::PolicyViolation(_))));

        let fetched = db.get_page(&bob, page.id).unwrap();
        assert_eq!(fetched.title, "Untitled");
    }

    #[test]
    fn non_authenticated_role_sees_nothing() {
        let mut db = db_with_users(&["alice"]);
        db.create_page(&Identity::authenticated("alice")).unwrap();

        let anon = Identity::new("alice", "anon");
        let pages = db.list_pages(&anon, Default::default()).unwrap();
        assert!(pages.is_empty());

        let err = db.create_page(&anon).unwrap_err();
        assert!(matches!(err, StoreError::PolicyViolation(_)), "{err}");
    }
}
