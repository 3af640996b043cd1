//! # pagekeep-store
//!
//! Persistence for profiles and pages, backed by SQLite.
//!
//! Every read and write runs inside an identity-scoped transaction opened by
//! [`Database::with_identity`]. The transaction carries the caller's subject
//! in the `auth_context` table, and the schema's row-security triggers and
//! `visible_*` views consult it, so ownership is enforced by the engine and
//! not only by the `WHERE` clauses the store writes.

pub mod database;
pub mod migrations;
pub mod models;
pub mod pages;
pub mod profiles;
pub mod session;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use session::ScopedSession;
