//! # pagekeep-shared
//!
//! Types shared by the store and the HTTP server: the block document model,
//! the verified caller identity, and workspace-wide constants.

pub mod constants;
pub mod document;
pub mod error;
pub mod identity;

pub use document::{Block, BlockDocument, BlockKind, BlockType, HeadingLevel, ListType};
pub use error::DocumentError;
pub use identity::Identity;
