use thiserror::Error;

/// Structural problems found while building or decoding a [`BlockDocument`].
///
/// [`BlockDocument`]: crate::document::BlockDocument
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("block at position {index} has an empty id")]
    EmptyBlockId { index: usize },

    #[error("duplicate block id: {0}")]
    DuplicateBlockId(String),

    #[error("headingLevel must be between 1 and 6, got {0}")]
    InvalidHeadingLevel(u8),
}
