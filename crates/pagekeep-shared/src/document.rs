//! Block-structured page content.
//!
//! A page's content is a [`BlockDocument`]: an ordered list of [`Block`]s.
//! Order is rendering order and survives storage untouched. Each block is a
//! tagged union over the four block types; the type-specific properties live
//! in [`BlockKind`] so no layer has to poke at loose JSON.
//!
//! ## Wire shape
//!
//! ```json
//! { "id": "b1", "type": "heading", "content": "Intro", "properties": { "headingLevel": 2 } }
//! ```
//!
//! Every property is optional and written back exactly as it was received,
//! including an empty `properties` object. Readers get defaults through the
//! [`BlockKind`] accessors (heading level 1, bullet list at index 0,
//! unchecked todo). Values that are present but invalid are rejected.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MAX_HEADING_LEVEL;
use crate::error::DocumentError;

// ---------------------------------------------------------------------------
// Block type tags
// ---------------------------------------------------------------------------

/// Discriminant of a block, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Paragraph,
    Heading,
    List,
    Todo,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading => "heading",
            BlockType::List => "list",
            BlockType::Todo => "todo",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker style of a list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    #[default]
    Bullet,
    Roman,
    Numbered,
}

/// Heading depth, always within `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    pub fn new(level: u8) -> Result<Self, DocumentError> {
        if (1..=MAX_HEADING_LEVEL).contains(&level) {
            Ok(Self(level))
        } else {
            Err(DocumentError::InvalidHeadingLevel(level))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for HeadingLevel {
    fn default() -> Self {
        Self(1)
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// Type-specific part of a block.
///
/// Each property is kept exactly as the client sent it: `None` means the
/// property was absent. Use the accessors for the effective value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Paragraph,
    Heading {
        level: Option<HeadingLevel>,
    },
    List {
        list_type: Option<ListType>,
        index: Option<u32>,
    },
    Todo {
        checked: Option<bool>,
    },
}

impl BlockKind {
    pub fn block_type(&self) -> BlockType {
        match self {
            BlockKind::Paragraph => BlockType::Paragraph,
            BlockKind::Heading { .. } => BlockType::Heading,
            BlockKind::List { .. } => BlockType::List,
            BlockKind::Todo { .. } => BlockType::Todo,
        }
    }

    /// Effective heading level; level 1 when unset.
    pub fn heading_level(&self) -> Option<HeadingLevel> {
        match self {
            BlockKind::Heading { level } => Some(level.unwrap_or_default()),
            _ => None,
        }
    }

    /// Effective marker style and position; a bullet at index 0 when unset.
    pub fn list_marker(&self) -> Option<(ListType, u32)> {
        match self {
            BlockKind::List { list_type, index } => {
                Some((list_type.unwrap_or_default(), index.unwrap_or(0)))
            }
            _ => None,
        }
    }

    /// Effective todo state; unchecked when unset.
    pub fn is_checked(&self) -> Option<bool> {
        match self {
            BlockKind::Todo { checked } => Some(checked.unwrap_or(false)),
            _ => None,
        }
    }

    fn has_properties(&self) -> bool {
        match self {
            BlockKind::Paragraph => false,
            BlockKind::Heading { level } => level.is_some(),
            BlockKind::List { list_type, index } => list_type.is_some() || index.is_some(),
            BlockKind::Todo { checked } => checked.is_some(),
        }
    }
}

/// One leaf of a page document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub struct Block {
    /// Client-chosen id, unique within its document.
    pub id: String,
    /// Plain text payload.
    pub content: String,
    pub kind: BlockKind,
    /// Emit a `properties` object even when the kind sets none, so a block
    /// that arrived with `"properties": {}` is written back the same way.
    pub keep_empty_properties: bool,
}

impl Block {
    pub fn new(id: impl Into<String>, content: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind,
            keep_empty_properties: false,
        }
    }

    /// A paragraph with a freshly generated id.
    pub fn paragraph(content: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), content, BlockKind::Paragraph)
    }

    pub fn block_type(&self) -> BlockType {
        self.kind.block_type()
    }
}

/// Serialized form of a [`Block`].
#[derive(Debug, Serialize, Deserialize)]
struct RawBlock {
    id: String,
    #[serde(rename = "type")]
    block_type: BlockType,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<RawProperties>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    list_type: Option<ListType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    heading_level: Option<u8>,
}

impl TryFrom<RawBlock> for Block {
    type Error = DocumentError;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let keep_empty_properties = raw.properties.is_some();
        let props = raw.properties.unwrap_or_default();

        // Properties that do not belong to the block type are dropped.
        let kind = match raw.block_type {
            BlockType::Paragraph => BlockKind::Paragraph,
            BlockType::Heading => BlockKind::Heading {
                level: props.heading_level.map(HeadingLevel::new).transpose()?,
            },
            BlockType::List => BlockKind::List {
                list_type: props.list_type,
                index: props.index,
            },
            BlockType::Todo => BlockKind::Todo {
                checked: props.checked,
            },
        };

        Ok(Block {
            id: raw.id,
            content: raw.content,
            kind,
            keep_empty_properties,
        })
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        let block_type = block.block_type();
        let properties = if block.kind.has_properties() || block.keep_empty_properties {
            Some(match block.kind {
                BlockKind::Paragraph => RawProperties::default(),
                BlockKind::Heading { level } => RawProperties {
                    heading_level: level.map(HeadingLevel::get),
                    ..Default::default()
                },
                BlockKind::List { list_type, index } => RawProperties {
                    list_type,
                    index,
                    ..Default::default()
                },
                BlockKind::Todo { checked } => RawProperties {
                    checked,
                    ..Default::default()
                },
            })
        } else {
            None
        };

        RawBlock {
            id: block.id,
            block_type,
            content: block.content,
            properties,
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Ordered sequence of blocks making up a page.
///
/// Serializes as a bare JSON array. Construction and decoding both reject
/// empty or duplicate block ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Block>", into = "Vec<Block>")]
pub struct BlockDocument {
    blocks: Vec<Block>,
}

impl BlockDocument {
    pub fn new(blocks: Vec<Block>) -> Result<Self, DocumentError> {
        validate_ids(&blocks)?;
        Ok(Self { blocks })
    }

    /// A document with no blocks.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Content of a brand new page: a single empty paragraph.
    pub fn seed() -> Self {
        Self {
            blocks: vec![Block::paragraph("")],
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

impl TryFrom<Vec<Block>> for BlockDocument {
    type Error = DocumentError;

    fn try_from(blocks: Vec<Block>) -> Result<Self, Self::Error> {
        Self::new(blocks)
    }
}

impl From<BlockDocument> for Vec<Block> {
    fn from(doc: BlockDocument) -> Self {
        doc.blocks
    }
}

fn validate_ids(blocks: &[Block]) -> Result<(), DocumentError> {
    let mut seen = HashSet::with_capacity(blocks.len());
    for (index, block) in blocks.iter().enumerate() {
        if block.id.trim().is_empty() {
            return Err(DocumentError::EmptyBlockId { index });
        }
        if !seen.insert(block.id.as_str()) {
            return Err(DocumentError::DuplicateBlockId(block.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mixed_document_json() -> serde_json::Value {
        json!([
            { "id": "h", "type": "heading", "content": "Groceries", "properties": { "headingLevel": 2 } },
            { "id": "p", "type": "paragraph", "content": "for the weekend" },
            { "id": "l1", "type": "list", "content": "eggs", "properties": { "listType": "numbered", "index": 0 } },
            { "id": "l2", "type": "list", "content": "milk", "properties": { "listType": "numbered", "index": 1 } },
            { "id": "t", "type": "todo", "content": "call mum", "properties": { "checked": true } }
        ])
    }

    #[test]
    fn seed_is_single_empty_paragraph() {
        let doc = BlockDocument::seed();
        assert_eq!(doc.len(), 1);
        let block = &doc.blocks()[0];
        assert_eq!(block.block_type(), BlockType::Paragraph);
        assert!(block.content.is_empty());
        assert!(!block.id.is_empty());
    }

    #[test]
    fn decode_then_encode_preserves_order_and_fields() {
        let input = mixed_document_json();
        let doc: BlockDocument = serde_json::from_value(input.clone()).unwrap();

        let types: Vec<_> = doc.blocks().iter().map(Block::block_type).collect();
        assert_eq!(
            types,
            vec![
                BlockType::Heading,
                BlockType::Paragraph,
                BlockType::List,
                BlockType::List,
                BlockType::Todo
            ]
        );
        assert_eq!(
            doc.blocks()[3].kind,
            BlockKind::List {
                list_type: Some(ListType::Numbered),
                index: Some(1)
            }
        );

        assert_eq!(serde_json::to_value(&doc).unwrap(), input);
    }

    #[test]
    fn empty_array_is_a_valid_document() {
        let doc: BlockDocument = serde_json::from_str("[]").unwrap();
        assert!(doc.is_empty());
        assert_eq!(serde_json::to_string(&doc).unwrap(), "[]");
    }

    #[test]
    fn absent_properties_read_as_defaults() {
        let doc: BlockDocument = serde_json::from_value(json!([
            { "id": "a", "type": "heading", "content": "x" },
            { "id": "b", "type": "list", "content": "y" },
            { "id": "c", "type": "todo", "content": "z", "properties": {} }
        ]))
        .unwrap();

        assert_eq!(doc.blocks()[0].kind, BlockKind::Heading { level: None });
        assert_eq!(
            doc.blocks()[0].kind.heading_level(),
            Some(HeadingLevel::default())
        );
        assert_eq!(
            doc.blocks()[1].kind.list_marker(),
            Some((ListType::Bullet, 0))
        );
        assert_eq!(doc.blocks()[2].kind.is_checked(), Some(false));
        assert_eq!(BlockKind::Paragraph.heading_level(), None);
    }

    #[test]
    fn optional_and_absent_properties_round_trip() {
        let input = json!([
            { "id": "p", "type": "paragraph", "content": "", "properties": {} },
            { "id": "l", "type": "list", "content": "a", "properties": { "listType": "bullet" } },
            { "id": "i", "type": "list", "content": "b", "properties": { "index": 3 } },
            { "id": "t", "type": "todo", "content": "c" },
            { "id": "e", "type": "todo", "content": "d", "properties": {} },
            { "id": "h", "type": "heading", "content": "e" }
        ]);

        let doc: BlockDocument = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&doc).unwrap(), input);
    }

    #[test]
    fn foreign_properties_are_dropped() {
        let doc: BlockDocument = serde_json::from_value(json!([
            { "id": "a", "type": "paragraph", "content": "x", "properties": { "checked": true } },
            { "id": "b", "type": "todo", "content": "y", "properties": { "checked": true, "headingLevel": 2 } }
        ]))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!([
                { "id": "a", "type": "paragraph", "content": "x", "properties": {} },
                { "id": "b", "type": "todo", "content": "y", "properties": { "checked": true } }
            ])
        );
    }

    #[test]
    fn constructed_blocks_omit_unset_properties() {
        let doc = BlockDocument::new(vec![
            Block::new("p", "x", BlockKind::Paragraph),
            Block::new("t", "y", BlockKind::Todo { checked: None }),
        ])
        .unwrap();

        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!([
                { "id": "p", "type": "paragraph", "content": "x" },
                { "id": "t", "type": "todo", "content": "y" }
            ])
        );
    }

    #[test]
    fn heading_level_out_of_range_is_rejected() {
        for level in [0, 7] {
            let err = serde_json::from_value::<BlockDocument>(json!([
                { "id": "a", "type": "heading", "content": "x", "properties": { "headingLevel": level } }
            ]))
            .unwrap_err();
            assert!(err.to_string().contains("headingLevel"), "{err}");
        }
        assert!(HeadingLevel::new(6).is_ok());
    }

    #[test]
    fn unknown_block_type_is_rejected() {
        let result = serde_json::from_value::<BlockDocument>(json!([
            { "id": "a", "type": "image", "content": "x" }
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_list_type_is_rejected() {
        let result = serde_json::from_value::<BlockDocument>(json!([
            { "id": "a", "type": "list", "content": "x", "properties": { "listType": "checkbox" } }
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_and_empty_ids_are_rejected() {
        let dup = vec![Block::new("x", "", BlockKind::Paragraph); 2];
        assert_eq!(
            BlockDocument::new(dup),
            Err(DocumentError::DuplicateBlockId("x".into()))
        );

        let blank = vec![
            Block::paragraph("ok"),
            Block::new("  ", "", BlockKind::Paragraph),
        ];
        assert_eq!(
            BlockDocument::new(blank),
            Err(DocumentError::EmptyBlockId { index: 1 })
        );
    }
}
