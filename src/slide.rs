//! Slide-level data: the raw extraction that goes in, the semantic result
//! that comes out.

use crate::blocks::{ContentBlock, ImageRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The structurally messy input to conversion, as produced by the external
/// presentation extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideExtraction {
    /// Stable identity in the slide store.
    pub id: String,
    /// 1-based position within the deck.
    pub ordinal: usize,
    #[serde(default)]
    pub title: String,
    /// Layout name from the source master (e.g. "Title and Content").
    #[serde(default)]
    pub layout: String,
    /// Speaker notes.
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl SlideExtraction {
    /// Every image and icon referenced anywhere in the content tree,
    /// including icons on nested smart-art nodes.
    pub fn image_inventory(&self) -> Vec<ImageRef> {
        let mut refs = Vec::new();
        for block in &self.content {
            block.collect_images(&mut refs);
        }
        refs
    }

    /// Concatenated text of all content blocks.
    pub fn extracted_text(&self) -> String {
        self.content
            .iter()
            .map(ContentBlock::plain_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What kind of meaning a converted slide carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Comparison,
    Sequence,
    Definition,
    List,
    #[default]
    Mixed,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::Comparison,
        Classification::Sequence,
        Classification::Definition,
        Classification::List,
        Classification::Mixed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Comparison => "comparison",
            Classification::Sequence => "sequence",
            Classification::Definition => "definition",
            Classification::List => "list",
            Classification::Mixed => "mixed",
        }
    }

    /// Case-insensitive tag lookup.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(tag))
    }

    /// Derive a classification from the blocks themselves.
    ///
    /// Headings, paragraphs and media are framing; if every remaining block
    /// is of one typed kind, that kind wins. Anything else is `Mixed`.
    pub fn infer(blocks: &[ContentBlock]) -> Self {
        let mut found: Option<Classification> = None;
        for block in blocks {
            let kind = match block {
                ContentBlock::Comparison(_) => Classification::Comparison,
                ContentBlock::Sequence(_) => Classification::Sequence,
                ContentBlock::Definition(_) => Classification::Definition,
                ContentBlock::List(_) => Classification::List,
                ContentBlock::Heading(_)
                | ContentBlock::Paragraph(_)
                | ContentBlock::Image(_)
                | ContentBlock::Video(_)
                | ContentBlock::Link(_) => continue,
                _ => return Classification::Mixed,
            };
            match found {
                None => found = Some(kind),
                Some(prev) if prev == kind => {}
                Some(_) => return Classification::Mixed,
            }
        }
        found.unwrap_or(Classification::Mixed)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal problem found while turning model output into a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultWarning {
    /// A block failed validation and was left out.
    DroppedBlock {
        index: usize,
        block_type: String,
        reason: String,
    },
    /// The model's classification was missing or unrecognised.
    InferredClassification {
        given: Option<String>,
        inferred: Classification,
    },
}

/// The clean, typed output of converting one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: String,
    pub classification: Classification,
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResultWarning>,
}

impl SemanticResult {
    /// Number of model blocks that were dropped as invalid.
    pub fn dropped_blocks(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ResultWarning::DroppedBlock { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{ComparisonGroup, ListItem, ListStyle, SmartArtNode};

    #[test]
    fn from_tag_is_case_insensitive() {
        assert_eq!(Classification::from_tag("Definition"), Some(Classification::Definition));
        assert_eq!(Classification::from_tag(" mixed "), Some(Classification::Mixed));
        assert_eq!(Classification::from_tag("timeline"), None);
    }

    #[test]
    fn infer_single_kind() {
        let blocks = vec![
            ContentBlock::heading("Title", 1).unwrap(),
            ContentBlock::comparison(
                "",
                vec![ComparisonGroup {
                    label: "A".into(),
                    items: vec![],
                }],
            )
            .unwrap(),
        ];
        assert_eq!(Classification::infer(&blocks), Classification::Comparison);
    }

    #[test]
    fn infer_mixed_kinds() {
        let blocks = vec![
            ContentBlock::definition("t", "d", vec![]).unwrap(),
            ContentBlock::list(ListStyle::Bullet, vec![ListItem::new("x")]).unwrap(),
        ];
        assert_eq!(Classification::infer(&blocks), Classification::Mixed);
        assert_eq!(Classification::infer(&[]), Classification::Mixed);
    }

    #[test]
    fn image_inventory_reaches_nested_icons() {
        let mut leaf = SmartArtNode::new("leaf");
        leaf.icon = Some("media/leaf.png".into());
        let mut root = SmartArtNode::new("root");
        root.children.push(leaf);
        let slide = SlideExtraction {
            id: "s1".into(),
            ordinal: 1,
            title: "t".into(),
            layout: String::new(),
            notes: String::new(),
            content: vec![
                ContentBlock::image("media/photo.jpg", "team photo").unwrap(),
                ContentBlock::smart_art("", vec![root]).unwrap(),
            ],
        };
        let paths: Vec<_> = slide.image_inventory().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["media/photo.jpg", "media/leaf.png"]);
    }
}
