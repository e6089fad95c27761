//! Content blocks: the typed vocabulary every slide is expressed in.
//!
//! A slide's content is an ordered list of [`ContentBlock`]s. The enum is
//! closed and internally tagged on `"type"`, so the JSON form produced by the
//! extractor and by the model is exactly what serde reads:
//!
//! ```json
//! {"type": "definition", "term": "Latency", "definition": "Time to first byte", "examples": []}
//! ```
//!
//! Two layers of checking apply:
//!
//! 1. **Shape**: serde rejects unknown discriminators and missing required
//!    fields ([`validate_value`]).
//! 2. **Invariants**: [`ContentBlock::validate`] rejects blocks that parse
//!    but are meaningless: blank text, heading level outside 1–6, ragged
//!    tables, empty groups/steps.
//!
//! Invalid blocks are rejected, never coerced into something plausible.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A block failed shape or invariant checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {block_type} block: {reason}")]
pub struct InvalidBlock {
    /// Discriminator of the offending block (`"unknown"` when absent).
    pub block_type: String,
    pub reason: String,
}

impl InvalidBlock {
    pub fn new(block_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            reason: reason.into(),
        }
    }
}

// ── Block catalog ────────────────────────────────────────────────────────

/// Static description of one block variant.
///
/// Drives both the prompt's schema section and the validation tests, so the
/// instructions the model receives cannot drift from what the parser accepts.
#[derive(Debug, Clone, Copy)]
pub struct BlockSpec {
    pub type_name: &'static str,
    /// Fields whose absence makes the block invalid.
    pub required: &'static [&'static str],
    /// Fields that may be omitted.
    pub optional: &'static [&'static str],
    pub purpose: &'static str,
}

pub const BLOCK_CATALOG: &[BlockSpec] = &[
    BlockSpec {
        type_name: "heading",
        required: &["text"],
        optional: &["level"],
        purpose: "A section heading; level 1-6",
    },
    BlockSpec {
        type_name: "paragraph",
        required: &["text"],
        optional: &[],
        purpose: "Running prose",
    },
    BlockSpec {
        type_name: "list",
        required: &["items"],
        optional: &["style"],
        purpose: "Bulleted or numbered items; each item has text, level, optional link and children",
    },
    BlockSpec {
        type_name: "image",
        required: &["src"],
        optional: &["alt", "caption"],
        purpose: "A meaningful picture from the image inventory",
    },
    BlockSpec {
        type_name: "smart_art",
        required: &["nodes"],
        optional: &["layout"],
        purpose: "A diagram as a tree of nodes, each with text, level and optional icon",
    },
    BlockSpec {
        type_name: "table",
        required: &["rows"],
        optional: &[],
        purpose: "A rectangular grid of string cells; every row has the same column count",
    },
    BlockSpec {
        type_name: "comparison",
        required: &["groups"],
        optional: &["description"],
        purpose: "Side-by-side options; each group has a label and items",
    },
    BlockSpec {
        type_name: "sequence",
        required: &["steps"],
        optional: &["description"],
        purpose: "Ordered numbered steps; each step has text and optional detail and icon",
    },
    BlockSpec {
        type_name: "text_with_visual",
        required: &["text", "visual"],
        optional: &["relationship"],
        purpose: "Text paired with a visual, plus how they relate",
    },
    BlockSpec {
        type_name: "definition",
        required: &["term", "definition"],
        optional: &["examples"],
        purpose: "A term, its definition and examples",
    },
    BlockSpec {
        type_name: "link",
        required: &["url", "text"],
        optional: &[],
        purpose: "A hyperlink with display text",
    },
    BlockSpec {
        type_name: "video",
        required: &["src"],
        optional: &["title"],
        purpose: "An embedded video",
    },
];

/// Look up the catalog entry for a discriminator.
pub fn block_spec(type_name: &str) -> Option<&'static BlockSpec> {
    BLOCK_CATALOG.iter().find(|s| s.type_name == type_name)
}

// ── The block enum ───────────────────────────────────────────────────────

/// One structurally typed unit of slide content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading(HeadingBlock),
    Paragraph(ParagraphBlock),
    List(ListBlock),
    Image(ImageBlock),
    #[serde(alias = "smartArt", alias = "smartart")]
    SmartArt(SmartArtBlock),
    Table(TableBlock),
    Comparison(ComparisonBlock),
    Sequence(SequenceBlock),
    #[serde(alias = "textWithVisual")]
    TextWithVisual(TextWithVisualBlock),
    Definition(DefinitionBlock),
    Link(LinkBlock),
    Video(VideoBlock),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingBlock {
    pub text: String,
    #[serde(default = "default_heading_level")]
    pub level: u8,
}

fn default_heading_level() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphBlock {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStyle {
    #[default]
    Bullet,
    Numbered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListBlock {
    pub items: Vec<ListItem>,
    #[serde(default)]
    pub style: ListStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub text: String,
    #[serde(default)]
    pub level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ListItem>,
}

impl ListItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: 0,
            link: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartArtBlock {
    #[serde(default)]
    pub layout: String,
    pub nodes: Vec<SmartArtNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartArtNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, alias = "iconAlt", skip_serializing_if = "Option::is_none")]
    pub icon_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SmartArtNode>,
}

impl SmartArtNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            level: 0,
            icon: None,
            icon_alt: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBlock {
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonBlock {
    #[serde(default)]
    pub description: String,
    pub groups: Vec<ComparisonGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonGroup {
    pub label: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceBlock {
    #[serde(default)]
    pub description: String,
    pub steps: Vec<SequenceStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Explicit step number; position in `steps` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextWithVisualBlock {
    pub text: String,
    pub visual: String,
    #[serde(default)]
    pub relationship: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionBlock {
    pub term: String,
    pub definition: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkBlock {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoBlock {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// An image or icon referenced anywhere in a block tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub path: String,
    pub alt_text: String,
}

// ── Constructors ─────────────────────────────────────────────────────────

impl ContentBlock {
    pub fn heading(text: impl Into<String>, level: u8) -> Result<Self, InvalidBlock> {
        Self::Heading(HeadingBlock {
            text: text.into(),
            level,
        })
        .checked()
    }

    pub fn paragraph(text: impl Into<String>) -> Result<Self, InvalidBlock> {
        Self::Paragraph(ParagraphBlock { text: text.into() }).checked()
    }

    pub fn list(style: ListStyle, items: Vec<ListItem>) -> Result<Self, InvalidBlock> {
        Self::List(ListBlock { items, style }).checked()
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Result<Self, InvalidBlock> {
        Self::Image(ImageBlock {
            src: src.into(),
            alt: alt.into(),
            caption: String::new(),
        })
        .checked()
    }

    pub fn smart_art(
        layout: impl Into<String>,
        nodes: Vec<SmartArtNode>,
    ) -> Result<Self, InvalidBlock> {
        Self::SmartArt(SmartArtBlock {
            layout: layout.into(),
            nodes,
        })
        .checked()
    }

    pub fn table(rows: Vec<Vec<String>>) -> Result<Self, InvalidBlock> {
        Self::Table(TableBlock { rows }).checked()
    }

    pub fn comparison(
        description: impl Into<String>,
        groups: Vec<ComparisonGroup>,
    ) -> Result<Self, InvalidBlock> {
        Self::Comparison(ComparisonBlock {
            description: description.into(),
            groups,
        })
        .checked()
    }

    pub fn sequence(
        description: impl Into<String>,
        steps: Vec<SequenceStep>,
    ) -> Result<Self, InvalidBlock> {
        Self::Sequence(SequenceBlock {
            description: description.into(),
            steps,
        })
        .checked()
    }

    pub fn text_with_visual(
        text: impl Into<String>,
        visual: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Result<Self, InvalidBlock> {
        Self::TextWithVisual(TextWithVisualBlock {
            text: text.into(),
            visual: visual.into(),
            relationship: relationship.into(),
        })
        .checked()
    }

    pub fn definition(
        term: impl Into<String>,
        definition: impl Into<String>,
        examples: Vec<String>,
    ) -> Result<Self, InvalidBlock> {
        Self::Definition(DefinitionBlock {
            term: term.into(),
            definition: definition.into(),
            examples,
        })
        .checked()
    }

    pub fn link(url: impl Into<String>, text: impl Into<String>) -> Result<Self, InvalidBlock> {
        Self::Link(LinkBlock {
            url: url.into(),
            text: text.into(),
        })
        .checked()
    }

    pub fn video(src: impl Into<String>, title: Option<String>) -> Result<Self, InvalidBlock> {
        Self::Video(VideoBlock {
            src: src.into(),
            title,
        })
        .checked()
    }

    fn checked(self) -> Result<Self, InvalidBlock> {
        self.validate()?;
        Ok(self)
    }
}

// ── Validation ───────────────────────────────────────────────────────────

impl ContentBlock {
    /// The `"type"` discriminator as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            ContentBlock::Heading(_) => "heading",
            ContentBlock::Paragraph(_) => "paragraph",
            ContentBlock::List(_) => "list",
            ContentBlock::Image(_) => "image",
            ContentBlock::SmartArt(_) => "smart_art",
            ContentBlock::Table(_) => "table",
            ContentBlock::Comparison(_) => "comparison",
            ContentBlock::Sequence(_) => "sequence",
            ContentBlock::TextWithVisual(_) => "text_with_visual",
            ContentBlock::Definition(_) => "definition",
            ContentBlock::Link(_) => "link",
            ContentBlock::Video(_) => "video",
        }
    }

    /// Check the per-variant invariants.
    pub fn validate(&self) -> Result<(), InvalidBlock> {
        let ty = self.type_name();
        let fail = |reason: &str| Err(InvalidBlock::new(ty, reason));

        match self {
            ContentBlock::Heading(h) => {
                require_text(ty, "text", &h.text)?;
                if !(1..=6).contains(&h.level) {
                    return Err(InvalidBlock::new(
                        ty,
                        format!("level must be 1-6, got {}", h.level),
                    ));
                }
            }
            ContentBlock::Paragraph(p) => require_text(ty, "text", &p.text)?,
            ContentBlock::List(l) => {
                if l.items.is_empty() {
                    return fail("items must not be empty");
                }
                validate_list_items(ty, &l.items)?;
            }
            ContentBlock::Image(i) => require_text(ty, "src", &i.src)?,
            ContentBlock::SmartArt(s) => {
                if s.nodes.is_empty() {
                    return fail("nodes must not be empty");
                }
                validate_nodes(ty, &s.nodes)?;
            }
            ContentBlock::Table(t) => {
                let Some(first) = t.rows.first() else {
                    return fail("rows must not be empty");
                };
                let cols = first.len();
                if cols == 0 {
                    return fail("rows must have at least one column");
                }
                if let Some((i, row)) = t.rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
                    return Err(InvalidBlock::new(
                        ty,
                        format!("row {i} has {} cells, expected {cols}", row.len()),
                    ));
                }
            }
            ContentBlock::Comparison(c) => {
                if c.groups.is_empty() {
                    return fail("groups must not be empty");
                }
                for g in &c.groups {
                    require_text(ty, "groups[].label", &g.label)?;
                }
            }
            ContentBlock::Sequence(s) => {
                if s.steps.is_empty() {
                    return fail("steps must not be empty");
                }
                for step in &s.steps {
                    require_text(ty, "steps[].text", &step.text)?;
                }
            }
            ContentBlock::TextWithVisual(t) => {
                require_text(ty, "text", &t.text)?;
                require_text(ty, "visual", &t.visual)?;
            }
            ContentBlock::Definition(d) => {
                require_text(ty, "term", &d.term)?;
                require_text(ty, "definition", &d.definition)?;
            }
            ContentBlock::Link(l) => {
                require_text(ty, "url", &l.url)?;
                require_text(ty, "text", &l.text)?;
            }
            ContentBlock::Video(v) => require_text(ty, "src", &v.src)?,
        }
        Ok(())
    }
}

/// Validate an already-typed block.
pub fn validate(block: &ContentBlock) -> Result<(), InvalidBlock> {
    block.validate()
}

/// Decode and validate one untyped block.
///
/// Unknown discriminators and missing required fields fail here; a block
/// that decodes is then held to [`ContentBlock::validate`].
pub fn validate_value(value: &Value) -> Result<ContentBlock, InvalidBlock> {
    let Some(obj) = value.as_object() else {
        return Err(InvalidBlock::new("unknown", "block is not a JSON object"));
    };
    let Some(ty) = obj.get("type").and_then(Value::as_str) else {
        return Err(InvalidBlock::new("unknown", "missing `type` discriminator"));
    };
    let block: ContentBlock = serde_json::from_value(value.clone())
        .map_err(|e| InvalidBlock::new(ty, e.to_string()))?;
    block.validate()?;
    Ok(block)
}

fn require_text(ty: &str, field: &str, value: &str) -> Result<(), InvalidBlock> {
    if value.trim().is_empty() {
        Err(InvalidBlock::new(ty, format!("`{field}` must not be blank")))
    } else {
        Ok(())
    }
}

fn validate_list_items(ty: &str, items: &[ListItem]) -> Result<(), InvalidBlock> {
    for item in items {
        require_text(ty, "items[].text", &item.text)?;
        validate_list_items(ty, &item.children)?;
    }
    Ok(())
}

fn validate_nodes(ty: &str, nodes: &[SmartArtNode]) -> Result<(), InvalidBlock> {
    for node in nodes {
        // Icon-only nodes are legitimate diagram elements.
        if node.text.trim().is_empty() && node.icon.is_none() {
            return Err(InvalidBlock::new(ty, "node has neither text nor icon"));
        }
        validate_nodes(ty, &node.children)?;
    }
    Ok(())
}

// ── Traversal ────────────────────────────────────────────────────────────

impl ContentBlock {
    /// Flatten all human-readable text in the block, one fragment per line.
    pub fn plain_text(&self) -> String {
        let mut out = Vec::new();
        match self {
            ContentBlock::Heading(h) => out.push(h.text.clone()),
            ContentBlock::Paragraph(p) => out.push(p.text.clone()),
            ContentBlock::List(l) => list_text(&l.items, &mut out),
            ContentBlock::Image(i) => {
                out.push(i.alt.clone());
                out.push(i.caption.clone());
            }
            ContentBlock::SmartArt(s) => node_text(&s.nodes, &mut out),
            ContentBlock::Table(t) => {
                out.extend(t.rows.iter().map(|r| r.join(" | ")));
            }
            ContentBlock::Comparison(c) => {
                out.push(c.description.clone());
                for g in &c.groups {
                    out.push(g.label.clone());
                    out.extend(g.items.iter().cloned());
                }
            }
            ContentBlock::Sequence(s) => {
                out.push(s.description.clone());
                for step in &s.steps {
                    out.push(step.text.clone());
                    out.extend(step.detail.iter().cloned());
                }
            }
            ContentBlock::TextWithVisual(t) => {
                out.push(t.text.clone());
                out.push(t.visual.clone());
                out.push(t.relationship.clone());
            }
            ContentBlock::Definition(d) => {
                out.push(format!("{}: {}", d.term, d.definition));
                out.extend(d.examples.iter().cloned());
            }
            ContentBlock::Link(l) => out.push(l.text.clone()),
            ContentBlock::Video(v) => out.extend(v.title.iter().cloned()),
        }
        out.retain(|s| !s.trim().is_empty());
        out.join("\n")
    }

    /// Append every image/icon reference in this block, depth first.
    pub fn collect_images(&self, out: &mut Vec<ImageRef>) {
        match self {
            ContentBlock::Image(i) => {
                let alt = if i.alt.is_empty() { &i.caption } else { &i.alt };
                out.push(ImageRef {
                    path: i.src.clone(),
                    alt_text: alt.clone(),
                });
            }
            ContentBlock::SmartArt(s) => node_icons(&s.nodes, out),
            ContentBlock::Sequence(s) => {
                for step in &s.steps {
                    if let Some(icon) = &step.icon {
                        out.push(ImageRef {
                            path: icon.clone(),
                            alt_text: step.text.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
}

fn list_text(items: &[ListItem], out: &mut Vec<String>) {
    for item in items {
        out.push(item.text.clone());
        list_text(&item.children, out);
    }
}

fn node_text(nodes: &[SmartArtNode], out: &mut Vec<String>) {
    for node in nodes {
        out.push(node.text.clone());
        node_text(&node.children, out);
    }
}

fn node_icons(nodes: &[SmartArtNode], out: &mut Vec<ImageRef>) {
    for node in nodes {
        if let Some(icon) = &node.icon {
            out.push(ImageRef {
                path: icon.clone(),
                alt_text: node.icon_alt.clone().unwrap_or_default(),
            });
        }
        node_icons(&node.children, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// One valid JSON exemplar per catalog entry.
    fn exemplar(type_name: &str) -> Value {
        match type_name {
            "heading" => json!({"type": "heading", "text": "Overview", "level": 2}),
            "paragraph" => json!({"type": "paragraph", "text": "Some prose."}),
            "list" => json!({"type": "list", "style": "numbered", "items": [{"text": "a"}, {"text": "b", "children": [{"text": "b.1", "level": 1}]}]}),
            "image" => json!({"type": "image", "src": "media/img1.png", "alt": "chart"}),
            "smart_art" => json!({"type": "smart_art", "layout": "cycle", "nodes": [{"text": "Plan", "icon": "media/i1.svg"}]}),
            "table" => json!({"type": "table", "rows": [["a", "b"], ["1", "2"]]}),
            "comparison" => json!({"type": "comparison", "description": "Pros vs cons", "groups": [{"label": "Pros", "items": ["fast"]}, {"label": "Cons", "items": ["costly"]}]}),
            "sequence" => json!({"type": "sequence", "description": "Setup", "steps": [{"text": "Install"}, {"text": "Run", "detail": "with --release"}]}),
            "text_with_visual" => json!({"type": "text_with_visual", "text": "Growth", "visual": "Upward line chart", "relationship": "illustrates"}),
            "definition" => json!({"type": "definition", "term": "Latency", "definition": "Delay before transfer", "examples": ["ping"]}),
            "link" => json!({"type": "link", "url": "https://example.org", "text": "Docs"}),
            "video" => json!({"type": "video", "src": "media/clip.mp4"}),
            other => panic!("no exemplar for {other}"),
        }
    }

    #[test]
    fn every_catalog_variant_validates() {
        for spec in BLOCK_CATALOG {
            let value = exemplar(spec.type_name);
            let block = validate_value(&value)
                .unwrap_or_else(|e| panic!("{} should validate: {e}", spec.type_name));
            assert_eq!(block.type_name(), spec.type_name);
        }
    }

    #[test]
    fn removing_required_field_is_invalid() {
        for spec in BLOCK_CATALOG {
            for field in spec.required {
                let mut value = exemplar(spec.type_name);
                value.as_object_mut().unwrap().remove(*field);
                let err = validate_value(&value).expect_err(&format!(
                    "{} without `{field}` must be invalid",
                    spec.type_name
                ));
                assert_eq!(err.block_type, spec.type_name);
            }
        }
    }

    #[test]
    fn removing_optional_field_stays_valid() {
        for spec in BLOCK_CATALOG {
            for field in spec.optional {
                let mut value = exemplar(spec.type_name);
                value.as_object_mut().unwrap().remove(*field);
                assert!(
                    validate_value(&value).is_ok(),
                    "{} without optional `{field}` should stay valid",
                    spec.type_name
                );
            }
        }
    }

    #[test]
    fn unknown_type_is_invalid() {
        let err = validate_value(&json!({"type": "hologram", "text": "x"})).unwrap_err();
        assert_eq!(err.block_type, "hologram");
    }

    #[test]
    fn missing_discriminator_is_invalid() {
        let err = validate_value(&json!({"text": "x"})).unwrap_err();
        assert_eq!(err.block_type, "unknown");
    }

    #[test]
    fn ragged_table_rejected() {
        let err = ContentBlock::table(vec![
            vec!["a".into(), "b".into()],
            vec!["1".into()],
        ])
        .unwrap_err();
        assert!(err.reason.contains("row 1"), "got: {err}");
    }

    #[test]
    fn heading_level_bounds() {
        assert!(ContentBlock::heading("Title", 1).is_ok());
        assert!(ContentBlock::heading("Title", 6).is_ok());
        assert!(ContentBlock::heading("Title", 0).is_err());
        assert!(ContentBlock::heading("Title", 7).is_err());
    }

    #[test]
    fn blank_text_rejected() {
        assert!(ContentBlock::paragraph("   ").is_err());
        assert!(ContentBlock::definition("Term", "", vec![]).is_err());
    }

    #[test]
    fn camel_case_aliases_accepted() {
        let block = validate_value(&json!({
            "type": "textWithVisual", "text": "t", "visual": "v"
        }))
        .unwrap();
        assert_eq!(block.type_name(), "text_with_visual");
    }

    #[test]
    fn icon_only_smart_art_node_is_valid() {
        let mut node = SmartArtNode::new("");
        node.icon = Some("media/icon.png".into());
        assert!(ContentBlock::smart_art("", vec![node]).is_ok());
        assert!(ContentBlock::smart_art("", vec![SmartArtNode::new(" ")]).is_err());
    }

    #[test]
    fn collects_nested_smart_art_icons() {
        let mut child = SmartArtNode::new("child");
        child.icon = Some("media/child.png".into());
        child.icon_alt = Some("gear".into());
        let mut root = SmartArtNode::new("root");
        root.children.push(child);
        let block = ContentBlock::smart_art("hierarchy", vec![root]).unwrap();

        let mut refs = Vec::new();
        block.collect_images(&mut refs);
        assert_eq!(
            refs,
            vec![ImageRef {
                path: "media/child.png".into(),
                alt_text: "gear".into()
            }]
        );
    }

    #[test]
    fn plain_text_flattens_nested_items() {
        let mut item = ListItem::new("parent");
        item.children.push(ListItem::new("child"));
        let block = ContentBlock::list(ListStyle::Bullet, vec![item]).unwrap();
        assert_eq!(block.plain_text(), "parent\nchild");
    }

    #[test]
    fn serialises_with_snake_case_tag() {
        let block = ContentBlock::text_with_visual("t", "v", "").unwrap();
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "text_with_visual");
    }
}
