//! Prompt construction for semantic slide conversion.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the output schema described to the model
//!    is rendered from [`crate::blocks::BLOCK_CATALOG`], the same table the
//!    parser validates against.
//!
//! 2. **Testability**: the prompt is a pure function of its inputs, so
//!    tests can assert on it without a model.
//!
//! Callers can override the instructional part via
//! [`crate::config::SemanticConfig::system_prompt`]; the extraction and image
//! inventory sections are always appended.

use crate::blocks::{ContentBlock, ImageRef, BLOCK_CATALOG};
use crate::slide::{Classification, SlideExtraction};
use serde::Serialize;

/// Default instructions for converting a slide into typed semantic blocks.
///
/// The block catalog is appended by [`default_instructions`].
pub const DEFAULT_INSTRUCTIONS: &str = r#"You are an expert at restructuring presentation slides. You receive a screenshot of one slide and a rough extraction of its text and layout. The extraction is structurally messy: diagrams come out as flat node lists, comparisons as unrelated text boxes, steps as loose paragraphs.

Your task is to express what the slide MEANS as clean, typed content blocks.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Preserve ALL source text verbatim, in its original language
   - Do NOT translate, paraphrase or summarise slide text inside blocks
   - Use the screenshot to recover reading order and grouping

2. STRUCTURE
   - Side-by-side alternatives become one "comparison" block
   - Ordered processes and timelines become one "sequence" block
   - A term with its explanation becomes a "definition" block
   - Text that explains a picture becomes "text_with_visual"
   - Use "smart_art" only for diagrams that fit none of the above

3. IMAGES
   - Reference images only by paths from the IMAGE INVENTORY below
   - Omit purely decorative images (backgrounds, logos, dividers)

4. OUTPUT FORMAT
   - Output ONLY one JSON object, no commentary
   - The object has exactly these keys:
     "title": improved slide title, or null to keep the original
     "summary": one sentence describing the slide's message
     "classification": one of "comparison", "sequence", "definition", "list", "mixed"
     "blocks": array of content blocks
   - Every block has a "type" key naming its variant"#;

/// Render the default instructions with the block catalog appended.
pub fn default_instructions() -> String {
    let mut out = String::from(DEFAULT_INSTRUCTIONS);
    out.push_str("\n\nBLOCK TYPES (required fields first, optional in brackets):\n");
    for spec in BLOCK_CATALOG {
        out.push_str(&format!("   - \"{}\": {}", spec.type_name, spec.required.join(", ")));
        if !spec.optional.is_empty() {
            out.push_str(&format!(" [{}]", spec.optional.join(", ")));
        }
        out.push_str(&format!(" ({})\n", spec.purpose));
    }
    let tags: Vec<&str> = Classification::ALL.iter().map(|c| c.as_str()).collect();
    out.push_str(&format!("\nValid classifications: {}\n", tags.join(", ")));
    out
}

#[derive(Serialize)]
struct ExtractionView<'a> {
    ordinal: usize,
    title: &'a str,
    layout: &'a str,
    content: &'a [ContentBlock],
}

/// Build the complete prompt text for one slide.
///
/// Sections, in order: instructions, raw extraction (pretty JSON), image
/// inventory. Identical inputs always yield identical output.
pub fn build_prompt(
    slide: &SlideExtraction,
    inventory: &[ImageRef],
    instructions: Option<&str>,
) -> String {
    let view = ExtractionView {
        ordinal: slide.ordinal,
        title: &slide.title,
        layout: &slide.layout,
        content: &slide.content,
    };
    // Plain structs with string keys: serialisation cannot fail.
    let extraction = serde_json::to_string_pretty(&view).unwrap_or_default();

    let mut out = match instructions {
        Some(custom) => custom.trim_end().to_string(),
        None => default_instructions().trim_end().to_string(),
    };

    out.push_str("\n\nRAW EXTRACTION:\n```json\n");
    out.push_str(&extraction);
    out.push_str("\n```\n\nIMAGE INVENTORY:\n");
    if inventory.is_empty() {
        out.push_str("(none)\n");
    } else {
        for image in inventory {
            if image.alt_text.trim().is_empty() {
                out.push_str(&format!("- {}\n", image.path));
            } else {
                out.push_str(&format!("- {}: \"{}\"\n", image.path, image.alt_text.trim()));
            }
        }
    }
    out
}
