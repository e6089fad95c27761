//! Response parsing: recover a [`SemanticResult`] from free-form model text.
//!
//! ## Why is this necessary?
//!
//! The model is asked for one bare JSON object. It does not always comply:
//!
//! - the object arrives wrapped in ` ```json ... ``` ` fences
//! - a friendly sentence precedes or follows the object
//! - individual blocks miss required fields or use unknown types
//!
//! Recovery runs in a fixed order, first success wins:
//!
//! 1. Strip a leading/trailing fence marker and parse the remainder.
//! 2. Parse the first balanced `{...}` span found anywhere in the text.
//! 3. Give up with [`ParseError::Unparsable`].
//!
//! A recovered object is then validated block by block. Invalid blocks are
//! dropped and recorded as [`ResultWarning::DroppedBlock`], so a mostly-good
//! answer still reaches the reviewer.

use crate::blocks::validate_value;
use crate::error::{ConversionError, ErrorKind};
use crate::slide::{Classification, ResultWarning, SemanticResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// The model output could not be recovered as structured data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Model response is not structured JSON: {}", preview(raw))]
    Unparsable { raw: String },
}

impl From<ParseError> for ConversionError {
    fn from(e: ParseError) -> Self {
        ConversionError::new(ErrorKind::UnparsableResponse, e.to_string())
    }
}

fn preview(raw: &str) -> String {
    let flat: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 120 {
        let cut: String = flat.chars().take(119).collect();
        format!("{cut}\u{2026}")
    } else {
        flat
    }
}

/// Parse raw model text into a validated [`SemanticResult`].
///
/// Parsing is idempotent with respect to fencing:
/// `parse_response(t) == parse_response("```json\n" + t + "\n```")`
/// for any well-formed `t`.
pub fn parse_response(raw: &str) -> Result<SemanticResult, ParseError> {
    let cleaned = remove_invisible_chars(raw);

    // ── Attempt 1: fences stripped, whole text ───────────────────────────
    let stripped = strip_fences(&cleaned);
    if let Some(value) = parse_structured(stripped) {
        debug!("Parsed model response directly ({} bytes)", stripped.len());
        return Ok(build_result(value));
    }

    // ── Attempt 2: first balanced object span ────────────────────────────
    if let Some(span) = first_balanced_object(&cleaned) {
        if let Some(value) = parse_structured(span) {
            debug!(
                "Recovered JSON object span ({} of {} bytes)",
                span.len(),
                cleaned.len()
            );
            return Ok(build_result(value));
        }
    }

    Err(ParseError::Unparsable {
        raw: raw.to_string(),
    })
}

static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\n").unwrap());
static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n?```\s*$").unwrap());

/// Remove one leading fence line (` ``` ` or ` ```json `) and one trailing
/// ` ``` ` marker, each independently.
pub fn strip_fences(input: &str) -> &str {
    let mut s = input.trim();
    if let Some(open) = RE_OPEN_FENCE.find(s) {
        s = &s[open.end()..];
    }
    if let Some(close) = RE_CLOSE_FENCE.find(s) {
        s = &s[..close.start()];
    }
    s.trim()
}

/// Return the first `{...}` span whose braces balance, honouring JSON
/// string literals and escapes.
pub fn first_balanced_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in input[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&input[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Objects are full results; a bare array is accepted as the block list.
fn parse_structured(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(v @ Value::Object(_)) => Some(v),
        Ok(Value::Array(blocks)) => {
            let mut obj = serde_json::Map::new();
            obj.insert("blocks".into(), Value::Array(blocks));
            Some(Value::Object(obj))
        }
        _ => None,
    }
}

fn string_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_str))
}

fn build_result(value: Value) -> SemanticResult {
    let title = string_field(&value, &["title"])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let summary = string_field(&value, &["summary"])
        .unwrap_or_default()
        .trim()
        .to_string();

    let raw_blocks: &[Value] = ["blocks", "content"]
        .iter()
        .find_map(|k| value.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut blocks = Vec::with_capacity(raw_blocks.len());
    let mut warnings = Vec::new();
    for (index, raw) in raw_blocks.iter().enumerate() {
        match validate_value(raw) {
            Ok(block) => blocks.push(block),
            Err(invalid) => {
                warn!("Dropping block {}: {}", index, invalid);
                warnings.push(ResultWarning::DroppedBlock {
                    index,
                    block_type: invalid.block_type,
                    reason: invalid.reason,
                });
            }
        }
    }

    let given = string_field(&value, &["classification", "slide_type", "slideType"]);
    let classification = match given.and_then(Classification::from_tag) {
        Some(c) => c,
        None => {
            let inferred = Classification::infer(&blocks);
            warnings.push(ResultWarning::InferredClassification {
                given: given.map(str::to_string),
                inferred,
            });
            inferred
        }
    };

    SemanticResult {
        title,
        summary,
        classification,
        blocks,
        warnings,
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace(['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::ContentBlock;

    const CLEAN: &str = r#"{
  "title": "Latency",
  "summary": "Defines latency.",
  "classification": "definition",
  "blocks": [
    {"type": "definition", "term": "Latency", "definition": "Delay before a transfer begins", "examples": ["ping"]}
  ]
}"#;

    #[test]
    fn parses_clean_json() {
        let r = parse_response(CLEAN).unwrap();
        assert_eq!(r.title.as_deref(), Some("Latency"));
        assert_eq!(r.classification, Classification::Definition);
        assert_eq!(r.blocks.len(), 1);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn fenced_equals_unfenced() {
        let fenced = format!("```json\n{CLEAN}\n```");
        assert_eq!(parse_response(CLEAN).unwrap(), parse_response(&fenced).unwrap());
        let bare_fence = format!("```\n{CLEAN}\n```");
        assert_eq!(parse_response(CLEAN).unwrap(), parse_response(&bare_fence).unwrap());
    }

    #[test]
    fn recovers_object_surrounded_by_prose() {
        let text = format!("Here is the structure you asked for:\n```json\n{CLEAN}\n```\nLet me know if you need changes!");
        let r = parse_response(&text).unwrap();
        assert_eq!(r.blocks.len(), 1);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_span_search() {
        let text = r#"Sure: {"summary": "uses {curly} braces and \"quotes\"", "classification": "mixed", "blocks": [{"type": "paragraph", "text": "a } b"}]} trailing"#;
        let r = parse_response(text).unwrap();
        assert_eq!(r.summary, "uses {curly} braces and \"quotes\"");
        assert_eq!(r.blocks, vec![ContentBlock::paragraph("a } b").unwrap()]);
    }

    #[test]
    fn unparsable_text_fails() {
        let err = parse_response("I cannot help with that slide.").unwrap_err();
        assert!(matches!(err, ParseError::Unparsable { ref raw } if raw.contains("cannot help")));
    }

    #[test]
    fn unbalanced_object_fails() {
        assert!(parse_response(r#"{"blocks": [{"type": "paragraph""#).is_err());
    }

    #[test]
    fn invalid_blocks_are_dropped_and_counted() {
        let text = r#"{"classification": "list", "blocks": [
            {"type": "list", "items": [{"text": "one"}]},
            {"type": "table", "rows": [["a", "b"], ["c"]]},
            {"type": "hologram"},
            {"type": "definition", "term": "x"}
        ]}"#;
        let r = parse_response(text).unwrap();
        assert_eq!(r.blocks.len(), 1);
        assert_eq!(r.dropped_blocks(), 3);
        assert!(matches!(
            &r.warnings[0],
            ResultWarning::DroppedBlock { index: 1, block_type, .. } if block_type == "table"
        ));
    }

    #[test]
    fn unknown_classification_is_inferred() {
        let text = r#"{"classification": "timeline", "blocks": [{"type": "sequence", "steps": [{"text": "a"}]}]}"#;
        let r = parse_response(text).unwrap();
        assert_eq!(r.classification, Classification::Sequence);
        assert!(matches!(
            &r.warnings[0],
            ResultWarning::InferredClassification { given: Some(g), .. } if g == "timeline"
        ));
    }

    #[test]
    fn bare_array_is_block_list() {
        let r = parse_response(r#"[{"type": "paragraph", "text": "hi"}]"#).unwrap();
        assert_eq!(r.blocks.len(), 1);
        assert_eq!(r.summary, "");
    }

    #[test]
    fn strip_fences_variants() {
        assert_eq!(strip_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_fences("{}"), "{}");
        assert_eq!(strip_fences("```json\n{}\n```\nthanks"), "{}\n```\nthanks");
    }

    #[test]
    fn bom_is_ignored() {
        let text = format!("\u{FEFF}{CLEAN}");
        assert!(parse_response(&text).is_ok());
    }
}
