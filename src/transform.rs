//! Content filters applied to text files before upload.
//!
//! Drawing notes (`*.excalidraw.md`) embed a large JSON scene next to the
//! text the author actually typed. Only the `Text Elements` section is worth
//! indexing, so everything else is dropped and the trailing block references
//! (` ^abcd1234`) are stripped from each kept line.

use regex::Regex;
use std::sync::OnceLock;

/// Double extension that marks a drawing note.
pub const DRAWING_NOTE_SUFFIX: &str = ".excalidraw.md";

fn trigger_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*#+ Text Elements").expect("static regex"))
}

fn any_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#+\s+").expect("static regex"))
}

fn block_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" \^[\w-]{8}$").expect("static regex"))
}

pub fn is_drawing_note(filename: &str) -> bool {
    filename.ends_with(DRAWING_NOTE_SUFFIX)
}

/// Apply the format-specific filter for `filename`. Identity for anything
/// that is not a drawing note.
pub fn transform(filename: &str, content: &str) -> String {
    if !is_drawing_note(filename) {
        return content.to_string();
    }
    extract_text_elements(content)
}

/// Keep the `Text Elements` heading and the lines under it, up to the next
/// heading. Returns an empty string when the heading is absent.
fn extract_text_elements(content: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    let mut capturing = false;

    for line in content.lines() {
        if trigger_heading().is_match(line) {
            capturing = true;
        } else if capturing && any_heading().is_match(line) {
            capturing = false;
        }

        if capturing {
            kept.push(block_ref().replace(line, "").into_owned());
        }
    }

    kept.join("\n")
}
