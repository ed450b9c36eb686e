use super::vocabulary::{
    ANCHOR_KEYWORDS, ANIMATION_KEYWORDS, COLOR_KEYWORDS, NUMBER_WORDS, SHAPE_KEYWORDS,
    SIZE_KEYWORDS,
};
use super::ParsedIntent;

/// Maximum shape count a command may request; literals above this are ignored.
pub const MAX_COUNT: u32 = 20;

/// Turn one raw transcription into a structured intent.
///
/// Total: any input, including the empty string, yields a fully populated
/// intent (unmatched fields keep their defaults). Each field is extracted
/// independently by a substring scan over its keyword table; within a table
/// the first match wins. A literal integer in `1..=20` overrides a matched
/// number word.
pub fn parse(text: &str) -> ParsedIntent {
    let clean = text.trim().to_ascii_lowercase();
    let mut intent = ParsedIntent::defaults_for(text);

    for entry in SHAPE_KEYWORDS {
        if clean.contains(entry.keyword) {
            intent.shape = entry.shape;
            break;
        }
    }

    for entry in COLOR_KEYWORDS {
        if clean.contains(entry.keyword) {
            intent.color = entry.color;
            break;
        }
    }

    for entry in SIZE_KEYWORDS {
        if clean.contains(entry.keyword) {
            intent.size = entry.size;
            break;
        }
    }

    for entry in ANCHOR_KEYWORDS {
        if clean.contains(entry.keyword) {
            intent.position = entry.anchor;
            break;
        }
    }

    for entry in ANIMATION_KEYWORDS {
        if clean.contains(entry.keyword) {
            intent.animation = Some(entry.animation);
            break;
        }
    }

    for (word, value) in NUMBER_WORDS {
        if clean.contains(word) {
            intent.count = *value;
            break;
        }
    }
    if let Some(value) = first_integer_token(&clean) {
        if (1..=MAX_COUNT).contains(&value) {
            intent.count = value;
        }
    }

    intent
}

// First standalone decimal run in the text. A run is standalone when it is
// not glued to a letter or another digit on either side, so "5 total"
// matches but "p5" does not. Only the first run is considered, matching the
// single-match extraction this replaces.
fn first_integer_token(text: &str) -> Option<u32> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let left_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let right_ok = i >= bytes.len() || !bytes[i].is_ascii_alphanumeric();
        if left_ok && right_ok {
            return text[start..i].parse().ok();
        }
    }
    None
}
