//! Offset helpers for the plain-text projection.
//!
//! Every offset the engine stores counts Unicode scalar values (`char`s). Rust
//! strings slice by byte, and some providers report UTF-16 code units, so the
//! conversions live here and nowhere else.

/// Number of chars in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Convert a char offset into a byte offset. `char_idx == char_len(text)` maps
/// to `text.len()`; anything past the end is `None`.
pub fn char_to_byte(text: &str, char_idx: usize) -> Option<usize> {
    text.char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .nth(char_idx)
}

/// Convert a byte offset into a char offset. Returns `None` when `byte` does
/// not fall on a char boundary.
pub fn byte_to_char(text: &str, byte: usize) -> Option<usize> {
    if byte > text.len() || !text.is_char_boundary(byte) {
        return None;
    }
    Some(text[..byte].chars().count())
}

/// Slice `text` by a half-open char range.
pub fn slice_chars(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let start_byte = char_to_byte(text, start)?;
    let end_byte = char_to_byte(text, end)?;
    Some(&text[start_byte..end_byte])
}

/// Char at `idx`, if any.
pub fn char_at(text: &str, idx: usize) -> Option<char> {
    text.chars().nth(idx)
}

/// Convert a UTF-16 code-unit offset into a char offset.
///
/// Returns `None` when the offset is past the end or splits a surrogate pair.
pub fn utf16_to_char(text: &str, utf16_idx: usize) -> Option<usize> {
    let mut units = 0usize;
    for (idx, ch) in text.chars().enumerate() {
        if units == utf16_idx {
            return Some(idx);
        }
        if units > utf16_idx {
            return None;
        }
        units += ch.len_utf16();
    }
    (units == utf16_idx).then(|| char_len(text))
}

/// Char offsets of every non-overlapping occurrence of `needle`, in order.
pub fn find_all(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    let mut offsets = Vec::new();
    let mut last_byte = 0usize;
    let mut last_char = 0usize;
    for (byte, _) in haystack.match_indices(needle) {
        last_char += haystack[last_byte..byte].chars().count();
        last_byte = byte;
        offsets.push(last_char);
    }
    offsets
}

/// Lowercase and drop whitespace; used to compare spans loosely.
pub fn loose_key(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
