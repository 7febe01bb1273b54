//! Plain-text projection of the live document.
//!
//! The editor surface owns the structural tree; this type mirrors its text and
//! turns every change into a [`MutationEvent`] that the rest of the engine can
//! react to (trigger evaluation, offset mapping, reconciliation).

use serde::{Deserialize, Serialize};

use crate::error::AnchorError;
use crate::layout::BlockLayout;
use crate::text::{char_at, char_len, char_to_byte, slice_chars};
use crate::types::TextRange;

/// Replace chars `[start, end)` with `insert`. `start == end` is a pure
/// insertion, an empty `insert` a pure deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub insert: String,
}

impl Edit {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start: at,
            end: at,
            insert: text.into(),
        }
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            insert: String::new(),
        }
    }

    pub fn replace(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            start: range.start,
            end: range.end,
            insert: text.into(),
        }
    }
}

/// What changed, expressed against the text before the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    /// Document revision after the edit.
    pub revision: u64,
    pub start: usize,
    /// Chars removed starting at `start`.
    pub removed: usize,
    pub inserted: String,
    /// Char right before `start`, if any.
    pub preceding: Option<char>,
}

impl MutationEvent {
    pub fn inserted_len(&self) -> usize {
        char_len(&self.inserted)
    }

    /// End of the replaced span in pre-edit coordinates.
    pub fn old_end(&self) -> usize {
        self.start + self.removed
    }

    /// End of the inserted span in post-edit coordinates.
    pub fn new_end(&self) -> usize {
        self.start + self.inserted_len()
    }

    /// Signed length change.
    pub fn delta(&self) -> i64 {
        self.inserted_len() as i64 - self.removed as i64
    }

    pub fn is_pure_deletion(&self) -> bool {
        self.inserted.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    version: u32,
    text: String,
    len: usize,
    revision: u64,
    cursor: usize,
}

impl Document {
    /// The cursor starts at the end of `text`.
    pub fn new(id: impl Into<String>, version: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let len = char_len(&text);
        Self {
            id: id.into(),
            version,
            text,
            len,
            revision: 0,
            cursor: len,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, offset: usize) -> Result<(), AnchorError> {
        if offset > self.len {
            return Err(AnchorError::OutOfBounds {
                offset,
                len: self.len,
            });
        }
        self.cursor = offset;
        Ok(())
    }

    pub fn slice(&self, range: TextRange) -> Option<&str> {
        slice_chars(&self.text, range.start, range.end)
    }

    pub fn layout(&self) -> BlockLayout {
        BlockLayout::from_text(&self.text)
    }

    /// Apply an edit and report what changed.
    pub fn apply(&mut self, edit: &Edit) -> Result<MutationEvent, AnchorError> {
        if edit.start > edit.end {
            return Err(AnchorError::InvalidEdit {
                start: edit.start,
                end: edit.end,
            });
        }
        if edit.end > self.len {
            return Err(AnchorError::OutOfBounds {
                offset: edit.end,
                len: self.len,
            });
        }
        let start_byte = char_to_byte(&self.text, edit.start).ok_or(AnchorError::OutOfBounds {
            offset: edit.start,
            len: self.len,
        })?;
        let end_byte = char_to_byte(&self.text, edit.end).ok_or(AnchorError::OutOfBounds {
            offset: edit.end,
            len: self.len,
        })?;

        self.text.replace_range(start_byte..end_byte, &edit.insert);
        let removed = edit.end - edit.start;
        let inserted_len = char_len(&edit.insert);
        self.len = self.len - removed + inserted_len;
        self.revision += 1;

        if self.cursor >= edit.end {
            self.cursor = self.cursor - removed + inserted_len;
        } else if self.cursor > edit.start {
            self.cursor = edit.start + inserted_len;
        }

        let preceding = edit
            .start
            .checked_sub(1)
            .and_then(|idx| char_at(&self.text, idx));

        Ok(MutationEvent {
            revision: self.revision,
            start: edit.start,
            removed,
            inserted: edit.insert.clone(),
            preceding,
        })
    }

    /// Replace the whole projection, diffed into a single minimal edit.
    /// Returns `None` when nothing changed.
    pub fn sync(&mut self, text: &str) -> Option<MutationEvent> {
        if self.text == text {
            return None;
        }
        let edit = diff_edit(&self.text, text);
        // A diff of two valid strings always lands inside the old text.
        self.apply(&edit).ok()
    }
}

/// Smallest single edit turning `old` into `new` (common prefix and suffix).
pub fn diff_edit(old: &str, new: &str) -> Edit {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let prefix = old_chars
        .iter()
        .zip(new_chars.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    Edit {
        start: prefix,
        end: old_chars.len() - suffix,
        insert: new_chars[prefix..new_chars.len() - suffix].iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_shifts_cursor_after_edit() {
        let mut doc = Document::new("doc", 1, "hello world");
        doc.set_cursor(11).unwrap();
        let event = doc.apply(&Edit::insert(5, ",")).unwrap();
        assert_eq!(doc.text(), "hello, world");
        assert_eq!(doc.cursor(), 12);
        assert_eq!(event.revision, 1);
        assert_eq!(event.preceding, Some('o'));
        assert_eq!(event.delta(), 1);
    }

    #[test]
    fn cursor_before_edit_stays_put() {
        let mut doc = Document::new("doc", 1, "hello world");
        doc.set_cursor(2).unwrap();
        doc.apply(&Edit::replace(TextRange::new(6, 11).unwrap(), "there"))
            .unwrap();
        assert_eq!(doc.cursor(), 2);
    }

    #[test]
    fn cursor_inside_replaced_span_moves_to_insertion_end() {
        let mut doc = Document::new("doc", 1, "I saw teh cat");
        doc.set_cursor(7).unwrap();
        doc.apply(&Edit::replace(TextRange::new(6, 9).unwrap(), "the"))
            .unwrap();
        assert_eq!(doc.cursor(), 9);
    }

    #[test]
    fn apply_rejects_out_of_range_edits() {
        let mut doc = Document::new("doc", 1, "abc");
        assert!(matches!(
            doc.apply(&Edit::delete(1, 9)),
            Err(AnchorError::OutOfBounds { .. })
        ));
        assert!(matches!(
            doc.apply(&Edit {
                start: 2,
                end: 1,
                insert: String::new()
            }),
            Err(AnchorError::InvalidEdit { .. })
        ));
        assert_eq!(doc.revision(), 0);
    }

    #[test]
    fn edits_count_chars_not_bytes() {
        let mut doc = Document::new("doc", 1, "café noir");
        doc.apply(&Edit::replace(TextRange::new(0, 4).unwrap(), "thé"))
            .unwrap();
        assert_eq!(doc.text(), "thé noir");
        assert_eq!(doc.len(), 8);
    }

    #[test]
    fn sync_produces_minimal_edit() {
        let mut doc = Document::new("doc", 1, "I saw teh cat");
        let event = doc.sync("I saw the cat").unwrap();
        assert_eq!(event.start, 7);
        assert_eq!(event.removed, 2);
        assert_eq!(event.inserted, "he");
        assert_eq!(doc.text(), "I saw the cat");
        assert!(doc.sync("I saw the cat").is_none());
    }

    #[test]
    fn diff_handles_repeated_chars() {
        let edit = diff_edit("aaa", "aaaa");
        assert_eq!(edit, Edit::insert(3, "a"));
        let edit = diff_edit("abc", "");
        assert_eq!(edit, Edit::delete(0, 3));
    }
}
