//! Mapping between plain-text offsets and structural editor positions.
//!
//! The editor keeps a tree of blocks, one per `\n`-separated line of the
//! projection. Each block contributes an opening and a closing token, so the
//! content of block `i` starts at `1 + sum(len_j + 2 for j < i)` and
//!
//! ```text
//! structural(offset) = offset + 1 + breaks_before(offset)
//! ```

use serde::{Deserialize, Serialize};

use crate::types::TextRange;

/// Half-open range in structural coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralRange {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    /// Char offset of the first char of the line.
    start: usize,
    /// Line length in chars, excluding the newline.
    len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    blocks: Vec<Block>,
}

impl BlockLayout {
    pub fn from_text(text: &str) -> Self {
        let mut blocks = Vec::new();
        let mut start = 0usize;
        let mut len = 0usize;
        for ch in text.chars() {
            if ch == '\n' {
                blocks.push(Block { start, len });
                start += len + 1;
                len = 0;
            } else {
                len += 1;
            }
        }
        blocks.push(Block { start, len });
        Self { blocks }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total plain-text length in chars, newlines included.
    pub fn text_len(&self) -> usize {
        self.blocks
            .last()
            .map(|block| block.start + block.len)
            .unwrap_or(0)
    }

    /// Index of the block holding `offset`. An offset sitting on a newline
    /// belongs to the block it terminates.
    fn block_index(&self, offset: usize) -> usize {
        self.blocks
            .partition_point(|block| block.start + block.len < offset)
            .min(self.blocks.len().saturating_sub(1))
    }

    /// Structural position of a plain-text offset. Offsets past the end clamp
    /// to the end of the last block.
    pub fn to_structural(&self, offset: usize) -> usize {
        let offset = offset.min(self.text_len());
        offset + 1 + self.block_index(offset)
    }

    /// Plain-text offset of a structural position, or `None` when the
    /// position falls on a block boundary token.
    pub fn from_structural(&self, pos: usize) -> Option<usize> {
        self.blocks.iter().enumerate().find_map(|(idx, block)| {
            let content_start = block.start + 1 + idx;
            (content_start..=content_start + block.len)
                .contains(&pos)
                .then(|| pos - 1 - idx)
        })
    }

    pub fn map_range(&self, range: TextRange) -> StructuralRange {
        StructuralRange {
            from: self.to_structural(range.start),
            to: self.to_structural(range.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block_is_offset_plus_one() {
        let layout = BlockLayout::from_text("hello world");
        assert_eq!(layout.block_count(), 1);
        assert_eq!(layout.to_structural(0), 1);
        assert_eq!(layout.to_structural(11), 12);
    }

    #[test]
    fn each_break_adds_one() {
        // "ab" | "cde" | "" | "f"
        let layout = BlockLayout::from_text("ab\ncde\n\nf");
        assert_eq!(layout.block_count(), 4);
        assert_eq!(layout.to_structural(0), 1);
        assert_eq!(layout.to_structural(2), 3);
        assert_eq!(layout.to_structural(3), 5);
        assert_eq!(layout.to_structural(7), 10);
        assert_eq!(layout.to_structural(8), 12);
    }

    #[test]
    fn from_structural_inverts_to_structural() {
        let text = "first line\nsecond\n\nlast";
        let layout = BlockLayout::from_text(text);
        for offset in 0..=text.chars().count() {
            let pos = layout.to_structural(offset);
            assert_eq!(layout.from_structural(pos), Some(offset), "offset {offset}");
        }
        assert_eq!(layout.from_structural(0), None);
    }

    #[test]
    fn map_range_spans_blocks() {
        let layout = BlockLayout::from_text("ab\ncd");
        let range = TextRange::new(1, 4).unwrap();
        assert_eq!(layout.map_range(range), StructuralRange { from: 2, to: 6 });
    }
}
