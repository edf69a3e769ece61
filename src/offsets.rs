//! Character offsets into a document's raw text.
//!
//! Offsets are counted in UTF-16 code units of the un-normalized `raw_text`,
//! so a range measured by one session stays valid for every other session that
//! reads the same text. Rust strings are UTF-8, so every slice goes through
//! the conversions here rather than indexing bytes directly.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while measuring or applying offsets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffsetError {
    /// A caret names a text node that does not exist.
    #[error("text node {node} does not exist (container has {len})")]
    NoSuchNode { node: usize, len: usize },

    /// A caret or range reaches past the end of the text.
    #[error("offset {offset} is beyond text length {len}")]
    OutOfBounds { offset: usize, len: usize },

    /// An offset falls between the two halves of a surrogate pair.
    #[error("offset {offset} splits a surrogate pair")]
    SplitsCharacter { offset: usize },

    /// A range whose start lies after its end.
    #[error("range {start}..{end} is reversed")]
    Reversed { start: usize, end: usize },
}

/// Number of UTF-16 code units in `s`.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Converts a UTF-16 offset into a byte index of `s`.
///
/// # Errors
///
/// Fails when the offset lies past the end or inside a surrogate pair.
pub fn byte_index(s: &str, offset: usize) -> Result<usize, OffsetError> {
    let mut units = 0;
    for (byte, ch) in s.char_indices() {
        if units == offset {
            return Ok(byte);
        }
        units += ch.len_utf16();
        if units > offset {
            return Err(OffsetError::SplitsCharacter { offset });
        }
    }
    if units == offset {
        Ok(s.len())
    } else {
        Err(OffsetError::OutOfBounds { offset, len: units })
    }
}

/// Converts a byte index of `s` into a UTF-16 offset.
///
/// `byte` must lie on a char boundary.
pub fn utf16_offset(s: &str, byte: usize) -> usize {
    s.get(..byte).map(utf16_len).unwrap_or_else(|| utf16_len(s))
}

/// Slices `s` by a UTF-16 range.
///
/// # Errors
///
/// Fails when either end is out of bounds or splits a character, or when the
/// range is reversed.
pub fn slice_utf16(s: &str, range: Range<usize>) -> Result<&str, OffsetError> {
    let start = byte_index(s, range.start)?;
    let end = byte_index(s, range.end)?;
    if start > end {
        return Err(OffsetError::Reversed {
            start: range.start,
            end: range.end,
        });
    }
    Ok(&s[start..end])
}

/// Forward UTF-16 to byte conversion over one string.
///
/// Lookups at non-decreasing offsets only walk the characters between them,
/// so converting every boundary of a left-to-right pass costs one scan of the
/// text. A lookup behind the cursor rewinds to the start.
#[derive(Debug, Clone)]
pub struct Utf16Cursor<'a> {
    text: &'a str,
    byte: usize,
    unit: usize,
}

impl<'a> Utf16Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            unit: 0,
        }
    }

    /// Byte index of a UTF-16 offset, moving the cursor there.
    ///
    /// # Errors
    ///
    /// Same as [`byte_index`]. A failed lookup leaves the cursor where it was.
    pub fn byte_at(&mut self, offset: usize) -> Result<usize, OffsetError> {
        if offset < self.unit {
            self.byte = 0;
            self.unit = 0;
        }
        let text = self.text;
        let mut byte = self.byte;
        let mut unit = self.unit;
        let mut chars = text[byte..].chars();
        while unit < offset {
            let Some(ch) = chars.next() else {
                return Err(OffsetError::OutOfBounds { offset, len: unit });
            };
            if unit + ch.len_utf16() > offset {
                return Err(OffsetError::SplitsCharacter { offset });
            }
            unit += ch.len_utf16();
            byte += ch.len_utf8();
        }
        self.byte = byte;
        self.unit = unit;
        Ok(byte)
    }

    /// Slices the text by a UTF-16 range.
    ///
    /// # Errors
    ///
    /// Same as [`slice_utf16`].
    pub fn slice(&mut self, range: Range<usize>) -> Result<&'a str, OffsetError> {
        if range.start > range.end {
            return Err(OffsetError::Reversed {
                start: range.start,
                end: range.end,
            });
        }
        let start = self.byte_at(range.start)?;
        let end = self.byte_at(range.end)?;
        Ok(&self.text[start..end])
    }
}

/// A caret position: an offset (UTF-16 units) inside one text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Caret {
    pub node: usize,
    pub offset: usize,
}

impl Caret {
    pub fn new(node: usize, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A measured selection over the container's concatenated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Selection {
    /// Whether the selection holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Shrinks the selection so it neither starts nor ends with whitespace.
    ///
    /// Both offsets move with the text so `text` still equals the slice.
    pub fn trimmed(&self) -> Self {
        let leading = &self.text[..self.text.len() - self.text.trim_start().len()];
        let trimmed = self.text.trim();
        let start = self.start + utf16_len(leading);
        Self {
            start,
            end: start + utf16_len(trimmed),
            text: trimmed.to_string(),
        }
    }
}

/// The rendered text content of a document, as an ordered list of text nodes.
///
/// Mirrors what a renderer shows: the caller splits the raw text into
/// whatever nodes its markup produces, and carets are expressed per node.
#[derive(Debug, Clone)]
pub struct TextContainer<'a> {
    nodes: Vec<&'a str>,
    prefix: Vec<usize>,
}

impl<'a> TextContainer<'a> {
    pub fn new(nodes: impl IntoIterator<Item = &'a str>) -> Self {
        let nodes: Vec<&str> = nodes.into_iter().collect();
        let mut prefix = Vec::with_capacity(nodes.len() + 1);
        let mut total = 0;
        prefix.push(0);
        for node in &nodes {
            total += utf16_len(node);
            prefix.push(total);
        }
        Self { nodes, prefix }
    }

    /// Total length in UTF-16 units.
    pub fn len(&self) -> usize {
        self.prefix.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The concatenated text of every node.
    pub fn text(&self) -> String {
        self.nodes.concat()
    }

    /// Absolute offset of a caret: the length of every preceding node plus
    /// the caret's offset in its own node.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist or the offset exceeds its length.
    pub fn absolute(&self, caret: Caret) -> Result<usize, OffsetError> {
        let node = self.nodes.get(caret.node).ok_or(OffsetError::NoSuchNode {
            node: caret.node,
            len: self.nodes.len(),
        })?;
        byte_index(node, caret.offset)?;
        Ok(self.prefix[caret.node] + caret.offset)
    }

    /// Measures the selection between two carets, in either order.
    ///
    /// # Errors
    ///
    /// Fails if either caret is invalid.
    pub fn measure(&self, anchor: Caret, focus: Caret) -> Result<Selection, OffsetError> {
        let a = self.absolute(anchor)?;
        let b = self.absolute(focus)?;
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let text = self.text();
        let slice = slice_utf16(&text, start..end)?;
        Ok(Selection {
            start,
            end,
            text: slice.to_string(),
        })
    }
}

/// Measures a selection inside a single-node container.
///
/// # Errors
///
/// Fails if either offset is out of bounds or splits a character.
pub fn measure_selection(
    container_text: &str,
    range_start: usize,
    range_end: usize,
) -> Result<Selection, OffsetError> {
    TextContainer::new([container_text]).measure(Caret::new(0, range_start), Caret::new(0, range_end))
}
