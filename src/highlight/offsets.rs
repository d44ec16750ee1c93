//! Flat character offsets over a chapter's text nodes.
//!
//! Offsets count Unicode scalar values over the concatenation of every text
//! node of the fragment, depth-first pre-order. Elements contribute nothing,
//! so highlight markers already present in a document are transparent.

use scraper::{ElementRef, Html};

/// Ordinal of a text node in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextNodeId(pub usize);

/// A position inside a specific text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Text node holding the position.
    pub node: TextNodeId,
    /// Character offset inside that node, `0..=len`.
    pub offset: usize,
}

/// One text node's share of the flat text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Text node ordinal.
    pub node: TextNodeId,
    /// Global offset of the node's first character.
    pub start: usize,
    /// Length in characters.
    pub len: usize,
    byte_start: usize,
}

impl Segment {
    /// Global offset one past the node's last character.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Offset index of one chapter document.
#[derive(Debug, Clone, Default)]
pub struct OffsetIndex {
    segments: Vec<Segment>,
    text: String,
}

impl OffsetIndex {
    /// Index every text node below `root`.
    pub fn build(root: ElementRef<'_>) -> Self {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut offset = 0;

        let runs = root.descendants().filter_map(|node| node.value().as_text());
        for (ordinal, run) in runs.enumerate() {
            let len = run.chars().count();
            segments.push(Segment {
                node: TextNodeId(ordinal),
                start: offset,
                len,
                byte_start: text.len(),
            });
            text.push_str(run);
            offset += len;
        }

        Self { segments, text }
    }

    /// Index an already parsed fragment.
    pub fn from_fragment(fragment: &Html) -> Self {
        Self::build(fragment.root_element())
    }

    /// Parse and index a stored chapter fragment.
    pub fn from_html(content: &str) -> Self {
        Self::from_fragment(&crate::html::parse_fragment(content))
    }

    /// Total length in characters.
    pub fn total_len(&self) -> usize {
        self.segments.last().map(Segment::end).unwrap_or(0)
    }

    /// The flattened text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text node segments in document order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve a global offset to the text node that starts at or contains it.
    ///
    /// `total_len()` resolves to the end of the last text node. Offsets past
    /// the end, or any offset in a document without text, give `None`.
    pub fn locate(&self, offset: usize) -> Option<Position> {
        let last = self.segments.last()?;
        if offset > last.end() {
            return None;
        }
        if offset == last.end() {
            return Some(Position {
                node: last.node,
                offset: last.len,
            });
        }

        let idx = self.segments.partition_point(|s| s.end() <= offset);
        let segment = self.segments.get(idx)?;
        Some(Position {
            node: segment.node,
            offset: offset - segment.start,
        })
    }

    /// Resolve an exclusive end offset, preferring the end of the preceding
    /// node over the start of the next one.
    pub fn locate_end(&self, offset: usize) -> Option<Position> {
        if offset == 0 {
            return self.locate(0);
        }
        if offset > self.total_len() {
            return None;
        }

        let idx = self.segments.partition_point(|s| s.end() < offset);
        let segment = self.segments.get(idx)?;
        Some(Position {
            node: segment.node,
            offset: offset - segment.start,
        })
    }

    /// Inverse of [`locate`](Self::locate): global offset of a node position.
    pub fn offset_of(&self, position: Position) -> Option<usize> {
        let segment = self.segments.get(position.node.0)?;
        (position.offset <= segment.len).then_some(segment.start + position.offset)
    }

    /// Text between two global offsets.
    pub fn slice(&self, start: usize, end: usize) -> Option<&str> {
        if start > end || end > self.total_len() {
            return None;
        }
        let from = self.byte_offset(start)?;
        let to = self.byte_offset(end)?;
        self.text.get(from..to)
    }

    /// First occurrence of `needle` in the flattened text, as `(start, end)`.
    pub fn find_text(&self, needle: &str) -> Option<(usize, usize)> {
        if needle.is_empty() {
            return None;
        }
        let byte = self.text.find(needle)?;
        let start = self.text[..byte].chars().count();
        Some((start, start + needle.chars().count()))
    }

    /// Raw text of one segment.
    pub fn run(&self, node: TextNodeId) -> Option<&str> {
        let segment = self.segments.get(node.0)?;
        let end = self
            .segments
            .get(node.0 + 1)
            .map(|next| next.byte_start)
            .unwrap_or(self.text.len());
        self.text.get(segment.byte_start..end)
    }

    fn byte_offset(&self, offset: usize) -> Option<usize> {
        let position = self.locate(offset)?;
        let segment = self.segments.get(position.node.0)?;
        let run = self.run(position.node)?;
        Some(segment.byte_start + char_to_byte(run, position.offset))
    }
}

/// Byte index of the `chars`-th character of `text` (or its length).
pub fn char_to_byte(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}
