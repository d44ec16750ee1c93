//! Selection capture.
//!
//! The browser half lives in `reader.js`: it walks the rendered chapter's text
//! nodes in the same order as [`OffsetIndex`], so marker elements inserted by
//! the applier are transparent to it. [`capture`] is the same computation over
//! a server-side index.

use super::offsets::{OffsetIndex, Position};
use super::store::NewHighlight;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Script served to the reading page.
pub const CLIENT_SCRIPT: &str = include_str!("reader.js");

/// A selection translated to chapter offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedSelection {
    /// Chapter the selection was made in.
    pub chapter_index: usize,
    /// Start offset.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
    /// Selected text, taken from the flattened chapter text.
    pub text: String,
}

/// Translate a selection between two node positions into chapter offsets.
///
/// Anchor and focus may come in either order. Empty and whitespace-only
/// selections are rejected.
pub fn capture(
    index: &OffsetIndex,
    chapter_index: usize,
    anchor: Position,
    focus: Position,
) -> Result<CapturedSelection> {
    let invalid = || AppError::Validation("selection is outside the chapter".to_string());
    let a = index.offset_of(anchor).ok_or_else(invalid)?;
    let b = index.offset_of(focus).ok_or_else(invalid)?;
    let (start, end) = if a <= b { (a, b) } else { (b, a) };

    let text = index.slice(start, end).ok_or_else(invalid)?;
    if text.trim().is_empty() {
        return Err(AppError::Validation("empty selection".to_string()));
    }

    Ok(CapturedSelection {
        chapter_index,
        start,
        end,
        text: text.to_string(),
    })
}

impl From<CapturedSelection> for NewHighlight {
    fn from(selection: CapturedSelection) -> Self {
        Self {
            chapter_index: selection.chapter_index,
            start: selection.start,
            end: selection.end,
            text: selection.text,
        }
    }
}
