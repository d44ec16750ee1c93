//! Highlights: offset indexing, persistence, restoration and capture.
//!
//! A highlight is stored as a `(chapter, start, end, text)` record whose
//! offsets count characters over the chapter's flattened text. Rendering
//! re-derives the marker placement from those offsets, falling back to a search
//! for the captured text when the offsets no longer resolve.

pub mod applier;
pub mod offsets;
pub mod selection;
pub mod store;

pub use applier::{AppliedChapter, HighlightApplier, Restoration};
pub use offsets::{OffsetIndex, Position, TextNodeId};
pub use selection::{CLIENT_SCRIPT, CapturedSelection, capture};
pub use store::{Highlight, HighlightStore, Highlights, NewHighlight};
