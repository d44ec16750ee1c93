//! Restores stored highlights onto a chapter fragment.
//!
//! All spans are resolved against one immutable [`OffsetIndex`] and the output
//! is written in a single serialization pass, so wrapping one highlight never
//! shifts the offsets of another.

use super::offsets::{OffsetIndex, char_to_byte};
use super::store::Highlight;
use crate::html::{self, Rewriter};
use scraper::node::Element;

/// Parents whose content model has no room for a phrasing element.
const NO_WRAP_PARENTS: &[&str] = &[
    "table", "thead", "tbody", "tfoot", "tr", "colgroup", "select", "optgroup", "datalist",
];

/// How a highlight was placed in a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restoration {
    /// Stored offsets resolved against the current document.
    Offsets,
    /// Offsets did not resolve; captured text found by search.
    TextSearch,
    /// Neither path succeeded; the highlight is absent from this render.
    Missed,
}

/// Chapter HTML with markers inserted, plus the per-highlight outcome.
#[derive(Debug, Clone)]
pub struct AppliedChapter {
    /// Rendered fragment.
    pub html: String,
    /// `(highlight id, outcome)` in creation order.
    pub outcomes: Vec<(String, Restoration)>,
}

impl AppliedChapter {
    /// Number of highlights that made it into the render.
    pub fn restored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, r)| *r != Restoration::Missed)
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct Span<'h> {
    start: usize,
    end: usize,
    order: usize,
    id: &'h str,
}

/// Wraps highlight spans in `<mark>` markers.
#[derive(Debug, Clone)]
pub struct HighlightApplier {
    marker_class: String,
}

impl Default for HighlightApplier {
    fn default() -> Self {
        Self::new("highlight")
    }
}

impl HighlightApplier {
    /// Create an applier emitting markers with the given CSS class.
    pub fn new(marker_class: impl Into<String>) -> Self {
        Self {
            marker_class: marker_class.into(),
        }
    }

    /// Apply `highlights` (one chapter's records, creation order) to `content`.
    pub fn apply(&self, content: &str, highlights: &[Highlight]) -> AppliedChapter {
        if highlights.is_empty() {
            return AppliedChapter {
                html: content.to_string(),
                outcomes: Vec::new(),
            };
        }

        let fragment = html::parse_fragment(content);
        let index = OffsetIndex::from_fragment(&fragment);

        let mut spans = Vec::with_capacity(highlights.len());
        let mut outcomes = Vec::with_capacity(highlights.len());

        for (order, highlight) in highlights.iter().enumerate() {
            let outcome = match resolve(&index, highlight) {
                Some((start, end, how)) => {
                    spans.push(Span {
                        start,
                        end,
                        order,
                        id: &highlight.id,
                    });
                    how
                }
                None => {
                    tracing::warn!(
                        highlight = %highlight.id,
                        chapter = highlight.chapter_index,
                        start = highlight.start,
                        end = highlight.end,
                        "Highlight could not be restored, skipping"
                    );
                    Restoration::Missed
                }
            };
            outcomes.push((highlight.id.clone(), outcome));
        }

        spans.sort_by_key(|s| (s.start, s.order));

        let mut marker = MarkRewriter {
            index: &index,
            spans: &spans,
            class: &self.marker_class,
            node: 0,
        };
        let html = html::serialize_children(fragment.root_element(), &mut marker);

        tracing::debug!(
            highlights = highlights.len(),
            placed = spans.len(),
            "Applied highlights"
        );

        AppliedChapter { html, outcomes }
    }
}

/// Stored offsets first, then the first verbatim occurrence of the captured text.
fn resolve(index: &OffsetIndex, highlight: &Highlight) -> Option<(usize, usize, Restoration)> {
    if highlight.start < highlight.end
        && index.locate(highlight.start).is_some()
        && index.locate_end(highlight.end).is_some()
    {
        return Some((highlight.start, highlight.end, Restoration::Offsets));
    }

    index
        .find_text(&highlight.text)
        .map(|(start, end)| (start, end, Restoration::TextSearch))
}

struct MarkRewriter<'a, 'h> {
    index: &'a OffsetIndex,
    spans: &'a [Span<'h>],
    class: &'a str,
    node: usize,
}

impl MarkRewriter<'_, '_> {
    fn open(&self, span: &Span<'_>, out: &mut String) {
        out.push_str("<mark class=\"");
        html::escape_attribute(self.class, out);
        out.push_str("\" data-highlight-id=\"");
        html::escape_attribute(span.id, out);
        out.push_str("\">");
    }
}

impl Rewriter for MarkRewriter<'_, '_> {
    fn text(&mut self, parent: &Element, text: &str, out: &mut String) {
        let segment = self.index.segments().get(self.node).cloned();
        self.node += 1;

        let Some(segment) = segment else {
            html::write_text(parent, text, out);
            return;
        };

        let (from, to) = (segment.start, segment.end());
        let touching: Vec<&Span<'_>> = self
            .spans
            .iter()
            .take_while(|s| s.start < to)
            .filter(|s| s.end > from)
            .collect();

        if touching.is_empty()
            || NO_WRAP_PARENTS.contains(&parent.name())
            || html::is_text_only(parent)
        {
            html::write_text(parent, text, out);
            return;
        }

        let mut cuts = vec![from, to];
        for span in &touching {
            cuts.extend([span.start, span.end].into_iter().filter(|c| *c > from && *c < to));
        }
        cuts.sort_unstable();
        cuts.dedup();

        for piece in cuts.windows(2) {
            let (a, b) = (piece[0], piece[1]);
            let bytes = char_to_byte(text, a - from)..char_to_byte(text, b - from);
            let Some(chunk) = text.get(bytes) else {
                continue;
            };

            let mut active: Vec<&Span<'_>> = touching
                .iter()
                .copied()
                .filter(|s| s.start <= a && s.end >= b)
                .collect();
            active.sort_by_key(|s| s.order);

            for span in &active {
                self.open(span, out);
            }
            html::write_text(parent, chunk, out);
            for _ in &active {
                out.push_str("</mark>");
            }
        }
    }
}
