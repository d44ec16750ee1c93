//! Processed book model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version written into every processed book.
pub const BOOK_FORMAT_VERSION: &str = "3.0";

/// Descriptive metadata from the OPF package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookMetadata {
    /// Book title.
    pub title: String,

    /// Authors in package order (may be empty).
    pub authors: Vec<String>,

    /// Language code (e.g., "en", "fr").
    pub language: String,

    /// Publisher name.
    pub publisher: Option<String>,

    /// Publication date, as written in the package.
    pub date: Option<String>,

    /// Book description (may contain HTML).
    pub description: Option<String>,

    /// Identifiers keyed by scheme (ISBN, UUID, ...).
    pub identifiers: BTreeMap<String, String>,

    /// Subject/genre tags.
    pub subjects: Vec<String>,
}

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            authors: Vec::new(),
            language: "en".to_string(),
            publisher: None,
            date: None,
            description: None,
            identifiers: BTreeMap::new(),
            subjects: Vec::new(),
        }
    }
}

/// One spine document, sanitized and ready to serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Position in reading order, starting at 0.
    pub index: usize,

    /// Path of the source document inside the container.
    pub href: String,

    /// Display title.
    pub title: String,

    /// Sanitized body HTML with rewritten image paths.
    pub content: String,

    /// Length of the chapter's flattened text; upper bound for highlight offsets.
    pub plain_text_len: usize,
}

/// Navigation tree entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TocEntry {
    /// Entry label.
    pub title: String,

    /// Original target (e.g. `part01.html#chapter1`).
    pub href: String,

    /// Target document without the fragment.
    pub file_href: String,

    /// Fragment identifier, empty if none.
    pub anchor: String,

    /// Nested entries.
    #[serde(default)]
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    /// Create an entry from a container href.
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        let href = href.into();
        let (file_href, anchor) = match href.split_once('#') {
            Some((file, anchor)) => (file.to_string(), anchor.to_string()),
            None => (href.clone(), String::new()),
        };

        Self {
            title: title.into(),
            href,
            file_href,
            anchor,
            children: Vec::new(),
        }
    }

    /// First entry targeting `file_href`, depth first.
    pub fn find<'a>(entries: &'a [TocEntry], file_href: &str) -> Option<&'a TocEntry> {
        entries.iter().find_map(|entry| {
            if entry.file_href == file_href {
                Some(entry)
            } else {
                Self::find(&entry.children, file_href)
            }
        })
    }
}

/// A processed book. Immutable once written; reprocessing replaces it whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Identifier, equal to the book's directory name.
    pub id: String,

    /// Package metadata.
    pub metadata: BookMetadata,

    /// Chapters in reading order.
    pub chapters: Vec<Chapter>,

    /// Navigation tree.
    pub toc: Vec<TocEntry>,

    /// Container image path (and bare file name) to local `images/...` path.
    pub images: BTreeMap<String, String>,

    /// Relative path of the cover image, if one was detected.
    pub cover_image: Option<String>,

    /// File name of the source EPUB.
    pub source_file: String,

    /// When the book was processed.
    pub processed_at: DateTime<Utc>,

    /// Processing format version.
    pub version: String,
}

impl Book {
    /// Get a chapter by index.
    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    /// Get display name for authors.
    pub fn authors_display(&self) -> String {
        if self.metadata.authors.is_empty() {
            "Unknown Author".to_string()
        } else {
            self.metadata.authors.join(", ")
        }
    }

    /// Chapter holding a container document.
    pub fn chapter_for(&self, file_href: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.href == file_href)
    }

    /// Metadata view without chapter content.
    pub fn summary(&self) -> BookSummary {
        BookSummary {
            id: self.id.clone(),
            metadata: self.metadata.clone(),
            chapters: self
                .chapters
                .iter()
                .map(|c| ChapterSummary {
                    index: c.index,
                    title: c.title.clone(),
                    plain_text_len: c.plain_text_len,
                })
                .collect(),
            toc: self.toc.clone(),
            cover_image: self.cover_image.clone(),
            processed_at: self.processed_at,
        }
    }
}

/// Book metadata as returned by the JSON API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSummary {
    /// Identifier.
    pub id: String,
    /// Package metadata.
    pub metadata: BookMetadata,
    /// Chapters without their content.
    pub chapters: Vec<ChapterSummary>,
    /// Navigation tree.
    pub toc: Vec<TocEntry>,
    /// Relative cover path.
    pub cover_image: Option<String>,
    /// Processing time.
    pub processed_at: DateTime<Utc>,
}

/// Chapter listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSummary {
    /// Position in reading order.
    pub index: usize,
    /// Display title.
    pub title: String,
    /// Flattened text length.
    pub plain_text_len: usize,
}
