//! Per-book highlight persistence.
//!
//! Each book keeps its highlights in one JSON array file, in creation order.
//! Every mutation rewrites the whole file through an atomic replace.

use crate::error::{AppError, Result};
use crate::library::{Book, BookDir, Library, atomic_write};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A persisted highlight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Highlight {
    /// Identifier, unique within the book.
    pub id: String,
    /// Chapter the highlight belongs to.
    pub chapter_index: usize,
    /// First highlighted character.
    pub start: usize,
    /// One past the last highlighted character.
    pub end: usize,
    /// Text as captured at creation time.
    pub text: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A highlight about to be created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewHighlight {
    /// Target chapter.
    pub chapter_index: usize,
    /// Start offset.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
    /// Captured text.
    pub text: String,
}

impl NewHighlight {
    /// Check the bounds against the chapter they target.
    pub fn validate(&self, book: &Book) -> Result<()> {
        let chapter = book.chapter(self.chapter_index).ok_or_else(|| {
            AppError::Validation(format!(
                "chapter {} does not exist ({} chapters)",
                self.chapter_index,
                book.chapters.len()
            ))
        })?;

        if self.start >= self.end {
            return Err(AppError::Validation(format!(
                "start ({}) must be before end ({})",
                self.start, self.end
            )));
        }
        if self.end > chapter.plain_text_len {
            return Err(AppError::Validation(format!(
                "end ({}) exceeds chapter length ({})",
                self.end, chapter.plain_text_len
            )));
        }
        Ok(())
    }
}

/// Highlights file of one book.
#[derive(Debug, Clone)]
pub struct HighlightStore {
    path: PathBuf,
}

impl HighlightStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the store of a book directory.
    pub fn for_book(dir: &BookDir) -> Self {
        Self::open(dir.highlights_file())
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every highlight of the book, in creation order.
    pub fn all(&self) -> Result<Vec<Highlight>> {
        match std::fs::read(&self.path) {
            Ok(data) if data.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Highlights of one chapter, in creation order.
    pub fn list(&self, chapter_index: usize) -> Result<Vec<Highlight>> {
        let mut highlights = self.all()?;
        highlights.retain(|h| h.chapter_index == chapter_index);
        Ok(highlights)
    }

    /// Validate and append a highlight. The caller serializes writers.
    pub fn create(&self, book: &Book, new: NewHighlight) -> Result<Highlight> {
        new.validate(book)?;

        let mut highlights = self.all()?;
        let highlight = Highlight {
            id: uuid::Uuid::new_v4().to_string(),
            chapter_index: new.chapter_index,
            start: new.start,
            end: new.end,
            text: new.text,
            created_at: Utc::now(),
        };
        highlights.push(highlight.clone());
        self.persist(&highlights)?;

        Ok(highlight)
    }

    /// Remove a highlight by identifier. The caller serializes writers.
    pub fn delete(&self, id: &str) -> Result<Highlight> {
        let mut highlights = self.all()?;
        let pos = highlights
            .iter()
            .position(|h| h.id == id)
            .ok_or_else(|| AppError::NotFound(format!("highlight {id}")))?;

        let removed = highlights.remove(pos);
        self.persist(&highlights)?;
        Ok(removed)
    }

    fn persist(&self, highlights: &[Highlight]) -> Result<()> {
        let data = serde_json::to_vec_pretty(highlights)?;
        atomic_write(&self.path, &data)
    }
}

/// Highlight service over the whole library.
///
/// Writers on the same book run one at a time; readers never wait.
pub struct Highlights {
    library: Library,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Highlights {
    /// Create the service.
    pub fn new(library: Library) -> Self {
        Self {
            library,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn book_lock(&self, book_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(book_id.to_string()).or_default())
    }

    fn store(&self, book_id: &str) -> Result<(BookDir, HighlightStore)> {
        let dir = self.library.book_dir(book_id)?;
        let store = HighlightStore::for_book(&dir);
        Ok((dir, store))
    }

    /// Highlights of one chapter. Unknown books are `NotFound`.
    pub fn list(&self, book_id: &str, chapter_index: usize) -> Result<Vec<Highlight>> {
        let (_, store) = self.store(book_id)?;
        store.list(chapter_index)
    }

    /// All highlights of a book.
    pub fn all(&self, book_id: &str) -> Result<Vec<Highlight>> {
        let (_, store) = self.store(book_id)?;
        store.all()
    }

    /// Create a highlight on `book`.
    pub fn create(&self, book: &Book, new: NewHighlight) -> Result<Highlight> {
        let (dir, store) = self.store(&book.id)?;
        let lock = self.book_lock(dir.id());
        let _guard = lock.lock();

        let highlight = store.create(book, new)?;
        tracing::info!(
            book = %dir.id(),
            highlight = %highlight.id,
            chapter = highlight.chapter_index,
            start = highlight.start,
            end = highlight.end,
            "Highlight created"
        );
        Ok(highlight)
    }

    /// Delete a highlight of a book.
    pub fn delete(&self, book_id: &str, highlight_id: &str) -> Result<Highlight> {
        let (dir, store) = self.store(book_id)?;
        let lock = self.book_lock(dir.id());
        let _guard = lock.lock();

        let removed = store.delete(highlight_id)?;
        tracing::info!(book = %dir.id(), highlight = %removed.id, "Highlight deleted");
        Ok(removed)
    }
}
