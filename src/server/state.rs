//! Application state shared across handlers.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::formats::{self, BatchReport};
use crate::highlight::{AppliedChapter, HighlightApplier, Highlights};
use crate::library::{Book, BookCache, Library};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Processed books on disk.
    pub library: Library,
    /// Highlight persistence.
    pub highlights: Arc<Highlights>,
    /// Parsed books, least recently used evicted first.
    books: Arc<BookCache>,
    /// Marker insertion for rendered chapters.
    applier: Arc<HighlightApplier>,
}

/// A chapter ready to be rendered.
pub struct RenderedChapter {
    /// Book the chapter belongs to.
    pub book: Arc<Book>,
    /// Chapter index.
    pub index: usize,
    /// Chapter HTML with highlights applied.
    pub applied: AppliedChapter,
}

impl AppState {
    /// Create state for a configuration.
    pub fn new(config: Config) -> Self {
        let library = Library::new(&config.library.dir);
        let books = BookCache::new(config.library.cache_capacity);
        let applier = HighlightApplier::new(config.highlights.marker_class.clone());

        Self {
            highlights: Arc::new(Highlights::new(library.clone())),
            library,
            books: Arc::new(books),
            applier: Arc::new(applier),
            config: Arc::new(config),
        }
    }

    /// Get a book, through the cache.
    pub fn book(&self, id: &str) -> Result<Arc<Book>> {
        self.books.get_or_load(&self.library, id)
    }

    /// Load a chapter and restore its highlights.
    pub fn render_chapter(&self, book_id: &str, index: usize) -> Result<RenderedChapter> {
        let book = self.book(book_id)?;
        let chapter = book.chapter(index).ok_or_else(|| {
            AppError::NotFound(format!("chapter {index} of {}", book.id))
        })?;

        let highlights = self.highlights.list(&book.id, index)?;
        let applied = self.applier.apply(&chapter.content, &highlights);

        if applied.restored() < highlights.len() {
            tracing::warn!(
                book = %book.id,
                chapter = index,
                stored = highlights.len(),
                restored = applied.restored(),
                "Some highlights were not restored"
            );
        }

        Ok(RenderedChapter {
            book,
            index,
            applied,
        })
    }

    /// Process new EPUBs from the inbox into the library.
    pub fn process_inbox(&self) -> Result<BatchReport> {
        let report = formats::process_all(&self.config.library.inbox, self.library.root())?;
        Ok(report)
    }
}
