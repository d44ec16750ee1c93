//! Bounded in-memory cache of parsed books.

use super::{Book, Library, path_component};
use crate::error::{AppError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Least-recently-used cache of parsed books, keyed by book identifier.
///
/// Cached books are shared read-only. The server only processes books that are
/// not in the library yet, so a cached entry never goes stale.
pub struct BookCache {
    books: Mutex<LruCache<String, Arc<Book>>>,
}

impl BookCache {
    /// Create a cache holding at most `capacity` books (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            books: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a book, loading it from the library on a miss.
    pub fn get_or_load(&self, library: &Library, id: &str) -> Result<Arc<Book>> {
        let key = path_component(id).ok_or_else(|| AppError::NotFound(format!("book {id}")))?;
        if let Some(book) = self.books.lock().get(key) {
            return Ok(Arc::clone(book));
        }

        // Loaded outside the lock; a concurrent miss may load the same book twice.
        let dir = library.book_dir(key)?;
        let book = Arc::new(dir.load_book()?);
        tracing::debug!(book = %dir.id(), chapters = book.chapters.len(), "Loaded book");

        self.books
            .lock()
            .put(dir.id().to_string(), Arc::clone(&book));
        Ok(book)
    }
}
