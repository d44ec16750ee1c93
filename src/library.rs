//! On-disk library of processed books.
//!
//! Every processed book lives in its own `<stem>_data` directory holding the
//! serialized [`Book`], the highlights file and the extracted images. The
//! directory name is the book identifier.

pub mod book;
pub mod cache;

pub use book::{Book, BookMetadata, BookSummary, Chapter, ChapterSummary, TocEntry};
pub use cache::BookCache;

use crate::error::{AppError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Suffix of processed book directories.
pub const DATA_SUFFIX: &str = "_data";
/// Serialized book inside a book directory.
pub const BOOK_FILE: &str = "book.json";
/// Highlight records inside a book directory.
pub const HIGHLIGHTS_FILE: &str = "highlights.json";
/// Extracted images inside a book directory.
pub const IMAGES_DIR: &str = "images";

/// Separator introduced by download tools between title and metadata.
const NAME_NOISE: &str = " -- ";

/// Root directory holding processed books.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    /// Create a library rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Library root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a book identifier to its directory.
    ///
    /// Fails with `NotFound` unless the directory holds a processed book.
    pub fn book_dir(&self, id: &str) -> Result<BookDir> {
        let name = path_component(id).ok_or_else(|| AppError::NotFound(format!("book {id}")))?;
        let dir = BookDir::at(self.root.join(name));

        if !dir.book_file().is_file() {
            return Err(AppError::NotFound(format!("book {name}")));
        }
        Ok(dir)
    }

    /// All processed books, sorted by identifier.
    pub fn list(&self) -> Result<Vec<BookDir>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut dirs: Vec<BookDir> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(DATA_SUFFIX))
            .map(|entry| BookDir::at(entry.path()))
            .filter(|dir| dir.book_file().is_file())
            .collect();

        dirs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(dirs)
    }

    /// Load every processed book, skipping unreadable ones.
    pub fn books(&self) -> Result<Vec<Book>> {
        let books = self
            .list()?
            .into_iter()
            .filter_map(|dir| match dir.load_book() {
                Ok(book) => Some(book),
                Err(e) => {
                    tracing::warn!(book = %dir.id(), error = %e, "Skipping unreadable book");
                    None
                }
            })
            .collect();
        Ok(books)
    }
}

/// One processed book's directory.
#[derive(Debug, Clone)]
pub struct BookDir {
    id: String,
    path: PathBuf,
}

impl BookDir {
    /// Wrap a directory; the identifier is its final path component.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { id, path }
    }

    /// Output directory for an EPUB: `<stem>_data` under `root`.
    pub fn for_epub(epub: &Path, root: &Path) -> Self {
        let stem = epub
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "book".to_string());
        Self::at(root.join(format!("{stem}{DATA_SUFFIX}")))
    }

    /// Book identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the serialized book.
    pub fn book_file(&self) -> PathBuf {
        self.path.join(BOOK_FILE)
    }

    /// Path of the highlights file.
    pub fn highlights_file(&self) -> PathBuf {
        self.path.join(HIGHLIGHTS_FILE)
    }

    /// Path of the images directory.
    pub fn images_dir(&self) -> PathBuf {
        self.path.join(IMAGES_DIR)
    }

    /// Whether the directory holds a processed book.
    pub fn is_processed(&self) -> bool {
        self.book_file().is_file()
    }

    /// Read the serialized book.
    pub fn load_book(&self) -> Result<Book> {
        let data = std::fs::read(self.book_file()).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound(format!("book {}", self.id)),
            _ => AppError::Io(e),
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write the serialized book.
    pub fn save_book(&self, book: &Book) -> Result<()> {
        let data = serde_json::to_vec(book)?;
        atomic_write(&self.book_file(), &data)
    }
}

/// Replace `path` with `content` so readers see either the old or the new file.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Reduce untrusted input to a single path component.
pub fn path_component(raw: &str) -> Option<&str> {
    let name = Path::new(raw).file_name()?.to_str()?;
    (!name.is_empty()).then_some(name)
}

/// Strip download-tool metadata from a library entry name.
///
/// `Title -- Author -- 2019 -- Publisher.epub` becomes `Title.epub`; the
/// `_data` and `.sdr` suffixes are kept the same way. Returns `None` when the
/// name is already clean.
pub fn clean_name(name: &str) -> Option<String> {
    let suffix = [".epub", DATA_SUFFIX, ".sdr"]
        .into_iter()
        .find(|s| name.ends_with(s))?;

    let (title, _) = name.split_once(NAME_NOISE)?;
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    Some(format!("{title}{suffix}"))
}

/// Planned or performed rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    /// Current path.
    pub from: PathBuf,
    /// Cleaned path.
    pub to: PathBuf,
    /// Whether the rename happened.
    pub applied: bool,
}

/// Clean up entry names in `dir`. Without `apply` nothing is renamed.
///
/// Existing targets are never overwritten.
pub fn tidy(dir: &Path, apply: bool) -> Result<Vec<Rename>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    let mut renames = Vec::new();
    for from in entries {
        let Some(name) = from.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(cleaned) = clean_name(name) else {
            continue;
        };

        let to = dir.join(&cleaned);
        if to.exists() {
            tracing::warn!(from = %from.display(), to = %to.display(), "Target exists, skipping");
            continue;
        }

        let applied = if apply {
            std::fs::rename(&from, &to)?;
            tracing::info!(from = %name, to = %cleaned, "Renamed");
            true
        } else {
            false
        };

        renames.push(Rename { from, to, applied });
    }

    Ok(renames)
}
