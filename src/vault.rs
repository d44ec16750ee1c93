//! Notes vault export.
//!
//! Writes one Markdown note per book, with YAML front-matter and the book's
//! highlights quoted in creation order. Existing notes are never touched.

use crate::config::VaultConfig;
use crate::error::{AppError, Result};
use crate::highlight::{Highlight, HighlightStore};
use crate::html;
use crate::library::{Book, BookDir, Library};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Longest title kept in note and image file names.
const MAX_TITLE_LEN: usize = 50;

/// Longest description kept in front-matter.
const MAX_DESCRIPTION_LEN: usize = 300;

static INVALID_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("file name pattern"));

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year pattern"));

/// Make a book title usable as a file name.
pub fn sanitize_title(title: &str) -> String {
    let cleaned = INVALID_FILE_CHARS.replace_all(title, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() <= MAX_TITLE_LEN {
        return cleaned;
    }

    let truncated: String = cleaned.chars().take(MAX_TITLE_LEN).collect();
    match truncated.rsplit_once(' ') {
        Some((head, _)) => head.trim().to_string(),
        None => truncated.trim().to_string(),
    }
}

/// First plausible publication year in a date string.
pub fn published_year(date: &str) -> Option<String> {
    YEAR.find(date).map(|m| m.as_str().to_string())
}

fn yaml_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Markdown note builder.
pub struct NoteBuilder<'a> {
    book: &'a Book,
    created: NaiveDate,
    status: String,
    cover: Option<String>,
    highlights: &'a [Highlight],
}

impl<'a> NoteBuilder<'a> {
    /// Start a note for `book`, dated today.
    pub fn new(book: &'a Book) -> Self {
        Self {
            book,
            created: Utc::now().date_naive(),
            status: "want to read".to_string(),
            cover: None,
            highlights: &[],
        }
    }

    /// Set the creation date.
    pub fn created(mut self, date: NaiveDate) -> Self {
        self.created = date;
        self
    }

    /// Set the reading status.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Reference a cover image stored in the vault.
    pub fn cover(mut self, file_name: impl Into<String>) -> Self {
        self.cover = Some(file_name.into());
        self
    }

    /// Quote these highlights.
    pub fn highlights(mut self, highlights: &'a [Highlight]) -> Self {
        self.highlights = highlights;
        self
    }

    fn description(&self) -> Option<String> {
        let raw = self.book.metadata.description.as_deref()?;
        let text = html::strip_tags(raw);
        if text.is_empty() {
            return None;
        }
        if text.chars().count() > MAX_DESCRIPTION_LEN {
            let head: String = text.chars().take(MAX_DESCRIPTION_LEN - 3).collect();
            return Some(format!("{head}..."));
        }
        Some(text)
    }

    /// Render the note.
    pub fn build(&self) -> String {
        let meta = &self.book.metadata;
        let mut lines = vec![
            "---".to_string(),
            format!("title: {}", yaml_quote(&meta.title)),
            format!("created: {}", self.created.format("%Y-%m-%d")),
        ];

        if let Some(description) = self.description() {
            lines.push(format!("description: {}", yaml_quote(&description)));
        }

        lines.push("tags:".to_string());
        lines.push("  - books".to_string());

        if let Some(cover) = &self.cover {
            lines.push(format!("cover: {}", yaml_quote(&format!("[[{cover}]]"))));
        }

        lines.push("author:".to_string());
        if meta.authors.is_empty() {
            lines.push("  - \"[[Unknown]]\"".to_string());
        }
        for author in &meta.authors {
            lines.push(format!("  - {}", yaml_quote(&format!("[[{author}]]"))));
        }

        lines.push(format!("status: {}", self.status));
        if let Some(year) = meta.date.as_deref().and_then(published_year) {
            lines.push(format!("published: {year}"));
        }
        lines.push("---".to_string());

        if let Some(cover) = &self.cover {
            lines.push(format!("![[{cover}]]"));
        }

        lines.push(String::new());
        lines.push("## notes".to_string());
        lines.push(String::new());

        if !self.highlights.is_empty() {
            lines.push("## highlights".to_string());
            lines.push(String::new());
            for highlight in self.highlights {
                for line in highlight.text.lines() {
                    lines.push(format!("> {}", line.trim_end()).trim_end().to_string());
                }
                lines.push(String::new());
            }
        }

        let mut note = lines.join("\n");
        if !note.ends_with('\n') {
            note.push('\n');
        }
        note
    }
}

/// Result of exporting one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    /// A new note was written.
    Written(PathBuf),
    /// A note already existed and was left alone.
    Skipped(PathBuf),
}

/// Destination vault.
#[derive(Debug, Clone)]
pub struct Vault {
    books_dir: PathBuf,
    images_dir: PathBuf,
    status: String,
}

impl Vault {
    /// Create a vault writing notes to `books_dir` and covers to `images_dir`.
    pub fn new(books_dir: impl Into<PathBuf>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            books_dir: books_dir.into(),
            images_dir: images_dir.into(),
            status: "want to read".to_string(),
        }
    }

    /// Build from configuration; both directories must be set.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let (Some(books_dir), Some(images_dir)) = (&config.books_dir, &config.images_dir) else {
            return Err(AppError::Config(
                "vault.books_dir and vault.images_dir must be set to export".to_string(),
            ));
        };

        Ok(Self {
            books_dir: books_dir.clone(),
            images_dir: images_dir.clone(),
            status: config.status.clone(),
        })
    }

    /// Export one processed book.
    pub fn export_book(&self, dir: &BookDir) -> Result<Export> {
        let book = dir.load_book()?;
        let title = sanitize_title(&book.metadata.title);
        let note_path = self.books_dir.join(format!("{title}.md"));

        if note_path.exists() {
            tracing::info!(note = %note_path.display(), "Note already exists, skipping");
            return Ok(Export::Skipped(note_path));
        }

        let cover = match find_cover(dir, &book) {
            Some(source) => Some(self.copy_cover(&source, &title)?),
            None => {
                tracing::warn!(book = %book.id, "No cover image found");
                None
            }
        };

        let highlights = HighlightStore::for_book(dir).all()?;
        let mut builder = NoteBuilder::new(&book)
            .status(self.status.clone())
            .highlights(&highlights);
        if let Some(cover) = cover {
            builder = builder.cover(cover);
        }

        std::fs::create_dir_all(&self.books_dir)?;
        std::fs::write(&note_path, builder.build())?;
        tracing::info!(
            note = %note_path.display(),
            highlights = highlights.len(),
            "Created note"
        );

        Ok(Export::Written(note_path))
    }

    fn copy_cover(&self, source: &Path, title: &str) -> Result<String> {
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let name = format!("{title}_cover{ext}");
        let dest = self.images_dir.join(&name);

        if dest.exists() {
            tracing::debug!(cover = %dest.display(), "Cover already in vault");
        } else {
            std::fs::create_dir_all(&self.images_dir)?;
            std::fs::copy(source, &dest)?;
            tracing::debug!(cover = %dest.display(), "Copied cover");
        }
        Ok(name)
    }

    /// Export every processed book of the library. Returns `(exported, skipped)`.
    pub fn export_all(&self, library: &Library) -> Result<(usize, usize)> {
        let mut exported = 0;
        let mut skipped = 0;

        for dir in library.list()? {
            match self.export_book(&dir) {
                Ok(Export::Written(_)) => exported += 1,
                Ok(Export::Skipped(_)) => skipped += 1,
                Err(e) => {
                    tracing::error!(book = %dir.id(), error = %e, "Export failed");
                    skipped += 1;
                }
            }
        }

        Ok((exported, skipped))
    }
}

/// The book's detected cover, else any `cover.*` among its images.
pub fn find_cover(dir: &BookDir, book: &Book) -> Option<PathBuf> {
    if let Some(cover) = &book.cover_image {
        let path = dir.path().join(cover);
        if path.is_file() {
            return Some(path);
        }
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir.images_dir())
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().starts_with("cover."))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}
