//! Source format processing.

pub mod epub;

pub use epub::process_epub;

use crate::error::Result;
use crate::library::{Book, BookDir};
use std::path::Path;

/// Outcome of a batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Books processed in this run.
    pub processed: usize,
    /// Books already processed, left alone.
    pub skipped: usize,
    /// Books that failed to process.
    pub failed: usize,
}

/// Process one EPUB into `<stem>_data` under `library_root`.
pub fn process(epub: &Path, library_root: &Path) -> Result<Book> {
    let dir = BookDir::for_epub(epub, library_root);
    process_epub(epub, dir.path())
}

/// Process every EPUB in `source_dir` that has no processed book under
/// `library_root` yet. Books are processed one at a time, in name order.
pub fn process_all(source_dir: &Path, library_root: &Path) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    if !source_dir.is_dir() {
        tracing::debug!(dir = %source_dir.display(), "No EPUB folder");
        return Ok(report);
    }

    let epubs = walkdir::WalkDir::new(source_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
        });

    for entry in epubs {
        let epub = entry.path();
        if BookDir::for_epub(epub, library_root).is_processed() {
            tracing::debug!(epub = %epub.display(), "Already processed, skipping");
            report.skipped += 1;
            continue;
        }

        match process(epub, library_root) {
            Ok(_) => report.processed += 1,
            Err(e) => {
                tracing::error!(epub = %epub.display(), error = %e, "Failed to process EPUB");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        "Batch processing complete"
    );
    Ok(report)
}
