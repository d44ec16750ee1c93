//! reader-rs: a self-hosted EPUB reader with persistent highlights.
//!
//! EPUB files are processed once into a directory of sanitized chapter HTML,
//! extracted images and metadata. The server renders those chapters for the
//! browser and restores the reader's highlights on every render.
//!
//! # Features
//!
//! - EPUB processing (metadata, navigation, images, cover detection)
//! - Web reading surface with table of contents
//! - Highlights stored as chapter text offsets, with text-search fallback
//! - Bounded in-memory cache of parsed books
//! - Export of book notes and highlights to a Markdown vault

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Error types.
pub mod error;
/// Book format processing.
pub mod formats;
/// Highlight indexing, storage and restoration.
pub mod highlight;
/// HTML serialization and sanitizing.
pub mod html;
/// Library and book models.
pub mod library;
/// HTTP server.
pub mod server;
/// Notes vault export.
pub mod vault;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use error::{AppError, Result};
pub use server::AppState;
