use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Self-hosted EPUB reader with persistent highlights.
#[derive(Parser, Debug, Clone)]
#[command(name = "reader-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "READER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Directory holding processed books (overrides the config file).
        #[arg(short, long)]
        library: Option<PathBuf>,
    },

    /// Process a single EPUB into `<stem>_data` next to it.
    Process {
        /// Path to the EPUB file.
        epub: PathBuf,
    },

    /// Process every EPUB in a directory that has not been processed yet.
    ProcessAll {
        /// Directory to scan (defaults to the current directory).
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Export one processed book to the notes vault.
    Export {
        /// Path to the book's `_data` directory.
        book_dir: PathBuf,
    },

    /// Export every processed book in the library to the notes vault.
    ExportAll,

    /// Strip trailing metadata (" -- Author -- ...") from book file names.
    Tidy {
        /// Directory to tidy (defaults to the current directory).
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Actually rename; without this flag only prints the plan.
        #[arg(long)]
        apply: bool,
    },

    /// Create a default config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Library configuration.
    #[serde(default)]
    pub library: LibraryConfig,

    /// Notes vault export configuration.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Highlight rendering configuration.
    #[serde(default)]
    pub highlights: HighlightsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Title shown on the library page.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8123,
    )
}

fn default_title() -> String {
    "Reader".to_string()
}

/// Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directory holding the processed `*_data` book directories.
    #[serde(default = "default_library_dir")]
    pub dir: PathBuf,

    /// Drop folder for new EPUBs, processed when the server starts.
    #[serde(default = "default_inbox")]
    pub inbox: PathBuf,

    /// Number of parsed books kept in memory.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            dir: default_library_dir(),
            inbox: default_inbox(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_library_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_inbox() -> PathBuf {
    PathBuf::from("books")
}

fn default_cache_capacity() -> usize {
    10
}

/// Notes vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Directory receiving one note per book.
    #[serde(default)]
    pub books_dir: Option<PathBuf>,

    /// Directory receiving cover images.
    #[serde(default)]
    pub images_dir: Option<PathBuf>,

    /// Reading status written to new notes.
    #[serde(default = "default_status")]
    pub status: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            books_dir: None,
            images_dir: None,
            status: default_status(),
        }
    }
}

fn default_status() -> String {
    "want to read".to_string()
}

/// Highlight rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightsConfig {
    /// CSS class put on every highlight marker.
    #[serde(default = "default_marker_class")]
    pub marker_class: String,
}

impl Default for HighlightsConfig {
    fn default() -> Self {
        Self {
            marker_class: default_marker_class(),
        }
    }
}

fn default_marker_class() -> String {
    "highlight".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("reader-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("reader-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/reader-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# reader-rs configuration

[server]
bind = "0.0.0.0:8123"
title = "Reader"

[library]
# Where processed books (*_data directories) live
dir = "."
# EPUBs dropped here are processed when the server starts
inbox = "books"
# Parsed books kept in memory
cache_capacity = 10

[vault]
# books_dir = "/home/me/Notes/books"
# images_dir = "/home/me/Notes/Images"
status = "want to read"

[highlights]
marker_class = "highlight"
"#
        .to_string()
    }
}
