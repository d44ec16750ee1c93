//! reader-rs entry point.

use clap::Parser;
use reader_rs::{
    config::{Cli, Command, Config},
    formats, library,
    library::{BookDir, Library},
    server,
    vault::{Export, Vault},
};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reader_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        tracing::debug!(config = %path.display(), "Loading config");
        Config::load(path)?
    } else {
        Config::default()
    };

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::Process { epub }) => cmd_process(&epub),
        Some(Command::ProcessAll { dir }) => cmd_process_all(&dir),
        Some(Command::Export { book_dir }) => cmd_export(&config, &book_dir),
        Some(Command::ExportAll) => cmd_export_all(&config),
        Some(Command::Tidy { dir, apply }) => cmd_tidy(&dir, apply),
        Some(Command::Serve { bind, library }) => cmd_serve(config, bind, library).await,
        None => {
            // Default: start server
            cmd_serve(config, None, None).await
        }
    }
}

/// Write a default config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());
    println!("\nEdit config.toml to configure your server.");
    println!("Then run: reader-rs serve");

    Ok(())
}

/// Process one EPUB next to itself.
fn cmd_process(epub: &Path) -> anyhow::Result<()> {
    if !epub.is_file() {
        anyhow::bail!("File not found: {}", epub.display());
    }

    let root = epub.parent().unwrap_or(Path::new("."));
    let book = formats::process(epub, root)?;

    println!("Title:    {}", book.metadata.title);
    println!("Authors:  {}", book.authors_display());
    println!("Chapters: {}", book.chapters.len());
    println!("TOC:      {} root entries", book.toc.len());
    println!("Cover:    {}", book.cover_image.as_deref().unwrap_or("none"));
    println!("Output:   {}", root.join(&book.id).display());

    Ok(())
}

/// Process every unprocessed EPUB of a directory.
fn cmd_process_all(dir: &Path) -> anyhow::Result<()> {
    let report = formats::process_all(dir, dir)?;
    println!(
        "Summary: {} processed, {} skipped, {} failed",
        report.processed, report.skipped, report.failed
    );
    Ok(())
}

/// Export one book to the vault.
fn cmd_export(config: &Config, book_dir: &Path) -> anyhow::Result<()> {
    let vault = Vault::from_config(&config.vault)?;
    let dir = BookDir::at(book_dir);
    if !dir.is_processed() {
        anyhow::bail!("Not a processed book: {}", book_dir.display());
    }

    match vault.export_book(&dir)? {
        Export::Written(note) => println!("Created note: {}", note.display()),
        Export::Skipped(note) => println!("Skipping: note already exists at {}", note.display()),
    }
    Ok(())
}

/// Export every processed book to the vault.
fn cmd_export_all(config: &Config) -> anyhow::Result<()> {
    let vault = Vault::from_config(&config.vault)?;
    let library = Library::new(&config.library.dir);

    let (exported, skipped) = vault.export_all(&library)?;
    println!("Summary: {exported} exported, {skipped} skipped");
    Ok(())
}

/// Clean up library entry names.
fn cmd_tidy(dir: &Path, apply: bool) -> anyhow::Result<()> {
    let renames = library::tidy(dir, apply)?;

    if renames.is_empty() {
        println!("Nothing to rename.");
        return Ok(());
    }

    for rename in &renames {
        let from = rename.from.file_name().unwrap_or_default().to_string_lossy();
        let to = rename.to.file_name().unwrap_or_default().to_string_lossy();
        println!("{from}\n  -> {to}");
    }

    if apply {
        println!("\nRenamed {} entries.", renames.len());
    } else {
        println!("\n{} entries would be renamed. Run with --apply to rename.", renames.len());
    }
    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    library: Option<PathBuf>,
) -> anyhow::Result<()> {
    // Override bind address if specified
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if let Some(dir) = library {
        config.library.dir = dir;
    }

    tracing::info!(
        bind = %config.server.bind,
        library = %config.library.dir.display(),
        "Starting reader-rs server"
    );

    let state = server::AppState::new(config.clone());

    // New EPUBs in the inbox are processed before serving
    if let Err(e) = state.process_inbox() {
        tracing::warn!(error = %e, "Failed to process inbox");
    }

    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
