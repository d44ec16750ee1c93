//! HTTP request handlers.

use super::pages;
use crate::error::{AppError, Result};
use crate::highlight::{CLIENT_SCRIPT, Highlight, NewHighlight};
use crate::library::{self, BookSummary};
use crate::server::AppState;
use crate::vault;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

/// Build a response, returning 500 on error (which shouldn't happen).
fn build_response(status: StatusCode, content_type: &str, body: impl Into<Body>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Internal error"))
                .unwrap_or_default()
        })
}

fn image_mime(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// Stream a file from disk.
async fn serve_file(path: &std::path::Path) -> Result<Response<Body>> {
    let file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound(path.display().to_string()),
        _ => AppError::Io(e),
    })?;
    let stream = ReaderStream::new(file);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, image_mime(path))
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| Response::default()))
}

// ============================================================================
// WEB PAGES
// ============================================================================

/// Library page.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    let books = state.library.books()?;
    Ok(Html(pages::library_page(&state.config.server.title, &books)))
}

/// Start reading a book at its first chapter.
pub async fn read_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Redirect> {
    let book = state.book(&book_id)?;
    Ok(Redirect::to(&format!(
        "/read/{}/0",
        urlencoding::encode(&book.id)
    )))
}

/// Reading page with highlights restored.
pub async fn read_chapter(
    State(state): State<AppState>,
    Path((book_id, chapter_index)): Path<(String, usize)>,
) -> Result<Html<String>> {
    let rendered = state.render_chapter(&book_id, chapter_index)?;
    Ok(Html(pages::chapter_page(
        &rendered.book,
        rendered.index,
        &rendered.applied.html,
        &state.config.highlights.marker_class,
    )))
}

/// Extracted book image.
pub async fn book_image(
    State(state): State<AppState>,
    Path((book_id, image)): Path<(String, String)>,
) -> Result<Response<Body>> {
    let dir = state.library.book_dir(&book_id)?;
    let name = library::path_component(&image)
        .ok_or_else(|| AppError::NotFound(format!("image {image}")))?;

    serve_file(&dir.images_dir().join(name)).await
}

/// Book cover image.
pub async fn book_cover(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Response<Body>> {
    let dir = state.library.book_dir(&book_id)?;
    let book = state.book(dir.id())?;
    let cover = vault::find_cover(&dir, &book)
        .ok_or_else(|| AppError::NotFound(format!("cover of {}", book.id)))?;

    serve_file(&cover).await
}

/// Selection capture script.
pub async fn client_script() -> impl IntoResponse {
    build_response(
        StatusCode::OK,
        "application/javascript; charset=utf-8",
        CLIENT_SCRIPT,
    )
}

// ============================================================================
// API HANDLERS
// ============================================================================

/// Book metadata (JSON), without chapter content.
pub async fn book_metadata(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<BookSummary>> {
    let book = state.book(&book_id)?;
    Ok(Json(book.summary()))
}

/// Highlights of one chapter.
#[derive(Debug, Serialize, Deserialize)]
pub struct HighlightList {
    /// Records in creation order.
    pub highlights: Vec<Highlight>,
}

/// List the highlights of a chapter.
pub async fn list_highlights(
    State(state): State<AppState>,
    Path((book_id, chapter_index)): Path<(String, usize)>,
) -> Result<Json<HighlightList>> {
    let highlights = state.highlights.list(&book_id, chapter_index)?;
    Ok(Json(HighlightList { highlights }))
}

/// Create highlight request.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateHighlightRequest {
    /// Book identifier.
    pub book_id: String,
    /// Chapter index.
    pub chapter_index: usize,
    /// Start offset.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
    /// Captured text.
    pub text: String,
}

/// Create a highlight.
pub async fn create_highlight(
    State(state): State<AppState>,
    Json(req): Json<CreateHighlightRequest>,
) -> Result<Json<Highlight>> {
    let book = state.book(&req.book_id)?;
    let highlight = state.highlights.create(
        &book,
        NewHighlight {
            chapter_index: req.chapter_index,
            start: req.start,
            end: req.end,
            text: req.text,
        },
    )?;
    Ok(Json(highlight))
}

/// Delete highlight request.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteHighlightRequest {
    /// Book identifier.
    pub book_id: String,
    /// Highlight identifier.
    pub highlight_id: String,
    /// Chapter the client believes the highlight is in; informational only.
    #[serde(default)]
    pub chapter_index: Option<usize>,
}

/// Delete highlight response.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteHighlightResponse {
    /// Always `deleted`.
    pub status: String,
    /// Removed highlight.
    pub id: String,
}

/// Delete a highlight.
pub async fn delete_highlight(
    State(state): State<AppState>,
    Json(req): Json<DeleteHighlightRequest>,
) -> Result<Json<DeleteHighlightResponse>> {
    let removed = state.highlights.delete(&req.book_id, &req.highlight_id)?;

    if let Some(chapter) = req.chapter_index
        && chapter != removed.chapter_index
    {
        tracing::debug!(
            highlight = %removed.id,
            requested = chapter,
            actual = removed.chapter_index,
            "Deleted highlight from a different chapter than requested"
        );
    }

    Ok(Json(DeleteHighlightResponse {
        status: "deleted".to_string(),
        id: removed.id,
    }))
}
