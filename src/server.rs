//! HTTP server and routes.

mod handlers;
mod pages;
mod state;

pub use handlers::{
    CreateHighlightRequest, DeleteHighlightRequest, DeleteHighlightResponse, HighlightList,
};
pub use state::{AppState, RenderedChapter};

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let read_routes = Router::new()
        .route("/{book_id}", get(handlers::read_book))
        .route("/{book_id}/{chapter_index}", get(handlers::read_chapter))
        .route("/{book_id}/images/{image}", get(handlers::book_image));

    let api_routes = Router::new()
        .route("/books/{book_id}", get(handlers::book_metadata))
        .route(
            "/highlights",
            post(handlers::create_highlight).delete(handlers::delete_highlight),
        )
        .route(
            "/highlights/{book_id}/{chapter_index}",
            get(handlers::list_highlights),
        );

    Router::new()
        .route("/", get(handlers::index))
        .route("/cover/{book_id}", get(handlers::book_cover))
        .route("/static/reader.js", get(handlers::client_script))
        .nest("/read", read_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
