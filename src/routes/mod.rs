pub mod books;
pub mod health;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::models::storage::BookStore;

type Store = Arc<dyn BookStore + Send + Sync>;

pub fn router(store: Store) -> Router {
    Router::new()
        .route("/status", get(health::health_check))
        .route(
            "/books",
            axum::routing::post(books::create_book).get(books::get_all_books),
        )
        .route(
            "/books/:book_id",
            get(books::get_book_by_id)
                .put(books::update_book)
                .patch(books::update_book)
                .delete(books::delete_book),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}
