pub mod auth;
pub mod books;
pub mod extract;
pub mod middleware;
pub mod rest;
pub mod reviews;
pub mod state;
pub mod validation;

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

pub use middleware::{require_auth, require_book_owner};
use state::AppState;

/// Builds the API router.
///
/// Guards run outermost-first: `require_auth`, then `require_book_owner`,
/// then the handler.
pub fn router(app_state: Arc<AppState>) -> Router {
    let auth_guard = axum_middleware::from_fn_with_state(app_state.clone(), require_auth);
    let owner_guard = axum_middleware::from_fn_with_state(app_state.clone(), require_book_owner);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/books", get(books::list_books_handler))
        .route("/api/books/search", get(books::search_books_handler))
        .route("/api/books/{id}", get(books::get_book_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/books", post(books::create_book_handler))
        .route(
            "/api/reviews/books/{book_id}",
            post(reviews::create_review_handler),
        )
        .route(
            "/api/reviews/{id}",
            patch(reviews::update_review_handler).delete(reviews::delete_review_handler),
        )
        .route_layer(auth_guard.clone());

    // Owner routes (auth + ownership of the book in the path)
    let owner_routes = Router::new()
        .route(
            "/api/books/{id}",
            patch(books::update_book_handler).delete(books::delete_book_handler),
        )
        .route_layer(owner_guard)
        .route_layer(auth_guard);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(owner_routes)
        .with_state(app_state)
}
