//! services/api/src/web/books.rs
//!
//! Book catalog endpoints. Listing, search and detail are public; create
//! requires an identity and update/delete additionally require ownership.

use axum::{extract::State, http::StatusCode, Json};
use book_catalog_core::{BookChanges, BookFilter, NewBook, PortError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{JsonBody, PathParam, QueryParams};
use crate::web::middleware::{Authenticated, OwnedBook};
use crate::web::rest::{BookResponse, Envelope, MessageResponse, ReviewResponse, Usernames};
use crate::web::state::AppState;
use crate::web::validation::{
    check_published_year, check_required, non_blank, page_from, Validator,
};

const DEFAULT_BOOKS_PER_PAGE: u32 = 10;
const DEFAULT_REVIEWS_PER_PAGE: u32 = 5;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListBooksQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Case-insensitive substring of the author.
    pub author: Option<String>,
    /// Case-insensitive substring of the genre.
    pub genre: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchBooksQuery {
    /// Case-insensitive substring of the title or author.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReviewPageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub published_year: Option<i32>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub published_year: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub results: Vec<BookResponse>,
    pub total_results: u64,
    pub current_page: u32,
    pub total_pages: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: BookResponse,
    pub reviews: Vec<ReviewResponse>,
    pub current_page: u32,
    pub reviews_per_page: u32,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/books - List books, optionally filtered by author and genre
#[utoipa::path(
    get,
    path = "/api/books",
    params(ListBooksQuery),
    responses(
        (status = 200, description = "A page of books", body = Envelope<Vec<BookResponse>>),
        (status = 400, description = "Invalid paging parameters")
    )
)]
pub async fn list_books_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<ListBooksQuery>,
) -> Result<Json<Envelope<Vec<BookResponse>>>, ApiError> {
    let page = page_from(query.page, query.limit, DEFAULT_BOOKS_PER_PAGE)?;
    let filter = BookFilter {
        author: non_blank(query.author),
        genre: non_blank(query.genre),
    };
    let books = state.db.list_books(&filter, page).await?;
    Ok(Json(Envelope::ok(
        BookResponse::many(state.db.as_ref(), books).await?,
    )))
}

/// GET /api/books/search - Search books by title or author
#[utoipa::path(
    get,
    path = "/api/books/search",
    params(SearchBooksQuery),
    responses(
        (status = 200, description = "Matching books", body = Envelope<SearchResults>),
        (status = 400, description = "Missing search query")
    )
)]
pub async fn search_books_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<SearchBooksQuery>,
) -> Result<Json<Envelope<SearchResults>>, ApiError> {
    let q = non_blank(query.q)
        .ok_or_else(|| ApiError::validation("q", "Search query (q) is required"))?;
    let page = page_from(query.page, query.limit, DEFAULT_BOOKS_PER_PAGE)?;

    let (books, total) = state.db.search_books(&q, page).await?;
    Ok(Json(Envelope::ok(SearchResults {
        results: BookResponse::many(state.db.as_ref(), books).await?,
        total_results: total,
        current_page: page.number,
        total_pages: page.total_pages(total),
    })))
}

/// GET /api/books/{id} - A book with its rating aggregate and a page of reviews
#[utoipa::path(
    get,
    path = "/api/books/{id}",
    params(("id" = Uuid, Path, description = "Book id"), ReviewPageQuery),
    responses(
        (status = 200, description = "The book", body = Envelope<BookDetail>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_handler(
    State(state): State<Arc<AppState>>,
    PathParam(book_id): PathParam<Uuid>,
    QueryParams(query): QueryParams<ReviewPageQuery>,
) -> Result<Json<Envelope<BookDetail>>, ApiError> {
    let page = page_from(query.page, query.limit, DEFAULT_REVIEWS_PER_PAGE)?;
    let book = state.db.get_book(book_id).await.map_err(|e| match e {
        PortError::NotFound(_) => ApiError::NotFound("Book not found".to_string()),
        other => ApiError::Port(other),
    })?;
    let reviews = state.db.list_reviews_for_book(book_id, page).await?;
    let users = Usernames::load(
        state.db.as_ref(),
        std::iter::once(book.created_by).chain(reviews.iter().map(|r| r.user_id)),
    )
    .await?;

    Ok(Json(Envelope::ok(BookDetail {
        book: BookResponse::new(book, &users),
        reviews: reviews
            .into_iter()
            .map(|review| ReviewResponse::new(review, &users))
            .collect(),
        current_page: page.number,
        reviews_per_page: page.limit,
    })))
}

/// POST /api/books - Create a book owned by the caller
#[utoipa::path(
    post,
    path = "/api/books",
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Book created", body = Envelope<BookResponse>),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Authentication required")
    )
)]
pub async fn create_book_handler(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    JsonBody(req): JsonBody<CreateBookRequest>,
) -> Result<(StatusCode, Json<Envelope<BookResponse>>), ApiError> {
    let mut validator = Validator::new();
    check_required(&mut validator, "title", &req.title);
    check_required(&mut validator, "author", &req.author);
    check_published_year(&mut validator, req.published_year);
    validator.finish()?;

    let book = state
        .db
        .create_book(NewBook {
            title: req.title.trim().to_string(),
            author: req.author.trim().to_string(),
            genre: non_blank(req.genre),
            description: non_blank(req.description),
            published_year: req.published_year,
            created_by: identity.user_id,
        })
        .await?;
    info!(book_id = %book.id, user_id = %identity.user_id, "Book created");

    let users = Usernames::load(state.db.as_ref(), [book.created_by]).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(BookResponse::new(book, &users))),
    ))
}

/// PATCH /api/books/{id} - Update a book the caller created
#[utoipa::path(
    patch,
    path = "/api/books/{id}",
    params(("id" = Uuid, Path, description = "Book id")),
    request_body = UpdateBookRequest,
    responses(
        (status = 200, description = "Book updated", body = Envelope<BookResponse>),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller does not own the book"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book_handler(
    State(state): State<Arc<AppState>>,
    OwnedBook(book): OwnedBook,
    JsonBody(req): JsonBody<UpdateBookRequest>,
) -> Result<Json<Envelope<BookResponse>>, ApiError> {
    let mut validator = Validator::new();
    if let Some(title) = &req.title {
        check_required(&mut validator, "title", title);
    }
    if let Some(author) = &req.author {
        check_required(&mut validator, "author", author);
    }
    check_published_year(&mut validator, req.published_year);
    validator.finish()?;

    let changes = BookChanges {
        title: req.title.map(|t| t.trim().to_string()),
        author: req.author.map(|a| a.trim().to_string()),
        genre: req.genre.map(|g| non_blank(Some(g))),
        description: req.description.map(|d| non_blank(Some(d))),
        published_year: req.published_year,
    };
    let updated = state.db.update_book(book.id, changes).await?;
    info!(book_id = %updated.id, "Book updated");

    let users = Usernames::load(state.db.as_ref(), [updated.created_by]).await?;
    Ok(Json(Envelope::ok(BookResponse::new(updated, &users))))
}

/// DELETE /api/books/{id} - Delete a book the caller created, with its reviews
#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    params(("id" = Uuid, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller does not own the book"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn delete_book_handler(
    State(state): State<Arc<AppState>>,
    OwnedBook(book): OwnedBook,
) -> Result<Json<MessageResponse>, ApiError> {
    // Serialized with review mutations so none recomputes a rating for a
    // book that is gone.
    let _guard = state.reviews.lock_book(book.id).await;
    state.db.delete_book(book.id).await?;
    info!(book_id = %book.id, "Book deleted");
    Ok(Json(MessageResponse {
        success: true,
        message: "Book deleted successfully".to_string(),
    }))
}
