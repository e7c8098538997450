//! services/api/src/web/rest.rs
//!
//! Contains the shared REST response payloads and the master definition for
//! the OpenAPI specification.

use std::collections::HashMap;

use book_catalog_core::{Book, CatalogStore, RatingSummary, Review};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::{auth, books, reviews, validation::FieldError};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        books::list_books_handler,
        books::search_books_handler,
        books::get_book_handler,
        books::create_book_handler,
        books::update_book_handler,
        books::delete_book_handler,
        reviews::create_review_handler,
        reviews::update_review_handler,
        reviews::delete_review_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            books::CreateBookRequest,
            books::UpdateBookRequest,
            books::BookDetail,
            books::SearchResults,
            reviews::CreateReviewRequest,
            reviews::UpdateReviewRequest,
            reviews::ReviewMutationResponse,
            UserRef,
            BookResponse,
            ReviewResponse,
            RatingResponse,
            MessageResponse,
            FieldError,
        )
    ),
    tags(
        (name = "Book Catalog API", description = "Books, reviews and rating aggregates.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Payloads
//=========================================================================================

/// The envelope every successful JSON response is wrapped in.
#[derive(Debug, Serialize, ToSchema)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// A user reference with the username filled in.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserRef {
    pub id: Uuid,
    /// `None` if the user no longer exists.
    pub username: Option<String>,
}

/// Usernames looked up once for everything a response mentions.
#[derive(Debug, Default)]
pub struct Usernames(HashMap<Uuid, String>);

impl Usernames {
    pub async fn load(
        store: &dyn CatalogStore,
        user_ids: impl IntoIterator<Item = Uuid>,
    ) -> Result<Self, ApiError> {
        let mut ids: Vec<Uuid> = user_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(Self(store.usernames(&ids).await?))
    }

    pub fn user(&self, id: Uuid) -> UserRef {
        UserRef {
            id,
            username: self.0.get(&id).cloned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub published_year: Option<i32>,
    pub created_by: UserRef,
    pub average_rating: f64,
    pub reviews_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookResponse {
    pub fn new(book: Book, users: &Usernames) -> Self {
        Self {
            created_by: users.user(book.created_by),
            id: book.id,
            title: book.title,
            author: book.author,
            genre: book.genre,
            description: book.description,
            published_year: book.published_year,
            average_rating: book.average_rating,
            reviews_count: book.reviews_count,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }

    /// Builds responses for `books` with one username lookup.
    pub async fn many(store: &dyn CatalogStore, books: Vec<Book>) -> Result<Vec<Self>, ApiError> {
        let users = Usernames::load(store, books.iter().map(|b| b.created_by)).await?;
        Ok(books.into_iter().map(|b| Self::new(b, &users)).collect())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user: UserRef,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewResponse {
    pub fn new(review: Review, users: &Usernames) -> Self {
        Self {
            user: users.user(review.user_id),
            id: review.id,
            book_id: review.book_id,
            rating: review.rating.value(),
            comment: review.comment,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}

/// A book's rating aggregate.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RatingResponse {
    pub average_rating: f64,
    pub reviews_count: u64,
}

impl From<RatingSummary> for RatingResponse {
    fn from(summary: RatingSummary) -> Self {
        Self {
            average_rating: summary.average_rating,
            reviews_count: summary.reviews_count,
        }
    }
}
