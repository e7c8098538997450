//! crates/book_catalog_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific storage implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Book, BookChanges, BookFilter, NewBook, NewReview, Page, RatingSummary, Review,
    ReviewChanges, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the underlying store.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write. Carries the name of the
    /// conflicting field (`username`, `email`, `review`).
    #[error("Conflict on {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // --- User Management ---

    /// Fails with `Conflict("username")` or `Conflict("email")` when taken.
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    /// Usernames of the given users. Unknown ids are left out of the map.
    async fn usernames(&self, user_ids: &[Uuid]) -> PortResult<HashMap<Uuid, String>>;

    // --- Books ---
    async fn create_book(&self, book: NewBook) -> PortResult<Book>;

    async fn get_book(&self, book_id: Uuid) -> PortResult<Book>;

    async fn list_books(&self, filter: &BookFilter, page: Page) -> PortResult<Vec<Book>>;

    /// Matches `query` against title or author. Returns the page and the total match count.
    async fn search_books(&self, query: &str, page: Page) -> PortResult<(Vec<Book>, u64)>;

    async fn update_book(&self, book_id: Uuid, changes: BookChanges) -> PortResult<Book>;

    /// Deletes the book together with its reviews.
    async fn delete_book(&self, book_id: Uuid) -> PortResult<()>;

    // --- Reviews ---

    /// Fails with `Conflict("review")` if the user already reviewed the book.
    async fn create_review(&self, review: NewReview) -> PortResult<Review>;

    async fn get_review(&self, review_id: Uuid) -> PortResult<Review>;

    async fn find_review(&self, book_id: Uuid, user_id: Uuid) -> PortResult<Option<Review>>;

    /// Reviews of a book, newest first.
    async fn list_reviews_for_book(&self, book_id: Uuid, page: Page) -> PortResult<Vec<Review>>;

    async fn update_review(&self, review_id: Uuid, changes: ReviewChanges) -> PortResult<Review>;

    /// Deletes a review and returns the record as it was stored.
    async fn delete_review(&self, review_id: Uuid) -> PortResult<Review>;

    // --- Rating Aggregates ---

    /// Groups the reviews of `book_id` into their mean rating and count.
    async fn review_stats(&self, book_id: Uuid) -> PortResult<RatingSummary>;

    /// Overwrites the denormalized rating fields on the book.
    async fn set_book_rating(&self, book_id: Uuid, summary: RatingSummary) -> PortResult<()>;
}
