//! crates/book_catalog_core/src/reviews.rs
//!
//! Review mutations. Every create, update or delete holds the book's lock
//! across the write and the rating recompute that follows it.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{Identity, NewReview, Rating, RatingSummary, Review, ReviewChanges};
use crate::ports::{CatalogStore, PortError};
use crate::rating::{BookLocks, RatingAggregator};

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Book {0} not found")]
    BookNotFound(Uuid),
    #[error("Review {0} not found")]
    ReviewNotFound(Uuid),
    #[error("You can only modify your own reviews")]
    NotAuthor,
    #[error("You have already reviewed this book")]
    DuplicateReview,
    #[error("Store error: {0}")]
    Store(#[source] PortError),
    /// The review write succeeded but the book's rating could not be recomputed.
    #[error("Failed to update book rating: {0}")]
    Aggregation(#[source] PortError),
}

/// The outcome of a review mutation: the affected review and the book's new aggregate.
#[derive(Debug, Clone)]
pub struct ReviewMutation {
    pub review: Review,
    pub summary: RatingSummary,
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn CatalogStore>,
    aggregator: RatingAggregator,
    locks: Arc<BookLocks>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            aggregator: RatingAggregator::new(store.clone()),
            store,
            locks: Arc::new(BookLocks::new()),
        }
    }

    pub fn aggregator(&self) -> &RatingAggregator {
        &self.aggregator
    }

    /// Holds off every review mutation of `book_id` until the guard drops.
    pub async fn lock_book(&self, book_id: Uuid) -> OwnedMutexGuard<()> {
        self.locks.lock(book_id).await
    }

    /// Creates the identity's review of `book_id`, rejecting a second review
    /// of the same book without writing anything.
    pub async fn create(
        &self,
        identity: &Identity,
        book_id: Uuid,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<ReviewMutation, ReviewError> {
        let _guard = self.locks.lock(book_id).await;

        self.store.get_book(book_id).await.map_err(|e| match e {
            PortError::NotFound(_) => ReviewError::BookNotFound(book_id),
            other => ReviewError::Store(other),
        })?;

        if self
            .store
            .find_review(book_id, identity.user_id)
            .await
            .map_err(ReviewError::Store)?
            .is_some()
        {
            return Err(ReviewError::DuplicateReview);
        }

        let review = self
            .store
            .create_review(NewReview {
                book_id,
                user_id: identity.user_id,
                rating,
                comment,
            })
            .await
            .map_err(|e| match e {
                // another instance won the race past the pre-check
                PortError::Conflict(_) => ReviewError::DuplicateReview,
                other => ReviewError::Store(other),
            })?;
        info!(review_id = %review.id, %book_id, "Review created");

        let summary = self.recompute(book_id).await?;
        Ok(ReviewMutation { review, summary })
    }

    /// Changes the rating and/or comment of a review owned by `identity`.
    pub async fn update(
        &self,
        identity: &Identity,
        review_id: Uuid,
        changes: ReviewChanges,
    ) -> Result<ReviewMutation, ReviewError> {
        let existing = self.authored_review(identity, review_id).await?;
        let _guard = self.locks.lock(existing.book_id).await;

        let review = self
            .store
            .update_review(review_id, changes)
            .await
            .map_err(|e| Self::review_lookup_error(review_id, e))?;

        let summary = self.recompute(review.book_id).await?;
        Ok(ReviewMutation { review, summary })
    }

    /// Deletes a review owned by `identity` and recomputes its book's rating
    /// from the deleted record's book reference.
    pub async fn delete(
        &self,
        identity: &Identity,
        review_id: Uuid,
    ) -> Result<ReviewMutation, ReviewError> {
        let existing = self.authored_review(identity, review_id).await?;
        let _guard = self.locks.lock(existing.book_id).await;

        let review = self
            .store
            .delete_review(review_id)
            .await
            .map_err(|e| Self::review_lookup_error(review_id, e))?;
        info!(%review_id, book_id = %review.book_id, "Review deleted");

        let summary = self.recompute(review.book_id).await?;
        Ok(ReviewMutation { review, summary })
    }

    async fn authored_review(
        &self,
        identity: &Identity,
        review_id: Uuid,
    ) -> Result<Review, ReviewError> {
        let review = self
            .store
            .get_review(review_id)
            .await
            .map_err(|e| Self::review_lookup_error(review_id, e))?;
        if review.user_id != identity.user_id {
            return Err(ReviewError::NotAuthor);
        }
        Ok(review)
    }

    async fn recompute(&self, book_id: Uuid) -> Result<RatingSummary, ReviewError> {
        self.aggregator.recompute(book_id).await.map_err(|e| {
            error!(%book_id, "Rating recompute failed after review mutation: {:?}", e);
            ReviewError::Aggregation(e)
        })
    }

    fn review_lookup_error(review_id: Uuid, e: PortError) -> ReviewError {
        match e {
            PortError::NotFound(_) => ReviewError::ReviewNotFound(review_id),
            other => ReviewError::Store(other),
        }
    }
}
