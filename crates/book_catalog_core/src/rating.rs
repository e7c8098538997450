//! crates/book_catalog_core/src/rating.rs
//!
//! Keeps a book's `average_rating` and `reviews_count` equal to the aggregate
//! of its current reviews.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Rating, RatingSummary};
use crate::ports::{CatalogStore, PortResult};

impl RatingSummary {
    pub const EMPTY: RatingSummary = RatingSummary {
        average_rating: 0.0,
        reviews_count: 0,
    };

    /// Arithmetic mean and count of `ratings`; zero for both when empty.
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = Rating>,
    {
        let (sum, count) = ratings
            .into_iter()
            .fold((0u64, 0u64), |(sum, count), rating| {
                (sum + u64::from(rating.value()), count + 1)
            });
        if count == 0 {
            return Self::EMPTY;
        }
        Self {
            average_rating: sum as f64 / count as f64,
            reviews_count: count,
        }
    }
}

//=========================================================================================
// Per-book Serialization
//=========================================================================================

/// Keyed async locks that serialize review mutations per book.
///
/// Entries are held weakly and pruned once no guard refers to them.
#[derive(Debug, Default)]
pub struct BookLocks {
    locks: Mutex<HashMap<Uuid, Weak<tokio::sync::Mutex<()>>>>,
}

impl BookLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder has the lock for `book_id`.
    pub async fn lock(&self, book_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(&book_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(book_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of books that currently have a live lock.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}

//=========================================================================================
// Rating Aggregator
//=========================================================================================

/// Recomputes and persists a book's rating aggregate from its reviews.
#[derive(Clone)]
pub struct RatingAggregator {
    store: Arc<dyn CatalogStore>,
}

impl RatingAggregator {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Groups the current reviews of `book_id` and overwrites the book's
    /// rating fields with the result.
    pub async fn recompute(&self, book_id: Uuid) -> PortResult<RatingSummary> {
        let summary = self.store.review_stats(book_id).await?;
        self.store.set_book_rating(book_id, summary).await?;
        debug!(
            %book_id,
            average_rating = summary.average_rating,
            reviews_count = summary.reviews_count,
            "Recomputed book rating"
        );
        Ok(summary)
    }
}
