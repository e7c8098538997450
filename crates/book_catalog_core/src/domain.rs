//! crates/book_catalog_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// The identity attached to a request once its session token has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
}

/// A catalogued book.
///
/// `average_rating` and `reviews_count` are derived from the book's reviews
/// and are only ever written by the rating aggregator.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub published_year: Option<i32>,
    pub created_by: Uuid,
    pub average_rating: f64,
    pub reviews_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        self.created_by == identity.user_id
    }
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub published_year: Option<i32>,
    pub created_by: Uuid,
}

/// A partial update of a book's descriptive fields. `None` leaves a field
/// untouched; `Some(None)` clears an optional one.
#[derive(Debug, Clone, Default)]
pub struct BookChanges {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub published_year: Option<i32>,
}

/// Case-insensitive substring filters for book listings.
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub author: Option<String>,
    pub genre: Option<String>,
}

/// A 1-based page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(number: u32, limit: u32) -> Self {
        Self {
            number: number.max(1),
            limit,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.limit)
    }

    /// Number of pages needed to hold `total` items.
    pub fn total_pages(&self, total: u64) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        total.div_ceil(u64::from(self.limit))
    }
}

/// A review rating, always in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rating(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Rating must be between 1 and 5, got {0}")]
pub struct InvalidRating(pub i64);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, InvalidRating> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(InvalidRating(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// A user's review of a book. At most one exists per (book, user) pair.
#[derive(Debug, Clone)]
pub struct Review {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub rating: Rating,
    pub comment: Option<String>,
}

/// Only the rating and comment of a review can change after creation.
#[derive(Debug, Clone, Default)]
pub struct ReviewChanges {
    pub rating: Option<Rating>,
    /// `Some(None)` removes the comment.
    pub comment: Option<Option<String>>,
}

/// The derived rating aggregate of a book's reviews.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub reviews_count: u64,
}
