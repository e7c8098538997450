//! services/api/src/adapters/memory.rs
//!
//! An in-memory implementation of the `CatalogStore` port, used when no
//! database is configured and in tests. Uniqueness checks and the inserts
//! they guard happen under a single write lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use book_catalog_core::domain::{
    Book, BookChanges, BookFilter, NewBook, NewReview, Page, RatingSummary, Review, ReviewChanges,
    User, UserCredentials,
};
use book_catalog_core::ports::{CatalogStore, PortError, PortResult};
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct UserRecord {
    user: User,
    hashed_password: String,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    books: HashMap<Uuid, Book>,
    reviews: HashMap<Uuid, Review>,
}

/// In-memory catalog store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Newest first, then a slice for the requested page.
fn paginate<T, K>(mut items: Vec<T>, page: Page, key: impl Fn(&T) -> K) -> Vec<T>
where
    K: Ord,
{
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect()
}

fn book_not_found(book_id: Uuid) -> PortError {
    PortError::NotFound(format!("Book {} not found", book_id))
}

fn review_not_found(review_id: Uuid) -> PortError {
    PortError::NotFound(format!("Review {} not found", review_id))
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|r| r.user.username == username) {
            return Err(PortError::Conflict("username".to_string()));
        }
        if tables.users.values().any(|r| r.user.email == email) {
            return Err(PortError::Conflict("email".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
        };
        tables.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                hashed_password: hashed_password.to_string(),
            },
        );
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|r| r.user.email == email)
            .map(|r| UserCredentials {
                user_id: r.user.id,
                email: r.user.email.clone(),
                hashed_password: r.hashed_password.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn usernames(&self, user_ids: &[Uuid]) -> PortResult<HashMap<Uuid, String>> {
        let tables = self.tables.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .map(|r| (r.user.id, r.user.username.clone()))
            .collect())
    }

    async fn create_book(&self, book: NewBook) -> PortResult<Book> {
        let now = Utc::now();
        let book = Book {
            id: Uuid::new_v4(),
            title: book.title,
            author: book.author,
            genre: book.genre,
            description: book.description,
            published_year: book.published_year,
            created_by: book.created_by,
            average_rating: 0.0,
            reviews_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn get_book(&self, book_id: Uuid) -> PortResult<Book> {
        let tables = self.tables.read().await;
        tables
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| book_not_found(book_id))
    }

    async fn list_books(&self, filter: &BookFilter, page: Page) -> PortResult<Vec<Book>> {
        let tables = self.tables.read().await;
        let matches: Vec<Book> = tables
            .books
            .values()
            .filter(|book| {
                filter
                    .author
                    .as_deref()
                    .map_or(true, |author| contains_ignore_case(&book.author, author))
            })
            .filter(|book| {
                filter.genre.as_deref().map_or(true, |genre| {
                    book.genre
                        .as_deref()
                        .is_some_and(|g| contains_ignore_case(g, genre))
                })
            })
            .cloned()
            .collect();
        Ok(paginate(matches, page, |book: &Book| (book.created_at, book.id)))
    }

    async fn search_books(&self, query: &str, page: Page) -> PortResult<(Vec<Book>, u64)> {
        let tables = self.tables.read().await;
        let matches: Vec<Book> = tables
            .books
            .values()
            .filter(|book| {
                contains_ignore_case(&book.title, query) || contains_ignore_case(&book.author, query)
            })
            .cloned()
            .collect();
        let total = matches.len() as u64;
        Ok((
            paginate(matches, page, |book: &Book| (book.created_at, book.id)),
            total,
        ))
    }

    async fn update_book(&self, book_id: Uuid, changes: BookChanges) -> PortResult<Book> {
        let mut tables = self.tables.write().await;
        let book = tables
            .books
            .get_mut(&book_id)
            .ok_or_else(|| book_not_found(book_id))?;
        if let Some(title) = changes.title {
            book.title = title;
        }
        if let Some(author) = changes.author {
            book.author = author;
        }
        if let Some(genre) = changes.genre {
            book.genre = genre;
        }
        if let Some(description) = changes.description {
            book.description = description;
        }
        if let Some(published_year) = changes.published_year {
            book.published_year = Some(published_year);
        }
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn delete_book(&self, book_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .books
            .remove(&book_id)
            .ok_or_else(|| book_not_found(book_id))?;
        tables.reviews.retain(|_, review| review.book_id != book_id);
        Ok(())
    }

    async fn create_review(&self, review: NewReview) -> PortResult<Review> {
        let mut tables = self.tables.write().await;
        if !tables.books.contains_key(&review.book_id) {
            return Err(book_not_found(review.book_id));
        }
        if tables
            .reviews
            .values()
            .any(|r| r.book_id == review.book_id && r.user_id == review.user_id)
        {
            return Err(PortError::Conflict("review".to_string()));
        }
        let now = Utc::now();
        let review = Review {
            id: Uuid::new_v4(),
            book_id: review.book_id,
            user_id: review.user_id,
            rating: review.rating,
            comment: review.comment,
            created_at: now,
            updated_at: now,
        };
        tables.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn get_review(&self, review_id: Uuid) -> PortResult<Review> {
        let tables = self.tables.read().await;
        tables
            .reviews
            .get(&review_id)
            .cloned()
            .ok_or_else(|| review_not_found(review_id))
    }

    async fn find_review(&self, book_id: Uuid, user_id: Uuid) -> PortResult<Option<Review>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .find(|r| r.book_id == book_id && r.user_id == user_id)
            .cloned())
    }

    async fn list_reviews_for_book(&self, book_id: Uuid, page: Page) -> PortResult<Vec<Review>> {
        let tables = self.tables.read().await;
        let reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect();
        Ok(paginate(reviews, page, |r: &Review| (r.created_at, r.id)))
    }

    async fn update_review(&self, review_id: Uuid, changes: ReviewChanges) -> PortResult<Review> {
        let mut tables = self.tables.write().await;
        let review = tables
            .reviews
            .get_mut(&review_id)
            .ok_or_else(|| review_not_found(review_id))?;
        if let Some(rating) = changes.rating {
            review.rating = rating;
        }
        if let Some(comment) = changes.comment {
            review.comment = comment;
        }
        review.updated_at = Utc::now();
        Ok(review.clone())
    }

    async fn delete_review(&self, review_id: Uuid) -> PortResult<Review> {
        self.tables
            .write()
            .await
            .reviews
            .remove(&review_id)
            .ok_or_else(|| review_not_found(review_id))
    }

    async fn review_stats(&self, book_id: Uuid) -> PortResult<RatingSummary> {
        let tables = self.tables.read().await;
        Ok(RatingSummary::from_ratings(
            tables
                .reviews
                .values()
                .filter(|r| r.book_id == book_id)
                .map(|r| r.rating),
        ))
    }

    async fn set_book_rating(&self, book_id: Uuid, summary: RatingSummary) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let book = tables
            .books
            .get_mut(&book_id)
            .ok_or_else(|| book_not_found(book_id))?;
        book.average_rating = summary.average_rating;
        book.reviews_count = summary.reviews_count;
        Ok(())
    }
}
