//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `CatalogStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use std::collections::HashMap;

use async_trait::async_trait;
use book_catalog_core::domain::{
    Book, BookChanges, BookFilter, NewBook, NewReview, Page, Rating, RatingSummary, Review,
    ReviewChanges, User, UserCredentials,
};
use book_catalog_core::ports::{CatalogStore, PortError, PortResult};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `CatalogStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const BOOK_COLUMNS: &str = "id, title, author, genre, description, published_year, created_by, \
     average_rating, reviews_count, created_at, updated_at";

const REVIEW_COLUMNS: &str = "id, book_id, user_id, rating, comment, created_at, updated_at";

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    title: String,
    author: String,
    genre: Option<String>,
    description: Option<String>,
    published_year: Option<i32>,
    created_by: Uuid,
    average_rating: f64,
    reviews_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            title: self.title,
            author: self.author,
            genre: self.genre,
            description: self.description,
            published_year: self.published_year,
            created_by: self.created_by,
            average_rating: self.average_rating,
            reviews_count: self.reviews_count.max(0) as u64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ReviewRecord {
    id: Uuid,
    book_id: Uuid,
    user_id: Uuid,
    rating: i16,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ReviewRecord {
    fn to_domain(self) -> PortResult<Review> {
        let rating = Rating::new(i64::from(self.rating))
            .map_err(|e| PortError::Unexpected(format!("Review {}: {}", self.id, e)))?;
        Ok(Review {
            id: self.id,
            book_id: self.book_id,
            user_id: self.user_id,
            rating,
            comment: self.comment,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// Error Mapping Helpers
//=========================================================================================

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: &str, id: Uuid) -> impl FnOnce(sqlx::Error) -> PortError + '_ {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        _ => unexpected(e),
    }
}

/// Maps unique-constraint violations to `PortError::Conflict` naming the field.
fn write_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some("users_username_key") => "username",
                Some("users_email_key") => "email",
                Some("reviews_book_user_key") => "review",
                Some(other) => other,
                None => "unknown",
            };
            return PortError::Conflict(field.to_string());
        }
        if db_err.is_foreign_key_violation() {
            return PortError::NotFound(db_err.message().to_string());
        }
    }
    unexpected(e)
}

/// `%needle%` for ILIKE, with the pattern metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn page_bounds(page: Page) -> (i64, i64) {
    (i64::from(page.limit), page.offset() as i64)
}

//=========================================================================================
// `CatalogStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogStore for DbAdapter {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, username, email, hashed_password) VALUES ($1, $2, $3, $4) \
             RETURNING id, username, email",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn usernames(&self, user_ids: &[Uuid]) -> PortResult<HashMap<Uuid, String>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, username FROM users WHERE id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(rows.into_iter().collect())
    }

    async fn create_book(&self, book: NewBook) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "INSERT INTO books (id, title, author, genre, description, published_year, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            BOOK_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.genre)
        .bind(&book.description)
        .bind(book.published_year)
        .bind(book.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(record.to_domain())
    }

    async fn get_book(&self, book_id: Uuid) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books WHERE id = $1",
            BOOK_COLUMNS
        ))
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Book", book_id))?;
        Ok(record.to_domain())
    }

    async fn list_books(&self, filter: &BookFilter, page: Page) -> PortResult<Vec<Book>> {
        let (limit, offset) = page_bounds(page);
        let records = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books \
             WHERE ($1::TEXT IS NULL OR author ILIKE $1) \
               AND ($2::TEXT IS NULL OR genre ILIKE $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            BOOK_COLUMNS
        ))
        .bind(filter.author.as_deref().map(like_pattern))
        .bind(filter.genre.as_deref().map(like_pattern))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn search_books(&self, query: &str, page: Page) -> PortResult<(Vec<Book>, u64)> {
        let (limit, offset) = page_bounds(page);
        let pattern = like_pattern(query);

        let records = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books WHERE title ILIKE $1 OR author ILIKE $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            BOOK_COLUMNS
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM books WHERE title ILIKE $1 OR author ILIKE $1")
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;

        Ok((
            records.into_iter().map(|r| r.to_domain()).collect(),
            total.max(0) as u64,
        ))
    }

    async fn update_book(&self, book_id: Uuid, changes: BookChanges) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "UPDATE books SET \
                title = COALESCE($2, title), \
                author = COALESCE($3, author), \
                genre = CASE WHEN $4::BOOLEAN THEN $5::TEXT ELSE genre END, \
                description = CASE WHEN $6::BOOLEAN THEN $7::TEXT ELSE description END, \
                published_year = COALESCE($8, published_year), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            BOOK_COLUMNS
        ))
        .bind(book_id)
        .bind(&changes.title)
        .bind(&changes.author)
        .bind(changes.genre.is_some())
        .bind(changes.genre.flatten())
        .bind(changes.description.is_some())
        .bind(changes.description.flatten())
        .bind(changes.published_year)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Book", book_id))?;
        Ok(record.to_domain())
    }

    async fn delete_book(&self, book_id: Uuid) -> PortResult<()> {
        // reviews go with the book through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Book {} not found", book_id)));
        }
        Ok(())
    }

    async fn create_review(&self, review: NewReview) -> PortResult<Review> {
        let record = sqlx::query_as::<_, ReviewRecord>(&format!(
            "INSERT INTO reviews (id, book_id, user_id, rating, comment) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            REVIEW_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(review.book_id)
        .bind(review.user_id)
        .bind(i16::from(review.rating.value()))
        .bind(&review.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        record.to_domain()
    }

    async fn get_review(&self, review_id: Uuid) -> PortResult<Review> {
        sqlx::query_as::<_, ReviewRecord>(&format!(
            "SELECT {} FROM reviews WHERE id = $1",
            REVIEW_COLUMNS
        ))
        .bind(review_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Review", review_id))?
        .to_domain()
    }

    async fn find_review(&self, book_id: Uuid, user_id: Uuid) -> PortResult<Option<Review>> {
        sqlx::query_as::<_, ReviewRecord>(&format!(
            "SELECT {} FROM reviews WHERE book_id = $1 AND user_id = $2",
            REVIEW_COLUMNS
        ))
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(ReviewRecord::to_domain)
        .transpose()
    }

    async fn list_reviews_for_book(&self, book_id: Uuid, page: Page) -> PortResult<Vec<Review>> {
        let (limit, offset) = page_bounds(page);
        sqlx::query_as::<_, ReviewRecord>(&format!(
            "SELECT {} FROM reviews WHERE book_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            REVIEW_COLUMNS
        ))
        .bind(book_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(ReviewRecord::to_domain)
        .collect()
    }

    async fn update_review(&self, review_id: Uuid, changes: ReviewChanges) -> PortResult<Review> {
        sqlx::query_as::<_, ReviewRecord>(&format!(
            "UPDATE reviews SET \
                rating = COALESCE($2, rating), \
                comment = CASE WHEN $3::BOOLEAN THEN $4::TEXT ELSE comment END, \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            REVIEW_COLUMNS
        ))
        .bind(review_id)
        .bind(changes.rating.map(|r| i16::from(r.value())))
        .bind(changes.comment.is_some())
        .bind(changes.comment.flatten())
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Review", review_id))?
        .to_domain()
    }

    async fn delete_review(&self, review_id: Uuid) -> PortResult<Review> {
        sqlx::query_as::<_, ReviewRecord>(&format!(
            "DELETE FROM reviews WHERE id = $1 RETURNING {}",
            REVIEW_COLUMNS
        ))
        .bind(review_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Review", review_id))?
        .to_domain()
    }

    async fn review_stats(&self, book_id: Uuid) -> PortResult<RatingSummary> {
        let (average_rating, reviews_count): (f64, i64) = sqlx::query_as(
            "SELECT COALESCE(AVG(rating)::DOUBLE PRECISION, 0), COUNT(*) \
             FROM reviews WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(RatingSummary {
            average_rating,
            reviews_count: reviews_count.max(0) as u64,
        })
    }

    async fn set_book_rating(&self, book_id: Uuid, summary: RatingSummary) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE books SET average_rating = $2, reviews_count = $3 WHERE id = $1",
        )
        .bind(book_id)
        .bind(summary.average_rating)
        .bind(summary.reviews_count as i64)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Book {} not found", book_id)));
        }
        Ok(())
    }
}
