//! services/api/src/web/reviews.rs
//!
//! Review endpoints. Every mutation goes through `ReviewService`, which
//! recomputes the book's rating before the response is sent.

use axum::{extract::State, http::StatusCode, Json};
use book_catalog_core::{ReviewChanges, ReviewMutation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{JsonBody, PathParam};
use crate::web::middleware::Authenticated;
use crate::web::rest::{Envelope, RatingResponse, ReviewResponse, Usernames};
use crate::web::state::AppState;
use crate::web::validation::{check_comment, check_rating, non_blank, Validator};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    /// Whole number from 1 to 5.
    pub rating: Option<f64>,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateReviewRequest {
    pub rating: Option<f64>,
    pub comment: Option<String>,
}

/// A review together with its book's rating after the mutation.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewMutationResponse {
    #[serde(flatten)]
    pub review: ReviewResponse,
    pub book_rating: RatingResponse,
}

impl ReviewMutationResponse {
    /// Resolves the reviewer's username and builds the response.
    async fn load(state: &AppState, mutation: ReviewMutation) -> Result<Self, ApiError> {
        let users = Usernames::load(state.db.as_ref(), [mutation.review.user_id]).await?;
        Ok(Self {
            review: ReviewResponse::new(mutation.review, &users),
            book_rating: mutation.summary.into(),
        })
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/reviews/books/{book_id} - Review a book (once per user)
#[utoipa::path(
    post,
    path = "/api/reviews/books/{book_id}",
    params(("book_id" = Uuid, Path, description = "Book id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = Envelope<ReviewMutationResponse>),
        (status = 400, description = "Invalid input or book already reviewed"),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Book not found"),
        (status = 500, description = "Rating could not be recomputed")
    )
)]
pub async fn create_review_handler(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    PathParam(book_id): PathParam<Uuid>,
    JsonBody(req): JsonBody<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Envelope<ReviewMutationResponse>>), ApiError> {
    let mut validator = Validator::new();
    let rating = check_rating(&mut validator, req.rating);
    check_comment(&mut validator, req.comment.as_deref());
    validator.finish()?;
    let rating = rating.ok_or_else(|| ApiError::validation("rating", "Rating is required"))?;

    let mutation = state
        .reviews
        .create(&identity, book_id, rating, non_blank(req.comment))
        .await?;
    let body = ReviewMutationResponse::load(&state, mutation).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(body))))
}

/// PATCH /api/reviews/{id} - Change the rating or comment of the caller's review
#[utoipa::path(
    patch,
    path = "/api/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review id")),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Review updated", body = Envelope<ReviewMutationResponse>),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller did not write the review"),
        (status = 404, description = "Review not found"),
        (status = 500, description = "Rating could not be recomputed")
    )
)]
pub async fn update_review_handler(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    PathParam(review_id): PathParam<Uuid>,
    JsonBody(req): JsonBody<UpdateReviewRequest>,
) -> Result<Json<Envelope<ReviewMutationResponse>>, ApiError> {
    let mut validator = Validator::new();
    let rating = match req.rating {
        Some(value) => check_rating(&mut validator, Some(value)),
        None => None,
    };
    check_comment(&mut validator, req.comment.as_deref());
    validator.finish()?;

    let changes = ReviewChanges {
        rating,
        comment: req.comment.map(|c| non_blank(Some(c))),
    };
    let mutation = state.reviews.update(&identity, review_id, changes).await?;
    let body = ReviewMutationResponse::load(&state, mutation).await?;
    Ok(Json(Envelope::ok(body)))
}

/// DELETE /api/reviews/{id} - Delete the caller's review
#[utoipa::path(
    delete,
    path = "/api/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review deleted; data is the book's new rating", body = Envelope<RatingResponse>),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller did not write the review"),
        (status = 404, description = "Review not found"),
        (status = 500, description = "Rating could not be recomputed")
    )
)]
pub async fn delete_review_handler(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    PathParam(review_id): PathParam<Uuid>,
) -> Result<Json<Envelope<RatingResponse>>, ApiError> {
    let mutation = state.reviews.delete(&identity, review_id).await?;
    Ok(Json(Envelope::ok(mutation.summary.into())))
}
