mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use api_lib::error::ApiError;
use book_catalog_core::{Identity, Page, Rating, RatingSummary, ReviewChanges, ReviewError};
use serde_json::json;

use common::{
    app_state, app_state_with, bearer, create_book, send, signup, spawn_server, InstrumentedStore,
};

fn rating(value: i64) -> Rating {
    Rating::new(value).unwrap()
}

#[tokio::test]
async fn aggregate_tracks_every_create_and_delete() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let (alice, _) = signup(&state, "alice").await;
    let (bob, _) = signup(&state, "bob").await;
    let book = create_book(&state, &owner, "Dune").await;

    state.reviews.create(&alice, book.id, rating(4), None).await.unwrap();
    let five = state
        .reviews
        .create(&bob, book.id, rating(5), Some("Loved it".to_string()))
        .await
        .unwrap();
    assert_eq!(five.summary.average_rating, 4.5);
    assert_eq!(five.summary.reviews_count, 2);

    let stored = state.db.get_book(book.id).await.unwrap();
    assert_eq!(stored.average_rating, 4.5);
    assert_eq!(stored.reviews_count, 2);

    let after_delete = state.reviews.delete(&bob, five.review.id).await.unwrap();
    assert_eq!(after_delete.summary.average_rating, 4.0);
    assert_eq!(after_delete.summary.reviews_count, 1);

    let remaining = state
        .db
        .find_review(book.id, alice.user_id)
        .await
        .unwrap()
        .unwrap();
    let emptied = state.reviews.delete(&alice, remaining.id).await.unwrap();
    assert_eq!(emptied.summary, RatingSummary::EMPTY);

    let stored = state.db.get_book(book.id).await.unwrap();
    assert_eq!(stored.average_rating, 0.0);
    assert_eq!(stored.reviews_count, 0);
}

#[tokio::test]
async fn updating_a_rating_recomputes_the_average() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let (alice, _) = signup(&state, "alice").await;
    let (bob, _) = signup(&state, "bob").await;
    let book = create_book(&state, &owner, "Emma").await;

    let first = state.reviews.create(&alice, book.id, rating(1), None).await.unwrap();
    state.reviews.create(&bob, book.id, rating(2), None).await.unwrap();

    let updated = state
        .reviews
        .update(
            &alice,
            first.review.id,
            ReviewChanges {
                rating: Some(rating(5)),
                comment: Some(Some("Changed my mind".to_string())),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.review.rating.value(), 5);
    assert_eq!(updated.review.comment.as_deref(), Some("Changed my mind"));
    assert_eq!(updated.summary.average_rating, 3.5);
    assert_eq!(updated.summary.reviews_count, 2);
}

#[tokio::test]
async fn book_without_reviews_reports_zero() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let book = create_book(&state, &owner, "Untouched").await;

    assert_eq!(book.average_rating, 0.0);
    assert_eq!(book.reviews_count, 0);
    let summary = state.reviews.aggregator().recompute(book.id).await.unwrap();
    assert_eq!(summary, RatingSummary::EMPTY);
}

#[tokio::test]
async fn recompute_is_idempotent() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let book = create_book(&state, &owner, "Dune").await;
    for (i, value) in [5, 4, 4].into_iter().enumerate() {
        let (reviewer, _) = signup(&state, &format!("reader{i}")).await;
        state.reviews.create(&reviewer, book.id, rating(value), None).await.unwrap();
    }

    let aggregator = state.reviews.aggregator();
    let first = aggregator.recompute(book.id).await.unwrap();
    let second = aggregator.recompute(book.id).await.unwrap();
    assert_eq!(first.average_rating.to_bits(), second.average_rating.to_bits());
    assert_eq!(first.reviews_count, second.reviews_count);
    assert_eq!(first.average_rating, 13.0 / 3.0);
}

#[tokio::test]
async fn duplicate_review_writes_nothing_and_skips_recompute() {
    let store = Arc::new(InstrumentedStore::new());
    let state = app_state_with(store.clone());
    let (owner, _) = signup(&state, "owner").await;
    let (alice, _) = signup(&state, "alice").await;
    let book = create_book(&state, &owner, "Dune").await;

    state.reviews.create(&alice, book.id, rating(4), None).await.unwrap();
    let creates = store.review_creates();
    let writes = store.rating_writes();

    let err = state
        .reviews
        .create(&alice, book.id, rating(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::DuplicateReview));
    assert_eq!(ApiError::from(err).status().as_u16(), 400);

    assert_eq!(store.review_creates(), creates);
    assert_eq!(store.rating_writes(), writes);
    let reviews = state
        .db
        .list_reviews_for_book(book.id, Page::new(1, 10))
        .await
        .unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(state.db.get_book(book.id).await.unwrap().average_rating, 4.0);
}

#[tokio::test]
async fn concurrent_duplicate_submissions_leave_one_review() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let (alice, _) = signup(&state, "alice").await;
    let book = create_book(&state, &owner, "Dune").await;

    let attempts = (0..8).map(|i| {
        let state = state.clone();
        let (reviewer, book_id) = (alice, book.id);
        tokio::spawn(async move {
            state
                .reviews
                .create(&reviewer, book_id, rating(1 + i % 5), None)
                .await
        })
    });
    let mut created = 0;
    let mut duplicates = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        match attempt.await.unwrap() {
            Ok(_) => created += 1,
            Err(ReviewError::DuplicateReview) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(state.db.get_book(book.id).await.unwrap().reviews_count, 1);
}

#[tokio::test]
async fn concurrent_reviews_from_different_users_are_all_counted() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let book = create_book(&state, &owner, "Dune").await;
    let mut reviewers = Vec::new();
    for i in 0..6 {
        reviewers.push(signup(&state, &format!("reader{i}")).await.0);
    }

    let handles: Vec<_> = reviewers
        .into_iter()
        .map(|reviewer| {
            let state = state.clone();
            let book_id = book.id;
            tokio::spawn(async move {
                state.reviews.create(&reviewer, book_id, rating(3), None).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = state.db.get_book(book.id).await.unwrap();
    assert_eq!(stored.reviews_count, 6);
    assert_eq!(stored.average_rating, 3.0);
}

#[tokio::test]
async fn failed_recompute_surfaces_after_the_review_is_written() {
    let store = Arc::new(InstrumentedStore::new());
    let state = app_state_with(store.clone());
    let (owner, _) = signup(&state, "owner").await;
    let (alice, _) = signup(&state, "alice").await;
    let book = create_book(&state, &owner, "Dune").await;

    store.fail_rating_writes.store(true, Ordering::SeqCst);
    let err = state
        .reviews
        .create(&alice, book.id, rating(5), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Aggregation(_)));
    assert_eq!(ApiError::from(err).status().as_u16(), 500);

    // the review stays; the aggregate is stale until the next mutation
    assert!(state.db.find_review(book.id, alice.user_id).await.unwrap().is_some());
    assert_eq!(state.db.get_book(book.id).await.unwrap().reviews_count, 0);

    store.fail_rating_writes.store(false, Ordering::SeqCst);
    let summary = state.reviews.aggregator().recompute(book.id).await.unwrap();
    assert_eq!(summary.reviews_count, 1);
}

#[tokio::test]
async fn reviewing_a_missing_book_is_not_found() {
    let state = app_state();
    let (alice, _) = signup(&state, "alice").await;
    let err = state
        .reviews
        .create(&alice, uuid::Uuid::new_v4(), rating(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::BookNotFound(_)));
}

#[tokio::test]
async fn only_the_author_can_edit_a_review() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let (alice, _) = signup(&state, "alice").await;
    let mallory = Identity { user_id: uuid::Uuid::new_v4() };
    let book = create_book(&state, &owner, "Dune").await;
    let created = state.reviews.create(&alice, book.id, rating(4), None).await.unwrap();

    let update = state
        .reviews
        .update(
            &mallory,
            created.review.id,
            ReviewChanges {
                rating: Some(rating(1)),
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(update, ReviewError::NotAuthor));
    let delete = state.reviews.delete(&mallory, created.review.id).await.unwrap_err();
    assert!(matches!(delete, ReviewError::NotAuthor));

    let stored = state.db.get_review(created.review.id).await.unwrap();
    assert_eq!(stored.rating.value(), 4);
}

#[tokio::test]
async fn review_endpoints_validate_and_report_the_new_rating() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let (_, token) = signup(&state, "alice").await;
    let book = create_book(&state, &owner, "Dune").await;
    let addr = spawn_server(state.clone()).await;
    let path = format!("/api/reviews/books/{}", book.id);

    let out_of_range = send(addr, "POST", &path, &[bearer(&token)], Some(json!({ "rating": 6 }))).await;
    assert_eq!(out_of_range.status, 400);
    let fractional = send(addr, "POST", &path, &[bearer(&token)], Some(json!({ "rating": 4.5 }))).await;
    assert_eq!(fractional.status, 400);

    let created = send(
        addr,
        "POST",
        &path,
        &[bearer(&token)],
        Some(json!({ "rating": 4, "comment": "Sandworms!" })),
    )
    .await;
    assert_eq!(created.status, 201);
    let body = created.json();
    assert_eq!(body["data"]["rating"], json!(4));
    assert_eq!(body["data"]["bookRating"]["averageRating"], json!(4.0));
    assert_eq!(body["data"]["bookRating"]["reviewsCount"], json!(1));

    let again = send(addr, "POST", &path, &[bearer(&token)], Some(json!({ "rating": 2 }))).await;
    assert_eq!(again.status, 400);
    assert_eq!(again.json()["error"], json!("You have already reviewed this book"));

    let review_id = body["data"]["id"].as_str().unwrap().to_string();
    let deleted = send(
        addr,
        "DELETE",
        &format!("/api/reviews/{review_id}"),
        &[bearer(&token)],
        None,
    )
    .await;
    assert_eq!(deleted.status, 200);
    assert_eq!(deleted.json()["data"]["reviewsCount"], json!(0));
}

#[tokio::test]
async fn mistyped_review_body_gets_the_error_envelope() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let (_, token) = signup(&state, "alice").await;
    let book = create_book(&state, &owner, "Dune").await;
    let addr = spawn_server(state.clone()).await;

    let response = send(
        addr,
        "POST",
        &format!("/api/reviews/books/{}", book.id),
        &[bearer(&token)],
        Some(json!({ "rating": "5" })),
    )
    .await;
    assert_eq!(response.status, 400);
    let body = response.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["errors"][0]["field"], json!("body"));
    assert_eq!(state.db.get_book(book.id).await.unwrap().reviews_count, 0);
}

#[tokio::test]
async fn blank_comment_on_update_removes_it() {
    let state = app_state();
    let (owner, _) = signup(&state, "owner").await;
    let (alice, token) = signup(&state, "alice").await;
    let book = create_book(&state, &owner, "Dune").await;
    let created = state
        .reviews
        .create(&alice, book.id, rating(4), Some("Sandworms!".to_string()))
        .await
        .unwrap();
    let addr = spawn_server(state.clone()).await;

    let patched = send(
        addr,
        "PATCH",
        &format!("/api/reviews/{}", created.review.id),
        &[bearer(&token)],
        Some(json!({ "comment": "  " })),
    )
    .await;
    assert_eq!(patched.status, 200);
    let body = patched.json();
    assert_eq!(body["data"]["comment"], json!(null));
    assert_eq!(body["data"]["rating"], json!(4));
    assert_eq!(body["data"]["user"]["username"], json!("alice"));

    let stored = state.db.get_review(created.review.id).await.unwrap();
    assert_eq!(stored.comment, None);
}
