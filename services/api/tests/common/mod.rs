#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use api_lib::adapters::MemoryStore;
use api_lib::config::Config;
use api_lib::web::extract::JsonBody;
use api_lib::web::{self, auth, state::AppState};
use async_trait::async_trait;
use axum::extract::State;
use axum::Json;
use book_catalog_core::{
    Book, BookChanges, BookFilter, CatalogStore, Identity, NewBook, NewReview, Page, PortError,
    PortResult, RatingSummary, Review, ReviewChanges, User, UserCredentials,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

pub const PASSWORD: &str = "Sup3rSecret";

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some("integration_test_secret".to_string()),
        "JWT_COOKIE_EXPIRE_HOURS" => Some("2".to_string()),
        _ => None,
    })
    .expect("test configuration is valid")
}

pub fn app_state_with(store: Arc<dyn CatalogStore>) -> Arc<AppState> {
    Arc::new(AppState::new(store, Arc::new(test_config())))
}

pub fn app_state() -> Arc<AppState> {
    app_state_with(Arc::new(MemoryStore::new()))
}

/// Signs up `username` and returns its identity and session token.
pub async fn signup(state: &Arc<AppState>, username: &str) -> (Identity, String) {
    let (_, _, Json(body)) = auth::signup_handler(
        State(state.clone()),
        JsonBody(auth::SignupRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: PASSWORD.to_string(),
        }),
    )
    .await
    .expect("signup succeeds");
    (Identity { user_id: body.user_id }, body.token)
}

pub async fn create_book(state: &Arc<AppState>, owner: &Identity, title: &str) -> Book {
    state
        .db
        .create_book(NewBook {
            title: title.to_string(),
            author: "Test Author".to_string(),
            genre: Some("Fiction".to_string()),
            description: None,
            published_year: Some(2001),
            created_by: owner.user_id,
        })
        .await
        .expect("book is created")
}

//=========================================================================================
// Loopback HTTP
//=========================================================================================

/// Serves the API router on an ephemeral loopback port.
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = web::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

/// Sends one HTTP/1.1 request and reads the response until the server closes.
pub async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, String)],
    body: Option<serde_json::Value>,
) -> HttpResponse {
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    if !body.is_empty() {
        request.push_str("Content-Type: application/json\r\n");
    }
    request.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8_lossy(&raw).to_string();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("response has a status line");
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    HttpResponse { status, body }
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

pub fn token_cookie(token: &str) -> (&'static str, String) {
    ("Cookie", format!("token={token}"))
}

//=========================================================================================
// Instrumented Store
//=========================================================================================

/// Wraps a `MemoryStore`, counting writes and optionally failing the
/// rating write-back.
#[derive(Default)]
pub struct InstrumentedStore {
    inner: MemoryStore,
    pub review_creates: AtomicUsize,
    pub rating_writes: AtomicUsize,
    pub fail_rating_writes: AtomicBool,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rating_writes(&self) -> usize {
        self.rating_writes.load(Ordering::SeqCst)
    }

    pub fn review_creates(&self) -> usize {
        self.review_creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogStore for InstrumentedStore {
    async fn create_user(&self, username: &str, email: &str, hashed: &str) -> PortResult<User> {
        self.inner.create_user(username, email, hashed).await
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.inner.get_user_by_email(email).await
    }

    async fn usernames(&self, user_ids: &[Uuid]) -> PortResult<HashMap<Uuid, String>> {
        self.inner.usernames(user_ids).await
    }

    async fn create_book(&self, book: NewBook) -> PortResult<Book> {
        self.inner.create_book(book).await
    }

    async fn get_book(&self, book_id: Uuid) -> PortResult<Book> {
        self.inner.get_book(book_id).await
    }

    async fn list_books(&self, filter: &BookFilter, page: Page) -> PortResult<Vec<Book>> {
        self.inner.list_books(filter, page).await
    }

    async fn search_books(&self, query: &str, page: Page) -> PortResult<(Vec<Book>, u64)> {
        self.inner.search_books(query, page).await
    }

    async fn update_book(&self, book_id: Uuid, changes: BookChanges) -> PortResult<Book> {
        self.inner.update_book(book_id, changes).await
    }

    async fn delete_book(&self, book_id: Uuid) -> PortResult<()> {
        self.inner.delete_book(book_id).await
    }

    async fn create_review(&self, review: NewReview) -> PortResult<Review> {
        self.review_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_review(review).await
    }

    async fn get_review(&self, review_id: Uuid) -> PortResult<Review> {
        self.inner.get_review(review_id).await
    }

    async fn find_review(&self, book_id: Uuid, user_id: Uuid) -> PortResult<Option<Review>> {
        self.inner.find_review(book_id, user_id).await
    }

    async fn list_reviews_for_book(&self, book_id: Uuid, page: Page) -> PortResult<Vec<Review>> {
        self.inner.list_reviews_for_book(book_id, page).await
    }

    async fn update_review(&self, review_id: Uuid, changes: ReviewChanges) -> PortResult<Review> {
        self.inner.update_review(review_id, changes).await
    }

    async fn delete_review(&self, review_id: Uuid) -> PortResult<Review> {
        self.inner.delete_review(review_id).await
    }

    async fn review_stats(&self, book_id: Uuid) -> PortResult<RatingSummary> {
        self.inner.review_stats(book_id).await
    }

    async fn set_book_rating(&self, book_id: Uuid, summary: RatingSummary) -> PortResult<()> {
        self.rating_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_rating_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("rating write refused".to_string()));
        }
        self.inner.set_book_rating(book_id, summary).await
    }
}
