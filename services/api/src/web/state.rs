//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use book_catalog_core::{CatalogStore, ReviewService, TokenService};
use chrono::Duration;

use crate::config::Config;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn CatalogStore>,
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub reviews: ReviewService,
}

impl AppState {
    /// Wires the token and review services over `db` from the loaded configuration.
    pub fn new(db: Arc<dyn CatalogStore>, config: Arc<Config>) -> Self {
        let tokens = TokenService::new(
            &config.jwt_secret,
            Duration::hours(config.token_expire_hours),
        );
        let reviews = ReviewService::new(db.clone());
        Self {
            db,
            config,
            tokens,
            reviews,
        }
    }
}
