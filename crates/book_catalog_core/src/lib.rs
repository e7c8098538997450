pub mod domain;
pub mod ports;
pub mod rating;
pub mod reviews;
pub mod token;

pub use domain::{
    Book, BookChanges, BookFilter, Identity, InvalidRating, NewBook, NewReview, Page, Rating,
    RatingSummary, Review, ReviewChanges, User, UserCredentials,
};
pub use ports::{CatalogStore, PortError, PortResult};
pub use rating::{BookLocks, RatingAggregator};
pub use reviews::{ReviewError, ReviewMutation, ReviewService};
pub use token::{TokenError, TokenService};
