//! services/api/src/web/validation.rs
//!
//! Field-level input checks. Every check runs before any write and all
//! failures for a request are reported together.

use std::sync::OnceLock;

use book_catalog_core::{Page, Rating};
use chrono::{Datelike, Utc};
use regex::Regex;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_COMMENT_LEN: usize = 1000;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Collects field errors and turns them into a single `ApiError::Validation`.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    /// Records at most one error for `field`: the first failed rule.
    pub fn rules(&mut self, field: &str, rules: &[(bool, &str)]) -> &mut Self {
        if let Some((_, message)) = rules.iter().find(|(ok, _)| !ok) {
            self.errors.push(FieldError::new(field, *message));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
    })
}

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn check_username(v: &mut Validator, username: &str) {
    v.rules(
        "username",
        &[
            (!username.is_empty(), "Username is required"),
            (
                username.chars().count() >= MIN_USERNAME_LEN,
                "Username must be at least 3 characters",
            ),
        ],
    );
}

pub fn check_email(v: &mut Validator, email: &str) {
    v.rules(
        "email",
        &[
            (!email.is_empty(), "Email is required"),
            (email_pattern().is_match(email), "Invalid email format"),
        ],
    );
}

pub fn check_new_password(v: &mut Validator, password: &str) {
    v.rules(
        "password",
        &[
            (!password.is_empty(), "Password is required"),
            (
                password.chars().count() >= MIN_PASSWORD_LEN,
                "Password must be at least 8 characters",
            ),
            (
                password.chars().any(|c| c.is_ascii_uppercase()),
                "Password must contain at least one uppercase letter",
            ),
            (
                password.chars().any(|c| c.is_ascii_lowercase()),
                "Password must contain at least one lowercase letter",
            ),
            (
                password.chars().any(|c| c.is_ascii_digit()),
                "Password must contain at least one number",
            ),
        ],
    );
}

pub fn check_required(v: &mut Validator, field: &str, value: &str) {
    v.check(!value.trim().is_empty(), field, &format!("{} is required", field));
}

pub fn check_published_year(v: &mut Validator, year: Option<i32>) {
    if let Some(year) = year {
        let latest = Utc::now().year() + 1;
        v.check(
            (0..=latest).contains(&year),
            "publishedYear",
            "Published year is out of range",
        );
    }
}

/// Parses a rating, recording an error unless it is a whole number in `1..=5`.
pub fn check_rating(v: &mut Validator, rating: Option<f64>) -> Option<Rating> {
    let Some(rating) = rating else {
        v.check(false, "rating", "Rating is required");
        return None;
    };
    let parsed = (rating.fract() == 0.0)
        .then(|| Rating::new(rating as i64).ok())
        .flatten();
    if parsed.is_none() {
        v.check(false, "rating", "Rating must be an integer between 1 and 5");
    }
    parsed
}

pub fn check_comment(v: &mut Validator, comment: Option<&str>) {
    if let Some(comment) = comment {
        v.check(
            comment.chars().count() <= MAX_COMMENT_LEN,
            "comment",
            "Comment must be at most 1000 characters",
        );
    }
}

/// Builds a page from optional query parameters.
pub fn page_from(
    page: Option<u32>,
    limit: Option<u32>,
    default_limit: u32,
) -> Result<Page, ApiError> {
    let number = page.unwrap_or(1);
    let limit = limit.unwrap_or(default_limit);
    Validator::new()
        .check(number >= 1, "page", "Page must be at least 1")
        .check(
            (1..=MAX_PAGE_LIMIT).contains(&limit),
            "limit",
            "Limit must be between 1 and 100",
        )
        .finish()?;
    Ok(Page::new(number, limit))
}

/// Trims an optional text field, dropping it when blank.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_of(f: impl FnOnce(&mut Validator)) -> Vec<FieldError> {
        let mut v = Validator::new();
        f(&mut v);
        match v.finish() {
            Ok(()) => Vec::new(),
            Err(ApiError::Validation(errors)) => errors,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn password_rules_report_the_first_failure() {
        let errors = errors_of(|v| check_new_password(v, "short"));
        assert_eq!(
            errors,
            vec![FieldError::new("password", "Password must be at least 8 characters")]
        );

        let errors = errors_of(|v| check_new_password(v, "alllowercase1"));
        assert_eq!(
            errors[0].message,
            "Password must contain at least one uppercase letter"
        );

        let errors = errors_of(|v| check_new_password(v, "NoDigitsHere"));
        assert_eq!(errors[0].message, "Password must contain at least one number");

        assert!(errors_of(|v| check_new_password(v, "Sup3rSecret")).is_empty());
    }

    #[test]
    fn emails_are_checked_and_normalized() {
        assert!(errors_of(|v| check_email(v, "reader@example.com")).is_empty());
        assert_eq!(errors_of(|v| check_email(v, "not-an-email")).len(), 1);
        assert_eq!(errors_of(|v| check_email(v, ""))[0].message, "Email is required");
        assert_eq!(normalize_email("  Reader@Example.COM "), "reader@example.com");
    }

    #[test]
    fn errors_accumulate_across_fields() {
        let errors = errors_of(|v| {
            check_username(v, "ab");
            check_email(v, "nope");
            check_new_password(v, "Passw0rdOk");
        });
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["username", "email"]);
    }

    #[test]
    fn ratings_must_be_whole_numbers_in_range() {
        for bad in [Some(6.0), Some(0.0), Some(4.5), Some(-1.0), None] {
            let mut v = Validator::new();
            assert!(check_rating(&mut v, bad).is_none(), "{bad:?} accepted");
            assert!(v.finish().is_err());
        }

        let mut v = Validator::new();
        assert_eq!(check_rating(&mut v, Some(3.0)).map(Rating::value), Some(3));
        assert!(v.finish().is_ok());
    }

    #[test]
    fn pages_default_and_bound_their_limit() {
        assert_eq!(page_from(None, None, 10).unwrap(), Page::new(1, 10));
        assert_eq!(page_from(Some(2), Some(5), 10).unwrap(), Page::new(2, 5));
        assert!(page_from(Some(0), None, 10).is_err());
        assert!(page_from(None, Some(0), 10).is_err());
        assert!(page_from(None, Some(101), 10).is_err());
    }

    #[test]
    fn blank_optional_text_is_dropped() {
        assert_eq!(non_blank(Some("  Fantasy ".into())), Some("Fantasy".into()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
