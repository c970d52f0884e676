//! Input rules shared by entity factories and request handlers

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error_code::ErrorCode;

/// Email addresses accepted at signup and on every email-keyed endpoint
#[allow(clippy::expect_used)] // Static pattern, verified by tests
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9!#$%&'*+\-/=?^_`{|}~.]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,4}$")
        .expect("email pattern must compile")
});

#[allow(clippy::expect_used)] // Static pattern, verified by tests
static OTP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{6}$").expect("otp pattern must compile"));

pub const PASSWORD_MIN_LENGTH: usize = 6;
pub const PASSWORD_MAX_LENGTH: usize = 100;
pub const EMAIL_MIN_LENGTH: usize = 3;
pub const EMAIL_MAX_LENGTH: usize = 100;
pub const USER_NAME_MAX_LENGTH: usize = 50;
pub const OTP_LENGTH: usize = 6;

/// Rejected input, carrying the code the client should branch on
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(
            ErrorCode::RequiredParameterMissing,
            format!("required parameter missing: {field}"),
        )
    }
}

/// Trim and lowercase an email so lookups and writes agree on one spelling
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    (EMAIL_MIN_LENGTH..=EMAIL_MAX_LENGTH).contains(&email.len()) && EMAIL_PATTERN.is_match(email)
}

/// 6-100 characters with at least one uppercase letter, one lowercase letter and one digit
pub fn is_valid_password(password: &str) -> bool {
    let length = password.chars().count();
    (PASSWORD_MIN_LENGTH..=PASSWORD_MAX_LENGTH).contains(&length)
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

pub fn is_valid_otp(code: &str) -> bool {
    OTP_PATTERN.is_match(code)
}

/// Treat absent and blank strings alike, mirroring how required fields are checked
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
