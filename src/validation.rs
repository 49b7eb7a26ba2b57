//! Field rules shared by request bodies.
//!
//! Each rule carries its own client-facing message; the first failing rule of
//! a field is the one reported.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Datelike;
use regex_lite::Regex;
use validator::ValidationError;

use crate::token::PLAINTEXT_LENGTH;

pub const MAX_TITLE_BYTES: usize = 500;
pub const MAX_NAME_BYTES: usize = 500;
pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MAX_GENRES: usize = 5;
pub const FIRST_FILM_YEAR: i32 = 1888;

const RUNTIME_FORMAT: &str = "must be formatted as \"<N> mins\"";

static RUNTIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+ mins$").expect("runtime pattern is valid")
});

/// Build a [`ValidationError`] with a message.
pub fn failure(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.is_empty() {
        return Err(failure("required", "must be provided"));
    }
    if title.len() > MAX_TITLE_BYTES {
        return Err(failure("length", "must not be more than 500 bytes long"));
    }
    Ok(())
}

pub fn validate_year(year: i32) -> Result<(), ValidationError> {
    if year == 0 {
        return Err(failure("required", "must be provided"));
    }
    if year < FIRST_FILM_YEAR {
        return Err(failure("range", "must be greater than 1888"));
    }
    if year > chrono::Utc::now().year() {
        return Err(failure("range", "must not be in the future"));
    }
    Ok(())
}

/// Runtime travels as `"<N> mins"`.
pub fn validate_runtime(runtime: &str) -> Result<(), ValidationError> {
    if runtime.is_empty() {
        return Err(failure("required", "must be provided"));
    }
    if !RUNTIME.is_match(runtime) {
        return Err(failure("format", RUNTIME_FORMAT));
    }
    match runtime.trim_end_matches(" mins").parse::<i32>() {
        Ok(minutes) if minutes > 0 => Ok(()),
        Ok(_) => Err(failure("range", "must be a positive integer")),
        Err(_) => Err(failure("format", RUNTIME_FORMAT)),
    }
}

pub fn validate_genres(genres: &[String]) -> Result<(), ValidationError> {
    if genres.is_empty() {
        return Err(failure("required", "must contain at least 1 genre"));
    }
    if genres.len() > MAX_GENRES {
        return Err(failure("length", "must not contain more than 5 genres"));
    }
    if genres.iter().any(String::is_empty) {
        return Err(failure("required", "must not contain empty values"));
    }

    let mut seen = HashSet::with_capacity(genres.len());
    if !genres.iter().all(|genre| seen.insert(genre)) {
        return Err(failure("unique", "must not contain duplicate values"));
    }
    Ok(())
}

/// Upper bound in bytes; emptiness is checked by `length(min = 1)`.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.len() > MAX_NAME_BYTES {
        return Err(failure("length", "must not be more than 500 bytes long"));
    }
    Ok(())
}

/// Byte bounds; emptiness is checked by `length(min = 1)`.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < MIN_PASSWORD_BYTES {
        return Err(failure("length", "must be at least 8 bytes long"));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(failure("length", "must not be more than 72 bytes long"));
    }
    Ok(())
}

/// Also used on `Authorization` headers, so it checks emptiness itself.
pub fn validate_token_plaintext(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(failure("required", "must be provided"));
    }
    if token.len() != PLAINTEXT_LENGTH {
        return Err(failure("length", "must be 26 bytes long"));
    }
    Ok(())
}
