//! HTTP surface.
pub mod movies;
pub mod status;
pub mod tokens;
pub mod users;

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::http::Method;
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use validator::Validate;

use crate::error::{Result, ServerError};

/// Decoded and validated JSON body.
///
/// Broken JSON is a [`ServerError::BadRequest`]; rule violations are a
/// [`ServerError::Validation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let bytes = Bytes::from_request(req, state).await?;
        let value: T = read_json(&bytes)?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Decode a JSON body into `T`, describing what is wrong with it.
pub fn read_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServerError::BadRequest("body must not be empty".into()));
    }

    serde_json::from_slice(body).map_err(|err| {
        let message = match err.classify() {
            Category::Syntax if err.to_string().starts_with("trailing") => {
                "body must only contain a single JSON value".to_owned()
            },
            Category::Syntax => format!(
                "body contains badly-formed JSON (at line {} column {})",
                err.line(),
                err.column()
            ),
            Category::Eof => "body contains badly-formed JSON".to_owned(),
            Category::Data if err.to_string().starts_with("unknown field") => {
                format!("body contains unknown key: {err}")
            },
            Category::Data => format!("body contains incorrect JSON type: {err}"),
            Category::Io => format!("body could not be read: {err}"),
        };
        ServerError::BadRequest(message)
    })
}

/// Record ids are positive integers; anything else is simply not found.
pub fn parse_id(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ServerError::NotFound)
}

/// Record id taken from the `{id}` path segment.
///
/// A segment that cannot even be decoded is as unknown as a missing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(pub i64);

impl<S> FromRequestParts<S> for RecordId
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ServerError::NotFound)?;

        parse_id(&raw).map(RecordId)
    }
}

/// Fallback for unknown routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

/// Fallback for known routes hit with another method.
pub async fn method_not_allowed(method: Method) -> ServerError {
    ServerError::MethodNotAllowed(method)
}
