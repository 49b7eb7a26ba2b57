//! Error handler for greenlight.

use std::collections::BTreeMap;

use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::database::StoreError;

pub type Result<T> = std::result::Result<T, ServerError>;

pub const INTERNAL_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("body must not be larger than the accepted limit")]
    PayloadTooLarge,

    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("invalid or missing authentication token")]
    InvalidToken,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    InactiveAccount,

    #[error(
        "your user account doesn't have the necessary permissions to access this resource"
    )]
    NotPermitted,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("store failure: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Shortcut for an internal error with a description.
    pub fn internal(details: impl Into<String>) -> Self {
        ServerError::Internal {
            details: details.into(),
            source: None,
        }
    }

    /// HTTP status chosen for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::InvalidCredentials
            | ServerError::InvalidToken
            | ServerError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ServerError::InactiveAccount | ServerError::NotPermitted => StatusCode::FORBIDDEN,
            ServerError::EditConflict => StatusCode::CONFLICT,
            ServerError::Store(_) | ServerError::Crypto(_) | ServerError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

/// Store outcomes are mapped here, and only here, to HTTP semantics.
impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RecordNotFound => ServerError::NotFound,
            StoreError::EditConflict => ServerError::EditConflict,
            StoreError::DuplicateEmail => ServerError::Validation(duplicate_email()),
            err => ServerError::Store(err),
        }
    }
}

impl From<BytesRejection> for ServerError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge
        } else {
            ServerError::BadRequest(rejection.body_text())
        }
    }
}

/// Validation error raised when an email is already registered.
pub fn duplicate_email() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "email",
        validator::ValidationError::new("duplicate")
            .with_message("a user with this email address already exists".into()),
    );
    errors
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Message {
    Text(String),
    Fields(BTreeMap<String, String>),
}

#[derive(Debug, Serialize)]
struct ResponseError {
    error: Message,
}

/// Keep the first message of each field.
fn parse_validation_errors(errors: &ValidationErrors) -> BTreeMap<String, String> {
    errors
        .field_errors()
        .iter()
        .filter_map(|(field, issues)| {
            issues.first().map(|issue| {
                let message = issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string());
                (field.to_string(), message)
            })
        })
        .collect()
}

/// Encode `{"error": ...}` with a JSON content type.
fn json_response(status: StatusCode, error: Message) -> Response {
    match serde_json::to_string(&ResponseError { error }) {
        Ok(body) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap_or_else(|_| internal_server_error()),
        Err(_) => internal_server_error(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            ServerError::Validation(ref errors) => json_response(
                status,
                Message::Fields(parse_validation_errors(errors)),
            ),

            ServerError::InvalidToken => {
                let mut response = json_response(status, Message::Text(self.to_string()));
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            },

            ServerError::Store(ref err) => {
                tracing::error!(error = %err, "store failure, server returned 500 status");
                internal_server_error()
            },

            ServerError::Crypto(ref err) => {
                tracing::error!(error = %err, "crypto failure, server returned 500 status");
                internal_server_error()
            },

            ServerError::Internal {
                ref details,
                ref source,
            } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                internal_server_error()
            },

            _ => json_response(status, Message::Text(self.to_string())),
        }
    }
}

/// Fixed, non-leaking 500 response.
pub fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({ "error": INTERNAL_MESSAGE })
                .to_string()
                .into(),
        )
        .unwrap_or_else(|_| Response::new(INTERNAL_MESSAGE.into()))
}
