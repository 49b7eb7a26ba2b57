//! Middlewares for routes.

use std::any::Any;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Response, header};
use axum::middleware::Next;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::Scope;
use crate::user::Account;
use crate::validation::validate_token_plaintext;

const BEARER: &str = "Bearer ";

/// Who is behind a request.
#[derive(Clone, Debug, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Account(Account),
}

/// Resolve the `Authorization` header into an [`Identity`].
///
/// No header means anonymous; a header that does not resolve is rejected.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<axum::response::Response> {
    let identity = match req.headers().get(header::AUTHORIZATION) {
        None => Identity::Anonymous,
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix(BEARER))
                .ok_or(ServerError::InvalidToken)?;

            if validate_token_plaintext(token).is_err() {
                return Err(ServerError::InvalidToken);
            }

            match state.token.verify(token, Scope::Authentication).await? {
                Some(account) => Identity::Account(account),
                None => return Err(ServerError::InvalidToken),
            }
        },
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Require an activated account holding `permission`.
pub async fn require_permission(
    State((state, permission)): State<(AppState, &'static str)>,
    req: Request,
    next: Next,
) -> Result<axum::response::Response> {
    let account = match req.extensions().get::<Identity>() {
        Some(Identity::Account(account)) => account,
        Some(Identity::Anonymous) | None => {
            return Err(ServerError::AuthenticationRequired);
        },
    };

    if !account.activated {
        return Err(ServerError::InactiveAccount);
    }

    let permissions = state.db.accounts.permissions(account.id).await?;
    if !permissions.includes(permission) {
        return Err(ServerError::NotPermitted);
    }

    Ok(next.run(req).await)
}

/// Turn a panic inside a handler into the fixed 500 response.
pub fn recover_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic message"
    };
    tracing::error!(%details, "handler panicked, server returned 500 status");

    let mut response = crate::error::internal_server_error();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
