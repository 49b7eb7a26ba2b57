//! `POST /v1/tokens/authentication`.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::database::StoreError;
use crate::error::{Result, ServerError};
use crate::router::Valid;
use crate::token::Scope;
use crate::user::{Credentials, normalize_email};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub authentication_token: AuthenticationToken,
}

/// Exchange e-mail and password for an authentication token.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Credentials>,
) -> Result<(StatusCode, Json<Response>)> {
    let account = match state
        .db
        .accounts
        .find_by_email(&normalize_email(&body.email))
        .await
    {
        Ok(account) => account,
        Err(StoreError::RecordNotFound) => {
            // same Argon2 cost as a wrong password.
            state.crypto.pwd.verify_decoy(&body.password)?;
            return Err(ServerError::InvalidCredentials);
        },
        Err(err) => return Err(err.into()),
    };

    if !state
        .crypto
        .pwd
        .verify_password(&body.password, &account.password_hash)?
    {
        return Err(ServerError::InvalidCredentials);
    }

    let token = state
        .token
        .issue(
            account.id,
            Scope::Authentication,
            Duration::seconds(state.config.token.authentication_ttl),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Response {
            authentication_token: AuthenticationToken {
                token: token.plaintext,
                expiry: token.record.expiry,
            },
        }),
    ))
}
