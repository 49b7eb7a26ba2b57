//! Users-related HTTP API: registration and activation.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::database::StoreError;
use crate::error::{Result, ServerError};
use crate::mail::{self, Content, Template::Welcome};
use crate::router::Valid;
use crate::token::Scope;
use crate::user::{
    Account, Activation, MOVIES_READ, NewAccount, Registration, normalize_email,
};
use crate::validation::failure;

#[derive(Debug, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: Account,
}

pub fn router() -> Router<AppState> {
    Router::new()
        // `POST /v1/users` goes to `register`.
        .route("/v1/users", post(register))
        // `PUT /v1/users/activated` goes to `activate`.
        .route("/v1/users/activated", put(activate))
}

fn invalid_activation_token() -> ServerError {
    let mut errors = validator::ValidationErrors::new();
    errors.add(
        "token",
        failure("invalid", "invalid or expired activation token"),
    );
    errors.into()
}

/// `POST /v1/users`.
pub async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<Registration>,
) -> Result<(StatusCode, Json<UserEnvelope>)> {
    let account = state
        .db
        .accounts
        .insert(&NewAccount {
            name: body.name,
            email: normalize_email(&body.email),
            password_hash: state.crypto.pwd.hash_password(&body.password)?,
        })
        .await?;

    state.db.accounts.grant(account.id, &[MOVIES_READ]).await?;

    let token = state
        .token
        .issue(
            account.id,
            Scope::Activation,
            Duration::seconds(state.config.token.activation_ttl),
        )
        .await?;

    mail::dispatch(
        Arc::clone(&state.mail),
        Content {
            to: account.email.clone().into(),
            template: Welcome,
            user_id: account.id,
            activation_token: Some(token.plaintext.into()),
        },
    );

    tracing::info!(user_id = account.id, "user registered");
    Ok((StatusCode::CREATED, Json(UserEnvelope { user: account })))
}

/// `PUT /v1/users/activated`.
pub async fn activate(
    State(state): State<AppState>,
    Valid(body): Valid<Activation>,
) -> Result<Json<UserEnvelope>> {
    let mut account = state
        .token
        .verify(&body.token, Scope::Activation)
        .await?
        .ok_or_else(invalid_activation_token)?;

    // claim the token before touching the account: a concurrent request
    // holding the same token loses here.
    match state.token.consume(&state.token.digest(&body.token)).await {
        Ok(()) => {},
        Err(StoreError::RecordNotFound) => return Err(invalid_activation_token()),
        Err(err) => return Err(err.into()),
    }

    account.activated = true;
    let account = state.db.accounts.update(&account).await?;
    state.token.revoke_all(account.id, Scope::Activation).await?;

    tracing::info!(user_id = account.id, "user activated");
    Ok(Json(UserEnvelope { user: account }))
}
