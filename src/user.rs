//! Accounts, registration bodies and permission codes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Grants listing and showing movies.
pub const MOVIES_READ: &str = "movies:read";
/// Grants creating, updating and deleting movies.
pub const MOVIES_WRITE: &str = "movies:write";

/// Account as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// Fields needed to insert an account.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub name: String,
    /// Already lowercase.
    pub email: String,
    pub password_hash: String,
}

/// Body of `POST /v1/users`.
///
/// Keys also match their capitalised form, as sent by clients encoding
/// untagged structs.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Registration {
    #[serde(alias = "Name")]
    #[validate(
        length(min = 1, message = "must be provided"),
        custom(function = "crate::validation::validate_name")
    )]
    pub name: String,
    #[serde(alias = "Email")]
    #[validate(
        length(min = 1, message = "must be provided"),
        email(message = "must be a valid email address")
    )]
    pub email: String,
    #[serde(alias = "Password")]
    #[validate(
        length(min = 1, message = "must be provided"),
        custom(function = "crate::validation::validate_password")
    )]
    pub password: String,
}

/// Body of `POST /v1/tokens/authentication`.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Credentials {
    #[serde(alias = "Email")]
    #[validate(
        length(min = 1, message = "must be provided"),
        email(message = "must be a valid email address")
    )]
    pub email: String,
    #[serde(alias = "Password")]
    #[validate(
        length(min = 1, message = "must be provided"),
        custom(function = "crate::validation::validate_password")
    )]
    pub password: String,
}

/// Body of `PUT /v1/users/activated`.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Activation {
    #[serde(alias = "Token")]
    #[validate(custom(function = "crate::validation::validate_token_plaintext"))]
    pub token: String,
}

/// Normalize an e-mail before storage or lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Permission codes held by an account.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
