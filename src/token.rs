//! Opaque token lifecycle: issue, verify, consume.
//!
//! Only the digest of a plaintext is ever stored. A lookup miss never says
//! whether the token was unknown, expired or issued for another scope.

use std::sync::Arc;

use axum::extract::FromRef;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::crypto::{CryptoError, Hasher, random_token};
use crate::database::{AccountRepository, StoreError, TokenRepository};
use crate::user::Account;

/// Length of a base32 plaintext built from 16 random bytes.
pub const PLAINTEXT_LENGTH: usize = 26;

/// Purpose tag of a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

/// What the store keeps about a token.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenRecord {
    pub digest: String,
    pub account_id: i64,
    pub scope: Scope,
    pub expiry: DateTime<Utc>,
}

/// Freshly issued token. The plaintext is only available here.
#[derive(Clone, Debug)]
pub struct Token {
    pub plaintext: String,
    pub record: TokenRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TokenError> for crate::error::ServerError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Crypto(err) => err.into(),
            TokenError::Store(err) => err.into(),
        }
    }
}

/// Token manager.
#[derive(Clone)]
pub struct TokenManager {
    hasher: Arc<Hasher>,
    accounts: Arc<dyn AccountRepository>,
    tokens: Arc<dyn TokenRepository>,
}

impl FromRef<AppState> for TokenManager {
    fn from_ref(state: &AppState) -> TokenManager {
        state.token.clone()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`].
    pub fn new(
        hasher: Arc<Hasher>,
        accounts: Arc<dyn AccountRepository>,
        tokens: Arc<dyn TokenRepository>,
    ) -> Self {
        Self {
            hasher,
            accounts,
            tokens,
        }
    }

    /// Digest of a plaintext, as stored.
    pub fn digest(&self, plaintext: &str) -> String {
        self.hasher.digest(plaintext)
    }

    /// Build a token without storing it.
    pub fn generate(
        &self,
        account_id: i64,
        scope: Scope,
        ttl: Duration,
    ) -> Result<Token, CryptoError> {
        let plaintext = random_token()?;
        let record = TokenRecord {
            digest: self.digest(&plaintext),
            account_id,
            scope,
            expiry: Utc::now() + ttl,
        };

        Ok(Token { plaintext, record })
    }

    /// Generate and store a token for an account.
    pub async fn issue(
        &self,
        account_id: i64,
        scope: Scope,
        ttl: Duration,
    ) -> Result<Token, TokenError> {
        let token = self.generate(account_id, scope, ttl)?;
        self.tokens.insert(&token.record).await?;

        tracing::debug!(account_id, scope = scope.as_str(), "token issued");
        Ok(token)
    }

    /// Resolve a plaintext to its account.
    ///
    /// `Ok(None)` covers unknown, expired and wrong-scope tokens alike.
    pub async fn verify(
        &self,
        plaintext: &str,
        scope: Scope,
    ) -> Result<Option<Account>, StoreError> {
        let digest = self.digest(plaintext);

        let account_id = match self.tokens.find(&digest, scope, Utc::now()).await {
            Ok(account_id) => account_id,
            Err(StoreError::RecordNotFound) => return Ok(None),
            Err(err) => return Err(err),
        };

        match self.accounts.find_by_id(account_id).await {
            Ok(account) => Ok(Some(account)),
            Err(StoreError::RecordNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Invalidate a single-use token.
    pub async fn consume(&self, digest: &str) -> Result<(), StoreError> {
        self.tokens.delete(digest).await
    }

    /// Drop every token of an account for a scope.
    pub async fn revoke_all(
        &self,
        account_id: i64,
        scope: Scope,
    ) -> Result<(), StoreError> {
        self.tokens.delete_all_for_account(account_id, scope).await
    }

    /// Remove expired tokens, returning how many were dropped.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.tokens.delete_expired(Utc::now()).await
    }
}
