//! Storage ports and the adapters behind them.
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;

use crate::AppState;
use crate::movie::{Filters, Metadata, Movie, NewMovie};
use crate::token::{Scope, TokenRecord};
use crate::user::{Account, NewAccount, Permissions};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "greenlight";
pub const DEFAULT_POOL_SIZE: u32 = 10;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcomes a store can report besides success.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    RecordNotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error(transparent)]
    Sql(sqlx::Error),
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(details: impl Into<String>) -> Self {
        StoreError::Backend(details.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::RecordNotFound,
            err => StoreError::Sql(err),
        }
    }
}

#[async_trait]
pub trait MovieRepository: Send + Sync {
    /// Insert a movie at version 0.
    async fn insert(&self, movie: &NewMovie) -> Result<Movie>;

    async fn get(&self, id: i64) -> Result<Movie>;

    /// Store `movie` if its `version` is still the stored one.
    /// Returns the movie with its version advanced by one.
    async fn update(&self, movie: &Movie) -> Result<Movie>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Filter, sort then paginate.
    async fn list(&self, filters: &Filters) -> Result<(Vec<Movie>, Metadata)>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert an unactivated account. Fails with
    /// [`StoreError::DuplicateEmail`] if the e-mail is taken.
    async fn insert(&self, account: &NewAccount) -> Result<Account>;

    async fn find_by_id(&self, id: i64) -> Result<Account>;

    async fn find_by_email(&self, email: &str) -> Result<Account>;

    /// Version-checked update, same contract as [`MovieRepository::update`].
    async fn update(&self, account: &Account) -> Result<Account>;

    async fn permissions(&self, account_id: i64) -> Result<Permissions>;

    async fn grant(&self, account_id: i64, codes: &[&str]) -> Result<()>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: &TokenRecord) -> Result<()>;

    /// Owner of a non-expired token with this digest and scope.
    async fn find(
        &self,
        digest: &str,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<i64>;

    async fn delete(&self, digest: &str) -> Result<()>;

    async fn delete_all_for_account(
        &self,
        account_id: i64,
        scope: Scope,
    ) -> Result<()>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub movies: Arc<dyn MovieRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub tokens: Arc<dyn TokenRepository>,
}

impl Database {
    /// Init database connections and run migrations.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> std::result::Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        // execute migrations scripts on start.
        sqlx::migrate!().run(&postgres).await?;

        Ok(Self::from_store(Arc::new(PostgresStore::new(postgres))))
    }

    /// Process-local store, lost on exit.
    pub fn memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::default()))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: MovieRepository + AccountRepository + TokenRepository + 'static,
    {
        Self {
            movies: Arc::clone(&store) as Arc<dyn MovieRepository>,
            accounts: Arc::clone(&store) as Arc<dyn AccountRepository>,
            tokens: store,
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
