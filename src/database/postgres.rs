//! PostgreSQL adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{
    AccountRepository, MovieRepository, Result, StoreError, TokenRepository,
};
use crate::movie::{Filters, Metadata, Movie, NewMovie, Runtime};
use crate::token::{Scope, TokenRecord};
use crate::user::{Account, NewAccount, Permissions};

const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new [`PostgresStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct MovieRow {
    id: i64,
    created_at: DateTime<Utc>,
    title: String,
    year: i32,
    runtime: i32,
    genres: Vec<String>,
    version: i32,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Movie {
            id: row.id,
            created_at: row.created_at,
            title: row.title,
            year: row.year,
            runtime: Runtime(row.runtime),
            genres: row.genres,
            version: row.version,
        }
    }
}

#[derive(FromRow)]
struct AccountRow {
    id: i64,
    created_at: DateTime<Utc>,
    name: String,
    email: String,
    password_hash: String,
    activated: bool,
    version: i32,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            created_at: row.created_at,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            activated: row.activated,
            version: row.version,
        }
    }
}

/// Unique violation on the e-mail column.
fn duplicate_email(err: sqlx::Error) -> StoreError {
    let is_duplicate = err
        .as_database_error()
        .and_then(|e| e.constraint())
        .is_some_and(|c| c == EMAIL_CONSTRAINT);

    if is_duplicate {
        StoreError::DuplicateEmail
    } else {
        err.into()
    }
}

#[async_trait]
impl MovieRepository for PostgresStore {
    async fn insert(&self, movie: &NewMovie) -> Result<Movie> {
        let row = sqlx::query_as::<_, MovieRow>(
            r#"INSERT INTO movies (title, year, runtime, genres)
                VALUES ($1, $2, $3, $4)
                RETURNING id, created_at, title, year, runtime, genres, version"#,
        )
        .bind(&movie.title)
        .bind(movie.year)
        .bind(movie.runtime.0)
        .bind(&movie.genres)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get(&self, id: i64) -> Result<Movie> {
        let row = sqlx::query_as::<_, MovieRow>(
            r#"SELECT id, created_at, title, year, runtime, genres, version
                FROM movies WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update(&self, movie: &Movie) -> Result<Movie> {
        let row = sqlx::query_as::<_, MovieRow>(
            r#"UPDATE movies
                SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING id, created_at, title, year, runtime, genres, version"#,
        )
        .bind(&movie.title)
        .bind(movie.year)
        .bind(movie.runtime.0)
        .bind(&movie.genres)
        .bind(movie.id)
        .bind(movie.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            // the row either vanished or moved past the observed version.
            None => match MovieRepository::get(self, movie.id).await {
                Ok(_) => Err(StoreError::EditConflict),
                Err(err) => Err(err),
            },
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound);
        }
        Ok(())
    }

    async fn list(&self, filters: &Filters) -> Result<(Vec<Movie>, Metadata)> {
        const WHERE: &str = r#"WHERE ($1::text IS NULL OR position(lower($1) in lower(title)) > 0)
            AND (cardinality($2::text[]) = 0 OR genres @> $2)"#;

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT count(*) FROM movies {WHERE}"))
            .bind(&filters.title)
            .bind(&filters.genres)
            .fetch_one(&mut *tx)
            .await?;

        // Sort column comes from a closed set, never from raw input.
        let query = format!(
            r#"SELECT id, created_at, title, year, runtime, genres, version
                FROM movies {WHERE}
                ORDER BY {} {}, id ASC
                LIMIT $3 OFFSET $4"#,
            filters.sort.column.as_str(),
            filters.sort.direction(),
        );
        let rows = sqlx::query_as::<_, MovieRow>(&query)
            .bind(&filters.title)
            .bind(&filters.genres)
            .bind(i64::try_from(filters.limit()).unwrap_or(i64::MAX))
            .bind(i64::try_from(filters.offset()).unwrap_or(i64::MAX))
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((
            rows.into_iter().map(Movie::from).collect(),
            Metadata::calculate(total as u64, filters.page, filters.page_size),
        ))
    }
}

#[async_trait]
impl AccountRepository for PostgresStore {
    async fn insert(&self, account: &NewAccount) -> Result<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"INSERT INTO users (name, email, password_hash, activated)
                VALUES ($1, $2, $3, false)
                RETURNING id, created_at, name, email, password_hash, activated, version"#,
        )
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_email)?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: i64) -> Result<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"SELECT id, created_at, name, email, password_hash, activated, version
                FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_by_email(&self, email: &str) -> Result<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"SELECT id, created_at, name, email, password_hash, activated, version
                FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update(&self, account: &Account) -> Result<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"UPDATE users
                SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING id, created_at, name, email, password_hash, activated, version"#,
        )
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.activated)
        .bind(account.id)
        .bind(account.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(duplicate_email)?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.find_by_id(account.id).await {
                Ok(_) => Err(StoreError::EditConflict),
                Err(err) => Err(err),
            },
        }
    }

    async fn permissions(&self, account_id: i64) -> Result<Permissions> {
        let codes: Vec<String> = sqlx::query_scalar(
            r#"SELECT permissions.code
                FROM permissions
                INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                WHERE users_permissions.user_id = $1"#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes.into_iter().collect())
    }

    async fn grant(&self, account_id: i64, codes: &[&str]) -> Result<()> {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();

        sqlx::query(
            r#"INSERT INTO users_permissions (user_id, permission_id)
                SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
                ON CONFLICT DO NOTHING"#,
        )
        .bind(account_id)
        .bind(codes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TokenRepository for PostgresStore {
    async fn insert(&self, token: &TokenRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO tokens (hash, user_id, expiry, scope)
                VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&token.digest)
        .bind(token.account_id)
        .bind(token.expiry)
        .bind(token.scope.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        digest: &str,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let account_id: i64 = sqlx::query_scalar(
            r#"SELECT user_id FROM tokens
                WHERE hash = $1 AND scope = $2 AND expiry > $3"#,
        )
        .bind(digest)
        .bind(scope.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(account_id)
    }

    async fn delete(&self, digest: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM tokens WHERE hash = $1")
            .bind(digest)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound);
        }
        Ok(())
    }

    async fn delete_all_for_account(
        &self,
        account_id: i64,
        scope: Scope,
    ) -> Result<()> {
        sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND scope = $2")
            .bind(account_id)
            .bind(scope.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE expiry <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
