//! In-memory adapter, used when no PostgreSQL is configured and by tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{
    AccountRepository, MovieRepository, Result, StoreError, TokenRepository,
};
use crate::movie::{Filters, Metadata, Movie, NewMovie};
use crate::token::{Scope, TokenRecord};
use crate::user::{Account, NewAccount, Permissions};

/// Rows of one table plus its id sequence.
#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T> Table<T> {
    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Every table behind its own lock; no lock is held across an `.await`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    movies: RwLock<Table<Movie>>,
    accounts: RwLock<Table<Account>>,
    permissions: RwLock<HashMap<i64, BTreeSet<String>>>,
    tokens: RwLock<HashMap<String, TokenRecord>>,
}

#[async_trait]
impl MovieRepository for MemoryStore {
    async fn insert(&self, movie: &NewMovie) -> Result<Movie> {
        let mut table = self.movies.write();
        let movie = Movie {
            id: table.next_id(),
            created_at: Utc::now(),
            title: movie.title.clone(),
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres.clone(),
            version: 0,
        };
        table.rows.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn get(&self, id: i64) -> Result<Movie> {
        self.movies
            .read()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }

    async fn update(&self, movie: &Movie) -> Result<Movie> {
        let mut table = self.movies.write();
        let stored = table
            .rows
            .get_mut(&movie.id)
            .ok_or(StoreError::RecordNotFound)?;

        if stored.version != movie.version {
            return Err(StoreError::EditConflict);
        }

        *stored = Movie {
            version: movie.version + 1,
            created_at: stored.created_at,
            ..movie.clone()
        };
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.movies
            .write()
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::RecordNotFound)
    }

    async fn list(&self, filters: &Filters) -> Result<(Vec<Movie>, Metadata)> {
        // One read guard for count and page: a consistent snapshot.
        let table = self.movies.read();
        let mut rows: Vec<&Movie> =
            table.rows.values().filter(|m| filters.matches(m)).collect();
        rows.sort_by(|a, b| filters.sort.compare(a, b));

        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(usize::try_from(filters.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(filters.limit()).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok((
            page,
            Metadata::calculate(total, filters.page, filters.page_size),
        ))
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn insert(&self, account: &NewAccount) -> Result<Account> {
        let mut table = self.accounts.write();
        if table.rows.values().any(|a| a.email == account.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let account = Account {
            id: table.next_id(),
            created_at: Utc::now(),
            name: account.name.clone(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            activated: false,
            version: 1,
        };
        table.rows.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: i64) -> Result<Account> {
        self.accounts
            .read()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }

    async fn find_by_email(&self, email: &str) -> Result<Account> {
        self.accounts
            .read()
            .rows
            .values()
            .find(|a| a.email == email)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }

    async fn update(&self, account: &Account) -> Result<Account> {
        let mut table = self.accounts.write();
        if table
            .rows
            .values()
            .any(|a| a.id != account.id && a.email == account.email)
        {
            return Err(StoreError::DuplicateEmail);
        }

        let stored = table
            .rows
            .get_mut(&account.id)
            .ok_or(StoreError::RecordNotFound)?;
        if stored.version != account.version {
            return Err(StoreError::EditConflict);
        }

        *stored = Account {
            version: account.version + 1,
            created_at: stored.created_at,
            ..account.clone()
        };
        Ok(stored.clone())
    }

    async fn permissions(&self, account_id: i64) -> Result<Permissions> {
        Ok(self
            .permissions
            .read()
            .get(&account_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant(&self, account_id: i64, codes: &[&str]) -> Result<()> {
        if !self.accounts.read().rows.contains_key(&account_id) {
            return Err(StoreError::RecordNotFound);
        }

        self.permissions
            .write()
            .entry(account_id)
            .or_default()
            .extend(codes.iter().map(|c| c.to_string()));
        Ok(())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert(&self, token: &TokenRecord) -> Result<()> {
        if !self.accounts.read().rows.contains_key(&token.account_id) {
            return Err(StoreError::RecordNotFound);
        }

        self.tokens
            .write()
            .insert(token.digest.clone(), token.clone());
        Ok(())
    }

    async fn find(
        &self,
        digest: &str,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.tokens
            .read()
            .get(digest)
            .filter(|t| t.scope == scope && t.expiry > now)
            .map(|t| t.account_id)
            .ok_or(StoreError::RecordNotFound)
    }

    async fn delete(&self, digest: &str) -> Result<()> {
        self.tokens
            .write()
            .remove(digest)
            .map(|_| ())
            .ok_or(StoreError::RecordNotFound)
    }

    async fn delete_all_for_account(
        &self,
        account_id: i64,
        scope: Scope,
    ) -> Result<()> {
        self.tokens
            .write()
            .retain(|_, t| !(t.account_id == account_id && t.scope == scope));
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, t| t.expiry > now);
        Ok((before - tokens.len()) as u64)
    }
}
