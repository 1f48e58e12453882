use crate::account::{Account, EmailVerification, PendingReviewOutcome};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable account records and the name blocklist.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Account>>;

    /// Look up an account whose normalized name equals `normalized_name`
    async fn find_by_normalized_name(&self, normalized_name: &str) -> StoreResult<Option<Account>>;

    /// Look up an account by its normalized email address
    async fn find_by_email(&self, normalized_email: &str) -> StoreResult<Option<Account>>;

    /// Look up the account holding the pending verification `token`
    async fn find_by_verification_token(&self, token: &str) -> StoreResult<Option<Account>>;

    /// Insert a new account and return the id assigned to it
    async fn insert(&self, account: &Account) -> StoreResult<i64>;

    /// Overwrite all profile fields of account `id`
    async fn update(&self, id: i64, account: &Account) -> StoreResult<()>;

    async fn update_credential(&self, id: i64, credential: &str) -> StoreResult<()>;

    /// Write a new credential together with the verification marker in a
    /// single statement
    async fn reset_credential(
        &self,
        id: i64,
        credential: &str,
        verification: &EmailVerification,
    ) -> StoreResult<()>;

    async fn update_email_verification(
        &self,
        id: i64,
        verification: &EmailVerification,
    ) -> StoreResult<()>;

    /// Replace identifying data of account `id` with a placeholder and add
    /// `normalized_name` to the blocklist. Either both happen or neither.
    async fn anonymize(&self, id: i64, normalized_name: &str) -> StoreResult<()>;

    async fn add_name_to_blocklist(&self, normalized_name: &str) -> StoreResult<()>;

    async fn count_blocked_name(&self, normalized_name: &str) -> StoreResult<u64>;
}

/// Review outcomes produced by the submission subsystem.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// All undelivered outcomes, ordered by recipient and then arrival
    async fn fetch_due_outcomes(&self) -> StoreResult<Vec<PendingReviewOutcome>>;

    /// Mark the given outcomes delivered. Either all of them are marked or none.
    async fn mark_delivered(&self, ids: &[i64]) -> StoreResult<()>;

    /// Queue a finished review for notification and return its id
    async fn record_outcome(
        &self,
        recipient: &Account,
        title: &str,
        reject_reason: Option<&str>,
    ) -> StoreResult<i64>;
}

/// Issued authorization grants (sessions / access tokens) per account name.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn issue_grant(&self, account_name: &str, token: &str) -> StoreResult<()>;

    /// Revoke every grant issued to `account_name`, returning how many were removed
    async fn delete_all_for_account(&self, account_name: &str) -> StoreResult<u64>;

    async fn count_for_account(&self, account_name: &str) -> StoreResult<u64>;
}

pub type DynAccountStore = Arc<dyn AccountStore>;
pub type DynReviewStore = Arc<dyn ReviewStore>;
pub type DynGrantStore = Arc<dyn GrantStore>;

/// Handles onto one opened database, one per collaborator interface.
#[derive(Clone)]
pub struct Stores {
    pub accounts: DynAccountStore,
    pub reviews: DynReviewStore,
    pub grants: DynGrantStore,
}

impl Stores {
    fn from_backend<T>(backend: T) -> Self
    where
        T: AccountStore + ReviewStore + GrantStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            accounts: backend.clone(),
            reviews: backend.clone(),
            grants: backend,
        }
    }
}

pub mod common;
pub mod migrations;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

/// Open a storage backend from a connection URI.
pub async fn open(uri: &str) -> StoreResult<Stores> {
    if uri.starts_with("sqlite:") {
        Ok(Stores::from_backend(sqlite::SqliteStore::new(uri).await?))
    } else if uri.starts_with("postgres:") {
        #[cfg(feature = "postgres")]
        {
            Ok(Stores::from_backend(postgres::PostgresStore::new(uri).await?))
        }
        #[cfg(not(feature = "postgres"))]
        {
            Err(StoreError::Database("postgres backend not enabled".into()))
        }
    } else {
        Err(StoreError::Database("unknown storage backend".into()))
    }
}
