use super::common::{ACCOUNT_COLUMNS, AccountRow, OUTCOME_COLUMNS, OutcomeRow, hash_grant_token};
use super::migrations::{Migrator, sqlite::SqliteMigrator};
use super::{AccountStore, GrantStore, ReviewStore, StoreResult};
use crate::account::{Account, EmailVerification, PendingReviewOutcome, normalize_email};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    #[tracing::instrument(skip_all)]
    /// Open a SQLite database and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid, the connection fails or a
    /// migration fails.
    pub async fn new(path: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| {
                StoreError::Database(
                    format!(
                        "Invalid SQLite database URI '{}': {}

Please ensure the URI is in the correct format:
- File database: sqlite:///path/to/photohub.db
- In-memory database: sqlite::memory:",
                        path, e
                    )
                    .into(),
                )
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        SqliteMigrator::new(pool.clone()).migrate_to_latest().await?;

        Ok(Self { pool })
    }

    async fn fetch_account(&self, filter: &str, value: &str) -> StoreResult<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {filter} = ?");
        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Account::from))
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    #[tracing::instrument(skip_all)]
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Account::from))
    }

    #[tracing::instrument(skip_all)]
    async fn find_by_normalized_name(&self, normalized_name: &str) -> StoreResult<Option<Account>> {
        self.fetch_account("normalized_name", normalized_name).await
    }

    #[tracing::instrument(skip_all)]
    async fn find_by_email(&self, normalized_email: &str) -> StoreResult<Option<Account>> {
        self.fetch_account("email", normalized_email).await
    }

    #[tracing::instrument(skip_all)]
    async fn find_by_verification_token(&self, token: &str) -> StoreResult<Option<Account>> {
        let Some(stored) = EmailVerification::Pending(token.to_string()).to_stored() else {
            return Ok(None);
        };
        self.fetch_account("email_verification", &stored).await
    }

    #[tracing::instrument(skip_all)]
    async fn insert(&self, account: &Account) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO accounts (name, normalized_name, url, license, email, own_photos, anonymous, \
             credential, admin, email_verification, send_notifications, locale) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.name)
        .bind(account.normalized_name())
        .bind(&account.url)
        .bind(account.license.map(|l| l.as_str()))
        .bind(account.email.as_deref().map(normalize_email))
        .bind(account.own_photos)
        .bind(account.anonymous)
        .bind(&account.credential)
        .bind(account.admin)
        .bind(account.email_verification.to_stored())
        .bind(account.send_notifications)
        .bind(account.locale.tag())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    #[tracing::instrument(skip_all)]
    async fn update(&self, id: i64, account: &Account) -> StoreResult<()> {
        sqlx::query(
            "UPDATE accounts SET name = ?, normalized_name = ?, url = ?, license = ?, email = ?, \
             own_photos = ?, anonymous = ?, email_verification = ?, send_notifications = ?, locale = ? \
             WHERE id = ?",
        )
        .bind(&account.name)
        .bind(account.normalized_name())
        .bind(&account.url)
        .bind(account.license.map(|l| l.as_str()))
        .bind(account.email.as_deref().map(normalize_email))
        .bind(account.own_photos)
        .bind(account.anonymous)
        .bind(account.email_verification.to_stored())
        .bind(account.send_notifications)
        .bind(account.locale.tag())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_credential(&self, id: i64, credential: &str) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET credential = ? WHERE id = ?")
            .bind(credential)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_credential(
        &self,
        id: i64,
        credential: &str,
        verification: &EmailVerification,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET credential = ?, email_verification = ? WHERE id = ?")
            .bind(credential)
            .bind(verification.to_stored())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_email_verification(
        &self,
        id: i64,
        verification: &EmailVerification,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET email_verification = ? WHERE id = ?")
            .bind(verification.to_stored())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn anonymize(&self, id: i64, normalized_name: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE accounts SET name = 'deleteduser' || id, normalized_name = '#deleteduser' || id, \
             url = NULL, anonymous = 1, email = NULL, email_verification = NULL, own_photos = 0, \
             license = NULL, credential = NULL, send_notifications = 0, admin = 0 \
             WHERE id = ?",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("INSERT OR IGNORE INTO blocked_names (name) VALUES (?)")
            .bind(normalized_name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_name_to_blocklist(&self, normalized_name: &str) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO blocked_names (name) VALUES (?)")
            .bind(normalized_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_blocked_name(&self, normalized_name: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocked_names WHERE name = ?")
            .bind(normalized_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ReviewStore for SqliteStore {
    #[tracing::instrument(skip_all)]
    async fn fetch_due_outcomes(&self) -> StoreResult<Vec<PendingReviewOutcome>> {
        let query = format!(
            "SELECT {OUTCOME_COLUMNS} FROM review_outcomes WHERE notified = 0 \
             ORDER BY recipient_id, created_at, id"
        );
        let rows = sqlx::query_as::<_, OutcomeRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PendingReviewOutcome::from).collect())
    }

    #[tracing::instrument(skip_all)]
    async fn mark_delivered(&self, ids: &[i64]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE review_outcomes SET notified = 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn record_outcome(
        &self,
        recipient: &Account,
        title: &str,
        reject_reason: Option<&str>,
    ) -> StoreResult<i64> {
        let recipient_id = recipient
            .id
            .ok_or_else(|| StoreError::Database("recipient has no id".into()))?;
        let result = sqlx::query(
            "INSERT INTO review_outcomes (recipient_id, recipient_name, recipient_email, title, \
             reject_reason, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(recipient_id)
        .bind(&recipient.name)
        .bind(&recipient.email)
        .bind(title)
        .bind(reject_reason)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl GrantStore for SqliteStore {
    async fn issue_grant(&self, account_name: &str, token: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO authorization_grants (id, account_name, token_hash, issued_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(account_name)
        .bind(hash_grant_token(token))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn delete_all_for_account(&self, account_name: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM authorization_grants WHERE account_name = ?")
            .bind(account_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_for_account(&self, account_name: &str) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM authorization_grants WHERE account_name = ?")
                .bind(account_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
