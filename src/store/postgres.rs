use super::common::{ACCOUNT_COLUMNS, AccountRow, OUTCOME_COLUMNS, OutcomeRow, hash_grant_token};
use super::migrations::{Migrator, postgres::PostgresMigrator};
use super::{AccountStore, GrantStore, ReviewStore, StoreResult};
use crate::account::{Account, EmailVerification, PendingReviewOutcome, normalize_email};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, postgres::PgPoolOptions};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and bring the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or a migration fails.
    #[tracing::instrument(skip_all)]
    pub async fn new(uri: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(uri)
            .await?;

        PostgresMigrator::new(pool.clone()).migrate_to_latest().await?;

        Ok(Self { pool })
    }

    async fn fetch_account(&self, filter: &str, value: &str) -> StoreResult<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {filter} = $1");
        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Account::from))
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    #[tracing::instrument(skip_all)]
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
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
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (name, normalized_name, url, license, email, own_photos, anonymous, \
             credential, admin, email_verification, send_notifications, locale) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING id",
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
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    #[tracing::instrument(skip_all)]
    async fn update(&self, id: i64, account: &Account) -> StoreResult<()> {
        sqlx::query(
            "UPDATE accounts SET name = $1, normalized_name = $2, url = $3, license = $4, email = $5, \
             own_photos = $6, anonymous = $7, email_verification = $8, send_notifications = $9, \
             locale = $10 WHERE id = $11",
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
        sqlx::query("UPDATE accounts SET credential = $1 WHERE id = $2")
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
        sqlx::query("UPDATE accounts SET credential = $1, email_verification = $2 WHERE id = $3")
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
        sqlx::query("UPDATE accounts SET email_verification = $1 WHERE id = $2")
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
             url = NULL, anonymous = TRUE, email = NULL, email_verification = NULL, own_photos = FALSE, \
             license = NULL, credential = NULL, send_notifications = FALSE, admin = FALSE \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("INSERT INTO blocked_names (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(normalized_name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_name_to_blocklist(&self, normalized_name: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO blocked_names (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(normalized_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_blocked_name(&self, normalized_name: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocked_names WHERE name = $1")
            .bind(normalized_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ReviewStore for PostgresStore {
    #[tracing::instrument(skip_all)]
    async fn fetch_due_outcomes(&self) -> StoreResult<Vec<PendingReviewOutcome>> {
        let query = format!(
            "SELECT {OUTCOME_COLUMNS} FROM review_outcomes WHERE notified = FALSE \
             ORDER BY recipient_id, created_at, id"
        );
        let rows = sqlx::query_as::<_, OutcomeRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PendingReviewOutcome::from).collect())
    }

    #[tracing::instrument(skip_all)]
    async fn mark_delivered(&self, ids: &[i64]) -> StoreResult<()> {
        sqlx::query("UPDATE review_outcomes SET notified = TRUE WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
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
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO review_outcomes (recipient_id, recipient_name, recipient_email, title, \
             reject_reason, created_at) VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(recipient_id)
        .bind(&recipient.name)
        .bind(&recipient.email)
        .bind(title)
        .bind(reject_reason)
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

#[async_trait]
impl GrantStore for PostgresStore {
    async fn issue_grant(&self, account_name: &str, token: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO authorization_grants (id, account_name, token_hash, issued_at) \
             VALUES ($1, $2, $3, $4)",
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
        let result = sqlx::query("DELETE FROM authorization_grants WHERE account_name = $1")
            .bind(account_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_for_account(&self, account_name: &str) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM authorization_grants WHERE account_name = $1")
                .bind(account_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
