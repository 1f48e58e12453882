use super::{Migration, Migrator};
use crate::store::StoreResult;
use crate::store::common::sql;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

const CREATE_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
)";

/// Accounts and the name blocklist.
pub struct SqliteMigration001 {
    pool: SqlitePool,
}

#[async_trait]
impl Migration for SqliteMigration001 {
    fn target_version(&self) -> u32 {
        1
    }

    fn description(&self) -> &str {
        "accounts and blocked_names tables"
    }

    async fn apply(&self) -> StoreResult<()> {
        tracing::debug!("Applying SQLite migration 001");
        let mut tx = self.pool.begin().await?;
        sqlx::query(sql::ACCOUNTS_TABLE_SQLITE).execute(&mut *tx).await?;
        sqlx::query(sql::VERIFICATION_INDEX).execute(&mut *tx).await?;
        sqlx::query(sql::BLOCKED_NAMES_TABLE).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Review outcome queue and authorization grants.
pub struct SqliteMigration002 {
    pool: SqlitePool,
}

#[async_trait]
impl Migration for SqliteMigration002 {
    fn target_version(&self) -> u32 {
        2
    }

    fn description(&self) -> &str {
        "review_outcomes and authorization_grants tables"
    }

    async fn apply(&self) -> StoreResult<()> {
        tracing::debug!("Applying SQLite migration 002");
        let mut tx = self.pool.begin().await?;
        sqlx::query(sql::REVIEW_OUTCOMES_TABLE_SQLITE)
            .execute(&mut *tx)
            .await?;
        sqlx::query(sql::GRANTS_TABLE_SQLITE).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

pub struct SqliteMigrator {
    pool: SqlitePool,
}

impl SqliteMigrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Migrator for SqliteMigrator {
    async fn get_current_version(&self) -> StoreResult<u32> {
        sqlx::query(CREATE_VERSION_TABLE).execute(&self.pool).await?;

        let row = sqlx::query("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let version: i64 = row.try_get("version")?;
                Ok(version as u32)
            }
            None => Ok(0),
        }
    }

    async fn set_version(&self, version: u32) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(i64::from(version))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    fn get_migrations(&self) -> Vec<Box<dyn Migration>> {
        vec![
            Box::new(SqliteMigration001 { pool: self.pool.clone() }),
            Box::new(SqliteMigration002 { pool: self.pool.clone() }),
        ]
    }
}
