use super::StoreResult;
use crate::error::StoreError;
use async_trait::async_trait;

/// Represents a single database migration step.
///
/// Each migration transforms the database from one version to the next.
/// Migrations must be idempotent and safe to run multiple times.
#[async_trait]
pub trait Migration: Send + Sync {
    /// The target version this migration upgrades to.
    fn target_version(&self) -> u32;

    fn description(&self) -> &str;

    async fn apply(&self) -> StoreResult<()>;
}

/// Tracks the schema version of a backend and applies migrations.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Returns 0 if no version is stored (fresh install).
    async fn get_current_version(&self) -> StoreResult<u32>;

    async fn set_version(&self, version: u32) -> StoreResult<()>;

    /// All migrations for this backend, ordered by target version.
    fn get_migrations(&self) -> Vec<Box<dyn Migration>>;

    /// Apply all migrations newer than the stored version, recording the
    /// version after each step.
    ///
    /// Fails if a migration fails or if the stored version is newer than the
    /// latest migration this build knows about.
    async fn migrate_to_latest(&self) -> StoreResult<()> {
        let current_version = self.get_current_version().await?;
        let migrations = self.get_migrations();

        if migrations.is_empty() {
            tracing::info!("No migrations available");
            return Ok(());
        }

        let latest_version = migrations
            .iter()
            .map(|m| m.target_version())
            .max()
            .unwrap_or(0);

        if current_version > latest_version {
            return Err(StoreError::Database(
                format!(
                    "Stored schema version {} is higher than latest available version {}. \
                     Please upgrade to a compatible version.",
                    current_version, latest_version
                )
                .into(),
            ));
        }

        if current_version == latest_version {
            tracing::debug!("Database schema is up to date at version {}", current_version);
            return Ok(());
        }

        tracing::info!(
            "Migrating database schema from version {} to version {}",
            current_version,
            latest_version
        );

        for migration in migrations {
            let target = migration.target_version();
            if target <= current_version {
                continue;
            }

            tracing::info!("Applying migration to version {}: {}", target, migration.description());

            migration.apply().await.map_err(|e| {
                StoreError::Database(
                    format!("Failed to apply migration to version {}: {}", target, e).into(),
                )
            })?;
            self.set_version(target).await?;
        }

        tracing::info!("Database migration completed successfully");
        Ok(())
    }
}

pub mod sqlite;
#[cfg(feature = "postgres")]
pub mod postgres;
