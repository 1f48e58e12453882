//! Row types and SQL shared between the storage backends.

use crate::account::{Account, EmailVerification, License, Locale, PendingReviewOutcome};
use chrono::{TimeZone, Utc};
use sha2::{Digest, Sha256};

/// Columns selected for every account query.
pub const ACCOUNT_COLUMNS: &str = "id, name, url, license, email, own_photos, anonymous, \
     credential, admin, email_verification, send_notifications, locale";

pub const OUTCOME_COLUMNS: &str =
    "id, recipient_id, recipient_name, recipient_email, title, reject_reason, created_at";

#[derive(sqlx::FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub license: Option<String>,
    pub email: Option<String>,
    pub own_photos: bool,
    pub anonymous: bool,
    pub credential: Option<String>,
    pub admin: bool,
    pub email_verification: Option<String>,
    pub send_notifications: bool,
    pub locale: String,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: Some(row.id),
            name: row.name,
            url: row.url,
            license: row.license.as_deref().map(License::from_stored),
            email: row.email,
            own_photos: row.own_photos,
            anonymous: row.anonymous,
            credential: row.credential,
            admin: row.admin,
            email_verification: EmailVerification::from_stored(row.email_verification.as_deref()),
            send_notifications: row.send_notifications,
            locale: Locale::from_tag(&row.locale),
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct OutcomeRow {
    pub id: i64,
    pub recipient_id: i64,
    pub recipient_name: String,
    pub recipient_email: Option<String>,
    pub title: String,
    pub reject_reason: Option<String>,
    pub created_at: i64,
}

impl From<OutcomeRow> for PendingReviewOutcome {
    fn from(row: OutcomeRow) -> Self {
        PendingReviewOutcome {
            id: row.id,
            recipient_id: row.recipient_id,
            recipient_name: row.recipient_name,
            recipient_email: row.recipient_email,
            title: row.title,
            reject_reason: row.reject_reason,
            created_at: Utc
                .timestamp_opt(row.created_at, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

/// Grant tokens are only kept as a SHA-256 digest.
pub fn hash_grant_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// SQL schemas for the account database.
pub mod sql {
    pub const ACCOUNTS_TABLE_SQLITE: &str = "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL UNIQUE,
            url TEXT,
            license TEXT,
            email TEXT UNIQUE,
            own_photos INTEGER NOT NULL DEFAULT 0,
            anonymous INTEGER NOT NULL DEFAULT 0,
            credential TEXT,
            admin INTEGER NOT NULL DEFAULT 0,
            email_verification TEXT,
            send_notifications INTEGER NOT NULL DEFAULT 1,
            locale TEXT NOT NULL DEFAULT 'en'
        )";

    pub const ACCOUNTS_TABLE_POSTGRES: &str = "CREATE TABLE IF NOT EXISTS accounts (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL UNIQUE,
            url TEXT,
            license TEXT,
            email TEXT UNIQUE,
            own_photos BOOLEAN NOT NULL DEFAULT FALSE,
            anonymous BOOLEAN NOT NULL DEFAULT FALSE,
            credential TEXT,
            admin BOOLEAN NOT NULL DEFAULT FALSE,
            email_verification TEXT,
            send_notifications BOOLEAN NOT NULL DEFAULT TRUE,
            locale TEXT NOT NULL DEFAULT 'en'
        )";

    pub const VERIFICATION_INDEX: &str = "CREATE INDEX IF NOT EXISTS accounts_email_verification_idx
            ON accounts (email_verification)";

    pub const BLOCKED_NAMES_TABLE: &str = "CREATE TABLE IF NOT EXISTS blocked_names (
            name TEXT PRIMARY KEY
        )";

    pub const REVIEW_OUTCOMES_TABLE_SQLITE: &str = "CREATE TABLE IF NOT EXISTS review_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_id INTEGER NOT NULL,
            recipient_name TEXT NOT NULL,
            recipient_email TEXT,
            title TEXT NOT NULL,
            reject_reason TEXT,
            created_at INTEGER NOT NULL,
            notified INTEGER NOT NULL DEFAULT 0
        )";

    pub const REVIEW_OUTCOMES_TABLE_POSTGRES: &str = "CREATE TABLE IF NOT EXISTS review_outcomes (
            id BIGSERIAL PRIMARY KEY,
            recipient_id BIGINT NOT NULL,
            recipient_name TEXT NOT NULL,
            recipient_email TEXT,
            title TEXT NOT NULL,
            reject_reason TEXT,
            created_at BIGINT NOT NULL,
            notified BOOLEAN NOT NULL DEFAULT FALSE
        )";

    pub const GRANTS_TABLE_SQLITE: &str = "CREATE TABLE IF NOT EXISTS authorization_grants (
            id TEXT PRIMARY KEY,
            account_name TEXT NOT NULL,
            token_hash TEXT NOT NULL,
            issued_at INTEGER NOT NULL
        )";

    pub const GRANTS_TABLE_POSTGRES: &str = "CREATE TABLE IF NOT EXISTS authorization_grants (
            id TEXT PRIMARY KEY,
            account_name TEXT NOT NULL,
            token_hash TEXT NOT NULL,
            issued_at BIGINT NOT NULL
        )";
}
