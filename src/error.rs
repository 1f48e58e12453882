//! Domain error types for the account and notification core
//!
//! Errors are structured internally for logging/debugging but provide
//! generic responses to clients to avoid leaking sensitive information.

use thiserror::Error;

/// Top-level error returned by the account lifecycle operations
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Delivery failure: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Store failure: {0}")]
    Store(StoreError),
}

/// Which uniqueness rule a registration or update collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    NameTaken,
    NameBlocked,
    EmailTaken,
    NameTakenByDifferentEmail,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ConflictKind::NameTaken => "name is already taken",
            ConflictKind::NameBlocked => "name is blocked",
            ConflictKind::EmailTaken => "eMail is already taken",
            ConflictKind::NameTakenByDifferentEmail => {
                "name is already taken by different eMail"
            }
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the constraint or
    /// column description reported by the database.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let detail = db
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| db.message().to_string());
                return StoreError::UniqueViolation(detail);
            }
        }
        StoreError::Database(Box::new(err))
    }
}

impl From<StoreError> for ProfileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(detail) => {
                if detail.contains("email") {
                    ProfileError::Conflict(ConflictKind::EmailTaken)
                } else {
                    ProfileError::Conflict(ConflictKind::NameTaken)
                }
            }
            other => ProfileError::Store(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Failure delivering one recipient's review digest
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery failure: {0}")]
    Delivery(#[from] DeliveryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl ProfileError {
    /// Status code a request boundary should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ProfileError::InvalidInput(_) => 400,
            ProfileError::Conflict(_) => 409,
            ProfileError::Delivery(_) => 502,
            ProfileError::Store(_) => 500,
        }
    }

    /// Get a client-safe response message (generic, no internal details)
    pub fn client_message(&self) -> String {
        match self {
            ProfileError::InvalidInput(msg) => msg.clone(),
            ProfileError::Conflict(kind) => kind.to_string(),
            ProfileError::Delivery(_) => "Email could not be delivered".into(),
            ProfileError::Store(_) => "Service temporarily unavailable".into(),
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ProfileError::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_on_email_becomes_email_conflict() {
        let err: ProfileError = StoreError::UniqueViolation("accounts.email".into()).into();
        assert!(matches!(err, ProfileError::Conflict(ConflictKind::EmailTaken)));
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn unique_violation_on_name_becomes_name_conflict() {
        let err: ProfileError =
            StoreError::UniqueViolation("UNIQUE constraint failed: accounts.normalized_name".into())
                .into();
        assert!(matches!(err, ProfileError::Conflict(ConflictKind::NameTaken)));
    }

    #[test]
    fn store_errors_hide_details_from_clients() {
        let err = ProfileError::Store(StoreError::Database("disk I/O error".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.client_message(), "Service temporarily unavailable");
    }
}
