//! Account entity, review outcomes and the normalization rules used for
//! uniqueness checks.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Stored prefix of a pending verification marker.
pub const EMAIL_VERIFICATION_TOKEN_PREFIX: &str = "TOKEN:";
pub const EMAIL_VERIFIED: &str = "VERIFIED";
pub const EMAIL_VERIFIED_AT_NEXT_LOGIN: &str = "NEXT_LOGIN";

const ANONYMIZED_PREFIX: &str = "deleteduser";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Canonical form of a display name: lower-case, alphanumerics only.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Whether `normalized_name` looks like the placeholder of an anonymized
/// account. Such names cannot be registered or taken by a rename.
pub fn is_reserved_name(normalized_name: &str) -> bool {
    normalized_name
        .strip_prefix(ANONYMIZED_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Canonical form of an email address: trimmed and lower-case.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Photo license chosen by a contributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum License {
    Cc0,
    CcBySa40,
    Unknown,
}

impl License {
    pub fn as_str(&self) -> &'static str {
        match self {
            License::Cc0 => "CC0_10",
            License::CcBySa40 => "CC_BY_SA_40",
            License::Unknown => "UNKNOWN",
        }
    }

    /// Parse a stored license name; unrecognized values map to `Unknown`.
    pub fn from_stored(name: &str) -> Self {
        match name {
            "CC0_10" | "CC0" => License::Cc0,
            "CC_BY_SA_40" | "CC4" => License::CcBySa40,
            _ => License::Unknown,
        }
    }
}

/// Whether the account's email address has been confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum EmailVerification {
    #[default]
    Unset,
    Pending(String),
    Verified,
    VerifiedAtNextLogin,
}

impl EmailVerification {
    /// Representation in the `email_verification` column.
    pub fn to_stored(&self) -> Option<String> {
        match self {
            EmailVerification::Unset => None,
            EmailVerification::Pending(token) => {
                Some(format!("{EMAIL_VERIFICATION_TOKEN_PREFIX}{token}"))
            }
            EmailVerification::Verified => Some(EMAIL_VERIFIED.to_string()),
            EmailVerification::VerifiedAtNextLogin => Some(EMAIL_VERIFIED_AT_NEXT_LOGIN.to_string()),
        }
    }

    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            None => EmailVerification::Unset,
            Some(EMAIL_VERIFIED) => EmailVerification::Verified,
            Some(EMAIL_VERIFIED_AT_NEXT_LOGIN) => EmailVerification::VerifiedAtNextLogin,
            Some(other) => match other.strip_prefix(EMAIL_VERIFICATION_TOKEN_PREFIX) {
                Some(token) if !token.is_empty() => EmailVerification::Pending(token.to_string()),
                _ => EmailVerification::Unset,
            },
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, EmailVerification::Verified)
    }
}

/// Language used for mails to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Locale {
    #[default]
    English,
    German,
}

impl Locale {
    /// Parse a BCP 47 language tag, falling back to English.
    pub fn from_tag(tag: &str) -> Self {
        let lang = tag.split(['-', '_']).next().unwrap_or("");
        if lang.eq_ignore_ascii_case("de") {
            Locale::German
        } else {
            Locale::English
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Locale::English => "en",
            Locale::German => "de",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// Assigned by the store; `None` before the account is inserted.
    pub id: Option<i64>,
    pub name: String,
    pub url: Option<String>,
    pub license: Option<License>,
    pub email: Option<String>,
    pub own_photos: bool,
    pub anonymous: bool,
    #[serde(skip)]
    pub credential: Option<String>,
    pub admin: bool,
    #[serde(skip)]
    pub email_verification: EmailVerification,
    pub send_notifications: bool,
    pub locale: Locale,
}

impl Account {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: None,
            license: None,
            email: None,
            own_photos: false,
            anonymous: false,
            credential: None,
            admin: false,
            email_verification: EmailVerification::Unset,
            send_notifications: true,
            locale: Locale::English,
        }
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn normalized_email(&self) -> Option<String> {
        self.email.as_deref().map(normalize_email)
    }

    /// Authorization roles derived from the admin flag.
    pub fn roles(&self) -> Vec<&'static str> {
        let mut roles = vec!["ROLE_USER"];
        if self.admin {
            roles.push("ROLE_ADMIN");
        }
        roles
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verification.is_verified()
    }

    /// Review digests only go to verified, opted-in addresses.
    pub fn is_eligible_for_notification(&self) -> bool {
        self.email.is_some() && self.send_notifications && self.is_email_verified()
    }

    /// Placeholder name given to an anonymized account.
    pub fn anonymized_name(id: i64) -> String {
        format!("{ANONYMIZED_PREFIX}{id}")
    }

    /// Stored normalized name of an anonymized account. The leading `#` is
    /// never produced by [`normalize_name`], so no live account can hold it.
    pub fn anonymized_normalized_name(id: i64) -> String {
        format!("#{ANONYMIZED_PREFIX}{id}")
    }
}

/// Registration candidate as received from the request boundary.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: String,
    pub email: Option<String>,
    pub url: Option<String>,
    pub license: Option<License>,
    pub own_photos: bool,
    pub anonymous: bool,
    pub send_notifications: bool,
    pub locale: Option<Locale>,
    pub new_password: Option<String>,
}

/// The profile fields a user may change on their own account.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: Option<String>,
    pub url: Option<String>,
    pub license: Option<License>,
    pub own_photos: bool,
    pub anonymous: bool,
    pub send_notifications: bool,
    pub locale: Option<Locale>,
}

/// A finished review of a submission waiting to be reported to its author.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReviewOutcome {
    pub id: i64,
    pub recipient_id: i64,
    pub recipient_name: String,
    pub recipient_email: Option<String>,
    pub title: String,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingReviewOutcome {
    pub fn is_accepted(&self) -> bool {
        self.reject_reason.is_none()
    }
}
