//! Account lifecycle: registration, profile changes, credentials,
//! email verification and account deletion.

use crate::account::{
    Account, EmailVerification, NewAccount, ProfileUpdate, is_reserved_name, is_valid_email,
    normalize_email, normalize_name,
};
use crate::config::Config;
use crate::error::{ConflictKind, ProfileError};
use crate::mailer::DynMailer;
use crate::monitor::DynMonitor;
use crate::password;
use crate::store::{DynAccountStore, DynGrantStore};
use crate::templates::{self, Mail};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Whether a conflict check runs for a new registration or for an update
/// of the account with the given id.
#[derive(Clone, Copy)]
enum Claimant<'a> {
    Registration { client_info: &'a str },
    Account { id: i64, current_name: &'a str, current_email: Option<&'a str> },
}

impl Claimant<'_> {
    fn owns(&self, other: &Account) -> bool {
        match self {
            Claimant::Registration { .. } => false,
            Claimant::Account { id, .. } => other.id == Some(*id),
        }
    }
}

#[derive(Clone)]
pub struct ProfileService {
    accounts: DynAccountStore,
    grants: DynGrantStore,
    mailer: DynMailer,
    monitor: DynMonitor,
    config: Arc<RwLock<Config>>,
}

impl ProfileService {
    pub fn new(
        accounts: DynAccountStore,
        grants: DynGrantStore,
        mailer: DynMailer,
        monitor: DynMonitor,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            accounts,
            grants,
            mailer,
            monitor,
            config,
        }
    }

    /// Create an account and return its id.
    ///
    /// Without a password a random one is generated and mailed; with a
    /// password a verification link is mailed instead.
    pub async fn register(&self, candidate: NewAccount, client_info: &str) -> Result<i64, ProfileError> {
        let cfg = self.config.read().await.clone();

        let name = candidate.name.trim().to_string();
        validate_name(&name)?;
        let email = match candidate.email.as_deref().map(str::trim) {
            Some(e) if is_valid_email(e) => normalize_email(e),
            _ => return Err(ProfileError::invalid("a valid eMail address is required")),
        };
        if let Some(pw) = &candidate.new_password {
            validate_password(pw, cfg.min_password_length)?;
        }

        self.ensure_available(Claimant::Registration { client_info }, &name, Some(&email))
            .await?;

        let mut account = Account {
            id: None,
            name,
            url: candidate.url,
            license: candidate.license,
            email: Some(email.clone()),
            own_photos: candidate.own_photos,
            anonymous: candidate.anonymous,
            credential: None,
            admin: false,
            email_verification: EmailVerification::Unset,
            send_notifications: candidate.send_notifications,
            locale: candidate.locale.unwrap_or_default(),
        };

        let mail = match candidate.new_password {
            Some(pw) => {
                let token = password::generate_token();
                account.credential = Some(encode(&pw)?);
                account.email_verification = EmailVerification::Pending(token.clone());
                templates::email_verification(&cfg, &token)
            }
            None => {
                let pw = password::generate_password();
                account.credential = Some(encode(&pw)?);
                templates::new_password(&cfg, account.locale, &pw)
            }
        };

        let id = self.accounts.insert(&account).await?;
        info!(id, name = %account.name, "Registered account");
        self.monitor.send_message(&format!(
            "New registration{{nickname='{}', email='{}'}}\nvia {}",
            account.name, email, client_info
        ));

        self.deliver(&email, mail).await?;
        Ok(id)
    }

    /// Replace the mutable profile fields of `existing` and return the
    /// stored record. A new email address has to be verified again.
    pub async fn update_profile(
        &self,
        existing: &Account,
        update: ProfileUpdate,
        client_info: &str,
    ) -> Result<Account, ProfileError> {
        let id = require_id(existing)?;
        let cfg = self.config.read().await.clone();

        let name = update.name.trim().to_string();
        validate_name(&name)?;
        let email = match update.email.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(e) if is_valid_email(e) => Some(normalize_email(e)),
            Some(_) => return Err(ProfileError::invalid("invalid eMail address")),
        };

        let current_email = existing.normalized_email();
        self.ensure_available(
            Claimant::Account {
                id,
                current_name: &existing.name,
                current_email: current_email.as_deref(),
            },
            &name,
            email.as_deref(),
        )
        .await?;

        let email_changed = email.is_some() && email != current_email;
        let mut updated = existing.clone();
        updated.name = name;
        updated.url = update.url;
        updated.license = update.license;
        updated.own_photos = update.own_photos;
        updated.anonymous = update.anonymous;
        updated.send_notifications = update.send_notifications;
        if let Some(locale) = update.locale {
            updated.locale = locale;
        }
        updated.email = email.clone();

        let mut mail = None;
        if email_changed {
            let token = password::generate_token();
            updated.email_verification = EmailVerification::Pending(token.clone());
            mail = Some(templates::email_verification(&cfg, &token));
        } else if email.is_none() {
            updated.email_verification = EmailVerification::Unset;
        }

        self.accounts.update(id, &updated).await?;
        if updated.normalized_name() != existing.normalized_name() {
            self.monitor.send_message(&format!(
                "Update nickname for user '{}' to '{}'",
                existing.name, updated.name
            ));
        }
        info!(id, client = client_info, "Updated profile");

        if let (Some(mail), Some(to)) = (mail, &email) {
            self.deliver(to, mail).await?;
        }
        Ok(updated)
    }

    /// Set a new password and revoke every grant issued to the account.
    pub async fn change_password(&self, account: &Account, new_password: &str) -> Result<(), ProfileError> {
        let id = require_id(account)?;
        let min_len = self.config.read().await.min_password_length;
        validate_password(new_password, min_len)?;

        let key = encode(new_password)?;
        let revoked = self.grants.delete_all_for_account(&account.name).await?;
        self.accounts.update_credential(id, &key).await?;
        info!(id, revoked, "Password changed");
        Ok(())
    }

    /// Mail a freshly generated password to the account identified by
    /// name or email address.
    pub async fn reset_password(&self, name_or_email: &str, client_info: &str) -> Result<(), ProfileError> {
        let cfg = self.config.read().await.clone();
        let input = name_or_email.trim();
        let account = if is_valid_email(input) {
            self.accounts.find_by_email(&normalize_email(input)).await?
        } else {
            self.accounts.find_by_normalized_name(&normalize_name(input)).await?
        };
        let Some(account) = account else {
            info!(client = client_info, "Password reset for unknown user");
            return Err(ProfileError::invalid(format!("unknown user '{input}'")));
        };
        let id = require_id(&account)?;
        let Some(email) = account.email.clone() else {
            return Err(ProfileError::invalid(format!("user '{}' has no eMail address", account.name)));
        };

        let pw = password::generate_password();
        let key = encode(&pw)?;
        let verification = match &account.email_verification {
            EmailVerification::Unset | EmailVerification::Pending(_) => {
                EmailVerification::VerifiedAtNextLogin
            }
            current => current.clone(),
        };
        let revoked = self.grants.delete_all_for_account(&account.name).await?;
        self.accounts.reset_credential(id, &key, &verification).await?;
        info!(id, revoked, client = client_info, "Password reset");

        self.monitor.send_message(&format!(
            "Reset Password for '{}', email='{}'",
            account.name, email
        ));
        if verification != account.email_verification {
            self.monitor.send_message(&format!(
                "Email verification for '{}' deferred to next login",
                account.name
            ));
        }

        self.deliver(&email, templates::new_password(&cfg, account.locale, &pw))
            .await?;
        Ok(())
    }

    /// Confirm the email address holding `token`.
    ///
    /// Unknown or already used tokens are ignored and yield `None`.
    pub async fn email_verification(&self, token: &str) -> Result<Option<Account>, ProfileError> {
        if token.is_empty() {
            return Ok(None);
        }
        let Some(mut account) = self.accounts.find_by_verification_token(token).await? else {
            debug!("Verification token did not match any account");
            return Ok(None);
        };
        let id = require_id(&account)?;

        self.accounts
            .update_email_verification(id, &EmailVerification::Verified)
            .await?;
        account.email_verification = EmailVerification::Verified;
        self.monitor.send_message(&format!(
            "Email verified {{nickname='{}', email='{}'}}",
            account.name,
            account.email.as_deref().unwrap_or_default()
        ));
        Ok(Some(account))
    }

    /// Issue a new verification token and mail the link again.
    pub async fn resend_email_verification(&self, account: &Account) -> Result<(), ProfileError> {
        let id = require_id(account)?;
        let Some(email) = account.email.as_deref() else {
            return Err(ProfileError::invalid("no eMail address to verify"));
        };
        let cfg = self.config.read().await.clone();

        let token = password::generate_token();
        self.accounts
            .update_email_verification(id, &EmailVerification::Pending(token.clone()))
            .await?;
        self.deliver(email, templates::email_verification(&cfg, &token))
            .await
    }

    /// Anonymize the account and block its name from being claimed again.
    pub async fn delete_profile(&self, account: &Account, client_info: &str) -> Result<(), ProfileError> {
        let id = require_id(account)?;
        let normalized = account.normalized_name();

        let revoked = self.grants.delete_all_for_account(&account.name).await?;
        self.accounts.anonymize(id, &normalized).await?;
        info!(id, revoked, "Account anonymized");
        self.monitor.send_message(&format!(
            "Closing account {{nickname='{}'}}\nvia {}",
            account.name, client_info
        ));
        Ok(())
    }

    async fn ensure_available(
        &self,
        claimant: Claimant<'_>,
        name: &str,
        email: Option<&str>,
    ) -> Result<(), ProfileError> {
        let normalized_name = normalize_name(name);
        let name_changed = match claimant {
            Claimant::Registration { .. } => true,
            Claimant::Account { current_name, .. } => normalize_name(current_name) != normalized_name,
        };

        if name_changed {
            if let Some(holder) = self.accounts.find_by_normalized_name(&normalized_name).await? {
                if !claimant.owns(&holder) {
                    let holder_email = holder.normalized_email();
                    match (holder_email.as_deref(), email) {
                        (Some(theirs), Some(ours)) if theirs == ours => {
                            // Same person registering again; reported as email conflict below.
                        }
                        (Some(theirs), Some(ours)) => {
                            if let Claimant::Registration { client_info } = claimant {
                                self.monitor.send_message(&format!(
                                    "Registration for user '{}' with eMail '{}' failed, name is already taken by different eMail '{}'\nvia {}",
                                    name, ours, theirs, client_info
                                ));
                            }
                            return Err(ProfileError::Conflict(ConflictKind::NameTakenByDifferentEmail));
                        }
                        _ => return Err(ProfileError::Conflict(ConflictKind::NameTaken)),
                    }
                }
            }

            if is_reserved_name(&normalized_name)
                || self.accounts.count_blocked_name(&normalized_name).await? > 0
            {
                info!(name = %name, "Name is blocked");
                return Err(ProfileError::Conflict(ConflictKind::NameBlocked));
            }
        }

        let email_changed = match claimant {
            Claimant::Registration { .. } => true,
            Claimant::Account { current_email, .. } => email != current_email,
        };
        if let (Some(email), true) = (email, email_changed) {
            if let Some(holder) = self.accounts.find_by_email(email).await? {
                if !claimant.owns(&holder) {
                    if let Claimant::Registration { client_info } = claimant {
                        self.monitor.send_message(&format!(
                            "Registration for user '{}' with eMail '{}' failed, eMail is already taken\nvia {}",
                            name, email, client_info
                        ));
                    }
                    return Err(ProfileError::Conflict(ConflictKind::EmailTaken));
                }
            }
        }
        Ok(())
    }

    async fn deliver(&self, to: &str, mail: Mail) -> Result<(), ProfileError> {
        self.mailer
            .send(to, &mail.subject, &mail.body)
            .await
            .map_err(|e| {
                tracing::warn!(to = to, error = %e, "Mail delivery failed");
                ProfileError::Delivery(e)
            })
    }
}

fn require_id(account: &Account) -> Result<i64, ProfileError> {
    account
        .id
        .ok_or_else(|| ProfileError::invalid("account has not been stored yet"))
}

fn validate_name(name: &str) -> Result<(), ProfileError> {
    if name.is_empty() || normalize_name(name).is_empty() {
        return Err(ProfileError::invalid("nickname must not be empty"));
    }
    Ok(())
}

fn validate_password(password: &str, min_len: usize) -> Result<(), ProfileError> {
    if password.chars().count() < min_len {
        return Err(ProfileError::invalid(format!(
            "password must be at least {min_len} characters"
        )));
    }
    Ok(())
}

fn encode(password: &str) -> Result<String, ProfileError> {
    password::encode(password)
        .map_err(|e| ProfileError::invalid(format!("password cannot be encoded: {e}")))
}
