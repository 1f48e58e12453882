use crate::account::{Account, EmailVerification, is_valid_email, normalize_email, normalize_name};
use crate::error::StoreError;
use crate::password;
use crate::store::DynAccountStore;
use tracing::{debug, info};

/// Resolves accounts by name or email address and checks passwords.
#[derive(Clone)]
pub struct Authenticator {
    accounts: DynAccountStore,
}

impl Authenticator {
    pub fn new(accounts: DynAccountStore) -> Self {
        Self { accounts }
    }

    /// Find an account by email address first, then by normalized name.
    pub async fn load(&self, name_or_email: &str) -> Result<Option<Account>, StoreError> {
        let input = name_or_email.trim();
        if is_valid_email(input) {
            if let Some(account) = self.accounts.find_by_email(&normalize_email(input)).await? {
                return Ok(Some(account));
            }
        }
        let normalized = normalize_name(input);
        if normalized.is_empty() {
            return Ok(None);
        }
        self.accounts.find_by_normalized_name(&normalized).await
    }

    /// Check `password` for the account named by `name_or_email`.
    ///
    /// A successful login confirms an email address whose verification
    /// was deferred by a password reset.
    pub async fn authenticate(
        &self,
        name_or_email: &str,
        password: &str,
    ) -> Result<Option<Account>, StoreError> {
        let Some(mut account) = self.load(name_or_email).await? else {
            debug!("Login for unknown account");
            return Ok(None);
        };
        let Some(credential) = account.credential.as_deref() else {
            debug!(name = %account.name, "Account has no password");
            return Ok(None);
        };
        if !password::matches(password, credential) {
            info!(name = %account.name, "Login failed");
            return Ok(None);
        }

        if account.email_verification == EmailVerification::VerifiedAtNextLogin {
            if let Some(id) = account.id {
                self.accounts
                    .update_email_verification(id, &EmailVerification::Verified)
                    .await?;
                account.email_verification = EmailVerification::Verified;
                info!(id, "Email verified at login");
            }
        }
        Ok(Some(account))
    }
}
