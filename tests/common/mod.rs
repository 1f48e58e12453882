#![allow(dead_code)]

use async_trait::async_trait;
use photohub::account::{Account, EmailVerification, Locale};
use photohub::error::{DeliveryError, StoreError};
use photohub::mailer::Mailer;
use photohub::monitor::Monitor;
use photohub::store::{
    self, AccountStore, DynAccountStore, DynGrantStore, GrantStore, StoreResult, Stores,
};
use photohub::{Authenticator, Config, NotifyUsersService, ProfileService, password};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

pub const USER_PASSWORD: &str = "secret-password";

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailer that keeps every message; can be switched to fail all sends.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
    refused: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail every send to `address`.
    pub fn refuse(&self, address: &str) {
        self.refused.lock().unwrap().push(address.to_string());
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) || self.refused.lock().unwrap().iter().any(|a| a == to) {
            return Err(DeliveryError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMonitor {
    messages: Mutex<Vec<String>>,
}

impl RecordingMonitor {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Monitor for RecordingMonitor {
    fn send_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Grant store wrapper counting revocation calls per account name.
pub struct CountingGrantStore {
    inner: DynGrantStore,
    revocations: Mutex<Vec<String>>,
}

impl CountingGrantStore {
    pub fn revocations(&self) -> Vec<String> {
        self.revocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl GrantStore for CountingGrantStore {
    async fn issue_grant(&self, account_name: &str, token: &str) -> StoreResult<()> {
        self.inner.issue_grant(account_name, token).await
    }

    async fn delete_all_for_account(&self, account_name: &str) -> StoreResult<u64> {
        self.revocations.lock().unwrap().push(account_name.to_string());
        self.inner.delete_all_for_account(account_name).await
    }

    async fn count_for_account(&self, account_name: &str) -> StoreResult<u64> {
        self.inner.count_for_account(account_name).await
    }
}

/// Account store wrapper whose credential and anonymization writes can be
/// made to fail.
pub struct FaultyAccountStore {
    inner: DynAccountStore,
    failing: AtomicBool,
}

impl FaultyAccountStore {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database("disk I/O error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for FaultyAccountStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Account>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_normalized_name(&self, normalized_name: &str) -> StoreResult<Option<Account>> {
        self.inner.find_by_normalized_name(normalized_name).await
    }

    async fn find_by_email(&self, normalized_email: &str) -> StoreResult<Option<Account>> {
        self.inner.find_by_email(normalized_email).await
    }

    async fn find_by_verification_token(&self, token: &str) -> StoreResult<Option<Account>> {
        self.inner.find_by_verification_token(token).await
    }

    async fn insert(&self, account: &Account) -> StoreResult<i64> {
        self.inner.insert(account).await
    }

    async fn update(&self, id: i64, account: &Account) -> StoreResult<()> {
        self.inner.update(id, account).await
    }

    async fn update_credential(&self, id: i64, credential: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.update_credential(id, credential).await
    }

    async fn reset_credential(
        &self,
        id: i64,
        credential: &str,
        verification: &EmailVerification,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.reset_credential(id, credential, verification).await
    }

    async fn update_email_verification(
        &self,
        id: i64,
        verification: &EmailVerification,
    ) -> StoreResult<()> {
        self.inner.update_email_verification(id, verification).await
    }

    async fn anonymize(&self, id: i64, normalized_name: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.anonymize(id, normalized_name).await
    }

    async fn add_name_to_blocklist(&self, normalized_name: &str) -> StoreResult<()> {
        self.inner.add_name_to_blocklist(normalized_name).await
    }

    async fn count_blocked_name(&self, normalized_name: &str) -> StoreResult<u64> {
        self.inner.count_blocked_name(normalized_name).await
    }
}

pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.site_name = "Railway-Stations.org".into();
    cfg.team_signature = "Your Railway-Stations-Team".into();
    cfg.team_signature_de = "Dein Bahnhofsfoto-Team".into();
    cfg.email_verification_url = "EMAIL_VERIFICATION_URL".into();
    cfg
}

pub struct Harness {
    pub stores: Stores,
    pub mailer: Arc<RecordingMailer>,
    pub monitor: Arc<RecordingMonitor>,
    pub grants: Arc<CountingGrantStore>,
    pub accounts: Arc<FaultyAccountStore>,
    pub config: Arc<RwLock<Config>>,
    pub profiles: ProfileService,
    pub notifier: NotifyUsersService,
    pub authenticator: Authenticator,
}

pub async fn harness() -> Harness {
    let stores = store::open("sqlite::memory:").await.unwrap();
    let mailer = Arc::new(RecordingMailer::default());
    let monitor = Arc::new(RecordingMonitor::default());
    let grants = Arc::new(CountingGrantStore {
        inner: stores.grants.clone(),
        revocations: Mutex::new(Vec::new()),
    });
    let accounts = Arc::new(FaultyAccountStore {
        inner: stores.accounts.clone(),
        failing: AtomicBool::new(false),
    });
    let config = Arc::new(RwLock::new(test_config()));

    let profiles = ProfileService::new(
        accounts.clone(),
        grants.clone(),
        mailer.clone(),
        monitor.clone(),
        config.clone(),
    );
    let notifier = NotifyUsersService::new(
        stores.accounts.clone(),
        stores.reviews.clone(),
        mailer.clone(),
        config.clone(),
    );
    let authenticator = Authenticator::new(stores.accounts.clone());
    Harness {
        stores,
        mailer,
        monitor,
        grants,
        accounts,
        config,
        profiles,
        notifier,
        authenticator,
    }
}

impl Harness {
    /// Store an account directly, bypassing registration.
    pub async fn existing_user(
        &self,
        name: &str,
        email: Option<&str>,
        verification: EmailVerification,
    ) -> Account {
        let mut account = Account::new(name);
        account.email = email.map(str::to_string);
        account.credential = Some(password::encode(USER_PASSWORD).unwrap());
        account.email_verification = verification;
        account.locale = Locale::German;
        let id = self.stores.accounts.insert(&account).await.unwrap();
        account.id = Some(id);
        account
    }

    pub async fn reload(&self, account: &Account) -> Option<Account> {
        self.stores
            .accounts
            .find_by_id(account.id.unwrap())
            .await
            .unwrap()
    }
}
