use photohub::account::{Account, EmailVerification, License, Locale};
use photohub::error::StoreError;
use photohub::store::{self, sqlite::SqliteStore, AccountStore, GrantStore, ReviewStore};
use tempfile::TempDir;

fn account(name: &str, email: &str) -> Account {
    let mut account = Account::new(name);
    account.email = Some(email.into());
    account.credential = Some("$argon2id$stored".into());
    account
}

#[tokio::test]
async fn insert_and_find_account() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    let mut nick = account("Nick Name", "Nick@Example.com");
    nick.license = Some(License::CcBySa40);
    nick.locale = Locale::German;
    nick.url = Some("https://example.com".into());
    nick.email_verification = EmailVerification::Pending("token".into());
    let id = store.insert(&nick).await.unwrap();

    let by_id = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(by_id.name, "Nick Name");
    assert_eq!(by_id.email.as_deref(), Some("nick@example.com"));
    assert_eq!(by_id.license, Some(License::CcBySa40));
    assert_eq!(by_id.locale, Locale::German);
    assert_eq!(by_id.credential.as_deref(), Some("$argon2id$stored"));

    assert_eq!(store.find_by_normalized_name("nickname").await.unwrap().unwrap().id, Some(id));
    assert_eq!(
        store.find_by_email("nick@example.com").await.unwrap().unwrap().id,
        Some(id)
    );
    assert_eq!(
        store.find_by_verification_token("token").await.unwrap().unwrap().id,
        Some(id)
    );
    assert!(store.find_by_verification_token("other").await.unwrap().is_none());
    assert!(store.find_by_id(id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_name_or_email_is_a_unique_violation() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    store.insert(&account("nickname", "nick@example.com")).await.unwrap();

    let err = store
        .insert(&account("Nick_Name", "other@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(ref d) if d.contains("normalized_name")));

    let err = store
        .insert(&account("other", "NICK@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(ref d) if d.contains("email")));
}

#[tokio::test]
async fn update_keeps_credential() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    let mut nick = account("nickname", "nick@example.com");
    let id = store.insert(&nick).await.unwrap();

    nick.name = "New Nick".into();
    nick.credential = None;
    nick.send_notifications = false;
    store.update(id, &nick).await.unwrap();

    let stored = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.normalized_name(), "newnick");
    assert!(!stored.send_notifications);
    assert_eq!(stored.credential.as_deref(), Some("$argon2id$stored"));

    store.update_credential(id, "$argon2id$changed").await.unwrap();
    store
        .update_email_verification(id, &EmailVerification::VerifiedAtNextLogin)
        .await
        .unwrap();
    let stored = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.credential.as_deref(), Some("$argon2id$changed"));
    assert_eq!(stored.email_verification, EmailVerification::VerifiedAtNextLogin);
}

#[tokio::test]
async fn anonymize_frees_name_and_email() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    let id = store.insert(&account("nickname", "nick@example.com")).await.unwrap();

    store.anonymize(id, "nickname").await.unwrap();
    let stored = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.name, Account::anonymized_name(id));
    assert_eq!(store.count_blocked_name("nickname").await.unwrap(), 1);
    assert!(store.find_by_normalized_name("nickname").await.unwrap().is_none());
    assert!(
        store
            .find_by_normalized_name(&Account::anonymized_name(id))
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        store
            .find_by_normalized_name(&Account::anonymized_normalized_name(id))
            .await
            .unwrap()
            .unwrap()
            .id,
        Some(id)
    );
    assert_eq!(stored.email, None);
    assert_eq!(stored.credential, None);
    assert_eq!(stored.email_verification, EmailVerification::Unset);
    assert!(stored.anonymous);
    assert!(store.find_by_email("nick@example.com").await.unwrap().is_none());

    store.insert(&account("other", "nick@example.com")).await.unwrap();
}

#[tokio::test]
async fn anonymize_rolls_back_when_blocklist_write_fails() {
    let dir = TempDir::new().unwrap();
    let uri = format!("sqlite://{}", dir.path().join("photohub.db").display());
    let store = SqliteStore::new(&uri).await.unwrap();
    let id = store.insert(&account("nickname", "nick@example.com")).await.unwrap();

    let admin = sqlx::SqlitePool::connect(&uri).await.unwrap();
    sqlx::query("DROP TABLE blocked_names").execute(&admin).await.unwrap();

    assert!(store.anonymize(id, "nickname").await.is_err());
    let stored = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.name, "nickname");
    assert_eq!(stored.email.as_deref(), Some("nick@example.com"));
    assert_eq!(stored.credential.as_deref(), Some("$argon2id$stored"));
    assert!(!stored.anonymous);
}

#[tokio::test]
async fn reset_credential_writes_credential_and_marker() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    let id = store.insert(&account("nickname", "nick@example.com")).await.unwrap();

    store
        .reset_credential(id, "$argon2id$reset", &EmailVerification::VerifiedAtNextLogin)
        .await
        .unwrap();
    let stored = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.credential.as_deref(), Some("$argon2id$reset"));
    assert_eq!(stored.email_verification, EmailVerification::VerifiedAtNextLogin);
}

#[tokio::test]
async fn blocklist_counts_each_name_once() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    assert_eq!(store.count_blocked_name("blockedname").await.unwrap(), 0);
    store.add_name_to_blocklist("blockedname").await.unwrap();
    store.add_name_to_blocklist("blockedname").await.unwrap();
    assert_eq!(store.count_blocked_name("blockedname").await.unwrap(), 1);
    assert_eq!(store.count_blocked_name("other").await.unwrap(), 0);
}

#[tokio::test]
async fn outcomes_ordered_by_recipient_then_arrival() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    let mut first = account("first", "first@example.com");
    first.id = Some(store.insert(&first).await.unwrap());
    let mut second = account("second", "second@example.com");
    second.id = Some(store.insert(&second).await.unwrap());

    let a = store.record_outcome(&second, "A", None).await.unwrap();
    let b = store.record_outcome(&first, "B", Some("blurry")).await.unwrap();
    let c = store.record_outcome(&second, "C", None).await.unwrap();

    let due = store.fetch_due_outcomes().await.unwrap();
    let ids: Vec<i64> = due.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![b, a, c]);
    assert_eq!(due[0].reject_reason.as_deref(), Some("blurry"));
    assert!(!due[0].is_accepted());
    assert_eq!(due[0].recipient_email.as_deref(), Some("first@example.com"));

    store.mark_delivered(&[a, c]).await.unwrap();
    let due = store.fetch_due_outcomes().await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, b);
}

#[tokio::test]
async fn grants_are_revoked_per_account() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    store.issue_grant("nickname", "token-1").await.unwrap();
    store.issue_grant("nickname", "token-2").await.unwrap();
    store.issue_grant("other", "token-3").await.unwrap();

    assert_eq!(store.count_for_account("nickname").await.unwrap(), 2);
    assert_eq!(store.delete_all_for_account("nickname").await.unwrap(), 2);
    assert_eq!(store.count_for_account("nickname").await.unwrap(), 0);
    assert_eq!(store.count_for_account("other").await.unwrap(), 1);
    assert_eq!(store.delete_all_for_account("nickname").await.unwrap(), 0);
}

#[tokio::test]
async fn reopening_file_database_keeps_data() {
    let dir = TempDir::new().unwrap();
    let uri = format!("sqlite://{}", dir.path().join("photohub.db").display());

    let stores = store::open(&uri).await.unwrap();
    stores
        .accounts
        .insert(&account("nickname", "nick@example.com"))
        .await
        .unwrap();
    drop(stores);

    let stores = store::open(&uri).await.unwrap();
    assert!(
        stores
            .accounts
            .find_by_normalized_name("nickname")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn unknown_backend_is_rejected() {
    assert!(store::open("mysql://localhost/photohub").await.is_err());
}
