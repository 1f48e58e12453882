//! Account lifecycle and review notifications for a crowdsourced photo
//! platform.

pub mod account;
pub mod config;
pub mod error;
pub mod login;
pub mod mailer;
pub mod monitor;
pub mod notify;
pub mod password;
pub mod profile;
pub mod store;
pub mod templates;

pub use account::{Account, EmailVerification, License, Locale, NewAccount, ProfileUpdate};
pub use config::Config;
pub use error::{ConflictKind, DeliveryError, ProfileError, StoreError};
pub use login::Authenticator;
pub use notify::{NotifyJob, NotifySummary, NotifyUsersService};
pub use profile::ProfileService;
