//! Review-result digests.
//!
//! Due outcomes are grouped per recipient and sent as one mail each. An
//! outcome stays due until the digest containing it was handed to the
//! mailer, so recipients who are not reachable yet get it on a later run.

use crate::account::PendingReviewOutcome;
use crate::config::Config;
use crate::error::{NotifyError, StoreError};
use crate::mailer::DynMailer;
use crate::store::{DynAccountStore, DynReviewStore};
use crate::templates;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};

/// Per-cycle counts of recipients.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifySummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Delivery {
    Sent,
    Skipped,
}

#[derive(Clone)]
pub struct NotifyUsersService {
    accounts: DynAccountStore,
    reviews: DynReviewStore,
    mailer: DynMailer,
    config: Arc<RwLock<Config>>,
}

impl NotifyUsersService {
    pub fn new(
        accounts: DynAccountStore,
        reviews: DynReviewStore,
        mailer: DynMailer,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            accounts,
            reviews,
            mailer,
            config,
        }
    }

    /// Send one digest per recipient with due outcomes.
    ///
    /// # Errors
    ///
    /// Fails only when the due outcomes cannot be fetched. Failures for a
    /// single recipient are logged and counted in the summary.
    pub async fn notify_users(&self) -> Result<NotifySummary, StoreError> {
        let outcomes = self.reviews.fetch_due_outcomes().await?;
        let mut summary = NotifySummary::default();
        if outcomes.is_empty() {
            debug!("No review outcomes due");
            return Ok(summary);
        }
        let cfg = self.config.read().await.clone();

        for (recipient_id, group) in group_by_recipient(outcomes) {
            match self.notify_recipient(&cfg, recipient_id, &group).await {
                Ok(Delivery::Sent) => summary.sent += 1,
                Ok(Delivery::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(recipient_id, outcomes = group.len(), "Review digest failed: {e}");
                    summary.failed += 1;
                }
            }
        }
        info!(
            sent = summary.sent,
            skipped = summary.skipped,
            failed = summary.failed,
            "Notification cycle finished"
        );
        Ok(summary)
    }

    async fn notify_recipient(
        &self,
        cfg: &Config,
        recipient_id: i64,
        outcomes: &[PendingReviewOutcome],
    ) -> Result<Delivery, NotifyError> {
        let Some(account) = self.accounts.find_by_id(recipient_id).await? else {
            debug!(recipient_id, "Recipient no longer exists");
            return Ok(Delivery::Skipped);
        };
        if !account.is_eligible_for_notification() {
            debug!(recipient_id, "Recipient not reachable, keeping outcomes due");
            return Ok(Delivery::Skipped);
        }
        let Some(email) = account.email.as_deref() else {
            return Ok(Delivery::Skipped);
        };

        let mail = templates::review_digest(cfg, account.locale, &account.name, outcomes);
        self.mailer.send(email, &mail.subject, &mail.body).await?;

        let ids: Vec<i64> = outcomes.iter().map(|o| o.id).collect();
        self.reviews.mark_delivered(&ids).await?;
        Ok(Delivery::Sent)
    }
}

/// Group outcomes by recipient id, keeping arrival order inside a group.
fn group_by_recipient(outcomes: Vec<PendingReviewOutcome>) -> BTreeMap<i64, Vec<PendingReviewOutcome>> {
    let mut groups: BTreeMap<i64, Vec<PendingReviewOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        groups.entry(outcome.recipient_id).or_default().push(outcome);
    }
    groups
}

/// Periodic trigger for [`NotifyUsersService`]. A tick that fires while the
/// previous cycle is still running is dropped.
#[derive(Clone)]
pub struct NotifyJob {
    service: NotifyUsersService,
    running: Arc<Mutex<()>>,
}

impl NotifyJob {
    pub fn new(service: NotifyUsersService) -> Self {
        Self {
            service,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Run one cycle unless another one is in progress.
    ///
    /// Returns `None` when the cycle was skipped or failed.
    pub async fn run_once(&self) -> Option<NotifySummary> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Previous notification cycle still running, skipping");
            return None;
        };
        let start = Instant::now();
        match self.service.notify_users().await {
            Ok(summary) => {
                debug!("Notification cycle completed in {:?}", start.elapsed());
                Some(summary)
            }
            Err(e) => {
                error!("Notification cycle failed: {e}");
                None
            }
        }
    }

    /// Add the job to `scheduler` on the given cron schedule.
    ///
    /// Returns the job UUID on success for later removal.
    pub async fn schedule(
        &self,
        scheduler: &JobScheduler,
        schedule: &str,
    ) -> Result<uuid::Uuid, JobSchedulerError> {
        info!("Adding notification job with schedule '{}'", schedule);
        let this = self.clone();
        let job = Job::new_async(schedule, move |_uuid, _l| {
            let this = this.clone();
            Box::pin(async move {
                this.run_once().await;
            })
        })?;
        let job_uuid = job.guid();
        scheduler.add(job).await?;
        debug!("Added notification job with UUID {}", job_uuid);
        Ok(job_uuid)
    }
}
