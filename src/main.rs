use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::RwLock;
use tokio_cron_scheduler::JobScheduler;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use photohub::account::normalize_name;
use photohub::monitor::LogMonitor;
use photohub::store::{self, Stores};
use photohub::{Authenticator, Config, NewAccount, NotifyJob, NotifyUsersService, ProfileService, mailer};

const CLI_CLIENT: &str = "photohub-cli";

#[derive(Parser, Debug)]
#[command(name = "photohub")]
#[command(about = "Account lifecycle and review notifications", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PHOTOHUB_CONFIG", default_value = "/etc/photohub/config.toml")]
    config: String,

    /// Use JSON structured logging
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the periodic review notification job until interrupted
    Serve,
    /// Run one notification cycle
    Notify,
    /// Register a new account
    Register {
        name: String,
        email: String,
        /// Initial password; a verification link is mailed instead of a generated password
        #[arg(long)]
        password: Option<String>,
    },
    /// Mail a new password to an account
    ResetPassword { name_or_email: String },
    /// Confirm an email address with its verification token
    VerifyEmail { token: String },
    /// Anonymize an account and block its name
    Delete { name: String },
    /// Print an account as JSON
    Show { name_or_email: String },
    /// Add a name to the blocklist
    Block { name: String },
}

struct App {
    config: Arc<RwLock<Config>>,
    stores: Stores,
    profiles: ProfileService,
    notifier: NotifyUsersService,
    authenticator: Authenticator,
}

impl App {
    async fn build(cfg: Config) -> Result<Self> {
        let stores = store::open(&cfg.db_url)
            .await
            .with_context(|| format!("opening database {}", cfg.db_url))?;
        let mailer = mailer::from_config(&cfg.mail)?;
        let monitor = Arc::new(LogMonitor);
        let config = Arc::new(RwLock::new(cfg));

        let profiles = ProfileService::new(
            stores.accounts.clone(),
            stores.grants.clone(),
            mailer.clone(),
            monitor,
            config.clone(),
        );
        let notifier = NotifyUsersService::new(
            stores.accounts.clone(),
            stores.reviews.clone(),
            mailer,
            config.clone(),
        );
        let authenticator = Authenticator::new(stores.accounts.clone());
        Ok(Self {
            config,
            stores,
            profiles,
            notifier,
            authenticator,
        })
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let cfg = Config::from_file(&args.config)?;
    let app = App::build(cfg).await?;

    match args.command {
        Command::Serve => serve(app, args.config).await?,
        Command::Notify => {
            let summary = app.notifier.notify_users().await?;
            println!(
                "sent: {}, skipped: {}, failed: {}",
                summary.sent, summary.skipped, summary.failed
            );
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let candidate = NewAccount {
                name,
                email: Some(email),
                send_notifications: true,
                new_password: password,
                ..NewAccount::default()
            };
            let id = app.profiles.register(candidate, CLI_CLIENT).await?;
            println!("{id}");
        }
        Command::ResetPassword { name_or_email } => {
            app.profiles.reset_password(&name_or_email, CLI_CLIENT).await?;
        }
        Command::VerifyEmail { token } => match app.profiles.email_verification(&token).await? {
            Some(account) => println!("verified {}", account.name),
            None => bail!("unknown or expired token"),
        },
        Command::Delete { name } => {
            let Some(account) = app.authenticator.load(&name).await? else {
                bail!("no such account: {name}");
            };
            app.profiles.delete_profile(&account, CLI_CLIENT).await?;
        }
        Command::Show { name_or_email } => {
            let Some(account) = app.authenticator.load(&name_or_email).await? else {
                bail!("no such account: {name_or_email}");
            };
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        Command::Block { name } => {
            let normalized = normalize_name(&name);
            if normalized.is_empty() {
                bail!("name has no letters or digits: {name}");
            }
            app.stores.accounts.add_name_to_blocklist(&normalized).await?;
        }
    }
    Ok(())
}

async fn serve(app: App, cfg_path: String) -> Result<()> {
    let mut scheduler = JobScheduler::new().await?;
    let job = NotifyJob::new(app.notifier.clone());
    let schedule = app.config.read().await.notify_schedule.clone();
    let job_id = Arc::new(RwLock::new(job.schedule(&scheduler, &schedule).await?));
    scheduler.start().await?;
    info!("notification scheduler started");

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let cfg_reload = app.config.clone();
        let scheduler_reload = scheduler.clone();
        let job_reload = job.clone();
        let job_id_reload = job_id.clone();
        tokio::spawn(async move {
            if let Ok(mut hup) = signal(SignalKind::hangup()) {
                while hup.recv().await.is_some() {
                    match Config::from_file(&cfg_path) {
                        Ok(mut new_cfg) => {
                            let old_schedule = cfg_reload.read().await.notify_schedule.clone();
                            if new_cfg.notify_schedule != old_schedule {
                                let mut id = job_id_reload.write().await;
                                match job_reload
                                    .schedule(&scheduler_reload, &new_cfg.notify_schedule)
                                    .await
                                {
                                    Ok(new_id) => {
                                        if let Err(e) = scheduler_reload.remove(&id).await {
                                            error!("failed to remove old notification job: {e}");
                                        }
                                        *id = new_id;
                                    }
                                    Err(e) => {
                                        error!("invalid notify schedule: {e}");
                                        new_cfg.notify_schedule = old_schedule;
                                    }
                                }
                            }
                            cfg_reload.write().await.update_runtime(new_cfg);
                            info!("configuration reloaded");
                        }
                        Err(e) => error!("failed to reload config: {e}"),
                    }
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.shutdown().await?;
    Ok(())
}
