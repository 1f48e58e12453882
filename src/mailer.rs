use crate::config::MailConfig;
use crate::error::DeliveryError;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::Mailbox,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use std::sync::Arc;

/// Outbound plain-text email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a message, reporting any delivery failure to the caller.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

pub type DynMailer = Arc<dyn Mailer>;

/// SMTP relay transport.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the transport from the `[mail]` configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid sender address, a relay that cannot be
    /// set up, or a username given without password (or vice versa).
    pub fn new(cfg: &MailConfig) -> Result<Self, DeliveryError> {
        let from: Mailbox = format!("{} <{}>", cfg.from_name, cfg.from_address)
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress(format!("sender: {e}")))?;

        let transport = if cfg.insecure {
            tracing::warn!(
                host = %cfg.host,
                port = cfg.port,
                "Using insecure (unencrypted) SMTP transport - only use for local development!"
            );
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
                .port(cfg.port)
                .build()
        } else {
            let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                .map_err(|e| DeliveryError::Transport(format!("Failed to create SMTP transport: {e}")))?
                .port(cfg.port);

            match (&cfg.username, &cfg.password) {
                (Some(user), Some(pass)) => builder
                    .credentials(Credentials::new(user.clone(), pass.clone()))
                    .build(),
                (None, None) => builder.build(),
                _ => {
                    return Err(DeliveryError::Transport(
                        "SMTP username and password must both be provided or both be empty".into(),
                    ));
                }
            }
        };

        Ok(Self { from, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress(format!("{to}: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())
            .map_err(|e| DeliveryError::Transport(format!("Failed to build email message: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::Transport(format!("Failed to send email: {e}")))?;

        tracing::info!(to = to, subject = subject, "Email sent");
        Ok(())
    }
}

/// Writes mails to the log instead of sending them. Message bodies can carry
/// generated passwords, so only the body length is recorded.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        tracing::info!(to = to, subject = subject, body_len = body.len(), "Email not sent (log transport)");
        Ok(())
    }
}

/// Build the mailer selected by `[mail] transport`.
pub fn from_config(cfg: &MailConfig) -> Result<DynMailer, DeliveryError> {
    match cfg.transport.as_str() {
        "smtp" => Ok(Arc::new(SmtpMailer::new(cfg)?)),
        "log" => Ok(Arc::new(LogMailer)),
        other => Err(DeliveryError::Transport(format!("unknown mail transport '{other}'"))),
    }
}
