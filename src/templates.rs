//! Localized bodies of the mails sent to account holders.

use crate::account::{Locale, PendingReviewOutcome};
use crate::config::Config;

pub struct Mail {
    pub subject: String,
    pub body: String,
}

/// Signature lines for the recipient's language.
fn signature(cfg: &Config, locale: Locale) -> (&'static str, &str) {
    match locale {
        Locale::German => ("Viele Grüße", &cfg.team_signature_de),
        Locale::English => ("Cheers", &cfg.team_signature),
    }
}

pub fn new_password(cfg: &Config, locale: Locale, password: &str) -> Mail {
    let (closing, team) = signature(cfg, locale);
    let (subject, body) = match locale {
        Locale::German => (
            format!("{} neues Passwort", cfg.site_name),
            format!("Hallo,\n\nDein neues Passwort lautet: {password}\n\n{closing}\n{team}"),
        ),
        Locale::English => (
            format!("{} new password", cfg.site_name),
            format!("Hello,\n\nyour new password is: {password}\n\n{closing}\n{team}"),
        ),
    };
    Mail { subject, body }
}

pub fn email_verification(cfg: &Config, token: &str) -> Mail {
    let link = format!("{}{}", cfg.email_verification_url, token);
    let body = format!(
        "Hello,\n\nplease click on {link} to verify your eMail-Address.\n\n\
         Cheers\n{}\n\n---\n\
         Hallo,\n\nbitte klicke auf {link}, um Deine eMail-Adresse zu verifizieren.\n\n\
         Viele Grüße\n{}",
        cfg.team_signature, cfg.team_signature_de
    );
    Mail {
        subject: format!("{} eMail verification", cfg.site_name),
        body,
    }
}

/// One line per outcome, in the given order, numbered from 1.
pub fn outcome_lines(outcomes: &[PendingReviewOutcome]) -> String {
    let mut out = String::new();
    for (n, outcome) in outcomes.iter().enumerate() {
        let line = match &outcome.reject_reason {
            None => format!("{}. {}: accepted\n", n + 1, outcome.title),
            Some(reason) => format!("{}. {}: rejected - {}\n", n + 1, outcome.title, reason),
        };
        out.push_str(&line);
    }
    out
}

pub fn review_digest(
    cfg: &Config,
    locale: Locale,
    nickname: &str,
    outcomes: &[PendingReviewOutcome],
) -> Mail {
    let (closing, team) = signature(cfg, locale);
    let greeting = match locale {
        Locale::German => format!("Hallo {nickname},\n\nvielen Dank für Deine Beiträge."),
        Locale::English => format!("Hello {nickname},\n\nthank you for your contributions."),
    };
    let body = format!(
        "{greeting}\n\n{closing}\n{team}\n\n---------------------------------\n\n{}",
        outcome_lines(outcomes)
    );
    Mail {
        subject: format!("{} review result", cfg.site_name),
        body,
    }
}
