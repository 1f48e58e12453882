use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::error::Error;

/// Floor for `min_password_length`.
pub const MIN_PASSWORD_LENGTH: usize = 8;

fn default_db_url() -> String {
    "sqlite:///var/photohub/photohub.db".into()
}

fn default_site_name() -> String {
    "photohub".into()
}

fn default_team_signature() -> String {
    "Your photohub team".into()
}

fn default_team_signature_de() -> String {
    "Dein photohub-Team".into()
}

fn default_notify_schedule() -> String {
    "0 */10 * * * *".to_string() // Every ten minutes
}

fn default_min_password_length() -> usize {
    MIN_PASSWORD_LENGTH
}

fn default_mail_transport() -> String {
    "log".into()
}

fn default_mail_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@example.com".into()
}

fn expand_placeholders(text: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let env_re = Regex::new(r"\$ENV\{([^}]+)\}")?;
    let file_re = Regex::new(r"\$FILE\{([^}]+)\}")?;
    let mut out = String::new();
    let mut last = 0;
    for caps in env_re.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&text[last..m.start()]);
        let var = std::env::var(&caps[1])
            .map_err(|e| format!("environment variable {}: {e}", &caps[1]))?;
        out.push_str(&var);
        last = m.end();
    }
    out.push_str(&text[last..]);
    let text = out;
    let mut out = String::new();
    let mut last = 0;
    for caps in file_re.captures_iter(&text) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&text[last..m.start()]);
        let contents = std::fs::read_to_string(&caps[1])?;
        out.push_str(contents.trim_end());
        last = m.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_db_url")]
    pub db_url: String,
    #[serde(default = "default_site_name")]
    pub site_name: String,
    #[serde(default = "default_team_signature")]
    pub team_signature: String,
    #[serde(default = "default_team_signature_de")]
    pub team_signature_de: String,
    /// Prefix of the link sent in verification mails; the token is appended.
    #[serde(default)]
    pub email_verification_url: String,
    #[serde(default = "default_notify_schedule")]
    pub notify_schedule: String,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MailConfig {
    /// `smtp` or `log`
    #[serde(default = "default_mail_transport")]
    pub transport: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_mail_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_site_name")]
    pub from_name: String,
    #[serde(default)]
    pub insecure: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: default_mail_transport(),
            host: String::new(),
            port: default_mail_port(),
            username: None,
            password: None,
            from_address: default_from_address(),
            from_name: default_site_name(),
            insecure: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            site_name: default_site_name(),
            team_signature: default_team_signature(),
            team_signature_de: default_team_signature_de(),
            email_verification_url: String::new(),
            notify_schedule: default_notify_schedule(),
            min_password_length: default_min_password_length(),
            mail: MailConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// resolved, or the contents do not parse or validate.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{path}: {e}")))?;
        Self::from_toml(&text)
    }

    /// Parse and validate configuration text, expanding `$ENV{..}` and
    /// `$FILE{..}` placeholders first.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let text = expand_placeholders(text).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_password_length < MIN_PASSWORD_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "min_password_length must be at least {MIN_PASSWORD_LENGTH}"
            )));
        }
        if self.email_verification_url.trim().is_empty() {
            return Err(ConfigError::Invalid("email_verification_url must be set".into()));
        }
        Ok(())
    }

    /// Update runtime-adjustable values from a new configuration.
    /// The database location and the mail transport are fixed for the
    /// lifetime of the process.
    pub fn update_runtime(&mut self, other: Config) {
        self.site_name = other.site_name;
        self.team_signature = other.team_signature;
        self.team_signature_de = other.team_signature_de;
        self.email_verification_url = other.email_verification_url;
        self.notify_schedule = other.notify_schedule;
        self.min_password_length = other.min_password_length;
    }
}
