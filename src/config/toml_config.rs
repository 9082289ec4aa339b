use crate::adapters::smtp::SmtpSettings;
use crate::domain::model::{Campaign, DispatchJob};
use crate::utils::error::{MailerError, Result};
use crate::utils::validation::{
    validate_email_field, validate_non_empty_string, validate_path, validate_range,
    validate_rate, validate_seconds, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    pub timeout_seconds: Option<f64>,
    pub helo_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_rate")]
    pub rate_per_second: f64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_backoff")]
    pub retry_backoff_seconds: f64,
    #[serde(default)]
    pub fail_fast_on_auth: bool,
    #[serde(default)]
    pub retry_failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    #[serde(default)]
    pub json: bool,
}

fn default_port() -> u16 {
    25
}

fn default_sender() -> String {
    DispatchJob::DEFAULT_SENDER.to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_rate() -> f64 {
    1.0
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_backoff() -> f64 {
    2.0
}

fn default_store_path() -> String {
    "./mailer-store.json".to_string()
}

const DEFAULT_TIMEOUT_SECONDS: f64 = 15.0;

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sender: default_sender(),
            concurrency: default_concurrency(),
            rate_per_second: default_rate(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_seconds: default_backoff(),
            fail_fast_on_auth: false,
            retry_failed: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl MailerConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(MailerError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| MailerError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SMTP_PASSWORD})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_PLACEHOLDER
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn timeout(&self) -> Result<Duration> {
        validate_seconds(
            "smtp.timeout_seconds",
            self.smtp.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        )
    }

    pub fn smtp_settings(&self) -> Result<SmtpSettings> {
        let mut settings = SmtpSettings::new(self.smtp.host.clone(), self.smtp.port);
        settings.username = self.smtp.username.clone().filter(|u| !u.is_empty());
        settings.password = self.smtp.password.clone().filter(|p| !p.is_empty());
        settings.use_tls = self.smtp.use_tls;
        settings.timeout = self.timeout()?;
        if let Some(helo) = &self.smtp.helo_name {
            settings.helo_name = helo.clone();
        }
        Ok(settings)
    }

    /// Builds the run parameters for one campaign.
    pub fn dispatch_job(&self, campaign: &Campaign) -> Result<DispatchJob> {
        let mut job = DispatchJob::new(campaign);
        job.sender = self.dispatch.sender.clone();
        job.concurrency = self.dispatch.concurrency;
        job.rate_per_second = self.dispatch.rate_per_second;
        job.retry_attempts = self.dispatch.retry_attempts;
        job.backoff_unit = validate_seconds(
            "dispatch.retry_backoff_seconds",
            self.dispatch.retry_backoff_seconds,
        )?;
        job.send_timeout = self.timeout()?;
        job.fail_fast_on_auth = self.dispatch.fail_fast_on_auth;
        job.retry_failed = self.dispatch.retry_failed;
        Ok(job)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().map(|l| l.json).unwrap_or(false)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("smtp.host", &self.smtp.host)?;
        validate_range("smtp.port", self.smtp.port, 1, u16::MAX)?;
        let placeholders = [
            ("smtp.host", Some(self.smtp.host.as_str())),
            ("smtp.username", self.smtp.username.as_deref()),
            ("smtp.password", self.smtp.password.as_deref()),
        ];
        for (field, value) in placeholders {
            if value.is_some_and(|v| v.contains("${")) {
                return Err(MailerError::MissingConfigError {
                    field: format!("{} (environment variable not set)", field),
                });
            }
        }
        if self.smtp.username.is_some() != self.smtp.password.is_some() {
            return Err(MailerError::ConfigValidationError {
                field: "smtp.username".to_string(),
                message: "username and password must be set together".to_string(),
            });
        }
        let timeout = self.timeout()?;
        if timeout.is_zero() {
            return Err(MailerError::InvalidConfigValueError {
                field: "smtp.timeout_seconds".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be greater than zero".to_string(),
            });
        }

        validate_email_field("dispatch.sender", &self.dispatch.sender)?;
        validate_range(
            "dispatch.concurrency",
            self.dispatch.concurrency,
            1,
            DispatchJob::MAX_CONCURRENCY,
        )?;
        validate_rate("dispatch.rate_per_second", self.dispatch.rate_per_second)?;
        validate_seconds(
            "dispatch.retry_backoff_seconds",
            self.dispatch.retry_backoff_seconds,
        )?;

        validate_path("store.path", &self.store.path)?;
        Ok(())
    }
}

impl Validate for MailerConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
