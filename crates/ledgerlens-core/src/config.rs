//! LedgerLens configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ReportError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerLensConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl LedgerLensConfig {
    /// Load config from the default path (~/.ledgerlens/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReportError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ReportError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the LedgerLens home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ledgerlens")
    }

    /// Longest time a delivery may take across the configured channels.
    pub fn delivery_timeout_secs(&self) -> u64 {
        let email = self.email.as_ref().map(|e| e.timeout_secs).unwrap_or(0);
        let slack = self.slack.as_ref().map(|s| s.timeout_secs).unwrap_or(0);
        let webhook = self.webhook.as_ref().map(|w| w.timeout_secs).unwrap_or(0);
        email.max(slack).max(webhook)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.poll_interval_secs == 0 {
            return Err(ReportError::Config("scheduler.poll_interval_secs must be > 0".into()));
        }
        if s.report_timeout_secs == 0 {
            return Err(ReportError::Config("scheduler.report_timeout_secs must be > 0".into()));
        }
        // Files younger than the slowest end-to-end run may still be in flight.
        let in_flight = s.report_timeout_secs + self.delivery_timeout_secs();
        if s.cleanup_max_age_hours * 3600 <= in_flight {
            return Err(ReportError::Config(format!(
                "scheduler.cleanup_max_age_hours ({}h) must exceed the maximum in-flight time ({in_flight}s)",
                s.cleanup_max_age_hours
            )));
        }
        if self.output.dir.trim().is_empty() {
            return Err(ReportError::Config("output.dir is required".into()));
        }
        if let Some(email) = &self.email
            && (email.smtp_host.is_empty() || email.from_address.is_empty())
        {
            return Err(ReportError::Config(
                "email.smtp_host and email.from_address are required".into(),
            ));
        }
        if let Some(slack) = &self.slack
            && slack.webhook_url.is_empty()
        {
            return Err(ReportError::Config("slack.webhook_url is required".into()));
        }
        Ok(())
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_timeout")]
    pub report_timeout_secs: u64,
    #[serde(default = "default_upcoming_window")]
    pub upcoming_window_hours: u64,
    #[serde(default = "default_cleanup_max_age")]
    pub cleanup_max_age_hours: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_poll_interval() -> u64 { 15 * 60 }
fn default_report_timeout() -> u64 { 300 }
fn default_upcoming_window() -> u64 { 24 }
fn default_cleanup_max_age() -> u64 { 72 }
fn default_cleanup_interval() -> u64 { 3600 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            report_timeout_secs: default_report_timeout(),
            upcoming_window_hours: default_upcoming_window(),
            cleanup_max_age_hours: default_cleanup_max_age(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

/// Rendered artifact output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// Company name printed on the PDF cover and workbook summary.
    #[serde(default)]
    pub company_name: Option<String>,
}

fn default_output_dir() -> String { "~/.ledgerlens/reports".into() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            company_name: None,
        }
    }
}

/// SQLite store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.ledgerlens/ledgerlens.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

/// Analytics service the metric lookups are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_url() -> String { "http://127.0.0.1:8080/api/analytics".into() }
fn default_provider_timeout() -> u64 { 30 }

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            api_key: None,
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// Outbound SMTP for email delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from_address: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

fn default_smtp_port() -> u16 { 587 }
fn default_email_timeout() -> u64 { 60 }

/// Slack incoming-webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    /// Public base URL where the reports directory is served, for links.
    #[serde(default)]
    pub link_base_url: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

/// Generic HTTP webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Fallback URL when a schedule lists no recipients.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub link_base_url: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 { 10 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LedgerLensConfig::default();
        assert_eq!(config.scheduler.poll_interval_secs, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: LedgerLensConfig = toml::from_str(
            r#"
            [scheduler]
            poll_interval_secs = 60

            [output]
            dir = "/tmp/reports"
            company_name = "Acme"

            [slack]
            webhook_url = "https://hooks.slack.test/x"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert_eq!(config.scheduler.report_timeout_secs, 300);
        assert_eq!(config.output.company_name.as_deref(), Some("Acme"));
        assert_eq!(config.slack.unwrap().timeout_secs, 10);
    }

    #[test]
    fn test_cleanup_age_must_exceed_in_flight_time() {
        let mut config = LedgerLensConfig::default();
        config.scheduler.report_timeout_secs = 2 * 3600;
        config.scheduler.cleanup_max_age_hours = 2;
        assert!(matches!(config.validate(), Err(ReportError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler]\npoll_interval_secs = 0\n").unwrap();
        assert!(LedgerLensConfig::load_from(&path).is_err());
        std::fs::write(&path, "[scheduler]\npoll_interval_secs = 30\n").unwrap();
        assert_eq!(
            LedgerLensConfig::load_from(&path).unwrap().scheduler.poll_interval_secs,
            30
        );
    }
}
