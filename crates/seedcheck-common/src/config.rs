//! Configuration for SeedCheck

use crate::types::PlacementResult;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Outbound SMTP relay used to dispatch probes
    #[serde(default)]
    pub relay: RelayConfig,

    /// Seed mailbox panel, one entry per provider
    #[serde(default)]
    pub seed_mailboxes: Vec<SeedMailboxConfig>,

    /// Spam scoring service
    #[serde(default)]
    pub spam_check: SpamCheckConfig,

    /// DNS validation
    #[serde(default)]
    pub dns: DnsConfig,

    /// Pipeline timing and retry behaviour
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Outbound SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_host")]
    pub host: String,

    #[serde(default = "default_relay_port")]
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Use STARTTLS rather than implicit TLS
    #[serde(default = "default_true")]
    pub starttls: bool,

    /// Send timeout in seconds
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_relay_port(),
            username: None,
            password: None,
            starttls: default_true(),
            timeout_secs: default_relay_timeout(),
        }
    }
}

fn default_relay_host() -> String {
    "localhost".to_string()
}

fn default_relay_port() -> u16 {
    587
}

fn default_relay_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// One seed mailbox in the panel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedMailboxConfig {
    /// Provider key, e.g. "gmail"
    pub provider: String,

    /// Address the probe is sent to
    pub address: String,

    /// IMAP host
    pub host: String,

    /// IMAP port (implicit TLS)
    #[serde(default = "default_imap_port")]
    pub port: u16,

    /// IMAP login user
    pub username: String,

    /// IMAP login secret
    pub password: String,

    /// Spam-equivalent folders to search, in order
    pub spam_folders: Vec<String>,

    /// Placement reported when the probe is found in a spam folder
    #[serde(default = "default_spam_label")]
    pub spam_label: PlacementResult,

    /// Secondary-inbox folder searched last, e.g. "[Gmail]/Promotions"
    pub promotions_folder: Option<String>,
}

fn default_imap_port() -> u16 {
    993
}

fn default_spam_label() -> PlacementResult {
    PlacementResult::Spam
}

/// Spam scoring service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamCheckConfig {
    /// SpamCheck-compatible HTTP endpoint
    #[serde(default = "default_spam_check_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_spam_check_timeout")]
    pub timeout_secs: u64,
}

impl Default for SpamCheckConfig {
    fn default() -> Self {
        Self {
            url: default_spam_check_url(),
            timeout_secs: default_spam_check_timeout(),
        }
    }
}

fn default_spam_check_url() -> String {
    "https://spamcheck.postmarkapp.com/filter".to_string()
}

fn default_spam_check_timeout() -> u64 {
    30
}

/// DNS validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Per-lookup timeout in seconds
    #[serde(default = "default_dns_timeout")]
    pub timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dns_timeout(),
        }
    }
}

fn default_dns_timeout() -> u64 {
    10
}

/// Pipeline timing and retry behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Delivery propagation window before placement is checked (live mode)
    #[serde(default = "default_delivery_wait")]
    pub delivery_wait_secs: u64,

    /// Attempts per pipeline step
    #[serde(default = "default_step_attempts")]
    pub step_attempts: u32,

    /// Base delay for step retry backoff, doubled per attempt
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Per-provider mailbox check timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delivery_wait_secs: default_delivery_wait(),
            step_attempts: default_step_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            provider_timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_delivery_wait() -> u64 {
    60
}

fn default_step_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_provider_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/seedcheck/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.bind, "0.0.0.0:8080");

        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.delivery_wait_secs, 60);
        assert_eq!(pipeline.step_attempts, 3);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
bind = "127.0.0.1:9000"

[relay]
host = "smtp.example.com"
port = 587
username = "probe@example.com"
password = "secret"

[[seed_mailboxes]]
provider = "gmail"
address = "seed@gmail.com"
host = "imap.gmail.com"
username = "seed@gmail.com"
password = "app-password"
spam_folders = ["[Gmail]/Spam"]
spam_label = "spam"
promotions_folder = "[Gmail]/Promotions"

[[seed_mailboxes]]
provider = "yahoo"
address = "seed@yahoo.com"
host = "imap.mail.yahoo.com"
username = "seed@yahoo.com"
password = "app-password"
spam_folders = ["Bulk Mail", "Bulk", "Spam"]
spam_label = "bulk"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.relay.host, "smtp.example.com");
        assert_eq!(config.seed_mailboxes.len(), 2);
        assert_eq!(config.seed_mailboxes[0].port, 993);
        assert_eq!(
            config.seed_mailboxes[1].spam_label,
            PlacementResult::Bulk
        );
        assert!(config.seed_mailboxes[1].promotions_folder.is_none());
    }
}
