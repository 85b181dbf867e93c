//! Process configuration.
//!
//! Built once from [`Cli`] (which already folds in environment variables) plus
//! a few deployment hints read straight from the environment. The persisted
//! relay record in `config_path` is handled by the selection store and takes
//! precedence over the webhook URL and port given here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::selection::EnvDefaults;
use crate::session::{LaunchOptions, RetryPolicy};

const SESSION_DIR_NAME: &str = ".wwebjs_auth";

/// Validated configuration for one relay process.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    /// May be empty: delivery then fails with "not configured".
    pub slack_webhook_url: String,
    pub config_path: PathBuf,
    pub bridge_url: String,
    pub launch: LaunchOptions,
    pub retry: RetryPolicy,
    pub startup_delay: Duration,
    pub static_dir: PathBuf,
}

impl RelayConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary environment lookup.
    pub fn resolve<F>(cli: &Cli, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bridge_url = cli.bridge_url.trim().trim_end_matches('/').to_string();
        validate_http_url("WHATSAPP_BRIDGE_URL", &bridge_url)?;

        let slack_webhook_url = cli
            .slack_webhook_url
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if !slack_webhook_url.is_empty()
            && let Err(e) = validate_http_url("SLACK_WEBHOOK_URL", &slack_webhook_url)
        {
            tracing::warn!(error = %e, "Slack webhook URL looks invalid, deliveries will fail");
        }

        if cli.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_retries".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let session_data_path = match &cli.session_data_path {
            Some(path) => path.clone(),
            None => default_session_path(env("RAILWAY_VOLUME_MOUNT_PATH").as_deref()),
        };
        let headless = cli.headless.unwrap_or_else(|| is_production(&env));

        Ok(Self {
            port: cli.port,
            slack_webhook_url,
            config_path: cli.config_path.clone(),
            bridge_url,
            launch: LaunchOptions {
                headless,
                session_data_path: session_data_path.to_string_lossy().into_owned(),
            },
            retry: RetryPolicy {
                max_attempts: cli.max_retries,
                delay: Duration::from_secs(cli.retry_delay_secs),
            },
            startup_delay: Duration::from_secs(cli.startup_delay_secs),
            static_dir: cli.static_dir.clone(),
        })
    }

    /// Environment-level fallbacks for the persisted record.
    pub fn env_defaults(&self) -> EnvDefaults {
        EnvDefaults {
            slack_webhook_url: self.slack_webhook_url.clone(),
            server_port: self.port,
        }
    }
}

/// JSON log output is requested by `--log-json` or `LOG_FORMAT=json`.
pub fn json_logs_requested<F>(cli: &Cli, env: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    cli.log_json || env("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"))
}

/// Production-like environments have no display to show a browser on.
fn is_production<F>(env: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    env("NODE_ENV").as_deref() == Some("production")
        || env("RAILWAY_ENVIRONMENT").is_some()
        || env("DISPLAY").is_none_or(|d| d.is_empty())
}

fn default_session_path(volume: Option<&str>) -> PathBuf {
    match volume.filter(|v| !v.is_empty()) {
        Some(volume) => Path::new(volume).join(SESSION_DIR_NAME),
        None => PathBuf::from(SESSION_DIR_NAME),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    };
    let url = url::Url::parse(value).map_err(|e| invalid(format!("'{}': {}", value, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("'{}' is not an http(s) URL", value)));
    }
    Ok(())
}
