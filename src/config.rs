use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Product name used for window titles and the fallback log file.
pub const BUILD_NAME: &str = "PingStats";

/// Longest accepted heartbeat period (one day).
pub const MAX_HEARTBEAT_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for tracing output. Live mode always writes diagnostics to a file so the
    /// chart is not overdrawn; this only picks where.
    #[serde(default)]
    pub diagnostics_directory: Option<String>,
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
    #[serde(default = "default_log_name")]
    pub log_name: String,
    #[serde(default)]
    pub nofile: bool,
    #[serde(default)]
    pub quiet: bool,
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: f64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    #[serde(default = "default_table_length")]
    pub table_length: usize,
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
    #[serde(default = "default_failure_alert_threshold")]
    pub failure_alert_threshold: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    ".".to_string()
}

fn default_log_name() -> String {
    format!("{BUILD_NAME}Log")
}

fn default_delay_seconds() -> f64 {
    0.22
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_payload_size() -> usize {
    64
}

fn default_table_length() -> usize {
    250
}

fn default_refresh_ms() -> u64 {
    200
}

fn default_heartbeat_seconds() -> u64 {
    60
}

fn default_failure_alert_threshold() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            diagnostics_directory: None,
            log_directory: default_log_directory(),
            log_name: default_log_name(),
            nofile: false,
            quiet: false,
            delay_seconds: default_delay_seconds(),
            timeout_ms: default_timeout_ms(),
            payload_size: default_payload_size(),
            table_length: default_table_length(),
            refresh_ms: default_refresh_ms(),
            heartbeat_seconds: default_heartbeat_seconds(),
            failure_alert_threshold: default_failure_alert_threshold(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> &'static str {
        "config/pingstats.toml"
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref)
            .with_context(|| format!("failed to read configuration from {}", path_ref.display()))?;
        let config: Self = toml::from_str(&raw).with_context(|| {
            format!("failed to parse configuration from {}", path_ref.display())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the default configuration file when it exists, built-in defaults otherwise.
    pub fn load_or_default() -> Result<Self> {
        let path = Path::new(Self::default_path());
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Err(err) = Duration::try_from_secs_f64(self.delay_seconds) {
            bail!("invalid delay of {} seconds: {err}", self.delay_seconds);
        }
        if self.timeout_ms == 0 {
            bail!("timeout must be at least 1 millisecond");
        }
        if self.table_length == 0 {
            bail!("table length must be at least 1");
        }
        if self.refresh_ms == 0 {
            bail!("refresh interval must be at least 1 millisecond");
        }
        if self.heartbeat_seconds > MAX_HEARTBEAT_SECONDS {
            bail!(
                "heartbeat of {} seconds exceeds the maximum of {MAX_HEARTBEAT_SECONDS}",
                self.heartbeat_seconds
            );
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds.max(1))
    }

    pub fn verbose(&self) -> bool {
        !self.quiet
    }
}
