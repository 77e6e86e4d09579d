use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What happens to an open escrow obligation when its training request is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowDeletePolicy {
    /// Delete the request, keep the obligation and report it as orphaned
    #[default]
    Orphan,
    /// Refuse the delete while an obligation is open
    Refuse,
    /// Delete the request and drop its open obligation
    Cancel,
}

impl EscrowDeletePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowDeletePolicy::Orphan => "orphan",
            EscrowDeletePolicy::Refuse => "refuse",
            EscrowDeletePolicy::Cancel => "cancel",
        }
    }
}

impl fmt::Display for EscrowDeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EscrowDeletePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "orphan" => Ok(EscrowDeletePolicy::Orphan),
            "refuse" => Ok(EscrowDeletePolicy::Refuse),
            "cancel" => Ok(EscrowDeletePolicy::Cancel),
            _ => Err(format!(
                "invalid escrow delete policy '{}'; expected orphan|refuse|cancel",
                raw
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Policy applied to open obligations when a request is deleted
    #[serde(default)]
    pub escrow_on_delete: EscrowDeletePolicy,
    /// Upper bound on waiting for an external settlement confirmation
    #[serde(default = "default_settlement_timeout")]
    pub settlement_timeout_ms: u64,
    /// Capacity of the engine event broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_settlement_timeout() -> u64 {
    30_000
}

fn default_event_buffer() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escrow_on_delete: EscrowDeletePolicy::default(),
            settlement_timeout_ms: default_settlement_timeout(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot holding the engine state
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

fn default_snapshot_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trustrain")
        .join("state.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info" or "info,trustrain=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rolling log files; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(default_config_dir())
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("engine.escrow_on_delete", "orphan")?
            .set_default("engine.settlement_timeout_ms", default_settlement_timeout())?
            .set_default("engine.event_buffer", default_event_buffer() as u64)?
            .set_default(
                "storage.snapshot_path",
                default_snapshot_path().to_string_lossy().to_string(),
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRUSTRAIN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRUSTRAIN_ENGINE__EVENT_BUFFER, etc.)
            .add_source(
                Environment::with_prefix("TRUSTRAIN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.settlement_timeout_ms == 0 {
            errors.push("engine.settlement_timeout_ms must be positive".to_string());
        }

        if self.engine.event_buffer == 0 {
            errors.push("engine.event_buffer must be positive".to_string());
        }

        if self.storage.snapshot_path.file_name().is_none() {
            errors.push(format!(
                "storage.snapshot_path must name a file, got '{}'",
                self.storage.snapshot_path.display()
            ));
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            errors.push(format!(
                "logging.level '{}' is not a valid filter",
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `$TRUSTRAIN_CONFIG_DIR`, falling back to `./config`
pub fn default_config_dir() -> PathBuf {
    std::env::var("TRUSTRAIN_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"))
}
