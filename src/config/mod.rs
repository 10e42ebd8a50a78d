//! Configuration management.
//!
//! Configuration comes from a TOML file, then environment overrides:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `HITPORT_CONFIG_PATH` | Config file to load when `--config` is not given |
//! | `HITPORT_PRODUCTION` | `1`, `true` or `yes` enables throttling |
//! | `HITPORT_DATA_DIR` | Overrides `data_dir` |

use crate::io::faults::DEFAULT_FAULT_CAPACITY;
use crate::io::services::export::{DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE};
use crate::io::services::import::{DEFAULT_PAUSE, DEFAULT_PAUSE_EVERY, DEFAULT_SETTLE_DELAY};
use crate::io::{ExportOptions, ImportOptions, Throttle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for hitport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitportConfig {
    /// Directory holding the database and, by default, export artifacts.
    pub data_dir: PathBuf,
    /// Database file, relative to `data_dir` unless absolute.
    pub database: PathBuf,
    /// Artifact directory, relative to `data_dir` unless absolute.
    pub export_dir: PathBuf,
    /// Production mode; enables throttling.
    pub production: bool,
    /// Export settings.
    pub export: ExportConfig,
    /// Import settings.
    pub import: ImportConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Notification settings.
    pub notify: NotifyConfig,
}

/// Export settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportConfig {
    /// Hits fetched per batch.
    pub batch_size: usize,
    /// Pause between batches in production mode, in milliseconds.
    pub batch_delay_ms: u64,
}

/// Import settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportConfig {
    /// Rows between pauses in production mode.
    pub pause_every: u64,
    /// Pause length in production mode, in seconds.
    pub pause_secs: u64,
    /// Wait before the completion notification, in seconds.
    pub settle_secs: u64,
    /// Rejected rows kept in detail.
    pub fault_capacity: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. `info` or `hitport=debug`.
    pub filter: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

/// Notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyConfig {
    /// Webhook receiving notifications; they are logged when unset.
    pub webhook_url: Option<String>,
    /// Webhook request timeout, in seconds.
    pub timeout_secs: u64,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Database file.
    pub database: Option<String>,
    /// Artifact directory.
    pub export_dir: Option<String>,
    /// Production mode.
    pub production: Option<bool>,
    /// Export section.
    pub export: Option<ConfigFileExport>,
    /// Import section.
    pub import: Option<ConfigFileImport>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Notify section.
    pub notify: Option<ConfigFileNotify>,
}

/// Export section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileExport {
    /// Batch size.
    pub batch_size: Option<usize>,
    /// Inter-batch delay.
    pub batch_delay_ms: Option<u64>,
}

/// Import section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileImport {
    /// Rows between pauses.
    pub pause_every: Option<u64>,
    /// Pause length.
    pub pause_secs: Option<u64>,
    /// Settle delay.
    pub settle_secs: Option<u64>,
    /// Fault capacity.
    pub fault_capacity: Option<usize>,
}

/// Notify section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileNotify {
    /// Webhook URL.
    pub webhook_url: Option<String>,
    /// Timeout.
    pub timeout_secs: Option<u64>,
}

impl Default for HitportConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".hitport"),
            database: PathBuf::from("hitport.db"),
            export_dir: PathBuf::from("exports"),
            production: false,
            export: ExportConfig {
                batch_size: DEFAULT_BATCH_SIZE,
                batch_delay_ms: u64::try_from(DEFAULT_BATCH_DELAY.as_millis()).unwrap_or(u64::MAX),
            },
            import: ImportConfig {
                pause_every: DEFAULT_PAUSE_EVERY,
                pause_secs: DEFAULT_PAUSE.as_secs(),
                settle_secs: DEFAULT_SETTLE_DELAY.as_secs(),
                fault_capacity: DEFAULT_FAULT_CAPACITY,
            },
            logging: LoggingSettings::default(),
            notify: NotifyConfig {
                webhook_url: None,
                timeout_secs: crate::notify::DEFAULT_TIMEOUT_SECS,
            },
        }
    }
}

/// Returns whether an environment value means "on".
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

impl HitportConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/hitport/` on macOS)
    /// 2. XDG config dir (`~/.config/hitport/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("hitport").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("hitport")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring config file"),
            }
        }

        Self::default()
    }

    /// Loads configuration for the CLI: `explicit` path, then
    /// `HITPORT_CONFIG_PATH`, then the default locations; environment
    /// overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be loaded.
    pub fn load(explicit: Option<&Path>) -> crate::Result<Self> {
        let env_path = std::env::var_os("HITPORT_CONFIG_PATH").map(PathBuf::from);
        let config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Applies environment overrides read through `lookup`.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("HITPORT_PRODUCTION") {
            self.production = is_truthy(&v);
        }
        if let Some(dir) = lookup("HITPORT_DATA_DIR").filter(|d| !d.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        self
    }

    /// Converts a `ConfigFile` to `HitportConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(database) = file.database {
            config.database = PathBuf::from(database);
        }
        if let Some(export_dir) = file.export_dir {
            config.export_dir = PathBuf::from(export_dir);
        }
        if let Some(production) = file.production {
            config.production = production;
        }
        if let Some(export) = file.export {
            if let Some(v) = export.batch_size {
                config.export.batch_size = v.max(1);
            }
            if let Some(v) = export.batch_delay_ms {
                config.export.batch_delay_ms = v;
            }
        }
        if let Some(import) = file.import {
            if let Some(v) = import.pause_every {
                config.import.pause_every = v.max(1);
            }
            if let Some(v) = import.pause_secs {
                config.import.pause_secs = v;
            }
            if let Some(v) = import.settle_secs {
                config.import.settle_secs = v;
            }
            if let Some(v) = import.fault_capacity {
                config.import.fault_capacity = v;
            }
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(notify) = file.notify {
            config.notify.webhook_url = notify.webhook_url.filter(|u| !u.is_empty());
            if let Some(v) = notify.timeout_secs {
                config.notify.timeout_secs = v;
            }
        }

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Returns the database file path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database)
    }

    /// Returns the artifact directory.
    #[must_use]
    pub fn export_dir_path(&self) -> PathBuf {
        self.data_dir.join(&self.export_dir)
    }

    /// Export options for this configuration.
    #[must_use]
    pub const fn export_options(&self) -> ExportOptions {
        ExportOptions::new(
            self.export.batch_size,
            Throttle::new(
                self.production,
                1,
                Duration::from_millis(self.export.batch_delay_ms),
            ),
        )
    }

    /// Import options for this configuration.
    ///
    /// The pause between rows only applies in production mode. The settle
    /// delay applies in every mode, to any run that notifies.
    #[must_use]
    pub const fn import_options(&self) -> ImportOptions {
        ImportOptions {
            throttle: Throttle::new(
                self.production,
                self.import.pause_every,
                Duration::from_secs(self.import.pause_secs),
            ),
            settle_delay: Duration::from_secs(self.import.settle_secs),
            fault_capacity: self.import.fault_capacity,
        }
    }

    /// Webhook timeout.
    #[must_use]
    pub const fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify.timeout_secs)
    }
}
