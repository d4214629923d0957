//! This module handles the configuration for the modterm application.
//!
//! It provides functionality to read, parse, and initialize the configuration from a TOML file or
//! use default values when necessary.

use color_eyre::Result;
use color_eyre::{eyre::OptionExt, eyre::WrapErr, eyre::eyre};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// -------------------------------------------------------------------------------------------------
// Modterm Config
// -------------------------------------------------------------------------------------------------

/// Representation of the modterm configuration.
///
/// This struct deserializes the configuration file. The file is expected to be found under
/// `$HOME/.config/modterm/config.toml`.
///
/// # Defaults
///
/// ## Paths
/// - `store_path`: `"$XDG_DATA_HOME/modterm"` or `"~/.local/share/modterm"` - Store location
/// - `logs_dir`: `"$XDG_DATA_HOME/modterm/logs"` - Directory for log files
/// - `logs_max`: 15 - Maximum number of logs to retain
///
/// ## Container runtime
/// - `runtime_cmd`: `"docker"` - Container runtime executable
/// - `image`: `"modterm-module:latest"` - Image every module container runs
/// - `network`: `"modterm"` - Network every module container joins
/// - `runtime_timeout_secs`: 120 - Upper bound for a single runtime call
///
/// ## Configuration handshake
/// - `handshake_attempts`: 10
/// - `handshake_delay_ms`: 1000 - Fixed delay between two attempts
/// - `handshake_request_timeout_secs`: 5 - Timeout of a single configuration request
///
/// # Example Configuration
///
/// ```toml
/// image = "registry.example.com/modules/base:2"
/// network = "modules"
/// runtime_cmd = "podman"
/// ```
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub(crate) struct ModtermConfig {
    /// Location of the config file.
    #[allow(dead_code)]
    pub(crate) config_file: PathBuf,
    /// Directory of the store database
    pub(crate) store_path: PathBuf,
    /// Directory of the log files
    pub(crate) logs_dir: PathBuf,
    /// Maximum number of log files to retain
    pub(crate) logs_max: usize,
    /// Container runtime executable
    pub(crate) runtime_cmd: String,
    /// Image all module containers are started from
    pub(crate) image: String,
    /// Network all module containers are attached to
    pub(crate) network: String,
    /// Timeout for a single container runtime call, in seconds
    pub(crate) runtime_timeout_secs: u64,
    /// Number of configuration attempts
    pub(crate) handshake_attempts: u32,
    /// Delay between two configuration attempts, in milliseconds
    pub(crate) handshake_delay_ms: u64,
    /// Timeout of a single configuration request, in seconds
    pub(crate) handshake_request_timeout_secs: u64,
}

impl Default for ModtermConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::new(),
            store_path: PathBuf::new(),
            logs_dir: PathBuf::new(),
            logs_max: DEFAULT_LOGS_MAX,
            runtime_cmd: DEFAULT_RUNTIME_CMD.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            runtime_timeout_secs: DEFAULT_RUNTIME_TIMEOUT_SECS,
            handshake_attempts: DEFAULT_HANDSHAKE_ATTEMPTS,
            handshake_delay_ms: DEFAULT_HANDSHAKE_DELAY_MS,
            handshake_request_timeout_secs: DEFAULT_HANDSHAKE_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ModtermConfig {
    pub(crate) fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs)
    }

    pub(crate) fn handshake_delay(&self) -> Duration {
        Duration::from_millis(self.handshake_delay_ms)
    }

    pub(crate) fn handshake_request_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_request_timeout_secs)
    }
}

const DEFAULT_LOGS_MAX: usize = 15;
const DEFAULT_RUNTIME_CMD: &str = "docker";
const DEFAULT_IMAGE: &str = "modterm-module:latest";
const DEFAULT_NETWORK: &str = "modterm";
const DEFAULT_RUNTIME_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 10;
const DEFAULT_HANDSHAKE_DELAY_MS: u64 = 1000;
const DEFAULT_HANDSHAKE_REQUEST_TIMEOUT_SECS: u64 = 5;

// -------------------------------------------------------------------------------------------------
// Config Builder
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ModtermConfigBuilder {
    pub(crate) config_file: Option<PathBuf>,
    pub(crate) store_path: Option<PathBuf>,
    pub(crate) logs_dir: Option<PathBuf>,
    pub(crate) logs_max: Option<usize>,
    pub(crate) runtime_cmd: Option<String>,
    pub(crate) image: Option<String>,
    pub(crate) network: Option<String>,
    pub(crate) runtime_timeout_secs: Option<u64>,
    pub(crate) handshake_attempts: Option<u32>,
    pub(crate) handshake_delay_ms: Option<u64>,
    pub(crate) handshake_request_timeout_secs: Option<u64>,
}

impl ModtermConfigBuilder {
    // --
    // * Builders

    pub(crate) fn with_config_file(&mut self, config_file: Option<PathBuf>) -> &mut Self {
        let new = self;
        new.config_file = config_file;
        new
    }

    pub(crate) fn with_store_path(&mut self, store_path: Option<PathBuf>) -> &mut Self {
        let new = self;
        new.store_path = store_path;
        new
    }

    pub(crate) fn with_logs_dir(&mut self, logs_dir: Option<PathBuf>) -> &mut Self {
        let new = self;
        new.logs_dir = logs_dir;
        new
    }

    pub(crate) fn with_logs_max(&mut self, logs_max: Option<usize>) -> &mut Self {
        let new = self;
        new.logs_max = logs_max;
        new
    }

    pub(crate) fn with_runtime_cmd(&mut self, runtime_cmd: Option<String>) -> &mut Self {
        let new = self;
        new.runtime_cmd = runtime_cmd;
        new
    }

    pub(crate) fn with_image(&mut self, image: Option<String>) -> &mut Self {
        let new = self;
        new.image = image;
        new
    }

    pub(crate) fn with_network(&mut self, network: Option<String>) -> &mut Self {
        let new = self;
        new.network = network;
        new
    }

    pub(crate) fn with_runtime_timeout_secs(&mut self, secs: Option<u64>) -> &mut Self {
        let new = self;
        new.runtime_timeout_secs = secs;
        new
    }

    pub(crate) fn with_handshake_attempts(&mut self, attempts: Option<u32>) -> &mut Self {
        let new = self;
        new.handshake_attempts = attempts;
        new
    }

    pub(crate) fn with_handshake_delay_ms(&mut self, delay_ms: Option<u64>) -> &mut Self {
        let new = self;
        new.handshake_delay_ms = delay_ms;
        new
    }

    /// Reads and returns the contents of a configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    fn read_config_file(&self, path: &Path) -> Result<String> {
        let config_file_content: String = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config from {}", path.display()))?;

        Ok(config_file_content)
    }

    /// Helper function to expand a path from configuration
    fn expand_config_path<F>(
        value: &Option<PathBuf>,
        parsed_value: &Option<PathBuf>,
        default_fn: F,
    ) -> Result<PathBuf>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        match value {
            Some(path) => expand_path(path),
            None => parsed_value
                .as_ref()
                .map_or_else(default_fn, |p| expand_path(p)),
        }
    }

    /// Constructs the final configuration by merging defaults, file values, and runtime overrides
    ///
    /// Resolution order (highest priority last):
    /// 1. Default values
    /// 2. Config file values
    /// 3. Explicit builder overrides
    pub(crate) fn build(&self, verbosity: u8) -> Result<ModtermConfig> {
        // Determine the config file path based on environment variables
        let config_file_path = if let Some(ref path) = self.config_file {
            expand_path(path)?
        } else {
            dirs::config_dir()
                .ok_or_eyre("Could not determine user's config directory")?
                .join("modterm")
                .join("config.toml")
        };

        // Try to read config file, use empty string if not found
        let conf_string = match self.read_config_file(&config_file_path) {
            Ok(s) => s,
            Err(_) => {
                if verbosity > 0 {
                    eprintln!("No config file found in {}", &config_file_path.display());
                    eprintln!("Default config values will be used")
                }
                "".to_string()
            }
        };
        let parsed_data: ModtermConfigBuilder = toml::from_str(&conf_string)
            .wrap_err_with(|| format!("Failed to parse {}", config_file_path.display()))?;

        let store_path =
            Self::expand_config_path(&self.store_path, &parsed_data.store_path, default_data_dir)?;

        let logs_dir = Self::expand_config_path(&self.logs_dir, &parsed_data.logs_dir, || {
            Ok(default_data_dir()?.join("logs"))
        })?;

        let handshake_attempts = self
            .handshake_attempts
            .or(parsed_data.handshake_attempts)
            .unwrap_or(DEFAULT_HANDSHAKE_ATTEMPTS);
        if handshake_attempts == 0 {
            return Err(eyre!("handshake_attempts must be at least 1"));
        }

        let runtime_timeout_secs = self
            .runtime_timeout_secs
            .or(parsed_data.runtime_timeout_secs)
            .unwrap_or(DEFAULT_RUNTIME_TIMEOUT_SECS);
        if runtime_timeout_secs == 0 {
            return Err(eyre!("runtime_timeout_secs must be at least 1"));
        }

        let handshake_request_timeout_secs = self
            .handshake_request_timeout_secs
            .or(parsed_data.handshake_request_timeout_secs)
            .unwrap_or(DEFAULT_HANDSHAKE_REQUEST_TIMEOUT_SECS);
        if handshake_request_timeout_secs == 0 {
            return Err(eyre!("handshake_request_timeout_secs must be at least 1"));
        }

        Ok(ModtermConfig {
            config_file: config_file_path,
            store_path,
            logs_dir,
            logs_max: self
                .logs_max
                .unwrap_or(parsed_data.logs_max.unwrap_or(DEFAULT_LOGS_MAX)),
            runtime_cmd: match self.runtime_cmd {
                Some(ref value) => Clone::clone(value),
                None => parsed_data
                    .runtime_cmd
                    .unwrap_or_else(|| DEFAULT_RUNTIME_CMD.to_string()),
            },
            image: match self.image {
                Some(ref value) => Clone::clone(value),
                None => parsed_data
                    .image
                    .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            },
            network: match self.network {
                Some(ref value) => Clone::clone(value),
                None => parsed_data
                    .network
                    .unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            },
            runtime_timeout_secs,
            handshake_attempts,
            handshake_delay_ms: self.handshake_delay_ms.unwrap_or(
                parsed_data
                    .handshake_delay_ms
                    .unwrap_or(DEFAULT_HANDSHAKE_DELAY_MS),
            ),
            handshake_request_timeout_secs,
        })
    }
}

/// Expands `~` and environment variables in a configured path.
pub(crate) fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let expanded = shellexpand::path::full(path.as_ref())
        .map_err(|e| eyre!("Failed to expand path: {:?}", e))?;

    Ok(PathBuf::from(expanded))
}

fn default_data_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or_eyre("Could not determine user's data directory")?
        .join("modterm"))
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
