//! TOML-based configuration for the input-method server.
//!
//! Reads `ServerConfig` from `$XDG_CONFIG_HOME/imserver/config.toml`
//! (falling back to `~/.config/imserver/config.toml`), or from an explicit
//! path given on the command line.
//!
//! ```toml
//! [server]
//! log_level = "debug"
//!
//! [transport]
//! socket_dir = "/run/user/1000"
//! preedit_query_timeout_ms = 500
//!
//! [activation]
//! enabled = false
//! ```
//!
//! # Serde default values
//!
//! Every section and every field has a default, so an empty file, a missing
//! file and a file written for an older version all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub activation: ActivationConfig,
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Private socket and broker queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Parent of the private socket directory. The system temp dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_dir: Option<PathBuf>,
    /// Prefix of the randomly named private directory.
    #[serde(default = "default_socket_prefix")]
    pub socket_prefix: String,
    /// File name of the socket inside the private directory.
    #[serde(default = "default_socket_name")]
    pub socket_name: String,
    /// Upper bound for the preedit rectangle query.
    #[serde(default = "default_preedit_query_timeout_ms")]
    pub preedit_query_timeout_ms: u64,
    /// Capacity of the broker event queue.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl TransportConfig {
    pub fn preedit_query_timeout(&self) -> Duration {
        Duration::from_millis(self.preedit_query_timeout_ms)
    }
}

/// Session bus activation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivationConfig {
    /// Advertise the socket address on the session bus.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Well-known bus name requested for the server.
    #[serde(default = "default_bus_name")]
    pub bus_name: String,
    /// Object path serving the `address` method.
    #[serde(default = "default_object_path")]
    pub object_path: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_socket_prefix() -> String {
    "imserver-".to_string()
}
fn default_socket_name() -> String {
    "imserver_dbus".to_string()
}
fn default_preedit_query_timeout_ms() -> u64 {
    2000
}
fn default_event_queue_capacity() -> usize {
    256
}
fn default_true() -> bool {
    true
}
fn default_bus_name() -> String {
    "com.meego.inputmethod.uiserver1".to_string()
}
fn default_object_path() -> String {
    "/com/meego/inputmethod/activation".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_dir: None,
            socket_prefix: default_socket_prefix(),
            socket_name: default_socket_name(),
            preedit_query_timeout_ms: default_preedit_query_timeout_ms(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bus_name: default_bus_name(),
            object_path: default_object_path(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the directory holding the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the default location, returning
/// `ServerConfig::default()` if the file does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`; a missing file yields the defaults.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the default location.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServerConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Persists `config` to `path`, creating parent directories.
///
/// # Errors
///
/// Same as [`save_config`].
pub fn save_config_to(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// XDG_CONFIG_HOME or ~/.config, plus the `imserver` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("imserver"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_well_known_names() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.server.log_level, "info");
        assert_eq!(cfg.transport.socket_name, "imserver_dbus");
        assert_eq!(cfg.transport.preedit_query_timeout(), Duration::from_millis(2000));
        assert!(cfg.activation.enabled);
        assert_eq!(cfg.activation.bus_name, "com.meego.inputmethod.uiserver1");
        assert_eq!(cfg.activation.object_path, "/com/meego/inputmethod/activation");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_fields() {
        // Arrange
        let toml_str = r#"
[transport]
preedit_query_timeout_ms = 250
"#;

        // Act
        let cfg: ServerConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.transport.preedit_query_timeout_ms, 250);
        assert_eq!(cfg.transport.socket_prefix, "imserver-");
        assert!(cfg.activation.enabled);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = ServerConfig::default();
        cfg.server.log_level = "debug".to_string();
        cfg.transport.socket_dir = Some(PathBuf::from("/run/user/1000"));
        cfg.activation.enabled = false;

        // Act
        save_config_to(&path, &cfg).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_unset_socket_dir_is_omitted_from_toml() {
        let content = toml::to_string_pretty(&ServerConfig::default()).unwrap();
        assert!(!content.contains("socket_dir"));
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("imserver/config.toml"), "got {path:?}");
        }
        // NoPlatformConfigDir is acceptable in a stripped environment.
    }
}
