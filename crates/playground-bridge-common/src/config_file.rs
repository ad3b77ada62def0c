//! Configuration file structures for the playground bridge.
//!
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ModuleConfig`]: Which runtime module to load and how to start it

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// fuel_metering = true
///
/// [runtime.execution]
/// max_fuel = 1_000_000_000
/// inherit_stdio = false
///
/// [runtime.bridge]
/// ready_timeout_ms = 5000
///
/// [module]
/// source = "https://example.com/playground.wasm"
/// entry_point = "_initialize"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine, execution and bridge settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Runtime module settings.
    #[serde(default)]
    pub module: ModuleConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Runtime module settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleConfig {
    /// File path or `http(s)` URL of the runtime module.
    ///
    /// May be left unset and supplied on the command line instead.
    #[serde(default)]
    pub source: Option<String>,

    /// Export called once after instantiation, before the entry points are
    /// installed. Skipped when the module does not export it.
    #[serde(default = "defaults::entry_point")]
    pub entry_point: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            source: None,
            entry_point: defaults::entry_point(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn entry_point() -> String {
        "_initialize".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert!(config.module.source.is_none());
        assert_eq!(config.module.entry_point, "_initialize");
        assert_eq!(config.runtime.bridge.poll_interval_ms, 50);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [module]
            source = "./playground.wasm"
        "#;

        let config = assert_ok!(ConfigFile::from_toml(toml));

        assert_eq!(config.module.source.as_deref(), Some("./playground.wasm"));
        // Defaults applied
        assert_eq!(config.module.entry_point, "_initialize");
        assert!(!config.runtime.engine.fuel_metering);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [runtime.engine]
            optimize = false
            wasm_backtrace = false
            fuel_metering = true

            [runtime.execution]
            max_fuel = 5_000_000
            max_memory_mb = 32
            inherit_stdio = false

            [runtime.bridge]
            poll_interval_ms = 20
            ready_timeout_ms = 2000
            call_timeout_ms = 4000
            debounce_ms = 150
            max_module_mb = 16

            [module]
            source = "https://example.com/runtime.wasm"
            entry_point = "boot"
        "#;

        let config = assert_ok!(ConfigFile::from_toml(toml));

        assert!(!config.runtime.engine.optimize);
        assert!(config.runtime.engine.fuel_metering);
        assert_eq!(config.runtime.execution.max_fuel, 5_000_000);
        assert_eq!(config.runtime.execution.max_memory_mb, 32);
        assert!(!config.runtime.execution.inherit_stdio);
        assert_eq!(config.runtime.bridge.poll_interval_ms, 20);
        assert_eq!(config.runtime.bridge.ready_timeout_ms, 2000);
        assert_eq!(config.runtime.bridge.call_timeout_ms, 4000);
        assert_eq!(config.runtime.bridge.debounce_ms, 150);
        assert_eq!(config.runtime.bridge.max_module_mb, 16);
        assert_eq!(
            config.module.source.as_deref(),
            Some("https://example.com/runtime.wasm")
        );
        assert_eq!(config.module.entry_point, "boot");
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let err = assert_err!(ConfigFile::from_toml(invalid));
        assert!(matches!(err, ConfigFileError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = assert_err!(ConfigFile::from_file("/nonexistent/playground.toml"));
        assert!(err.to_string().contains("/nonexistent/playground.toml"));
    }
}
