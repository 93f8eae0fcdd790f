//! Presence CLI configuration management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Built-in defaults
//! - `presence.toml` in the working directory
//! - `~/.presence/config.toml` (or the file given with `--config`)
//! - Environment variables prefixed with `PRESENCE_`, nested with `__`
//!   (for example `PRESENCE_ENGINE__SCAN_PERIOD__SECS=3`)
//! - Command line flags

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use presence_ble::BleDriverConfig;
use presence_core::PresenceConfig;
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the presence CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    pub identity: IdentityConfig,
    /// Engine timing and policy
    pub engine: PresenceConfig,
    /// Radio driver settings
    pub ble: BleDriverConfig,
    pub output: OutputConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name to advertise; overrides the stored name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print sightings as JSON lines instead of a table
    pub json: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Values taken from the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub name: Option<String>,
    pub json: Option<bool>,
    pub data_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn from_cli(cli: &Cli) -> Self {
        let mut overrides = Self {
            config_file: cli.config.clone(),
            data_dir: cli.data_dir.clone(),
            ..Self::default()
        };
        if let Commands::Run { name, json, .. } = &cli.command {
            overrides.name = name.clone();
            // Only an explicit flag overrides the layered value
            overrides.json = json.then_some(true);
        }
        overrides
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// The layered configuration sources
    pub fn figment(overrides: &ConfigOverrides) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("presence.toml"));

        match (&overrides.config_file, Self::default_config_path()) {
            (Some(path), _) => figment = figment.merge(Toml::file(path)),
            (None, Some(path)) => figment = figment.merge(Toml::file(path)),
            (None, None) => {}
        }

        figment = figment.merge(Env::prefixed("PRESENCE_").split("__"));

        if let Some(name) = &overrides.name {
            figment = figment.merge(("identity.name", name));
        }
        if let Some(json) = overrides.json {
            figment = figment.merge(("output.json", json));
        }
        if let Some(dir) = &overrides.data_dir {
            figment = figment.merge(("storage.data_dir", dir));
        }
        figment
    }

    /// Load and validate the configuration
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let config: CliAppConfig = Self::figment(overrides).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        if self.ble.event_capacity == 0 {
            return Err(CliError::Config(
                "ble.event_capacity must be greater than 0".to_string(),
            ));
        }
        if let Some(name) = &self.identity.name {
            if name.trim().is_empty() {
                return Err(CliError::Config("identity.name must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Directory for persisted state
    pub fn data_dir(&self) -> Result<PathBuf> {
        self.storage
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("presence")))
            .ok_or_else(|| CliError::Environment("No data directory available".to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".presence").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        let config = CliAppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.engine.scan_period, Duration::from_secs(5));
        assert!(!config.output.json);
    }

    #[test]
    fn test_layering_priority() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "presence.toml",
                r#"
                [identity]
                name = "from-file"

                [engine.scan_period]
                secs = 7
                "#,
            )?;
            jail.set_env("PRESENCE_ENGINE__SCAN_PERIOD__SECS", "3");

            let config = CliAppConfig::load(&ConfigOverrides::default())
                .map_err(|e| e.to_string())?;
            assert_eq!(config.identity.name.as_deref(), Some("from-file"));
            assert_eq!(config.engine.scan_period, Duration::from_secs(3));

            let overrides = ConfigOverrides {
                name: Some("from-flag".to_string()),
                json: Some(true),
                ..ConfigOverrides::default()
            };
            let config = CliAppConfig::load(&overrides).map_err(|e| e.to_string())?;
            assert_eq!(config.identity.name.as_deref(), Some("from-flag"));
            assert!(config.output.json);
            Ok(())
        });
    }

    #[test]
    fn test_zero_scan_period_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("PRESENCE_ENGINE__SCAN_PERIOD__SECS", "0");
            assert!(CliAppConfig::load(&ConfigOverrides::default()).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_toml_output_loads_back() {
        let mut config = CliAppConfig::default();
        config.identity.name = Some("alice".to_string());
        let text = config.to_toml().unwrap();

        let parsed: CliAppConfig = Figment::from(Toml::string(&text)).extract().unwrap();
        assert_eq!(parsed, config);
    }
}
