//! Command dispatch

use tracing::warn;

use crate::app::{self, RunOptions};
use crate::cli::{Commands, NameAction};
use crate::config::CliAppConfig;
use crate::error::Result;
use crate::store::UsernameStore;

const DEFAULT_USERNAME: &str = "Anonymous";

pub struct CommandDispatcher;

impl CommandDispatcher {
    pub async fn execute(command: Commands, config: &CliAppConfig) -> Result<()> {
        match command {
            Commands::Run {
                no_advertise,
                no_scan,
                background,
                ..
            } => {
                let store = UsernameStore::open(&config.data_dir()?)?;
                let options = RunOptions {
                    username: resolve_username(config, &store),
                    advertise: !no_advertise,
                    scan: !no_scan,
                    background,
                };
                app::run(config, options).await
            }
            Commands::Name { action } => {
                let mut store = UsernameStore::open(&config.data_dir()?)?;
                match action {
                    NameAction::Show => {
                        println!("{}", store.username().unwrap_or("(not set)"));
                    }
                    NameAction::Set { name } => {
                        store.set_username(&name)?;
                        println!("Display name saved to {}", store.path().display());
                    }
                }
                Ok(())
            }
            Commands::Config => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
        }
    }
}

/// Configured name, then the stored name, then a placeholder
pub fn resolve_username(config: &CliAppConfig, store: &UsernameStore) -> String {
    if let Some(name) = &config.identity.name {
        return name.clone();
    }
    if let Some(name) = store.username() {
        return name.to_string();
    }
    warn!(
        "No display name set, advertising as '{}'. Use `presence name set <NAME>`.",
        DEFAULT_USERNAME
    );
    DEFAULT_USERNAME.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UsernameStore::open(dir.path()).unwrap();
        let mut config = CliAppConfig::default();
        assert_eq!(resolve_username(&config, &store), DEFAULT_USERNAME);

        store.set_username("stored").unwrap();
        assert_eq!(resolve_username(&config, &store), "stored");

        config.identity.name = Some("configured".to_string());
        assert_eq!(resolve_username(&config, &store), "configured");
    }
}
