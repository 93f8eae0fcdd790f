//! Presence CLI library
//!
//! Composition root for the `presence` binary: configuration loading, the
//! persisted display name, and the sighting table presenter.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod presenter;
pub mod store;

pub use cli::{Cli, Commands, NameAction};
pub use commands::CommandDispatcher;
pub use config::{CliAppConfig, ConfigOverrides};
pub use error::{CliError, Result};
pub use presenter::{AgeBucket, Presenter, SightingRow};
pub use store::UsernameStore;
