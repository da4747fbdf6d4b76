//! Manages application configuration by loading settings from standard locations.
//!
//! This crate provides a unified configuration object (`Config`) that aggregates
//! settings from files and environment variables, making them accessible
//! globally via a lazily initialized static reference (`CONFIG`).

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

/// The default configuration values
const DEFAULT_TOML_CONFIG: &str = include_str!("./charmstore.default.toml");

const APP: &str = "charmstore";
const DEFAULT_MAX_SESSIONS: usize = 16;
const DEFAULT_SESSION_TIMEOUT_MS: u64 = 5_000;

//================================================================================================
// Statics
//================================================================================================

/// Provides a lazily instantiated static reference to the application `Config`.
///
/// This static variable ensures that configuration is parsed only once from
/// canonical locations and then made immutably available throughout the
/// application's lifecycle.
pub static CONFIG: LazyLock<Config> = LazyLock::new(load_config);

//================================================================================================
// Types
//================================================================================================

/// Settings for the backing document store and its session pool.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// The directory holding the persisted documents.
    pub root: PathBuf,
    /// The hard cap on concurrently checked out backing-store sessions.
    pub max_sessions: usize,
    /// How long a checkout may wait for a free session before giving up.
    pub session_timeout_ms: u64,
}

/// Represents the application's primary configuration structure.
#[derive(Deserialize, Serialize, Default, Debug)]
pub struct Config {
    /// Backing store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: get_data_dir(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// The admission timeout as a [`Duration`].
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

impl Config {
    /// Constructs a `Figment` instance for configuration loading.
    ///
    /// This method builds a configuration provider by layering default settings,
    /// user-specific configuration files, and environment variables. Nested keys
    /// are addressed in the environment with a double underscore, e.g.
    /// `CHARMSTORE_STORE__MAX_SESSIONS=4`.
    pub fn figment() -> Figment {
        let mut fig = Figment::from(Config::default()).merge(Toml::string(DEFAULT_TOML_CONFIG));

        if let Ok(c) = etcetera::choose_base_strategy() {
            let config = c.config_dir().join(format!("{APP}.toml"));
            fig = fig.admerge(Toml::file(config));
        }

        fig.admerge(Env::prefixed("CHARMSTORE_").split("__"))
    }

    /// Creates a `Config` instance from a given provider.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Box<figment::Error>> {
        Figment::from(provider).extract().map_err(Box::new)
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("Charm Store Config")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Determines the appropriate data directory based on the operating system.
fn get_data_dir() -> PathBuf {
    if let Ok(c) = etcetera::choose_base_strategy() {
        c.data_dir().join(APP)
    } else {
        std::env::temp_dir().join(APP)
    }
}

/// Loads the application configuration using the default `Figment` provider.
///
/// This function is used to initialize the `CONFIG` static variable.
fn load_config() -> Config {
    Config::figment().extract().unwrap_or_else(|e| {
        tracing::error!(error = %e, "problem loading config from default sources, falling back to defaults");
        Config::default()
    })
}
