//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use lockin_core::SkipPolicy;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Path to the file holding in-flight sessions between invocations.
    pub state_path: PathBuf,
    /// What `session skip` does with the elapsed part of a phase.
    #[serde(default)]
    pub skip_policy: SkipPolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("state_path", &self.state_path)
            .field("skip_policy", &self.skip_policy)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        // Not every platform has a state dir; keep sessions next to the database there.
        let state_dir = dirs_state_path().unwrap_or_else(|| data_dir.clone());
        Self {
            database_path: data_dir.join("lockin.db"),
            state_path: state_dir.join("sessions.json"),
            skip_policy: SkipPolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations, optionally overlaid with a
    /// specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // LOCKIN_DATABASE_PATH, LOCKIN_STATE_PATH, LOCKIN_SKIP_POLICY
        figment = figment.merge(Env::prefixed("LOCKIN_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for lockin.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lockin"))
}

/// Returns the platform-specific data directory for lockin.
///
/// On Linux: `~/.local/share/lockin`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("lockin"))
}

/// Returns the platform-specific state directory for lockin.
///
/// On Linux: `~/.local/state/lockin`. `None` on platforms without one.
pub fn dirs_state_path() -> Option<PathBuf> {
    dirs::state_dir().map(|p| p.join("lockin"))
}
