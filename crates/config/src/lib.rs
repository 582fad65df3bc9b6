//! Configuration loading and validation.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults (the public repository, the platform data directory)
//! 2. a TOML file: the one given explicitly, otherwise
//!    `<config dir>/serverfiles/config.toml` if it exists
//! 3. `SERVERFILES_*` environment variables (`SERVERFILES_ROOT`,
//!    `SERVERFILES_SERVER`, `SERVERFILES_USERNAME`, `SERVERFILES_PASSWORD`,
//!    `SERVERFILES_TIMEOUT`)
//! 4. explicit [`Overrides`], typically from the command line
//!
//! ```toml
//! root = "/srv/serverfiles"
//! server = "https://files.example.org/repository/"
//! username = "reader"
//! password = "secret"
//! timeout = 10
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::{BaseDirs, ProjectDirs};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use serverfiles_catalog::{DEFAULT_SERVER, DEFAULT_TIMEOUT};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "serverfiles";
pub const ENV_PREFIX: &str = "SERVERFILES_";
const CONFIG_FILE: &str = "config.toml";

/// Validated settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Absolute directory holding the local mirror.
    pub root: PathBuf,
    /// Base URL of the remote repository.
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connection timeout for remote requests.
    pub timeout: Duration,
}

/// One layer of settings; unset fields defer to earlier layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Overrides {
    fn defaults() -> Self {
        Self {
            root: default_root(),
            server: Some(DEFAULT_SERVER.to_string()),
            username: None,
            password: None,
            timeout: Some(DEFAULT_TIMEOUT.as_secs()),
        }
    }
}

/// `<data dir>/serverfiles`, when the platform has a data directory.
pub fn default_root() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.data_dir().join(APP_NAME))
}

/// `<config dir>/serverfiles/config.toml`, when the platform has a config
/// directory. The file may not exist.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

impl Config {
    /// The layered sources, before extraction.
    ///
    /// An explicit `file` must exist; the default file is optional.
    pub fn figment(file: Option<&Path>, overrides: &Overrides) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Overrides::defaults()));
        match file {
            Some(file) => {
                if !file.is_file() {
                    exn::bail!(ErrorKind::FileNotFound(file.to_path_buf()));
                }
                figment = figment.merge(Toml::file(file));
            },
            None => {
                if let Some(file) = default_config_file() {
                    tracing::debug!(file = %file.display(), "using default configuration file if present");
                    figment = figment.merge(Toml::file(file));
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX)).merge(Serialized::globals(overrides)))
    }

    /// Load and validate settings from every layer.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        Self::from_figment(&Self::figment(file, overrides)?)
    }

    /// Extract and validate settings from prepared sources.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let layer: Overrides = figment.extract().or_raise(|| ErrorKind::Load)?;
        let root = layer.root.ok_or_else(|| ErrorKind::NoDataDir)?;
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidRoot(root));
        }
        Ok(Self {
            root,
            server: layer.server.unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            username: layer.username,
            password: layer.password,
            timeout: layer.timeout.map_or(DEFAULT_TIMEOUT, Duration::from_secs),
        })
    }

    /// Basic-auth credentials, only when both a username and a password
    /// are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }
}
