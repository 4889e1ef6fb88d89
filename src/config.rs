use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CLONE_BASE_DIR: &str = "./repos";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GITHUB_WEBHOOK_SECRET is not set, pass --secret or add it to your .env file")]
    MissingSecret,
}

/// Fully resolved configuration, built once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct KoozieConfig {
    /// Shared secret used to sign GitHub webhook deliveries
    pub github_secret: String,
    /// Port the HTTP server listens on
    pub port: u16,
    pub clone: CloneConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneConfig {
    /// Clone the repository of every newly opened issue
    pub enabled: bool,
    /// Directory under which repositories are cloned, as `<base_dir>/<owner>/<repo>`
    pub base_dir: PathBuf,
    /// Pull existing checkouts instead of leaving them untouched
    pub update_existing: bool,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_dir: PathBuf::from(DEFAULT_CLONE_BASE_DIR),
            update_existing: false,
        }
    }
}

/// On-disk shape of the optional YAML configuration file. Every key is optional, values given on
/// the command line or in the environment take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub github_secret: Option<String>,
    pub port: Option<u16>,
    pub clone: CloneSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloneSection {
    pub enabled: Option<bool>,
    pub base_dir: Option<PathBuf>,
    pub update_existing: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file =
            File::open(path).with_context(|| format!("couldn't open {}:", path.display()))?;
        serde_yaml::from_reader(BufReader::new(file)).context("couldn't parse config file")
    }
}

/// Values coming from the command line or the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub github_secret: Option<String>,
    pub port: Option<u16>,
    pub clone_enabled: Option<bool>,
    pub clone_base_dir: Option<PathBuf>,
    pub clone_update_existing: Option<bool>,
}

impl KoozieConfig {
    /// Merges the config file (if any) with command line / environment overrides.
    pub fn resolve(file: ConfigFile, overrides: Overrides) -> Result<Self, ConfigError> {
        let github_secret = overrides
            .github_secret
            .or(file.github_secret)
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::MissingSecret)?;

        let defaults = CloneConfig::default();
        let clone = CloneConfig {
            enabled: overrides
                .clone_enabled
                .or(file.clone.enabled)
                .unwrap_or(defaults.enabled),
            base_dir: overrides
                .clone_base_dir
                .or(file.clone.base_dir)
                .unwrap_or(defaults.base_dir),
            update_existing: overrides
                .clone_update_existing
                .or(file.clone.update_existing)
                .unwrap_or(defaults.update_existing),
        };

        Ok(Self {
            github_secret,
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            clone,
        })
    }
}
