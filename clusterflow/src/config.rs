//! Service configuration.
//!
//! Loaded from an optional YAML file named by `CLUSTERFLOW_CONFIG`, then
//! overridden by individual `CLUSTERFLOW_*` environment variables. Every
//! field has a default, so an empty file (or none at all) is valid.

use crate::errors::ConfigError;
use crate::watch::WatchConfig;
use crate::workflow::ProvisioningConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "CLUSTERFLOW_CONFIG";

/// Which cluster implementation the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A Kubernetes API server.
    #[default]
    Kube,
    /// The in-process cluster.
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kube" | "kubernetes" => Ok(Self::Kube),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend '{other}', expected 'kube' or 'memory'")),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Namespace used when a request names none.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    /// Cluster backend.
    #[serde(default)]
    pub backend: Backend,
    /// Directory of YAML manifest templates. Built-in templates are used when unset.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
    /// Watch intervals and deadlines.
    #[serde(default)]
    pub watch: WatchConfig,
    /// Project claim settings.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    /// Builder image when a request names none.
    #[serde(default = "default_builder_image")]
    pub builder_image: String,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_builder_image() -> String {
    "bash:latest".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            default_namespace: default_namespace(),
            backend: Backend::default(),
            templates_dir: None,
            watch: WatchConfig::default(),
            provisioning: ProvisioningConfig::default(),
            builder_image: default_builder_image(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Parses a YAML document. `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid YAML or unknown values.
    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|err| ConfigError::Parse {
            path: origin.to_string(),
            reason: err.to_string(),
        })
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content, &path.display().to_string())
    }

    /// Loads the file named by `CLUSTERFLOW_CONFIG`, if any, then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file or an override is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Applies `CLUSTERFLOW_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] for unparseable values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("CLUSTERFLOW_BIND") {
            self.bind_address = bind;
        }
        if let Some(namespace) = lookup("CLUSTERFLOW_NAMESPACE") {
            self.default_namespace = namespace;
        }
        if let Some(backend) = lookup("CLUSTERFLOW_BACKEND") {
            self.backend = backend.parse().map_err(|reason| ConfigError::Env {
                var: "CLUSTERFLOW_BACKEND",
                reason,
            })?;
        }
        if let Some(dir) = lookup("CLUSTERFLOW_TEMPLATES_DIR") {
            self.templates_dir = Some(PathBuf::from(dir));
        }
        if let Some(json) = lookup("CLUSTERFLOW_LOG_JSON") {
            self.logging.json = parse_flag(&json).ok_or_else(|| ConfigError::Env {
                var: "CLUSTERFLOW_LOG_JSON",
                reason: format!("expected a boolean, got '{json}'"),
            })?;
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
