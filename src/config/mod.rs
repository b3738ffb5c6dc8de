// ABOUTME: Stack file types and parsing for devstack.yml.
// ABOUTME: YAML parsing, env interpolation, and resolution into a validated registry.

mod deserialize;
mod env_value;
mod init;
mod service;

pub use env_value::{EnvValue, resolve_env};
pub use init::init_config;
pub use service::{
    LogConfig, PortEntry, PortSpec, ReadinessConfig, ServiceConfig, SocketConfig, parse_volume,
};

use crate::error::{Error, Result};
use crate::runtime::{RegistryAuth, RuntimeConfig};
use crate::stack::{
    DEFAULT_NETWORK, DEFAULT_RUNNING_TIMEOUT, DEFAULT_STOP_TIMEOUT, PortPolicy, SchedulerOptions,
    ServiceDefinition, StackRegistry,
};
use crate::types::StackPrefix;
use deserialize::deserialize_stack_prefix;
use serde::Deserialize;
use service::Defaults;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "devstack.yml";
pub const CONFIG_FILENAME_ALT: &str = "devstack.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".devstack/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct StackConfig {
    #[serde(deserialize_with = "deserialize_stack_prefix")]
    pub prefix: StackPrefix,

    /// Registry prepended to images that do not name one.
    #[serde(default)]
    pub registry: Option<String>,

    #[serde(default)]
    pub port_policy: PortPolicy,

    /// Put every service on the shared `<prefix>-network`.
    #[serde(default = "default_network")]
    pub network: bool,

    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    #[serde(default = "default_running_timeout", with = "humantime_serde")]
    pub running_timeout: Duration,

    #[serde(default)]
    pub engine: Option<RuntimeConfig>,

    #[serde(default)]
    pub auth: Option<AuthConfig>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

/// Registry credentials; the password usually comes from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: EnvValue,
    #[serde(default)]
    pub server: Option<String>,
}

fn default_network() -> bool {
    true
}

fn default_stop_timeout() -> Duration {
    DEFAULT_STOP_TIMEOUT
}

fn default_running_timeout() -> Duration {
    DEFAULT_RUNNING_TIMEOUT
}

impl StackConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// First stack file found in `dir`.
    pub fn locate(dir: &Path) -> Result<PathBuf> {
        [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
            .ok_or_else(|| Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        Self::load(&Self::locate(dir)?)
    }

    /// Resolve every service. Relative volume paths resolve against `base_dir`.
    pub fn definitions(&self, base_dir: &Path) -> Result<Vec<ServiceDefinition>> {
        let defaults = Defaults {
            registry: self.registry.as_deref(),
            network: self.network.then_some(DEFAULT_NETWORK),
            base_dir,
        };
        self.services
            .iter()
            .map(|(key, service)| service.to_definition(key, &defaults))
            .collect()
    }

    /// Resolve and validate the whole stack. Touches no engine.
    pub fn build_registry(&self, base_dir: &Path) -> Result<StackRegistry> {
        let definitions = self.definitions(base_dir)?;
        Ok(StackRegistry::new(
            self.prefix.clone(),
            definitions,
            self.port_policy,
        )?)
    }

    pub fn scheduler_options(&self) -> Result<SchedulerOptions> {
        let auth = self
            .auth
            .as_ref()
            .map(|a| -> Result<RegistryAuth> {
                Ok(RegistryAuth {
                    username: a.username.clone(),
                    password: a.password.resolve()?,
                    server: a.server.clone(),
                })
            })
            .transpose()?;
        Ok(SchedulerOptions {
            stop_timeout: self.stop_timeout,
            running_timeout: self.running_timeout,
            auth,
        })
    }
}
