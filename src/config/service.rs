// ABOUTME: Per-service section of the stack file.
// ABOUTME: Ports, volumes, and readiness entries, and their conversion to definitions.

use super::deserialize::{deserialize_env, deserialize_image_ref};
use super::env_value::{EnvValue, resolve_env};
use crate::error::{Error, Result};
use crate::runtime::host_user;
use crate::stack::{
    DEFAULT_PROBE_HOST, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT, LogPatternProbe,
    PortMapping, ReadinessProbeConfig, ServiceDefinition, SocketProbe,
};
use crate::types::{ImageRef, ServiceName};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    #[serde(default, deserialize_with = "deserialize_env")]
    pub env: Vec<(String, EnvValue)>,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub ports: Vec<PortEntry>,

    /// Written as a one-key map, `socket:` or `log:`.
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub readiness: Option<ReadinessConfig>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub auto_remove: bool,

    /// Run as the invoking user's `uid:gid`.
    #[serde(default)]
    pub use_host_user: bool,

    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// `"host:container"`, `"container"`, a bare number, or the long form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    Number(u16),
    Short(String),
    Detailed(PortSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortSpec {
    #[serde(default)]
    pub label: Option<String>,
    pub container: u16,
    /// 0 or absent leaves the choice to the port policy.
    #[serde(default)]
    pub host: u16,
    #[serde(default)]
    pub primary: bool,
}

impl PortEntry {
    pub fn to_mapping(&self) -> Result<PortMapping> {
        match self {
            PortEntry::Number(container) => Ok(PortMapping::new(container.to_string(), 0, *container)),
            PortEntry::Short(spec) => parse_port(spec),
            PortEntry::Detailed(spec) => {
                let label = spec
                    .label
                    .clone()
                    .unwrap_or_else(|| spec.container.to_string());
                let mapping = PortMapping::new(label, spec.host, spec.container);
                Ok(if spec.primary { mapping.primary() } else { mapping })
            }
        }
    }
}

/// Parse `"8080:80"` or `"80"`.
fn parse_port(spec: &str) -> Result<PortMapping> {
    let invalid = || Error::InvalidConfig(format!("invalid port '{spec}'"));
    let parts: Vec<&str> = spec.trim().split(':').collect();
    match parts.as_slice() {
        [container] => {
            let container: u16 = container.parse().map_err(|_| invalid())?;
            Ok(PortMapping::new(container.to_string(), 0, container))
        }
        [host, container] => {
            let host: u16 = host.parse().map_err(|_| invalid())?;
            let container: u16 = container.parse().map_err(|_| invalid())?;
            Ok(PortMapping::new(container.to_string(), host, container))
        }
        _ => Err(invalid()),
    }
}

/// Parse `host:container[:ro|rw]`; relative host paths resolve against `base_dir`.
pub fn parse_volume(spec: &str, base_dir: &Path) -> Result<(String, String, bool)> {
    let invalid = || Error::InvalidConfig(format!("invalid volume '{spec}'"));
    let parts: Vec<&str> = spec.split(':').collect();
    let (source, target, read_only) = match parts.as_slice() {
        [source, target] => (*source, *target, false),
        [source, target, "ro"] => (*source, *target, true),
        [source, target, "rw"] => (*source, *target, false),
        _ => return Err(invalid()),
    };
    if source.is_empty() || !target.starts_with('/') {
        return Err(invalid());
    }
    Ok((resolve_host_path(source, base_dir), target.to_string(), read_only))
}

fn resolve_host_path(source: &str, base_dir: &Path) -> String {
    if source == "." || source.starts_with("./") || source.starts_with("../") {
        return base_dir.join(source).to_string_lossy().into_owned();
    }
    if let (Some(rest), Ok(home)) = (source.strip_prefix("~/"), std::env::var("HOME")) {
        return Path::new(&home).join(rest).to_string_lossy().into_owned();
    }
    // absolute paths and named volumes pass through
    source.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessConfig {
    Socket(SocketConfig),
    Log(LogConfig),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SocketConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub pattern: String,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl ReadinessConfig {
    pub fn to_probe(&self) -> Result<ReadinessProbeConfig> {
        match self {
            ReadinessConfig::Socket(s) => Ok(ReadinessProbeConfig::Socket(SocketProbe {
                host: s.host.clone().unwrap_or_else(|| DEFAULT_PROBE_HOST.to_string()),
                port: s.port,
                interval: s.interval.unwrap_or(DEFAULT_PROBE_INTERVAL),
                timeout: s.timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT),
            })),
            ReadinessConfig::Log(l) => {
                let pattern = Regex::new(&l.pattern).map_err(|e| {
                    Error::InvalidConfig(format!("invalid log pattern '{}': {e}", l.pattern))
                })?;
                Ok(ReadinessProbeConfig::LogPattern(LogPatternProbe {
                    pattern,
                    timeout: l.timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT),
                }))
            }
        }
    }
}

/// Stack-wide settings a service definition depends on.
pub(super) struct Defaults<'a> {
    pub registry: Option<&'a str>,
    pub network: Option<&'a str>,
    pub base_dir: &'a Path,
}

impl ServiceConfig {
    pub(super) fn to_definition(&self, key: &str, defaults: &Defaults<'_>) -> Result<ServiceDefinition> {
        let name = service_name(key)?;

        let image = match defaults.registry {
            Some(registry) => self.image.clone().with_default_registry(registry),
            None => self.image.clone(),
        };

        let mut builder = ServiceDefinition::builder(name, image)
            .environment(resolve_env(&self.env)?)
            .network(defaults.network.map(str::to_string))
            .auto_remove(self.auto_remove);

        for spec in &self.volumes {
            let (source, target, read_only) = parse_volume(spec, defaults.base_dir)?;
            builder = builder.volume(source, target, read_only);
        }

        let mut mappings = self
            .ports
            .iter()
            .map(PortEntry::to_mapping)
            .collect::<Result<Vec<_>>>()?;
        if !mappings.iter().any(|m| m.primary) {
            if let Some(first) = mappings.first_mut() {
                first.primary = true;
            }
        }
        for mapping in mappings {
            builder = builder.mapping(mapping);
        }

        if let Some(readiness) = &self.readiness {
            builder = builder.readiness(readiness.to_probe()?);
        }
        for dependency in &self.depends_on {
            builder = builder.depends_on(service_name(dependency)?);
        }
        if self.use_host_user {
            match host_user() {
                Some(user) => builder = builder.user(user),
                None => warn!(service = key, "could not determine host uid:gid, running as image default"),
            }
        }
        if let Some(command) = &self.command {
            builder = builder.command(command.clone());
        }
        for (k, v) in &self.labels {
            builder = builder.label(k, v);
        }

        Ok(builder.build()?)
    }
}

fn service_name(value: &str) -> Result<ServiceName> {
    ServiceName::new(value)
        .map_err(|e| Error::InvalidConfig(format!("invalid service name '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ports_parse() {
        let m = parse_port("8080:80").unwrap();
        assert_eq!((m.host_port, m.container_port), (8080, 80));
        let m = parse_port("6379").unwrap();
        assert_eq!((m.host_port, m.container_port, m.label.as_str()), (0, 6379, "6379"));
        assert!(parse_port("a:b").is_err());
        assert!(parse_port("1:2:3").is_err());
    }

    #[test]
    fn relative_volume_resolves_against_config_dir() {
        let (source, target, ro) = parse_volume("./data:/var/lib/data:ro", Path::new("/work")).unwrap();
        assert_eq!(source, "/work/./data");
        assert_eq!(target, "/var/lib/data");
        assert!(ro);
    }

    #[test]
    fn named_volume_passes_through() {
        let (source, _, ro) = parse_volume("pgdata:/var/lib/postgresql/data", Path::new("/work")).unwrap();
        assert_eq!(source, "pgdata");
        assert!(!ro);
        assert!(parse_volume("pgdata", Path::new("/work")).is_err());
        assert!(parse_volume("a:relative", Path::new("/work")).is_err());
    }

    fn readiness_of(yaml: &str) -> Option<ReadinessConfig> {
        let service: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        service.readiness
    }

    #[test]
    fn readiness_is_read_from_a_plain_map() {
        let log = readiness_of(
            "image: postgres:16\nreadiness:\n  log:\n    pattern: ready to accept\n    timeout: 30s\n",
        );
        match log {
            Some(ReadinessConfig::Log(l)) => {
                assert_eq!(l.pattern, "ready to accept");
                assert_eq!(l.timeout, Some(Duration::from_secs(30)));
            }
            other => panic!("expected log readiness, got {other:?}"),
        }

        let socket = readiness_of("image: redis:7\nreadiness:\n  socket:\n    interval: 250ms\n");
        match socket {
            Some(ReadinessConfig::Socket(s)) => {
                assert_eq!(s.interval, Some(Duration::from_millis(250)));
                assert_eq!(s.port, None);
            }
            other => panic!("expected socket readiness, got {other:?}"),
        }

        assert!(readiness_of("image: redis:7\nreadiness:\n  socket: {}\n").is_some());
        assert!(readiness_of("image: redis:7\n").is_none());
    }

    #[test]
    fn readiness_with_two_kinds_is_rejected() {
        let yaml = "image: redis:7\nreadiness:\n  socket: {}\n  log:\n    pattern: x\n";
        assert!(serde_yaml::from_str::<ServiceConfig>(yaml).is_err());
    }
}
