// ABOUTME: Static description of one service in a stack.
// ABOUTME: Image, environment, volumes, ports, network, readiness, and dependencies.

use super::environment::ContainerEnvironment;
use super::error::ConfigurationError;
use super::ports::PortMapping;
use super::probe::ReadinessProbeConfig;
use crate::runtime::VolumeMount;
use crate::types::{ImageRef, ServiceName};
use std::collections::{BTreeMap, BTreeSet};

/// Logical name of the network services join unless told otherwise.
pub const DEFAULT_NETWORK: &str = "network";

#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub name: ServiceName,
    pub image: ImageRef,
    pub environment: ContainerEnvironment,
    pub volumes: Vec<VolumeMount>,
    pub ports: Vec<PortMapping>,
    /// Logical network name, expanded to `<prefix>-<network>`.
    pub network: Option<String>,
    /// `None` means ready as soon as the engine reports it running.
    pub readiness: Option<ReadinessProbeConfig>,
    pub depends_on: BTreeSet<ServiceName>,
    /// Remove the container on teardown instead of keeping it stopped.
    pub auto_remove: bool,
    pub command: Option<Vec<String>>,
    /// `uid:gid` to run as.
    pub user: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl ServiceDefinition {
    pub fn builder(name: ServiceName, image: ImageRef) -> ServiceDefinitionBuilder {
        ServiceDefinitionBuilder {
            definition: ServiceDefinition {
                name,
                image,
                environment: ContainerEnvironment::new(),
                volumes: Vec::new(),
                ports: Vec::new(),
                network: Some(DEFAULT_NETWORK.to_string()),
                readiness: None,
                depends_on: BTreeSet::new(),
                auto_remove: false,
                command: None,
                user: None,
                labels: BTreeMap::new(),
            },
        }
    }

    pub fn primary_port(&self) -> Option<&PortMapping> {
        self.ports.iter().find(|p| p.primary)
    }

    pub fn port(&self, label: &str) -> Option<&PortMapping> {
        self.ports.iter().find(|p| p.label == label)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigurationError> {
        if self.ports.iter().filter(|p| p.primary).count() > 1 {
            return Err(ConfigurationError::MultiplePrimaryPorts(self.name.clone()));
        }
        let probe_port_missing = matches!(
            &self.readiness,
            Some(ReadinessProbeConfig::Socket(probe)) if probe.port.is_none()
        );
        if probe_port_missing && self.primary_port().is_none() {
            return Err(ConfigurationError::ProbeWithoutPort(self.name.clone()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ServiceDefinitionBuilder {
    definition: ServiceDefinition,
}

impl ServiceDefinitionBuilder {
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.definition.environment.insert(key, value);
        self
    }

    pub fn environment(mut self, environment: ContainerEnvironment) -> Self {
        self.definition.environment.merge(&environment);
        self
    }

    pub fn volume(mut self, source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        self.definition.volumes.push(VolumeMount {
            source: source.into(),
            target: target.into(),
            read_only,
        });
        self
    }

    /// Publish `container_port`; a `host_port` of 0 leaves the choice to the port policy.
    pub fn port(mut self, label: impl Into<String>, host_port: u16, container_port: u16) -> Self {
        self.definition
            .ports
            .push(PortMapping::new(label, host_port, container_port));
        self
    }

    pub fn primary_port(mut self, label: impl Into<String>, host_port: u16, container_port: u16) -> Self {
        self.definition
            .ports
            .push(PortMapping::new(label, host_port, container_port).primary());
        self
    }

    pub fn mapping(mut self, mapping: PortMapping) -> Self {
        self.definition.ports.push(mapping);
        self
    }

    pub fn depends_on(mut self, service: ServiceName) -> Self {
        self.definition.depends_on.insert(service);
        self
    }

    pub fn readiness(mut self, probe: ReadinessProbeConfig) -> Self {
        self.definition.readiness = Some(probe);
        self
    }

    pub fn auto_remove(mut self, auto_remove: bool) -> Self {
        self.definition.auto_remove = auto_remove;
        self
    }

    pub fn network(mut self, network: Option<String>) -> Self {
        self.definition.network = network;
        self
    }

    pub fn command(mut self, command: Vec<String>) -> Self {
        self.definition.command = Some(command);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.definition.user = Some(user.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.definition.labels.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ServiceDefinition, ConfigurationError> {
        self.definition.validate()?;
        Ok(self.definition)
    }
}
