// ABOUTME: Engine-side lifecycle of the single container behind a service.
// ABOUTME: Find, create, start, wait for running, and stop with remove or detach.

use super::definition::ServiceDefinition;
use super::error::StackError;
use super::state::ContainerState;
use crate::runtime::{
    ContainerConfig, ContainerError, ContainerInfo, FullRuntime, NetworkError, PortBinding,
    Protocol, RegistryAuth, RunState,
};
use crate::types::{ContainerId, NetworkAlias, NetworkId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RUNNING_TIMEOUT: Duration = Duration::from_secs(30);

const RUNNING_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the engine knows about a service's container.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub state: ContainerState,
    pub info: Option<ContainerInfo>,
}

impl Lookup {
    pub fn id(&self) -> Option<&ContainerId> {
        self.info.as_ref().map(|i| &i.id)
    }

    pub fn exists(&self) -> bool {
        self.info.is_some()
    }
}

/// Drives one service's container against the engine.
///
/// Holds no state of its own: every decision is made from the definition
/// and what the engine reports.
pub struct ContainerLifecycleController<'a, R> {
    runtime: &'a R,
    definition: &'a ServiceDefinition,
    container_name: String,
    network: Option<NetworkId>,
    labels: HashMap<String, String>,
    stop_timeout: Duration,
    auth: Option<&'a RegistryAuth>,
}

impl<'a, R: FullRuntime> ContainerLifecycleController<'a, R> {
    pub fn new(
        runtime: &'a R,
        definition: &'a ServiceDefinition,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            definition,
            container_name: container_name.into(),
            network: None,
            labels: HashMap::new(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            auth: None,
        }
    }

    /// Engine name of the network the container joins.
    pub fn network(mut self, network: Option<String>) -> Self {
        self.network = network.map(NetworkId::new);
        self
    }

    pub fn labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn auth(mut self, auth: Option<&'a RegistryAuth>) -> Self {
        self.auth = auth;
        self
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Look the container up by name. Never creates anything.
    pub async fn find(&self) -> Result<Lookup, ContainerError> {
        let info = self.runtime.find_container(&self.container_name).await?;
        Ok(Lookup {
            state: info
                .as_ref()
                .map_or(ContainerState::Absent, |i| i.state.into()),
            info,
        })
    }

    /// Create the container unless `lookup` already found one.
    pub async fn create(&self, lookup: &Lookup) -> Result<ContainerId, StackError> {
        if let Some(id) = lookup.id() {
            debug!(service = %self.definition.name, container = %self.container_name, state = %lookup.state, "reusing container");
            return Ok(id.clone());
        }

        self.ensure_image().await?;

        let config = self.container_config();
        match self.runtime.create_container(&config).await {
            Ok(id) => {
                info!(service = %self.definition.name, container = %self.container_name, id = %id.short(), "container created");
                Ok(id)
            }
            Err(ContainerError::AlreadyExists(_)) => self
                .runtime
                .find_container(&self.container_name)
                .await
                .ok()
                .flatten()
                .map(|i| i.id)
                .ok_or_else(|| {
                    StackError::create(&self.definition.name, "container appeared and vanished during create")
                }),
            Err(e) => Err(StackError::create(&self.definition.name, e)),
        }
    }

    async fn ensure_image(&self) -> Result<(), StackError> {
        let image = &self.definition.image;
        let present = self
            .runtime
            .image_exists(image)
            .await
            .map_err(|e| StackError::from_image(&self.definition.name, e))?;
        if present {
            return Ok(());
        }
        info!(service = %self.definition.name, %image, "pulling image");
        self.runtime
            .pull_image(image, self.auth)
            .await
            .map_err(|e| StackError::from_image(&self.definition.name, e))
    }

    fn container_config(&self) -> ContainerConfig {
        let definition = self.definition;

        let mut labels = self.labels.clone();
        labels.extend(definition.labels.clone());

        let ports = definition
            .ports
            .iter()
            .map(|p| PortBinding {
                host_port: p.requested_host_port(),
                container_port: p.container_port,
                protocol: Protocol::Tcp,
                host_ip: None,
            })
            .collect();

        ContainerConfig {
            name: self.container_name.clone(),
            image: definition.image.clone(),
            env: definition.environment.to_pairs(),
            labels,
            ports,
            volumes: definition.volumes.clone(),
            command: definition.command.clone(),
            user: definition.user.clone(),
            network: self.network.as_ref().map(|n| n.to_string()),
            network_aliases: self.aliases(),
        }
    }

    fn aliases(&self) -> Vec<NetworkAlias> {
        if self.network.is_some() {
            vec![self.definition.name.as_alias()]
        } else {
            Vec::new()
        }
    }

    /// Start the container. A container that is already running counts as started.
    ///
    /// A reused container that lost its network attachment is reconnected first.
    pub async fn start(&self, lookup: &Lookup, id: &ContainerId) -> Result<(), StackError> {
        let detached = match (&lookup.info, &self.network) {
            (Some(info), Some(network)) => !info.networks.iter().any(|n| n == network.as_str()),
            _ => false,
        };
        if let (true, Some(network)) = (detached, &self.network) {
            debug!(service = %self.definition.name, %network, "reconnecting container to network");
            self.runtime
                .connect_to_network(id, network, &self.aliases())
                .await
                .map_err(|source| StackError::Network {
                    service: self.definition.name.clone(),
                    network: network.to_string(),
                    source,
                })?;
        }

        match self.runtime.start_container(id).await {
            Ok(()) => {
                info!(service = %self.definition.name, container = %self.container_name, "container started");
                Ok(())
            }
            Err(ContainerError::AlreadyRunning(_)) => Ok(()),
            Err(e) => Err(StackError::from_start(&self.definition.name, e)),
        }
    }

    /// Poll until the engine reports the container running.
    ///
    /// Returns the inspected container so callers can read the ports the
    /// engine bound.
    pub async fn await_running(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<ContainerInfo, StackError> {
        let deadline = Instant::now() + timeout;
        loop {
            let info = self
                .runtime
                .inspect_container(id)
                .await
                .map_err(|e| StackError::Start {
                    service: self.definition.name.clone(),
                    message: e.to_string(),
                })?;
            match info.state {
                RunState::Running => return Ok(info),
                RunState::Exited | RunState::Dead => {
                    return Err(StackError::Start {
                        service: self.definition.name.clone(),
                        message: match info.exit_code {
                            Some(code) => format!("container exited with code {code}"),
                            None => "container exited".to_string(),
                        },
                    });
                }
                _ => {}
            }
            if Instant::now() + RUNNING_POLL_INTERVAL > deadline {
                return Err(StackError::Start {
                    service: self.definition.name.clone(),
                    message: format!("not running after {timeout:?} (state {:?})", info.state),
                });
            }
            tokio::time::sleep(RUNNING_POLL_INTERVAL).await;
        }
    }

    /// Stop the container, then remove it (`auto_remove`) or detach it from the network.
    ///
    /// A non-graceful stop gives the container no time to shut down.
    pub async fn stop(&self, id: &ContainerId, graceful: bool) -> Result<(), StackError> {
        let name = &self.definition.name;
        let timeout = if graceful {
            self.stop_timeout
        } else {
            Duration::ZERO
        };

        match self.runtime.stop_container(id, timeout).await {
            Ok(()) => info!(service = %name, container = %self.container_name, "container stopped"),
            Err(ContainerError::NotRunning(_)) => {
                debug!(service = %name, "container was not running")
            }
            Err(ContainerError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(StackError::teardown(name, e)),
        }

        if self.definition.auto_remove {
            return match self.runtime.remove_container(id, !graceful).await {
                Ok(()) | Err(ContainerError::NotFound(_)) => Ok(()),
                Err(e) => Err(StackError::teardown(name, e)),
            };
        }

        if let Some(network) = &self.network {
            match self.runtime.disconnect_from_network(id, network).await {
                Ok(()) | Err(NetworkError::NotFound(_)) | Err(NetworkError::NotConnected(_)) => {}
                Err(e) => return Err(StackError::teardown(name, e)),
            }
        }
        Ok(())
    }
}
