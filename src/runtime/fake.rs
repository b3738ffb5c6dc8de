// ABOUTME: In-memory recording engine for unit tests.
// ABOUTME: Scripts log output and start failures, and records every call in order.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ContainerConfig, ContainerError, ContainerInfo, ContainerOps, ImageError, ImageOps, LogChunks,
    LogError, LogLine, LogOps, LogOptions, NetworkConfig, NetworkError, NetworkOps, PortBinding,
    RegistryAuth, RunState, RuntimeInfo, RuntimeInfoError, RuntimeMetadata,
};
use crate::types::{ContainerId, ImageRef, NetworkAlias, NetworkId};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// One engine call, keyed by container or network name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PullImage(String),
    CreateContainer(String),
    StartContainer(String),
    StopContainer(String),
    RemoveContainer(String),
    CreateNetwork(String),
    RemoveNetwork(String),
    Connect(String),
    Disconnect(String),
    Logs(String),
}

impl Call {
    pub fn target(&self) -> &str {
        match self {
            Call::PullImage(s)
            | Call::CreateContainer(s)
            | Call::StartContainer(s)
            | Call::StopContainer(s)
            | Call::RemoveContainer(s)
            | Call::CreateNetwork(s)
            | Call::RemoveNetwork(s)
            | Call::Connect(s)
            | Call::Disconnect(s)
            | Call::Logs(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StartFailure {
    PortConflict,
    Exits,
}

struct FakeContainer {
    name: String,
    image: String,
    state: RunState,
    ports: Vec<PortBinding>,
    networks: Vec<String>,
    labels: HashMap<String, String>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    containers: HashMap<String, FakeContainer>,
    networks: HashSet<String>,
    missing_images: HashSet<String>,
    logs: HashMap<String, Vec<String>>,
    earlier_logs: HashMap<String, Vec<String>>,
    start_failures: HashMap<String, StartFailure>,
    next_port: u16,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

fn id_for(name: &str) -> ContainerId {
    ContainerId::new(format!("id-{name}"))
}

fn name_of(id: &ContainerId) -> String {
    id.as_str().trim_start_matches("id-").to_string()
}

impl FakeRuntime {
    pub fn new() -> Self {
        let runtime = Self::default();
        runtime.state.lock().next_port = 49152;
        runtime
    }

    /// Output the container `name` prints once started.
    pub fn with_logs(self, name: &str, lines: &[&str]) -> Self {
        self.state.lock().logs.insert(
            name.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    /// Output left by an earlier run; hidden from reads with a `since` cutoff.
    pub fn with_earlier_logs(self, name: &str, lines: &[&str]) -> Self {
        self.state.lock().earlier_logs.insert(
            name.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    pub fn fail_start(self, name: &str, failure: StartFailure) -> Self {
        self.state
            .lock()
            .start_failures
            .insert(name.to_string(), failure);
        self
    }

    pub fn missing_image(self, image: &str) -> Self {
        self.state.lock().missing_images.insert(image.to_string());
        self
    }

    /// A container left over from an earlier run.
    pub fn with_container(self, name: &str, state: RunState) -> Self {
        self.state.lock().containers.insert(
            name.to_string(),
            FakeContainer {
                name: name.to_string(),
                image: "leftover:latest".to_string(),
                state,
                ports: Vec::new(),
                networks: Vec::new(),
                labels: HashMap::new(),
            },
        );
        self
    }

    pub fn with_network(self, name: &str) -> Self {
        self.state.lock().networks.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn calls_for(&self, target: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.target() == target)
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state.lock().containers.contains_key(name)
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().networks.contains(name)
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    fn info(container: &FakeContainer) -> ContainerInfo {
        ContainerInfo {
            id: id_for(&container.name),
            name: container.name.clone(),
            image: container.image.clone(),
            state: container.state,
            exit_code: (container.state == RunState::Exited).then_some(0),
            labels: container.labels.clone(),
            ports: container.ports.clone(),
            networks: container.networks.clone(),
        }
    }
}

impl Sealed for FakeRuntime {}

#[async_trait]
impl RuntimeInfo for FakeRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        Ok(RuntimeMetadata {
            name: "Fake".to_string(),
            version: "0".to_string(),
            api_version: "0".to_string(),
            os: "test".to_string(),
            arch: "test".to_string(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        Ok(())
    }
}

#[async_trait]
impl ImageOps for FakeRuntime {
    async fn pull_image(
        &self,
        reference: &ImageRef,
        _auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        let image = reference.to_string();
        self.record(Call::PullImage(image.clone()));
        if image.contains("does-not-exist") {
            return Err(ImageError::NotFound(image));
        }
        self.state.lock().missing_images.remove(&image);
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        let image = reference.to_string();
        let state = self.state.lock();
        Ok(!state.missing_images.contains(&image) && !image.contains("does-not-exist"))
    }
}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        self.record(Call::CreateContainer(config.name.clone()));
        let mut state = self.state.lock();
        if state.containers.contains_key(&config.name) {
            return Err(ContainerError::AlreadyExists(config.name.clone()));
        }
        let mut ports = Vec::new();
        for port in &config.ports {
            let host_port = match port.host_port {
                Some(p) => p,
                None => {
                    state.next_port += 1;
                    state.next_port
                }
            };
            ports.push(PortBinding {
                host_port: Some(host_port),
                ..port.clone()
            });
        }
        state.containers.insert(
            config.name.clone(),
            FakeContainer {
                name: config.name.clone(),
                image: config.image.to_string(),
                state: RunState::Created,
                ports,
                networks: config.network.iter().cloned().collect(),
                labels: config.labels.clone(),
            },
        );
        Ok(id_for(&config.name))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let name = name_of(id);
        self.record(Call::StartContainer(name.clone()));
        let mut state = self.state.lock();
        let failure = state.start_failures.get(&name).copied();
        let container = state
            .containers
            .get_mut(&name)
            .ok_or_else(|| ContainerError::NotFound(name.clone()))?;
        match (container.state, failure) {
            (RunState::Running, _) => Err(ContainerError::AlreadyRunning(name)),
            (_, Some(StartFailure::PortConflict)) => Err(ContainerError::PortConflict(format!(
                "Bind for 0.0.0.0 failed: port is already allocated ({name})"
            ))),
            (_, Some(StartFailure::Exits)) => {
                container.state = RunState::Exited;
                Ok(())
            }
            (_, None) => {
                container.state = RunState::Running;
                Ok(())
            }
        }
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        let name = name_of(id);
        self.record(Call::StopContainer(name.clone()));
        // let sibling teardowns interleave
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(&name)
            .ok_or_else(|| ContainerError::NotFound(name.clone()))?;
        if container.state != RunState::Running {
            return Err(ContainerError::NotRunning(name));
        }
        container.state = RunState::Exited;
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> Result<(), ContainerError> {
        let name = name_of(id);
        self.record(Call::RemoveContainer(name.clone()));
        self.state
            .lock()
            .containers
            .remove(&name)
            .map(|_| ())
            .ok_or(ContainerError::NotFound(name))
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let name = name_of(id);
        let state = self.state.lock();
        state
            .containers
            .get(&name)
            .map(Self::info)
            .ok_or(ContainerError::NotFound(name))
    }

    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>, ContainerError> {
        Ok(self.state.lock().containers.get(name).map(Self::info))
    }
}

#[async_trait]
impl NetworkOps for FakeRuntime {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        self.record(Call::CreateNetwork(config.name.clone()));
        // give concurrent callers a chance to race
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        if !state.networks.insert(config.name.clone()) {
            return Err(NetworkError::AlreadyExists(config.name.clone()));
        }
        Ok(NetworkId::new(config.name.clone()))
    }

    async fn remove_network(&self, id: &NetworkId) -> Result<(), NetworkError> {
        self.record(Call::RemoveNetwork(id.to_string()));
        let mut state = self.state.lock();
        if !state.networks.remove(id.as_str()) {
            return Err(NetworkError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
        _aliases: &[NetworkAlias],
    ) -> Result<(), NetworkError> {
        let name = name_of(container);
        self.record(Call::Connect(name.clone()));
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(&name)
            .ok_or_else(|| NetworkError::NotFound(name.clone()))?;
        container.networks.push(network.to_string());
        Ok(())
    }

    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError> {
        let name = name_of(container);
        self.record(Call::Disconnect(name.clone()));
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(&name)
            .ok_or_else(|| NetworkError::NotFound(name.clone()))?;
        container.networks.retain(|n| n != network.as_str());
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        Ok(self.state.lock().networks.contains(name))
    }
}

#[async_trait]
impl LogOps for FakeRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogChunks, LogError> {
        let name = name_of(id);
        self.record(Call::Logs(name.clone()));
        let lines: Vec<Result<LogLine, LogError>> = {
            let state = self.state.lock();
            let earlier = match opts.since {
                Some(_) => None,
                None => state.earlier_logs.get(&name),
            };
            earlier
                .into_iter()
                .chain(state.logs.get(&name))
                .flatten()
                .map(|l| Ok(LogLine::stdout(format!("{l}\n"))))
                .collect()
        };
        let stream = futures::stream::iter(lines);
        if opts.follow {
            Ok(Box::pin(stream.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(stream))
        }
    }
}
