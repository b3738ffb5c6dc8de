// ABOUTME: Bollard-based container engine implementation.
// ABOUTME: Talks to Docker, or to Podman through its Docker-compatible socket.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ContainerConfig, ContainerError, ContainerInfo, ContainerOps, ImageError, ImageOps, LogChunks,
    LogError, LogLine, LogOps, LogOptions, LogStream, NetworkConfig, NetworkError, NetworkOps,
    PortBinding, Protocol, RegistryAuth, RunState, RuntimeInfo, RuntimeInfoError,
    RuntimeMetadata,
};
use crate::runtime::types::{RuntimeType, SocketInfo};
use crate::types::{ContainerId, ImageRef, NetworkAlias, NetworkId};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, ContainerStateStatusEnum, EndpointSettings,
    HostConfig, Mount, MountTypeEnum, PortBinding as EnginePortBinding,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, LogsOptions,
    RemoveContainerOptions, StopContainerOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// =============================================================================
// Error Mapping Helpers
// =============================================================================

/// Status code and message of an engine-side error response.
fn server_error(e: &bollard::errors::Error) -> Option<(u16, &str)> {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

fn is_port_conflict(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("port is already allocated") || message.contains("address already in use")
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match server_error(&e) {
        Some((404, message)) => ContainerError::ImageNotFound(message.to_string()),
        Some((409, message)) => ContainerError::AlreadyExists(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: bollard::errors::Error) -> ContainerError {
    match server_error(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        Some((304, message)) => ContainerError::AlreadyRunning(message.to_string()),
        Some((_, message)) if is_port_conflict(message) => {
            ContainerError::PortConflict(message.to_string())
        }
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_stop_error(e: bollard::errors::Error) -> ContainerError {
    match server_error(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        Some((304, message)) => ContainerError::NotRunning(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match server_error(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_network_create_error(e: bollard::errors::Error) -> NetworkError {
    match server_error(&e) {
        Some((409, message)) => NetworkError::AlreadyExists(message.to_string()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_network_remove_error(e: bollard::errors::Error) -> NetworkError {
    match server_error(&e) {
        Some((404, message)) => NetworkError::NotFound(message.to_string()),
        Some((403, message)) => NetworkError::InUse(message.to_string()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_network_attach_error(e: bollard::errors::Error) -> NetworkError {
    match server_error(&e) {
        Some((404, message)) => NetworkError::NotFound(message.to_string()),
        Some((403, message)) => NetworkError::NotConnected(message.to_string()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container engine implementation using bollard.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Connect to the engine socket found by `detect_local()`.
    pub fn connect(socket: &SocketInfo) -> Result<Self, RuntimeInfoError> {
        let client =
            Docker::connect_with_unix(&socket.socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(client, socket.runtime_type))
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;
        Ok(container_info(details))
    }
}

fn container_info(details: ContainerInspectResponse) -> ContainerInfo {
    let state = details
        .state
        .as_ref()
        .and_then(|s| s.status)
        .map(|s| match s {
            ContainerStateStatusEnum::CREATED => RunState::Created,
            ContainerStateStatusEnum::RUNNING => RunState::Running,
            ContainerStateStatusEnum::PAUSED => RunState::Paused,
            ContainerStateStatusEnum::RESTARTING => RunState::Restarting,
            ContainerStateStatusEnum::REMOVING => RunState::Removing,
            ContainerStateStatusEnum::DEAD => RunState::Dead,
            _ => RunState::Exited,
        })
        .unwrap_or(RunState::Exited);

    let exit_code = details.state.as_ref().and_then(|s| s.exit_code);

    let mut ports = Vec::new();
    let mut networks = Vec::new();
    if let Some(settings) = &details.network_settings {
        if let Some(published) = &settings.ports {
            for (key, bindings) in published {
                let Some((container_port, protocol)) = parse_port_key(key) else {
                    continue;
                };
                for binding in bindings.iter().flatten() {
                    ports.push(PortBinding {
                        host_port: binding.host_port.as_deref().and_then(|p| p.parse().ok()),
                        container_port,
                        protocol,
                        host_ip: binding.host_ip.clone(),
                    });
                }
            }
        }
        if let Some(nets) = &settings.networks {
            networks.extend(nets.keys().cloned());
        }
    }

    ContainerInfo {
        id: ContainerId::new(details.id.unwrap_or_default()),
        name: details
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        image: details
            .config
            .as_ref()
            .and_then(|c| c.image.clone())
            .unwrap_or_default(),
        state,
        exit_code,
        labels: details.config.and_then(|c| c.labels).unwrap_or_default(),
        ports,
        networks,
    }
}

/// "5432/tcp" -> (5432, Tcp)
fn parse_port_key(key: &str) -> Option<(u16, Protocol)> {
    let (port, proto) = key.split_once('/').unwrap_or((key, "tcp"));
    let protocol = match proto {
        "udp" => Protocol::Udp,
        _ => Protocol::Tcp,
    };
    port.parse().ok().map(|p| (p, protocol))
}

impl Sealed for BollardRuntime {}

#[async_trait]
impl RuntimeInfo for BollardRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        let info = self
            .client
            .info()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;

        let name = match self.runtime_type {
            RuntimeType::Docker => "Docker".to_string(),
            RuntimeType::Podman => "Podman".to_string(),
        };

        Ok(RuntimeMetadata {
            name,
            version: info.server_version.unwrap_or_default(),
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
            os: info.operating_system.unwrap_or_default(),
            arch: info.architecture.unwrap_or_default(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.client
            .ping()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        let image_name = reference.to_string();
        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };
        let credentials = auth.map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server.clone(),
            ..Default::default()
        });

        // progress updates; the pull is done when the stream ends
        let mut stream = self.client.create_image(Some(opts), None, credentials);
        while let Some(result) = stream.next().await {
            result.map_err(|e| match server_error(&e) {
                Some((404, message)) => ImageError::NotFound(format!("{image_name}: {message}")),
                _ => ImageError::PullFailed(format!("{image_name}: {e}")),
            })?;
        }
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        let image_name = reference.to_string();
        match self.client.inspect_image(&image_name).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ImageError::Runtime(format!(
                "failed to inspect {image_name}: {e}"
            ))),
        }
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let mut host_config = HostConfig::default();

        let mounts: Vec<Mount> = config
            .volumes
            .iter()
            .map(|m| Mount {
                source: Some(m.source.clone()),
                target: Some(m.target.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();
        if !mounts.is_empty() {
            host_config.mounts = Some(mounts);
        }

        // Every port is published; an unset host port lets the engine pick one.
        let mut port_bindings: HashMap<String, Option<Vec<EnginePortBinding>>> = HashMap::new();
        let mut exposed_ports: Vec<String> = Vec::new();
        for port in &config.ports {
            let port_key = format!("{}/{}", port.container_port, port.protocol.as_str());
            exposed_ports.push(port_key.clone());
            port_bindings.insert(
                port_key,
                Some(vec![EnginePortBinding {
                    host_ip: port.host_ip.clone(),
                    host_port: port.host_port.map(|p| p.to_string()),
                }]),
            );
        }
        if !port_bindings.is_empty() {
            host_config.port_bindings = Some(port_bindings);
        }

        let mut networking_config = None;
        if let Some(network) = &config.network {
            host_config.network_mode = Some(network.clone());
            if !config.network_aliases.is_empty() {
                let aliases = config.network_aliases.iter().map(|a| a.to_string()).collect();
                let endpoints = HashMap::from([(
                    network.clone(),
                    EndpointSettings {
                        aliases: Some(aliases),
                        ..Default::default()
                    },
                )]);
                networking_config = Some(bollard::models::NetworkingConfig {
                    endpoints_config: Some(endpoints),
                });
            }
        }

        let body = ContainerCreateBody {
            image: Some(config.image.to_string()),
            env: (!env.is_empty()).then_some(env),
            labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
            cmd: config.command.clone(),
            user: config.user.clone(),
            host_config: Some(host_config),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            networking_config,
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(config.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), body)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(map_container_start_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };
        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_stop_error)
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        self.inspect(id.as_str()).await
    }

    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>, ContainerError> {
        match self.inspect(name).await {
            Ok(info) => Ok(Some(info)),
            Err(ContainerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl NetworkOps for BollardRuntime {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        let request = bollard::models::NetworkCreateRequest {
            name: config.name.clone(),
            driver: config.driver.clone(),
            labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_network(request)
            .await
            .map_err(map_network_create_error)?;

        Ok(NetworkId::new(response.id))
    }

    async fn remove_network(&self, id: &NetworkId) -> Result<(), NetworkError> {
        self.client
            .remove_network(id.as_str())
            .await
            .map_err(map_network_remove_error)
    }

    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
        aliases: &[NetworkAlias],
    ) -> Result<(), NetworkError> {
        let request = bollard::models::NetworkConnectRequest {
            container: container.to_string(),
            endpoint_config: Some(EndpointSettings {
                aliases: (!aliases.is_empty())
                    .then(|| aliases.iter().map(|a| a.to_string()).collect()),
                ..Default::default()
            }),
        };
        self.client
            .connect_network(network.as_str(), request)
            .await
            .map_err(map_network_attach_error)
    }

    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError> {
        let request = bollard::models::NetworkDisconnectRequest {
            container: container.to_string(),
            force: Some(false),
        };
        self.client
            .disconnect_network(network.as_str(), request)
            .await
            .map_err(map_network_attach_error)
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        match self
            .client
            .inspect_network(
                name,
                None::<bollard::query_parameters::InspectNetworkOptions>,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(NetworkError::Runtime(e.to_string())),
        }
    }
}

#[async_trait]
impl LogOps for BollardRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogChunks, LogError> {
        let log_opts = LogsOptions {
            stdout: opts.stdout,
            stderr: opts.stderr,
            follow: opts.follow,
            tail: opts
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            since: opts.since.map(unix_seconds).unwrap_or_default(),
            ..Default::default()
        };

        let container = id.to_string();
        let stream = self.client.logs(id.as_str(), Some(log_opts)).map(move |result| {
            result
                .map(|output| {
                    let (stream, data) = match output {
                        bollard::container::LogOutput::StdErr { message } => {
                            (LogStream::Stderr, message)
                        }
                        bollard::container::LogOutput::StdOut { message }
                        | bollard::container::LogOutput::StdIn { message }
                        | bollard::container::LogOutput::Console { message } => {
                            (LogStream::Stdout, message)
                        }
                    };
                    LogLine {
                        data: data.to_vec(),
                        stream,
                    }
                })
                .map_err(|e| match server_error(&e) {
                    Some((404, _)) => LogError::ContainerNotFound(container.clone()),
                    _ => LogError::StreamError(e.to_string()),
                })
        });

        Ok(Box::pin(stream))
    }
}

/// Whole seconds since the epoch, rounded down so the boundary second is kept.
fn unix_seconds(at: SystemTime) -> i32 {
    at.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i32::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}
