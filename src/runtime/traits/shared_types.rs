// ABOUTME: Shared types used across engine trait definitions.
// ABOUTME: ContainerConfig, ContainerInfo, PortBinding, NetworkConfig, RegistryAuth, etc.

use crate::types::{ContainerId, ImageRef, NetworkAlias};
use std::collections::HashMap;

/// Everything needed to create one container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageRef,
    /// Environment variables in declaration order.
    pub env: Vec<(String, String)>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortBinding>,
    pub volumes: Vec<VolumeMount>,
    /// Command to run (overrides image CMD).
    pub command: Option<Vec<String>>,
    /// User to run as, `uid[:gid]` or a name.
    pub user: Option<String>,
    /// Network to join at creation.
    pub network: Option<String>,
    pub network_aliases: Vec<NetworkAlias>,
}

/// A published port. `host_port` of `None` lets the engine choose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: Protocol,
    pub host_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// A bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Host path.
    pub source: String,
    /// Path inside the container.
    pub target: String,
    pub read_only: bool,
}

/// What the engine reports about an existing container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: RunState,
    pub exit_code: Option<i64>,
    pub labels: HashMap<String, String>,
    /// Published ports with the host side as actually bound.
    pub ports: Vec<PortBinding>,
    /// Names of the networks the container is attached to.
    pub networks: Vec<String>,
}

impl ContainerInfo {
    /// Host port the engine bound for `container_port`, if published.
    pub fn host_port_for(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container_port == container_port && p.host_port.is_some())
            .and_then(|p| p.host_port)
    }
}

/// Engine-level container status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    /// Network driver (bridge, host, overlay, etc.).
    pub driver: Option<String>,
    pub labels: HashMap<String, String>,
}

/// Registry credentials for pulling private images.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    /// Registry server (e.g., "ghcr.io").
    pub server: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeMetadata {
    /// "Docker" or "Podman".
    pub name: String,
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}
