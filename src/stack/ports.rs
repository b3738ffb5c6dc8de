// ABOUTME: Host port negotiation for a stack's published container ports.
// ABOUTME: Explicit ports are kept as-is; unset ports follow the stack's port policy.

use super::error::ConfigurationError;
use crate::types::ServiceName;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, TcpListener};

/// How many times an ephemeral pick may collide with a stack-claimed port.
const EPHEMERAL_ATTEMPTS: usize = 16;

/// One published port of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub label: String,
    /// 0 until a concrete host port is known.
    pub host_port: u16,
    pub container_port: u16,
    pub primary: bool,
}

impl PortMapping {
    pub fn new(label: impl Into<String>, host_port: u16, container_port: u16) -> Self {
        Self {
            label: label.into(),
            host_port,
            container_port,
            primary: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.host_port != 0
    }

    /// Host port to request from the engine, `None` letting the engine choose.
    pub fn requested_host_port(&self) -> Option<u16> {
        self.is_assigned().then_some(self.host_port)
    }

    /// Same mapping with the engine-reported host port filled in.
    pub fn resolved(&self, host_port: Option<u16>) -> Self {
        Self {
            host_port: host_port.unwrap_or(self.host_port),
            ..self.clone()
        }
    }
}

/// What to do with ports that have no explicit host port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortPolicy {
    /// The engine picks at container creation.
    #[default]
    #[serde(rename = "engine", alias = "engine_assigned")]
    EngineAssigned,
    /// A free port is taken from the OS ahead of time.
    Ephemeral,
}

/// Tracks host ports claimed across the stack.
#[derive(Debug)]
pub struct PortAllocator {
    policy: PortPolicy,
    claimed: HashMap<u16, String>,
    free_port: fn() -> io::Result<u16>,
}

impl PortAllocator {
    pub fn new(policy: PortPolicy) -> Self {
        Self {
            policy,
            claimed: HashMap::new(),
            free_port: os_free_port,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_free_port(policy: PortPolicy, free_port: fn() -> io::Result<u16>) -> Self {
        Self {
            free_port,
            ..Self::new(policy)
        }
    }

    pub fn policy(&self) -> PortPolicy {
        self.policy
    }

    pub fn is_claimed(&self, port: u16) -> bool {
        self.claimed.contains_key(&port)
    }

    /// Resolve one port of `owner` to a mapping.
    ///
    /// A non-zero `requested` is used as-is; it is only checked against the
    /// ports other services of this stack claimed, not against the host.
    pub fn resolve(
        &mut self,
        owner: &ServiceName,
        label: &str,
        requested: u16,
        container_port: u16,
    ) -> Result<PortMapping, ConfigurationError> {
        let claimant = format!("{owner}/{label}");

        let host_port = match (requested, self.policy) {
            (0, PortPolicy::EngineAssigned) => 0,
            (0, PortPolicy::Ephemeral) => self.pick_ephemeral(&claimant)?,
            (port, _) => port,
        };

        if host_port != 0 {
            if let Some(first) = self.claimed.get(&host_port) {
                return Err(ConfigurationError::DuplicateHostPort {
                    port: host_port,
                    first: first.clone(),
                    second: claimant,
                });
            }
            self.claimed.insert(host_port, claimant);
        }

        Ok(PortMapping::new(label, host_port, container_port))
    }

    fn pick_ephemeral(&self, claimant: &str) -> Result<u16, ConfigurationError> {
        for _ in 0..EPHEMERAL_ATTEMPTS {
            let port = (self.free_port)()
                .map_err(|_| ConfigurationError::NoEphemeralPort(claimant.to_string()))?;
            if !self.is_claimed(port) {
                return Ok(port);
            }
        }
        Err(ConfigurationError::NoEphemeralPort(claimant.to_string()))
    }
}

fn os_free_port() -> io::Result<u16> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|l| l.local_addr())
        .map(|addr| addr.port())
}
