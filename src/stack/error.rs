// ABOUTME: Error taxonomy of the orchestration engine.
// ABOUTME: Pre-flight configuration errors and per-service create/start/readiness/teardown failures.

use super::probe::ReadinessError;
use crate::runtime::{ContainerError, ImageError, NetworkError};
use crate::types::ServiceName;

/// The stack definition is invalid. Raised before any engine call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("service '{0}' is defined more than once")]
    DuplicateService(ServiceName),

    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        service: ServiceName,
        dependency: ServiceName,
    },

    #[error("dependency cycle: {}", format_cycle(.0))]
    DependencyCycle(Vec<ServiceName>),

    #[error("service '{0}' marks more than one port as primary")]
    MultiplePrimaryPorts(ServiceName),

    #[error("service '{service}' has no port labelled '{label}'")]
    UnknownPortLabel { service: ServiceName, label: String },

    #[error("host port {port} is claimed by both '{first}' and '{second}'")]
    DuplicateHostPort {
        port: u16,
        first: String,
        second: String,
    },

    #[error("could not find a free ephemeral port for '{0}'")]
    NoEphemeralPort(String),

    #[error("socket probe of '{0}' has no port and the service publishes no primary port")]
    ProbeWithoutPort(ServiceName),
}

fn format_cycle(cycle: &[ServiceName]) -> String {
    cycle
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Why one service did not become ready, or did not tear down cleanly.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("failed to create container for '{service}': {message}")]
    Create { service: ServiceName, message: String },

    #[error("failed to start '{service}': {message}")]
    Start { service: ServiceName, message: String },

    #[error("'{service}' could not bind its host port: {message}")]
    PortConflict { service: ServiceName, message: String },

    #[error("'{service}' did not become ready: {source}")]
    ReadinessTimeout {
        service: ServiceName,
        #[source]
        source: ReadinessError,
    },

    #[error("network '{network}' unavailable for '{service}': {source}")]
    Network {
        service: ServiceName,
        network: String,
        #[source]
        source: NetworkError,
    },

    #[error("teardown of '{service}' failed: {message}")]
    Teardown { service: ServiceName, message: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackErrorKind {
    Create,
    Start,
    /// Suggest choosing another host port.
    PortConflict,
    ReadinessTimeout,
    Network,
    Teardown,
}

impl StackError {
    pub fn kind(&self) -> StackErrorKind {
        match self {
            StackError::Create { .. } => StackErrorKind::Create,
            StackError::Start { .. } => StackErrorKind::Start,
            StackError::PortConflict { .. } => StackErrorKind::PortConflict,
            StackError::ReadinessTimeout { .. } => StackErrorKind::ReadinessTimeout,
            StackError::Network { .. } => StackErrorKind::Network,
            StackError::Teardown { .. } => StackErrorKind::Teardown,
        }
    }

    pub fn service(&self) -> &ServiceName {
        match self {
            StackError::Create { service, .. }
            | StackError::Start { service, .. }
            | StackError::PortConflict { service, .. }
            | StackError::ReadinessTimeout { service, .. }
            | StackError::Network { service, .. }
            | StackError::Teardown { service, .. } => service,
        }
    }

    /// Diagnostic lines gathered by the readiness probe, if any.
    pub fn evidence(&self) -> &[String] {
        match self {
            StackError::ReadinessTimeout { source, .. } => source.evidence(),
            _ => &[],
        }
    }

    pub(crate) fn create(service: &ServiceName, err: impl std::fmt::Display) -> Self {
        StackError::Create {
            service: service.clone(),
            message: err.to_string(),
        }
    }

    pub(crate) fn from_image(service: &ServiceName, err: ImageError) -> Self {
        Self::create(service, err)
    }

    /// Engine rejection of a start; bind failures become `PortConflict`.
    pub(crate) fn from_start(service: &ServiceName, err: ContainerError) -> Self {
        match err {
            ContainerError::PortConflict(message) => StackError::PortConflict {
                service: service.clone(),
                message,
            },
            other => StackError::Start {
                service: service.clone(),
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn teardown(service: &ServiceName, err: impl std::fmt::Display) -> Self {
        StackError::Teardown {
            service: service.clone(),
            message: err.to_string(),
        }
    }
}
