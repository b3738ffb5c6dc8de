// ABOUTME: Per-service lifecycle state and run outcomes.
// ABOUTME: What the scheduler records and what callers query after up, down, or refresh.

use super::error::StackError;
use super::ports::PortMapping;
use crate::runtime::{NetworkError, RunState};
use crate::types::ServiceName;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContainerState {
    #[default]
    Absent,
    Created,
    Starting,
    Running,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

impl ContainerState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_become(self, next: ContainerState) -> bool {
        use ContainerState::*;
        match (self, next) {
            (Failed, _) => false,
            (_, Failed) => true,
            (Absent | Stopped, Created) => true,
            (Created | Stopped, Starting) => true,
            (Starting, Running) => true,
            (Running, Ready) => true,
            (Running | Ready, Stopping) => true,
            (Stopping, Stopped) => true,
            _ => false,
        }
    }

    pub fn is_up(self) -> bool {
        matches!(self, ContainerState::Running | ContainerState::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Absent => "absent",
            ContainerState::Created => "created",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Ready => "ready",
            ContainerState::Stopping => "stopping",
            ContainerState::Stopped => "stopped",
            ContainerState::Failed => "failed",
        }
    }
}

impl From<RunState> for ContainerState {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Created => ContainerState::Created,
            RunState::Running | RunState::Restarting | RunState::Paused => ContainerState::Running,
            RunState::Removing => ContainerState::Stopping,
            RunState::Exited | RunState::Dead => ContainerState::Stopped,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a service ended up after `up`.
#[derive(Debug, Clone)]
pub enum ServiceOutcome {
    Ready,
    Failed(Arc<StackError>),
    /// Not attempted because `cause` failed upstream.
    Skipped { cause: ServiceName },
}

impl ServiceOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceOutcome::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ServiceOutcome::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ServiceOutcome::Skipped { .. })
    }

    pub fn error(&self) -> Option<&StackError> {
        match self {
            ServiceOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceOutcome::Ready => f.write_str("ready"),
            ServiceOutcome::Failed(e) => write!(f, "failed: {e}"),
            ServiceOutcome::Skipped { cause } => write!(f, "skipped ({cause} failed)"),
        }
    }
}

/// One service's line in a run summary.
#[derive(Debug, Clone)]
pub struct ServiceReport {
    pub service: ServiceName,
    pub container_name: String,
    pub state: ContainerState,
    pub outcome: ServiceOutcome,
    pub ports: Vec<PortMapping>,
}

impl ServiceReport {
    pub fn primary_port(&self) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.primary)
            .filter(|p| p.is_assigned())
            .map(|p| p.host_port)
    }
}

/// Result of bringing a stack up, in start order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<ServiceReport>,
}

impl RunSummary {
    pub fn ready(&self) -> impl Iterator<Item = &ServiceReport> {
        self.reports.iter().filter(|r| r.outcome.is_ready())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ServiceReport> {
        self.reports.iter().filter(|r| r.outcome.is_failed())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ServiceReport> {
        self.reports.iter().filter(|r| r.outcome.is_skipped())
    }

    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.outcome.is_ready())
    }

    pub fn get(&self, service: &ServiceName) -> Option<&ServiceReport> {
        self.reports.iter().find(|r| &r.service == service)
    }
}

/// Result of tearing a stack down. Errors never stop sibling teardown.
#[derive(Debug, Default)]
pub struct TeardownSummary {
    /// Services in the order their teardown finished.
    pub stopped: Vec<ServiceName>,
    pub removed_networks: Vec<String>,
    pub errors: Vec<StackError>,
    pub network_errors: Vec<(String, NetworkError)>,
}

impl TeardownSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.network_errors.is_empty()
    }
}
