// ABOUTME: Orchestration engine for one local multi-service stack.
// ABOUTME: Definitions and registry, ports, network, readiness, lifecycle, and scheduling.

mod definition;
mod environment;
mod error;
mod lifecycle;
mod network;
mod ports;
mod probe;
mod registry;
mod scheduler;
mod state;

pub use definition::{DEFAULT_NETWORK, ServiceDefinition, ServiceDefinitionBuilder};
pub use environment::ContainerEnvironment;
pub use error::{ConfigurationError, StackError, StackErrorKind};
pub use lifecycle::{
    ContainerLifecycleController, DEFAULT_RUNNING_TIMEOUT, DEFAULT_STOP_TIMEOUT, Lookup,
};
pub use network::NetworkHandle;
pub use ports::{PortAllocator, PortMapping, PortPolicy};
pub use probe::{
    DEFAULT_PROBE_HOST, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT, EVIDENCE_LINES, LogMatch,
    LogPatternProbe, ReadinessError, ReadinessProbeConfig, SocketProbe, probe_log_stream,
    probe_socket,
};
pub use registry::{LABEL_MANAGED, LABEL_SERVICE, LABEL_STACK, StackRegistry};
pub use scheduler::{OrchestrationScheduler, SchedulerOptions};
pub use state::{
    ContainerState, RunSummary, ServiceOutcome, ServiceReport, TeardownSummary,
};
