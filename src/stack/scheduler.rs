// ABOUTME: Dependency-ordered bring-up and teardown of a whole stack.
// ABOUTME: Services run concurrently and wait on their dependencies' readiness gates.

use super::definition::ServiceDefinition;
use super::error::StackError;
use super::lifecycle::{
    ContainerLifecycleController, DEFAULT_RUNNING_TIMEOUT, DEFAULT_STOP_TIMEOUT,
};
use super::network::NetworkHandle;
use super::ports::PortMapping;
use super::registry::StackRegistry;
use super::state::{
    ContainerState, RunSummary, ServiceOutcome, ServiceReport, TeardownSummary,
};
use crate::runtime::{ContainerError, ContainerInfo, FullRuntime, RegistryAuth};
use crate::types::{ContainerId, ServiceName};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Published once per service when its bring-up settles.
/// `Err` carries the service whose failure stopped it.
type Gate = Option<Result<(), ServiceName>>;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Grace period for a graceful stop.
    pub stop_timeout: Duration,
    /// How long a started container may take to report running.
    pub running_timeout: Duration,
    pub auth: Option<RegistryAuth>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            running_timeout: DEFAULT_RUNNING_TIMEOUT,
            auth: None,
        }
    }
}

#[derive(Debug, Default)]
struct ServiceRecord {
    state: ContainerState,
    id: Option<ContainerId>,
    ports: Vec<PortMapping>,
    outcome: Option<ServiceOutcome>,
    holds_lease: bool,
}

/// Owns the authoritative state of every service in a stack.
pub struct OrchestrationScheduler {
    registry: StackRegistry,
    networks: BTreeMap<String, NetworkHandle>,
    records: Mutex<BTreeMap<ServiceName, ServiceRecord>>,
    options: SchedulerOptions,
}

impl OrchestrationScheduler {
    pub fn new(registry: StackRegistry, options: SchedulerOptions) -> Self {
        let labels = registry.labels(None);
        let networks = registry
            .network_names()
            .into_iter()
            .map(|name| {
                let handle = NetworkHandle::new(name.clone()).with_labels(labels.clone());
                (name, handle)
            })
            .collect();
        let records = registry
            .services()
            .map(|d| {
                let record = ServiceRecord {
                    ports: d.ports.clone(),
                    ..ServiceRecord::default()
                };
                (d.name.clone(), record)
            })
            .collect();

        Self {
            registry,
            networks,
            records: Mutex::new(records),
            options,
        }
    }

    pub fn registry(&self) -> &StackRegistry {
        &self.registry
    }

    // =========================================================================
    // Bring-up
    // =========================================================================

    /// Bring every service up, dependencies first.
    ///
    /// All services are polled together; each one blocks until its
    /// dependencies are ready. A failure skips every transitive dependent
    /// without touching the engine for it.
    pub async fn up<R: FullRuntime>(&self, runtime: &R) -> RunSummary {
        let gates: BTreeMap<ServiceName, watch::Sender<Gate>> = self
            .registry
            .start_order()
            .iter()
            .map(|name| (name.clone(), watch::channel(None).0))
            .collect();

        join_all(
            self.registry
                .services()
                .map(|definition| self.bring_up(runtime, definition, &gates)),
        )
        .await;

        self.summary()
    }

    async fn bring_up<R: FullRuntime>(
        &self,
        runtime: &R,
        definition: &ServiceDefinition,
        gates: &BTreeMap<ServiceName, watch::Sender<Gate>>,
    ) {
        let name = &definition.name;
        let Some(gate) = gates.get(name) else {
            return;
        };

        for dependency in &definition.depends_on {
            let upstream = match gates.get(dependency) {
                Some(sender) => {
                    let mut rx = sender.subscribe();
                    let settled = match rx.wait_for(Option::is_some).await {
                        Ok(settled) => settled.clone(),
                        Err(_) => None,
                    };
                    settled
                }
                None => None,
            };
            match upstream {
                Some(Ok(())) => {}
                Some(Err(cause)) => {
                    self.skip(name, cause.clone());
                    gate.send_replace(Some(Err(cause)));
                    return;
                }
                None => {
                    self.skip(name, dependency.clone());
                    gate.send_replace(Some(Err(dependency.clone())));
                    return;
                }
            }
        }

        match self.launch(runtime, definition).await {
            Ok(()) => {
                info!(service = %name, "service ready");
                self.with_record(name, |r| r.outcome = Some(ServiceOutcome::Ready));
                gate.send_replace(Some(Ok(())));
            }
            Err(e) => {
                warn!(service = %name, error = %e, "service failed");
                for line in e.evidence() {
                    debug!(service = %name, "{line}");
                }
                self.with_record(name, |r| {
                    r.state = ContainerState::Failed;
                    r.outcome = Some(ServiceOutcome::Failed(Arc::new(e)));
                });
                gate.send_replace(Some(Err(name.clone())));
            }
        }
    }

    fn skip(&self, name: &ServiceName, cause: ServiceName) {
        info!(service = %name, %cause, "skipping service, dependency failed");
        self.with_record(name, |r| r.outcome = Some(ServiceOutcome::Skipped { cause }));
    }

    /// find, network, create, start, running, probe.
    async fn launch<R: FullRuntime>(
        &self,
        runtime: &R,
        definition: &ServiceDefinition,
    ) -> Result<(), StackError> {
        let name = &definition.name;
        let controller = self.controller(runtime, definition);

        let lookup = controller
            .find()
            .await
            .map_err(|e| StackError::create(name, e))?;
        self.observe(name, lookup.state, lookup.id().cloned());

        if let Some(network) = self.network_for(name) {
            let _network_id = network
                .acquire(runtime)
                .await
                .map_err(|source| StackError::Network {
                    service: name.clone(),
                    network: network.name().to_string(),
                    source,
                })?;
            self.with_record(name, |r| r.holds_lease = true);
        }

        let id = controller.create(&lookup).await?;
        if !lookup.exists() {
            self.advance(name, ContainerState::Created);
        }
        self.with_record(name, |r| r.id = Some(id.clone()));

        // output from before this start belongs to an earlier run
        let started_at = (!lookup.state.is_up()).then(SystemTime::now);
        if started_at.is_some() {
            self.advance(name, ContainerState::Starting);
        }
        controller.start(&lookup, &id).await?;
        let info = controller
            .await_running(&id, self.options.running_timeout)
            .await?;
        self.observe_ports(definition, &info);
        self.advance(name, ContainerState::Running);

        if let Some(probe) = &definition.readiness {
            debug!(service = %name, "waiting for readiness");
            probe
                .await_ready(runtime, &id, self.resolved_primary_port(name), started_at)
                .await
                .map_err(|source| StackError::ReadinessTimeout {
                    service: name.clone(),
                    source,
                })?;
        }
        self.advance(name, ContainerState::Ready);
        Ok(())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Tear every service down, dependents first.
    ///
    /// Errors are logged and collected; they never stop the teardown of
    /// other services. Networks nobody holds are swept at the end.
    pub async fn down<R: FullRuntime>(&self, runtime: &R, graceful: bool) -> TeardownSummary {
        let gates: BTreeMap<ServiceName, watch::Sender<bool>> = self
            .registry
            .start_order()
            .iter()
            .map(|name| (name.clone(), watch::channel(false).0))
            .collect();
        let finished = Mutex::new(Vec::new());

        let results = join_all(self.registry.teardown_order().into_iter().map(|name| {
            let gates = &gates;
            let finished = &finished;
            async move {
                for dependent in self.registry.dependents(&name) {
                    if let Some(sender) = gates.get(dependent) {
                        // a dropped sender means the dependent is gone too
                        let _ = sender.subscribe().wait_for(|done| *done).await;
                    }
                }
                let result = self.tear_down(runtime, &name, graceful).await;
                finished.lock().push(name.clone());
                if let Some(gate) = gates.get(&name) {
                    gate.send_replace(true);
                }
                result
            }
        }))
        .await;

        let mut summary = TeardownSummary {
            stopped: finished.into_inner(),
            ..TeardownSummary::default()
        };
        for result in results {
            match result {
                Ok(released) => summary.removed_networks.extend(released),
                Err(e) => {
                    warn!(service = %e.service(), error = %e, "teardown failed");
                    summary.errors.push(e);
                }
            }
        }

        for network in self.networks.values() {
            match network.remove_if_unused(runtime).await {
                Ok(true) => summary.removed_networks.push(network.name().to_string()),
                Ok(false) => {}
                Err(e) => {
                    warn!(network = %network.name(), error = %e, "network sweep failed");
                    summary.network_errors.push((network.name().to_string(), e));
                }
            }
        }
        summary
    }

    /// Stop one service and give back its network lease.
    ///
    /// Returns the network removed by that release, if any.
    async fn tear_down<R: FullRuntime>(
        &self,
        runtime: &R,
        name: &ServiceName,
        graceful: bool,
    ) -> Result<Option<String>, StackError> {
        let Some(definition) = self.registry.get(name) else {
            return Ok(None);
        };
        let controller = self.controller(runtime, definition);

        let lookup = controller
            .find()
            .await
            .map_err(|e| StackError::teardown(name, e))?;
        self.observe(name, lookup.state, lookup.id().cloned());

        if let Some(id) = lookup.id() {
            if lookup.state.is_up() {
                self.advance(name, ContainerState::Stopping);
            }
            if let Err(e) = controller.stop(id, graceful).await {
                self.with_record(name, |r| r.state = ContainerState::Failed);
                return Err(e);
            }
            let after = if definition.auto_remove {
                ContainerState::Absent
            } else {
                ContainerState::Stopped
            };
            self.with_record(name, |r| r.state = after);
        }

        let held = self
            .with_record(name, |r| std::mem::take(&mut r.holds_lease))
            .unwrap_or(false);
        match self.network_for(name) {
            Some(network) if held => {
                let removed = network
                    .release(runtime)
                    .await
                    .map_err(|e| StackError::teardown(name, e))?;
                Ok(removed.then(|| network.name().to_string()))
            }
            _ => Ok(None),
        }
    }

    // =========================================================================
    // Query surface
    // =========================================================================

    /// Re-read what the engine reports for every service. Changes nothing.
    pub async fn refresh<R: FullRuntime>(&self, runtime: &R) -> Result<(), ContainerError> {
        for definition in self.registry.services() {
            let controller = self.controller(runtime, definition);
            let lookup = controller.find().await?;
            self.observe(&definition.name, lookup.state, lookup.id().cloned());
            match &lookup.info {
                Some(info) => self.observe_ports(definition, info),
                None => {
                    self.with_record(&definition.name, |r| r.ports = definition.ports.clone());
                }
            }
        }
        Ok(())
    }

    pub fn service_state(&self, name: &ServiceName) -> Option<ContainerState> {
        self.records.lock().get(name).map(|r| r.state)
    }

    pub fn container_id(&self, name: &ServiceName) -> Option<ContainerId> {
        self.records.lock().get(name).and_then(|r| r.id.clone())
    }

    pub fn outcome(&self, name: &ServiceName) -> Option<ServiceOutcome> {
        self.records.lock().get(name).and_then(|r| r.outcome.clone())
    }

    /// Concrete host port of the primary mapping, once known.
    pub fn resolved_primary_port(&self, name: &ServiceName) -> Option<u16> {
        self.records
            .lock()
            .get(name)?
            .ports
            .iter()
            .find(|p| p.primary && p.is_assigned())
            .map(|p| p.host_port)
    }

    pub fn resolved_ports(&self, name: &ServiceName) -> Vec<PortMapping> {
        self.records
            .lock()
            .get(name)
            .map(|r| r.ports.clone())
            .unwrap_or_default()
    }

    pub fn container_name(&self, name: &ServiceName) -> Option<String> {
        self.registry
            .get(name)
            .map(|_| self.registry.container_name(name))
    }

    /// Per-service report in start order.
    pub fn summary(&self) -> RunSummary {
        let records = self.records.lock();
        let reports = self
            .registry
            .start_order()
            .iter()
            .filter_map(|name| {
                let record = records.get(name)?;
                Some(ServiceReport {
                    service: name.clone(),
                    container_name: self.registry.container_name(name),
                    state: record.state,
                    outcome: record.outcome.clone()?,
                    ports: record.ports.clone(),
                })
            })
            .collect();
        RunSummary { reports }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn controller<'a, R: FullRuntime>(
        &'a self,
        runtime: &'a R,
        definition: &'a ServiceDefinition,
    ) -> ContainerLifecycleController<'a, R> {
        let name = &definition.name;
        ContainerLifecycleController::new(runtime, definition, self.registry.container_name(name))
            .network(self.registry.network_name(name))
            .labels(self.registry.labels(Some(name)))
            .stop_timeout(self.options.stop_timeout)
            .auth(self.options.auth.as_ref())
    }

    fn network_for(&self, name: &ServiceName) -> Option<&NetworkHandle> {
        self.registry
            .network_name(name)
            .and_then(|n| self.networks.get(&n))
    }

    fn with_record<T>(&self, name: &ServiceName, f: impl FnOnce(&mut ServiceRecord) -> T) -> Option<T> {
        self.records.lock().get_mut(name).map(f)
    }

    /// Take the engine's word for the current state.
    fn observe(&self, name: &ServiceName, state: ContainerState, id: Option<ContainerId>) {
        self.with_record(name, |r| {
            r.state = state;
            r.id = id;
        });
    }

    fn advance(&self, name: &ServiceName, next: ContainerState) {
        self.with_record(name, |r| {
            if !r.state.can_become(next) {
                debug!(service = %name, from = %r.state, to = %next, "unexpected state change");
            }
            debug!(service = %name, state = %next, "state");
            r.state = next;
        });
    }

    fn observe_ports(&self, definition: &ServiceDefinition, info: &ContainerInfo) {
        let ports = definition
            .ports
            .iter()
            .map(|p| p.resolved(info.host_port_for(p.container_port)))
            .collect();
        self.with_record(&definition.name, |r| r.ports = ports);
    }
}
