// ABOUTME: Validated set of service definitions forming one stack.
// ABOUTME: Rejects bad graphs before any engine call and fixes the start order.

use super::definition::ServiceDefinition;
use super::error::ConfigurationError;
use super::ports::{PortAllocator, PortPolicy};
use crate::types::{ServiceName, StackPrefix};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const LABEL_STACK: &str = "devstack.stack";
pub const LABEL_SERVICE: &str = "devstack.service";
pub const LABEL_MANAGED: &str = "devstack.managed";

/// Every service of a stack, validated and topologically ordered.
#[derive(Debug)]
pub struct StackRegistry {
    prefix: StackPrefix,
    services: BTreeMap<ServiceName, ServiceDefinition>,
    dependents: BTreeMap<ServiceName, BTreeSet<ServiceName>>,
    order: Vec<ServiceName>,
    port_policy: PortPolicy,
}

impl StackRegistry {
    /// Validate `definitions` and resolve their host ports.
    ///
    /// # Errors
    ///
    /// Duplicate names, unknown or cyclic dependencies, two primary ports on
    /// one service, or one host port claimed twice.
    pub fn new(
        prefix: StackPrefix,
        definitions: Vec<ServiceDefinition>,
        port_policy: PortPolicy,
    ) -> Result<Self, ConfigurationError> {
        let mut services = BTreeMap::new();
        for definition in definitions {
            if services.contains_key(&definition.name) {
                return Err(ConfigurationError::DuplicateService(definition.name));
            }
            services.insert(definition.name.clone(), definition);
        }

        let mut dependents: BTreeMap<ServiceName, BTreeSet<ServiceName>> = services
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();
        for definition in services.values() {
            for dependency in &definition.depends_on {
                match dependents.get_mut(dependency) {
                    Some(set) => set.insert(definition.name.clone()),
                    None => {
                        return Err(ConfigurationError::UnknownDependency {
                            service: definition.name.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                };
            }
        }

        if let Some(cycle) = find_cycle(&services) {
            return Err(ConfigurationError::DependencyCycle(cycle));
        }

        for definition in services.values() {
            definition.validate()?;
        }
        resolve_ports(&mut services, &mut PortAllocator::new(port_policy))?;

        let order = kahn_order(&services, &dependents);

        Ok(Self {
            prefix,
            services,
            dependents,
            order,
            port_policy,
        })
    }

    pub fn prefix(&self) -> &StackPrefix {
        &self.prefix
    }

    pub fn port_policy(&self) -> PortPolicy {
        self.port_policy
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn get(&self, name: &ServiceName) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    /// Dependencies before dependents; ties broken by name.
    pub fn start_order(&self) -> &[ServiceName] {
        &self.order
    }

    pub fn teardown_order(&self) -> Vec<ServiceName> {
        self.order.iter().rev().cloned().collect()
    }

    /// Definitions in start order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.order.iter().filter_map(|name| self.services.get(name))
    }

    pub fn container_name(&self, service: &ServiceName) -> String {
        self.prefix.container_name(service)
    }

    /// Full engine name of the network `service` joins, if any.
    pub fn network_name(&self, service: &ServiceName) -> Option<String> {
        self.services
            .get(service)
            .and_then(|d| d.network.as_deref())
            .map(|n| self.prefix.network_name(n))
    }

    /// Every distinct network the stack uses.
    pub fn network_names(&self) -> BTreeSet<String> {
        self.services
            .keys()
            .filter_map(|name| self.network_name(name))
            .collect()
    }

    /// Services that list `service` in their `depends_on`.
    pub fn dependents(&self, service: &ServiceName) -> impl Iterator<Item = &ServiceName> {
        self.dependents.get(service).into_iter().flatten()
    }

    pub fn transitive_dependents(&self, service: &ServiceName) -> BTreeSet<ServiceName> {
        let mut found = BTreeSet::new();
        let mut pending: Vec<&ServiceName> = self.dependents(service).collect();
        while let Some(next) = pending.pop() {
            if found.insert(next.clone()) {
                pending.extend(self.dependents(next));
            }
        }
        found
    }

    /// Labels marking stack resources; `service` adds the per-container one.
    pub fn labels(&self, service: Option<&ServiceName>) -> HashMap<String, String> {
        let mut labels = HashMap::from([
            (LABEL_STACK.to_string(), self.prefix.to_string()),
            (LABEL_MANAGED.to_string(), "true".to_string()),
        ]);
        if let Some(service) = service {
            labels.insert(LABEL_SERVICE.to_string(), service.to_string());
        }
        labels
    }
}

/// First dependency cycle found, as a path that ends where it starts.
/// Explicit host ports are claimed across the whole stack before any unset
/// port is resolved, so a pick never lands on a port a later service names.
fn resolve_ports(
    services: &mut BTreeMap<ServiceName, ServiceDefinition>,
    allocator: &mut PortAllocator,
) -> Result<(), ConfigurationError> {
    for explicit in [true, false] {
        for definition in services.values_mut() {
            for mapping in &mut definition.ports {
                if (mapping.host_port != 0) != explicit {
                    continue;
                }
                let resolved = allocator.resolve(
                    &definition.name,
                    &mapping.label,
                    mapping.host_port,
                    mapping.container_port,
                )?;
                mapping.host_port = resolved.host_port;
            }
        }
    }
    Ok(())
}

fn find_cycle(services: &BTreeMap<ServiceName, ServiceDefinition>) -> Option<Vec<ServiceName>> {
    let mut visited = BTreeSet::new();
    let mut on_path = BTreeSet::new();
    let mut path = Vec::new();

    for name in services.keys() {
        if visited.contains(name) {
            continue;
        }
        if let Some(cycle) = dfs_cycle(name, services, &mut visited, &mut on_path, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn dfs_cycle<'a>(
    node: &'a ServiceName,
    services: &'a BTreeMap<ServiceName, ServiceDefinition>,
    visited: &mut BTreeSet<&'a ServiceName>,
    on_path: &mut BTreeSet<&'a ServiceName>,
    path: &mut Vec<&'a ServiceName>,
) -> Option<Vec<ServiceName>> {
    visited.insert(node);
    on_path.insert(node);
    path.push(node);

    for dependency in services.get(node).into_iter().flat_map(|d| &d.depends_on) {
        if on_path.contains(dependency) {
            let start = path.iter().position(|n| *n == dependency).unwrap_or(0);
            let mut cycle: Vec<ServiceName> = path[start..].iter().map(|n| (*n).clone()).collect();
            cycle.push(dependency.clone());
            return Some(cycle);
        }
        if visited.contains(dependency) {
            continue;
        }
        if let Some(cycle) = dfs_cycle(dependency, services, visited, on_path, path) {
            return Some(cycle);
        }
    }

    path.pop();
    on_path.remove(node);
    None
}

/// Kahn's algorithm over an acyclic graph, lowest name first among ready services.
fn kahn_order(
    services: &BTreeMap<ServiceName, ServiceDefinition>,
    dependents: &BTreeMap<ServiceName, BTreeSet<ServiceName>>,
) -> Vec<ServiceName> {
    let mut remaining: BTreeMap<&ServiceName, usize> = services
        .iter()
        .map(|(name, d)| (name, d.depends_on.len()))
        .collect();
    let mut ready: BTreeSet<&ServiceName> = remaining
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(services.len());
    while let Some(next) = ready.pop_first() {
        order.push(next.clone());
        for dependent in dependents.get(next).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }
    order
}
