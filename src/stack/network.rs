// ABOUTME: Reference-counted shared network of a stack.
// ABOUTME: Created on the first lease, removed when the last lease is released.

use crate::runtime::{NetworkConfig, NetworkError, NetworkOps};
use crate::types::NetworkId;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Lease {
    refs: usize,
    /// Whether the network is known to exist on the engine.
    present: bool,
}

/// One engine network shared by the services of a stack.
///
/// Create and remove run under an async lock so concurrent first users
/// issue a single create, and the last release issues a single remove.
#[derive(Debug)]
pub struct NetworkHandle {
    name: String,
    labels: HashMap<String, String>,
    lease: Mutex<Lease>,
}

impl NetworkHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
            lease: Mutex::new(Lease::default()),
        }
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> NetworkId {
        NetworkId::new(self.name.clone())
    }

    pub async fn lease_count(&self) -> usize {
        self.lease.lock().await.refs
    }

    /// Take a lease, creating the network if this is the first one.
    pub async fn acquire<R: NetworkOps>(&self, runtime: &R) -> Result<NetworkId, NetworkError> {
        let mut lease = self.lease.lock().await;
        if !lease.present {
            self.ensure(runtime).await?;
            lease.present = true;
        }
        lease.refs += 1;
        debug!(network = %self.name, refs = lease.refs, "network lease acquired");
        Ok(self.id())
    }

    async fn ensure<R: NetworkOps>(&self, runtime: &R) -> Result<(), NetworkError> {
        if runtime.network_exists(&self.name).await? {
            debug!(network = %self.name, "reusing existing network");
            return Ok(());
        }
        let config = NetworkConfig {
            name: self.name.clone(),
            driver: Some("bridge".to_string()),
            labels: self.labels.clone(),
        };
        match runtime.create_network(&config).await {
            Ok(_) => {
                info!(network = %self.name, "network created");
                Ok(())
            }
            // created by someone else between the check and the create
            Err(NetworkError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Give a lease back. Returns true if this release removed the network.
    pub async fn release<R: NetworkOps>(&self, runtime: &R) -> Result<bool, NetworkError> {
        let mut lease = self.lease.lock().await;
        lease.refs = lease.refs.saturating_sub(1);
        debug!(network = %self.name, refs = lease.refs, "network lease released");
        if lease.refs > 0 || !lease.present {
            return Ok(false);
        }
        self.remove(runtime).await?;
        lease.present = false;
        Ok(true)
    }

    /// Remove the network if it exists and nobody holds a lease.
    ///
    /// Covers teardown from a process that never acquired the network.
    pub async fn remove_if_unused<R: NetworkOps>(&self, runtime: &R) -> Result<bool, NetworkError> {
        let mut lease = self.lease.lock().await;
        if lease.refs > 0 || !runtime.network_exists(&self.name).await? {
            return Ok(false);
        }
        self.remove(runtime).await?;
        lease.present = false;
        Ok(true)
    }

    async fn remove<R: NetworkOps>(&self, runtime: &R) -> Result<(), NetworkError> {
        match runtime.remove_network(&self.id()).await {
            Ok(()) => {
                info!(network = %self.name, "network removed");
                Ok(())
            }
            Err(NetworkError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
