// ABOUTME: Network capability used by the shared stack network.
// ABOUTME: Existence check, create and remove, attach and detach service containers.

use super::sealed::Sealed;
use super::shared_types::NetworkConfig;
use crate::types::{ContainerId, NetworkAlias, NetworkId};
use async_trait::async_trait;

#[async_trait]
pub trait NetworkOps: Sealed + Send + Sync {
    /// Looks the network up by name, not id.
    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError>;

    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError>;

    async fn remove_network(&self, id: &NetworkId) -> Result<(), NetworkError>;

    /// Attach `container`, reachable from its peers under each of `aliases`.
    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
        aliases: &[NetworkAlias],
    ) -> Result<(), NetworkError>;

    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network not found: {0}")]
    NotFound(String),

    /// Another process (or a concurrent create) got there first.
    #[error("network already exists: {0}")]
    AlreadyExists(String),

    #[error("container not connected to network: {0}")]
    NotConnected(String),

    /// Containers outside this stack's leases are still attached.
    #[error("network still has attached containers: {0}")]
    InUse(String),

    #[error("engine error: {0}")]
    Runtime(String),
}
