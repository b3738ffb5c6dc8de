// ABOUTME: Engine-level capabilities: connectivity, version, and image presence.
// ABOUTME: Consulted once per run and before each container create.

use super::sealed::Sealed;
use super::shared_types::{RegistryAuth, RuntimeMetadata};
use crate::types::ImageRef;
use async_trait::async_trait;

#[async_trait]
pub trait RuntimeInfo: Sealed + Send + Sync {
    /// Engine name, version, and platform.
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError>;

    /// Cheap round trip issued before any orchestration.
    async fn ping(&self) -> Result<(), RuntimeInfoError>;
}

/// Images are pulled at most once per service, and only when missing.
#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// Whether `reference` is already in the local image store.
    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError>;

    /// Pull `reference`, waiting for every layer.
    async fn pull_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeInfoError {
    #[error("cannot reach engine: {0}")]
    ConnectionFailed(String),

    #[error("engine error: {0}")]
    Runtime(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The registry has no such repository or tag.
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("engine error: {0}")]
    Runtime(String),
}
