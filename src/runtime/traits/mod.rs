// ABOUTME: Composable capability traits for container engines.
// ABOUTME: ImageOps, ContainerOps, NetworkOps, LogOps, RuntimeInfo, and the FullRuntime bundle.

mod container;
mod engine;
mod logs;
mod network;
mod shared_types;

pub use container::{ContainerError, ContainerOps};
pub use engine::{ImageError, ImageOps, RuntimeInfo, RuntimeInfoError};
pub use logs::{LogChunks, LogError, LogLine, LogOps, LogOptions, LogStream};
pub use network::{NetworkError, NetworkOps};
pub use shared_types::*;

pub(crate) mod sealed {
    /// Implemented only by engines inside this crate, so the capability
    /// traits can grow methods without breaking callers.
    pub trait Sealed {}
}

/// Everything the orchestration engine needs from a container engine.
pub trait FullRuntime: ContainerOps + ImageOps + NetworkOps + LogOps + RuntimeInfo {}

impl<T> FullRuntime for T where T: ContainerOps + ImageOps + NetworkOps + LogOps + RuntimeInfo {}
