// ABOUTME: Container engine access for Docker and Podman.
// ABOUTME: Capability traits, the bollard-backed engine, and local socket detection.

mod bollard;
mod detection;
mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod traits;
mod types;

pub use bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local, host_user};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use traits::*;
pub use types::{RuntimeConfig, RuntimeType, SocketInfo};

/// Detect the local engine and connect to it, verifying it answers a ping.
pub async fn connect_local(config: Option<&RuntimeConfig>) -> Result<BollardRuntime, RuntimeError> {
    let socket = detect_local(config)?;
    tracing::debug!(runtime = %socket.runtime_type, socket = %socket.socket_path, "connecting");
    let runtime = BollardRuntime::connect(&socket)?;
    runtime.ping().await?;
    Ok(runtime)
}
