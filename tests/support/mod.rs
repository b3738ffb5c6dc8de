// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup and a helper to reach the local engine when one is running.

use devstack::runtime::{BollardRuntime, connect_local};
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("devstack=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// The local engine, or `None` if nothing answers a ping.
#[allow(dead_code)]
pub async fn local_runtime() -> Option<BollardRuntime> {
    connect_local(None).await.ok()
}

/// Skip the test if no local engine is available.
#[allow(unused_macros)]
macro_rules! require_runtime {
    () => {
        match support::local_runtime().await {
            Some(rt) => rt,
            None => {
                eprintln!("Skipping test: no local container runtime found");
                return;
            }
        }
    };
}
