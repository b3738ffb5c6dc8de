// ABOUTME: Integration tests against a local Docker or Podman engine.
// ABOUTME: Each test skips itself when no engine socket answers.

use devstack::runtime::{
    ContainerOps, ImageOps, NetworkConfig, NetworkError, NetworkOps, RuntimeInfo,
};
use devstack::stack::{
    ContainerState, OrchestrationScheduler, PortPolicy, ReadinessProbeConfig, SchedulerOptions,
    ServiceDefinition, StackRegistry,
};
use devstack::types::{ImageRef, ServiceName, StackPrefix};
use std::collections::HashMap;
use std::time::Duration;

#[macro_use]
mod support;

/// Prefix unique to this test process.
fn prefix(test: &str) -> StackPrefix {
    StackPrefix::new(&format!("dsit-{test}-{}", std::process::id())).unwrap()
}

fn name(s: &str) -> ServiceName {
    ServiceName::new(s).unwrap()
}

fn options() -> SchedulerOptions {
    SchedulerOptions {
        stop_timeout: Duration::from_secs(1),
        running_timeout: Duration::from_secs(30),
        auth: None,
    }
}

#[tokio::test]
async fn runtime_info() {
    let runtime = require_runtime!();

    let info = runtime.info().await.expect("should get runtime info");
    assert!(!info.name.is_empty(), "runtime name should not be empty");
    assert!(!info.version.is_empty(), "runtime version should not be empty");
}

#[tokio::test]
async fn pull_public_image() {
    let runtime = require_runtime!();

    let image = ImageRef::parse("alpine:3").unwrap();
    runtime.pull_image(&image, None).await.expect("pull should succeed");
    assert!(runtime.image_exists(&image).await.unwrap());
}

#[tokio::test]
async fn network_lifecycle() {
    let runtime = require_runtime!();
    let network = prefix("net").network_name("network");

    let config = NetworkConfig {
        name: network.clone(),
        driver: Some("bridge".to_string()),
        labels: HashMap::from([("devstack.managed".to_string(), "true".to_string())]),
    };
    let id = runtime.create_network(&config).await.unwrap();
    assert!(runtime.network_exists(&network).await.unwrap());

    let again = runtime.create_network(&config).await;
    assert!(matches!(again, Err(NetworkError::AlreadyExists(_))));

    runtime.remove_network(&id).await.unwrap();
    assert!(!runtime.network_exists(&network).await.unwrap());
}

#[tokio::test]
async fn missing_container_is_not_an_error() {
    let runtime = require_runtime!();
    let found = runtime
        .find_container(&format!("{}-nothing", prefix("find")))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn stack_comes_up_in_order_and_tears_down() {
    support::init_tracing();
    let runtime = require_runtime!();
    let prefix = prefix("up");
    let image = ImageRef::parse("alpine:3").unwrap();

    let db = ServiceDefinition::builder(name("db"), image.clone())
        .command(vec![
            "sh".into(),
            "-c".into(),
            "echo booting; sleep 1; echo database ready; sleep 300".into(),
        ])
        .readiness(
            ReadinessProbeConfig::log("database ready")
                .unwrap()
                .with_timeout(Duration::from_secs(30)),
        )
        .auto_remove(true)
        .build()
        .unwrap();
    let app = ServiceDefinition::builder(name("app"), image)
        .command(vec!["sleep".into(), "300".into()])
        .env("DB_HOST", "db")
        .depends_on(name("db"))
        .auto_remove(true)
        .build()
        .unwrap();

    let registry =
        StackRegistry::new(prefix.clone(), vec![db, app], PortPolicy::EngineAssigned).unwrap();
    let network = prefix.network_name("network");
    let scheduler = OrchestrationScheduler::new(registry, options());

    let summary = scheduler.up(&runtime).await;
    let up_ok = summary.is_success();
    let states = (
        scheduler.service_state(&name("db")),
        scheduler.service_state(&name("app")),
    );
    let network_up = runtime.network_exists(&network).await.unwrap_or(false);

    // always clean up before asserting
    let teardown = scheduler.down(&runtime, false).await;

    assert!(up_ok, "stack failed: {summary:?}");
    assert_eq!(states, (Some(ContainerState::Ready), Some(ContainerState::Ready)));
    assert!(network_up);

    assert!(teardown.is_clean(), "teardown failed: {teardown:?}");
    assert_eq!(teardown.stopped, [name("app"), name("db")]);
    assert!(!runtime.network_exists(&network).await.unwrap());
    assert!(
        runtime
            .find_container(&prefix.container_name(&name("db")))
            .await
            .unwrap()
            .is_none()
    );
}
