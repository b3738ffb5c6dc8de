// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use devstack::stack::{
    OrchestrationScheduler, RunSummary, ServiceOutcome, StackRegistry, TeardownSummary,
};
use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.duration() {
                Some(elapsed) => println!("{message} ({elapsed:.1}s)"),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => emit(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// One line per service after `up`. Quiet mode shows only failures.
    pub fn run_summary(&self, summary: &RunSummary) {
        for report in &summary.reports {
            let port = report.primary_port();
            match self.mode {
                OutputMode::Json => emit(&ServiceEvent {
                    event: "service",
                    service: report.service.as_str(),
                    container: &report.container_name,
                    state: report.state.as_str(),
                    outcome: outcome_word(&report.outcome),
                    port,
                    error: report.outcome.error().map(|e| e.to_string()),
                    evidence: report
                        .outcome
                        .error()
                        .map(|e| e.evidence().to_vec())
                        .unwrap_or_default(),
                }),
                OutputMode::Quiet if report.outcome.is_ready() => {}
                _ => {
                    let port = port.map(|p| format!("localhost:{p}")).unwrap_or_default();
                    println!(
                        "  {:<8} {:<16} {:<24} {}",
                        outcome_word(&report.outcome),
                        report.service,
                        report.container_name,
                        port
                    );
                    if let ServiceOutcome::Failed(e) = &report.outcome {
                        println!("           {e}");
                        for line in e.evidence() {
                            println!("           | {line}");
                        }
                    } else if let ServiceOutcome::Skipped { cause } = &report.outcome {
                        println!("           waiting on {cause}, which failed");
                    }
                }
            }
        }
    }

    pub fn teardown_summary(&self, summary: &TeardownSummary) {
        match self.mode {
            OutputMode::Json => {
                for service in &summary.stopped {
                    emit(&TeardownEvent {
                        event: "stopped",
                        name: service.as_str(),
                        error: summary
                            .errors
                            .iter()
                            .find(|e| e.service() == service)
                            .map(|e| e.to_string()),
                    });
                }
                for network in &summary.removed_networks {
                    emit(&TeardownEvent {
                        event: "network_removed",
                        name: network,
                        error: None,
                    });
                }
            }
            _ => {
                for error in &summary.errors {
                    eprintln!("  {error}");
                }
                for (network, error) in &summary.network_errors {
                    eprintln!("  network {network}: {error}");
                }
                if self.mode == OutputMode::Normal {
                    for network in &summary.removed_networks {
                        println!("  removed network {network}");
                    }
                }
            }
        }
    }

    /// Current state of every service, as last refreshed.
    pub fn status(&self, scheduler: &OrchestrationScheduler) {
        let registry = scheduler.registry();
        for service in registry.start_order() {
            let state = scheduler
                .service_state(service)
                .map(|s| s.as_str())
                .unwrap_or("unknown");
            let container = scheduler.container_name(service).unwrap_or_default();
            let port = scheduler.resolved_primary_port(service);
            match self.mode {
                OutputMode::Json => emit(&StatusEvent {
                    event: "status",
                    service: service.as_str(),
                    container: &container,
                    state,
                    port,
                }),
                _ => println!(
                    "  {:<16} {:<24} {:<10} {}",
                    service,
                    container,
                    state,
                    port.map(|p| format!("localhost:{p}")).unwrap_or_default()
                ),
            }
        }
    }

    /// Start order with each service's dependencies.
    pub fn start_order(&self, registry: &StackRegistry) {
        for (position, service) in registry.start_order().iter().enumerate() {
            let depends_on: Vec<&str> = registry
                .get(service)
                .map(|d| d.depends_on.iter().map(|s| s.as_str()).collect())
                .unwrap_or_default();
            match self.mode {
                OutputMode::Json => emit(&OrderEvent {
                    event: "order",
                    position: position + 1,
                    service: service.as_str(),
                    depends_on,
                }),
                OutputMode::Quiet => println!("{service}"),
                OutputMode::Normal if depends_on.is_empty() => {
                    println!("  {:>2}. {service}", position + 1)
                }
                OutputMode::Normal => println!(
                    "  {:>2}. {service} (after {})",
                    position + 1,
                    depends_on.join(", ")
                ),
            }
        }
    }
}

fn outcome_word(outcome: &ServiceOutcome) -> &'static str {
    match outcome {
        ServiceOutcome::Ready => "ready",
        ServiceOutcome::Failed(_) => "failed",
        ServiceOutcome::Skipped { .. } => "skipped",
    }
}

fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct ServiceEvent<'a> {
    event: &'a str,
    service: &'a str,
    container: &'a str,
    state: &'a str,
    outcome: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    evidence: Vec<String>,
}

#[derive(Serialize)]
struct TeardownEvent<'a> {
    event: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct StatusEvent<'a> {
    event: &'a str,
    service: &'a str,
    container: &'a str,
    state: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
}

#[derive(Serialize)]
struct OrderEvent<'a> {
    event: &'a str,
    position: usize,
    service: &'a str,
    depends_on: Vec<&'a str>,
}
