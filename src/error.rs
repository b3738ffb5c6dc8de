// ABOUTME: Application-wide error types for devstack.
// ABOUTME: Wraps configuration, engine, and orchestration failures for the CLI.

use crate::runtime::{ContainerError, RuntimeError};
use crate::stack::ConfigurationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0} (use --force to overwrite)")]
    AlreadyExists(PathBuf),

    #[error("no devstack.yml found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("engine error: {0}")]
    Engine(#[from] ContainerError),

    #[error("{failed} service(s) failed, {skipped} skipped")]
    StackFailed { failed: usize, skipped: usize },

    #[error("teardown finished with {0} error(s)")]
    TeardownFailed(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
