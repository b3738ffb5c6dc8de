// ABOUTME: Config scaffolding for new stacks.
// ABOUTME: Writes a starter devstack.yml with a database and a cache.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::StackPrefix;

use super::CONFIG_FILENAME;

const FALLBACK_PREFIX: &str = "dev";

/// Write a starter stack file into `dir`. Returns the path written.
pub fn init_config(dir: &Path, prefix: Option<&str>, force: bool) -> Result<std::path::PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let prefix = match prefix {
        Some(p) => StackPrefix::new(p).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => default_prefix(dir)?,
    };

    std::fs::write(&config_path, generate_template_yaml(&prefix))?;
    Ok(config_path)
}

/// The directory name if it makes a valid prefix.
fn default_prefix(dir: &Path) -> Result<StackPrefix> {
    let from_dir = dir
        .canonicalize()
        .ok()
        .and_then(|d| d.file_name().map(|n| n.to_string_lossy().to_lowercase()))
        .and_then(|n| StackPrefix::new(&n).ok());
    match from_dir {
        Some(prefix) => Ok(prefix),
        None => StackPrefix::new(FALLBACK_PREFIX).map_err(|e| Error::InvalidConfig(e.to_string())),
    }
}

fn generate_template_yaml(prefix: &StackPrefix) -> String {
    format!(
        r#"prefix: {prefix}
# registry: registry.example.com
# port_policy: ephemeral
services:
  db:
    image: postgres:16
    env:
      POSTGRES_PASSWORD: {{ env: POSTGRES_PASSWORD, default: devstack }}
    ports:
      - label: sql
        container: 5432
    readiness:
      log:
        pattern: "database system is ready to accept connections"
        timeout: 60s
  cache:
    image: redis:7
    ports:
      - "6379"
    readiness:
      socket:
        interval: 500ms
        timeout: 30s
"#
    )
}
