// ABOUTME: Naming namespace shared by every resource of one stack.
// ABOUTME: Derives the stable container and network names used to find prior runs.

use super::ServiceName;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackPrefixError {
    #[error("stack prefix cannot be empty")]
    Empty,

    #[error("stack prefix exceeds maximum length of 40 characters")]
    TooLong,

    #[error("stack prefix must start with a letter or digit")]
    BadStart,

    #[error("invalid character in stack prefix: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackPrefix(String);

impl StackPrefix {
    pub fn new(value: &str) -> Result<Self, StackPrefixError> {
        let value = value.trim();
        let first = value.chars().next().ok_or(StackPrefixError::Empty)?;
        if value.len() > 40 {
            return Err(StackPrefixError::TooLong);
        }
        if !first.is_ascii_alphanumeric() {
            return Err(StackPrefixError::BadStart);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.'))
        {
            return Err(StackPrefixError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<prefix>-<service>`
    pub fn container_name(&self, service: &ServiceName) -> String {
        format!("{}-{}", self.0, service)
    }

    /// `<prefix>-<network>`; the default stack network is `<prefix>-network`.
    pub fn network_name(&self, network: &str) -> String {
        format!("{}-{}", self.0, network)
    }
}

impl fmt::Display for StackPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
