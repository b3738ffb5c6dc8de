// ABOUTME: DNS alias a container answers to on the stack network.
// ABOUTME: Dependents reach a service by its alias instead of the prefixed container name.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkAliasError {
    #[error("network alias cannot be empty")]
    Empty,

    #[error("invalid character in network alias: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkAlias(String);

impl NetworkAlias {
    pub fn new(value: &str) -> Result<Self, NetworkAliasError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(NetworkAliasError::Empty);
        }
        match value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.'))
        {
            Some(c) => Err(NetworkAliasError::InvalidChar(c)),
            None => Ok(Self(value.to_string())),
        }
    }

    /// For values already validated against a stricter character set.
    pub(super) fn from_validated(value: &str) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
