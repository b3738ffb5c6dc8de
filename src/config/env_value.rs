// ABOUTME: Environment variable values with interpolation from the invoking shell.
// ABOUTME: Literal values, or a variable reference with an optional default.

use crate::error::{Error, Result};
use crate::stack::ContainerEnvironment;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    Number(serde_yaml::Number),
    Bool(bool),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::Number(n) => Ok(n.to_string()),
            EnvValue::Bool(b) => Ok(b.to_string()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}

/// Resolve every entry, keeping declaration order.
pub fn resolve_env(entries: &[(String, EnvValue)]) -> Result<ContainerEnvironment> {
    entries
        .iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_applies_when_variable_is_unset() {
        temp_env::with_var_unset("DEVSTACK_TEST_UNSET", || {
            let value = EnvValue::FromEnv {
                var: "DEVSTACK_TEST_UNSET".into(),
                default: Some("fallback".into()),
            };
            assert_eq!(value.resolve().unwrap(), "fallback");
        });
    }

    #[test]
    fn missing_variable_without_default_is_an_error() {
        temp_env::with_var_unset("DEVSTACK_TEST_UNSET", || {
            let value = EnvValue::FromEnv {
                var: "DEVSTACK_TEST_UNSET".into(),
                default: None,
            };
            assert!(matches!(value.resolve(), Err(Error::MissingEnvVar(v)) if v == "DEVSTACK_TEST_UNSET"));
        });
    }

    #[test]
    fn variable_wins_over_default() {
        temp_env::with_var("DEVSTACK_TEST_SET", Some("from-shell"), || {
            let value = EnvValue::FromEnv {
                var: "DEVSTACK_TEST_SET".into(),
                default: Some("fallback".into()),
            };
            assert_eq!(value.resolve().unwrap(), "from-shell");
        });
    }
}
