// ABOUTME: Custom serde deserializers for stack file types.
// ABOUTME: Validated names and prefixes, image refs, and order-preserving env maps.

use super::EnvValue;
use crate::types::{ImageRef, StackPrefix};
use serde::Deserialize;
use serde::de::{MapAccess, Visitor};
use std::fmt;

pub fn deserialize_stack_prefix<'de, D>(deserializer: D) -> Result<StackPrefix, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    StackPrefix::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(serde::de::Error::custom)
}

/// Environment mapping in the order the file lists it.
pub fn deserialize_env<'de, D>(deserializer: D) -> Result<Vec<(String, EnvValue)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct EnvVisitor;

    impl<'de> Visitor<'de> for EnvVisitor {
        type Value = Vec<(String, EnvValue)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of environment variable names to values")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries: Vec<(String, EnvValue)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, EnvValue>()? {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(EnvVisitor)
}
