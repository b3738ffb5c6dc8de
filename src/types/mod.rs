// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Service names, stack prefixes, image references, aliases, and phantom-typed IDs.

mod id;
mod image_ref;
mod network_alias;
mod service_name;
mod stack_prefix;

pub use id::{ContainerId, NetworkId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use network_alias::{NetworkAlias, NetworkAliasError};
pub use service_name::{ServiceName, ServiceNameError};
pub use stack_prefix::{StackPrefix, StackPrefixError};
