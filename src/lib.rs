// ABOUTME: Library root for devstack - the orchestration engine and its engine access.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod error;
pub mod runtime;
pub mod stack;
pub mod types;
