//! # MCP Common
//!
//! Common types shared across the supervisor crates.
//!
//! This crate provides the foundational pieces every other crate builds on:
//! the process error taxonomy and the service identifier type.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{ProcessError, ProcessResult};
pub use types::ServiceId;
