//! # MCP Process
//!
//! Low-level process operations used by the supervisor.
//!
//! This crate provides primitives for:
//! - Spawning detached child processes with an augmented environment
//! - Process existence checks
//! - Graceful termination
//! - Launch target validation

pub mod check;
pub mod execute;
pub mod terminate;
pub mod validation;

// Re-export main types
pub use check::*;
pub use execute::*;
pub use terminate::*;
pub use validation::*;
