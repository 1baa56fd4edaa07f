//! # MCP Monitoring
//!
//! Health probing for supervised tool servers.
//!
//! This crate provides:
//! - A bounded-timeout TCP port check
//! - `HealthProbe`, which combines the port check with a process liveness
//!   check on anything implementing [`Probeable`]
//! - [`Health`], the three-way probe verdict

pub mod probe;
pub mod tcp;

use mcp_common::ProcessError;
use std::fmt;
use thiserror::Error;

/// Health check error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckError {
    #[error("Health check timeout: {id} - port {port} did not answer within {timeout_ms}ms")]
    Timeout { id: String, port: u16, timeout_ms: u64 },

    #[error("Health check connection failed: {id} - port {port}: {reason}")]
    ConnectionFailed { id: String, port: u16, reason: String },
}

/// Result type for health check operations.
pub type HealthCheckResult<T> = Result<T, HealthCheckError>;

impl HealthCheckError {
    pub fn port(&self) -> u16 {
        match self {
            Self::Timeout { port, .. } | Self::ConnectionFailed { port, .. } => *port,
        }
    }

    /// Express the failure as a startup probe timeout over `window_ms`.
    pub fn into_probe_timeout(self, window_ms: u64) -> ProcessError {
        match self {
            Self::Timeout { id, port, .. } | Self::ConnectionFailed { id, port, .. } => {
                ProcessError::probe_timeout(id, port, window_ms)
            }
        }
    }
}

/// Verdict of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    /// Process alive and its port accepted a connection
    Healthy,
    /// Process alive (as far as we know) but the port did not answer
    Unreachable(HealthCheckError),
    /// The process behind the target has already exited
    ProcessExited,
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "up"),
            Health::Unreachable(HealthCheckError::Timeout { .. }) => {
                write!(f, "down (port not answering)")
            }
            Health::Unreachable(HealthCheckError::ConnectionFailed { .. }) => {
                write!(f, "down (port closed)")
            }
            Health::ProcessExited => write!(f, "down (process exited)"),
        }
    }
}

/// Something a [`probe::HealthProbe`] can check: a port plus a process
/// whose liveness can be queried without blocking.
pub trait Probeable {
    fn probe_id(&self) -> &str;

    fn probe_port(&self) -> u16;

    /// Non-blocking check whether the backing process has exited.
    fn has_exited(&mut self) -> bool;
}

// Re-export main types
pub use probe::*;
pub use tcp::*;
