//! # MCP Service Management
//!
//! Supervision of the MCP tool servers.
//!
//! This crate provides:
//! - Configuration loading (YAML or the built-in service table)
//! - `ServiceRegistry` and `ProcessLauncher`
//! - `Supervisor` - startup probe pass, monitor loop, and teardown
//! - `ShutdownCoordinator` with per-service stop outcomes
//! - `SignalBridge` for SIGINT/SIGTERM
//! - The stateless `status` query over recorded pid files

pub mod config;
pub mod handle;
pub mod launcher;
pub mod registry;
pub mod shutdown;
pub mod signals;
pub mod status;
pub mod supervisor;

// Re-export main types
pub use config::{builtin_services, ServiceConfig, SupervisorConfig, SupervisorOptions};
pub use handle::ServiceHandle;
pub use launcher::ProcessLauncher;
pub use registry::{LaunchCommand, RegistryLoad, ResolvedCommand, ServiceRegistry, ServiceSpec};
pub use shutdown::{ShutdownCoordinator, ShutdownReport, StopOutcome, FORCE_KILL_TIMEOUT};
pub use signals::SignalBridge;
pub use status::{check_status, RecordedService, ServiceStatus, StatusEntry};
pub use supervisor::{
    ExitReason, LaunchedService, RunObserver, StartupReport, Supervisor, SupervisorSettings,
};

pub use mcp_common::{ProcessError, ProcessResult, ServiceId};
pub use mcp_monitoring::{Health, HealthProbe};
pub use mcp_process_file::ProcessFileStore;
pub use mcp_service_state::ServiceState;
