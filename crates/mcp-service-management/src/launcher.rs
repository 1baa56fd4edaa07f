use crate::handle::ServiceHandle;
use crate::registry::ServiceSpec;
use mcp_common::{ProcessError, ProcessResult};
use mcp_process::{execute_detached, prepend_search_path, ExecutionConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Starts service processes from their specs.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    project_root: PathBuf,
    search_path_var: String,
}

impl ProcessLauncher {
    pub fn new(project_root: impl Into<PathBuf>, search_path_var: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            search_path_var: search_path_var.into(),
        }
    }

    /// Build the execution config for `spec`.
    ///
    /// The child runs in the project root, sees the root at the front of the
    /// search-path variable, and gets its port through `port_env`.
    pub fn execution_config(&self, spec: &ServiceSpec) -> ProcessResult<ExecutionConfig> {
        let command = spec.command.resolve(spec.id.as_str(), &self.project_root)?;

        let search_path = prepend_search_path(
            &self.project_root,
            std::env::var_os(&self.search_path_var),
        )
        .map_err(|e| ProcessError::configuration(spec.id.as_str(), e.to_string()))?;

        let mut execution = ExecutionConfig::new(command.executable)
            .with_args(command.args)
            .with_working_directory(&self.project_root)
            .with_env(self.search_path_var.clone(), search_path);

        if let Some(ref var) = spec.port_env {
            execution = execution.with_env(var.clone(), spec.port.to_string());
        }

        Ok(execution)
    }

    /// Spawn the service and return its handle in the `Starting` state.
    pub fn launch(&self, spec: Arc<ServiceSpec>) -> ProcessResult<ServiceHandle> {
        let execution = self.execution_config(&spec)?;
        let mut child = execute_detached(spec.id.as_str(), &execution)?;

        let Some(pid) = child.id() else {
            // reaped before we could read its pid
            let _ = child.start_kill();
            return Err(ProcessError::spawn_failed(
                spec.id.as_str(),
                "process exited before its pid could be read",
            ));
        };

        info!("Launched {} (PID {}) on port {}", spec.id, pid, spec.port);
        Ok(ServiceHandle::new(spec, pid, child))
    }
}
