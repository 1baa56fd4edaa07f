//! Service registry: the fixed, ordered set of services a supervisor owns.

use crate::config::ServiceConfig;
use mcp_common::{ProcessError, ProcessResult, ServiceId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a service is started, before path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub executable: String,
    /// Relative to the project root; becomes the first argument
    pub script: Option<String>,
    pub args: Vec<String>,
}

/// A launch command with every path resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn resolve(&self, id: &str, project_root: &Path) -> ProcessResult<ResolvedCommand> {
        let executable = mcp_process::resolve_executable(id, &self.executable, project_root)?;

        let mut args = Vec::with_capacity(self.args.len() + 1);
        if let Some(ref script) = self.script {
            let script = mcp_process::resolve_script(id, script, project_root)?;
            args.push(script.to_string_lossy().into_owned());
        }
        args.extend(self.args.iter().cloned());

        Ok(ResolvedCommand { executable, args })
    }
}

/// Static description of one supervised service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub id: ServiceId,
    pub display_name: String,
    pub command: LaunchCommand,
    pub port: u16,
    /// Variable through which the child learns its port
    pub port_env: Option<String>,
}

impl From<&ServiceConfig> for ServiceSpec {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            id: ServiceId::new(config.id.clone()),
            display_name: config.display_name().to_string(),
            command: LaunchCommand {
                executable: config.executable.clone(),
                script: config.script.clone(),
                args: config.args.clone(),
            },
            port: config.port,
            port_env: config.port_env.clone(),
        }
    }
}

/// Ordered list of launchable services. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    specs: Vec<Arc<ServiceSpec>>,
}

/// Outcome of loading a registry.
#[derive(Debug)]
pub struct RegistryLoad {
    pub registry: ServiceRegistry,
    /// Services left out because their launch target does not exist
    pub rejected: Vec<ProcessError>,
}

impl ServiceRegistry {
    /// Build the registry from candidate specs, in order.
    ///
    /// A duplicate id or port fails the whole load. A candidate whose
    /// executable or script cannot be found is left out and reported in
    /// [`RegistryLoad::rejected`]; the rest still load.
    pub fn load<I>(candidates: I, project_root: &Path) -> ProcessResult<RegistryLoad>
    where
        I: IntoIterator<Item = ServiceSpec>,
    {
        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        let mut specs = Vec::new();
        let mut rejected = Vec::new();

        for spec in candidates {
            mcp_process::validate_service_id(spec.id.as_str())?;

            if !ids.insert(spec.id.clone()) {
                return Err(ProcessError::configuration(spec.id.as_str(), "Duplicate service ID"));
            }
            if spec.port == 0 {
                return Err(ProcessError::configuration(spec.id.as_str(), "Port must be non-zero"));
            }
            if !ports.insert(spec.port) {
                return Err(ProcessError::configuration(
                    spec.id.as_str(),
                    format!("Port {} is already assigned to another service", spec.port),
                ));
            }

            if let Err(e) = spec.command.resolve(spec.id.as_str(), project_root) {
                warn!("Skipping service {}: {}", spec.id, e);
                rejected.push(e);
                continue;
            }

            debug!("Registered service {} on port {}", spec.id, spec.port);
            specs.push(Arc::new(spec));
        }

        Ok(RegistryLoad {
            registry: Self { specs },
            rejected,
        })
    }

    pub fn specs(&self) -> &[Arc<ServiceSpec>] {
        &self.specs
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ServiceSpec>> {
        self.specs.iter().find(|s| s.id.as_str() == id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
