use super::*;
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Validate the complete configuration
pub fn validate_config(config: &SupervisorConfig) -> Result<()> {
    validate_supervisor_options(&config.supervisor)?;
    validate_service_configs(&config.services)?;
    Ok(())
}

fn validate_supervisor_options(options: &SupervisorOptions) -> Result<()> {
    let durations = [
        ("poll_interval", options.poll_interval),
        ("probe_timeout", options.probe_timeout),
        ("graceful_timeout", options.graceful_timeout),
    ];
    for (name, value) in durations {
        if value.is_zero() {
            return Err(anyhow!("{} must be greater than 0", name));
        }
    }

    if options.probe_host.trim().is_empty() {
        return Err(anyhow!("probe_host cannot be empty"));
    }

    if options.search_path_var.is_empty() || options.search_path_var.contains('=') {
        return Err(anyhow!("Invalid search_path_var: '{}'", options.search_path_var));
    }

    match options.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            options.log_level
        )),
    }
}

/// Ids and ports must be unique among the enabled services.
fn validate_service_configs(services: &[ServiceConfig]) -> Result<()> {
    let enabled: Vec<&ServiceConfig> = services.iter().filter(|s| s.enabled).collect();
    if enabled.is_empty() {
        return Err(anyhow!("At least one service must be enabled"));
    }

    let mut ids = HashSet::new();
    let mut ports = HashSet::new();
    for service in enabled {
        validate_service_config(service)?;

        if !ids.insert(service.id.as_str()) {
            return Err(anyhow!("Duplicate service ID: {}", service.id));
        }
        if !ports.insert(service.port) {
            return Err(anyhow!(
                "Port {} is assigned to more than one service (again by {})",
                service.port,
                service.id
            ));
        }
    }

    Ok(())
}

fn validate_service_config(service: &ServiceConfig) -> Result<()> {
    mcp_process::validate_service_id(&service.id).map_err(|e| anyhow!("{}", e))?;

    if service.port == 0 {
        return Err(anyhow!("Service {} must have a non-zero port", service.id));
    }

    if service.executable.trim().is_empty() {
        return Err(anyhow!("Service {} has an empty executable", service.id));
    }

    if let Some(ref var) = service.port_env {
        if var.is_empty() || var.contains('=') {
            return Err(anyhow!("Service {} has an invalid port_env: '{}'", service.id, var));
        }
    }

    Ok(())
}
