//! Launch target validation.

use mcp_common::{ProcessError, ProcessResult};
use std::path::{Path, PathBuf};

/// Maximum length of a service id.
pub const MAX_SERVICE_ID_LEN: usize = 64;

/// Validate service ID format.
pub fn validate_service_id(id: &str) -> ProcessResult<()> {
    if id.is_empty() {
        return Err(ProcessError::configuration(
            "validation",
            "Service ID cannot be empty",
        ));
    }

    if id.len() > MAX_SERVICE_ID_LEN {
        return Err(ProcessError::configuration(
            id,
            format!("Service ID too long (max {} characters)", MAX_SERVICE_ID_LEN),
        ));
    }

    if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(ProcessError::configuration(
            id,
            "Service ID can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Resolve an executable to an absolute path.
///
/// Names containing a path separator are taken relative to `base_dir` and
/// must exist as files; bare names are looked up on `PATH`.
pub fn resolve_executable(id: &str, executable: &str, base_dir: &Path) -> ProcessResult<PathBuf> {
    if executable.is_empty() {
        return Err(ProcessError::configuration(id, "Executable path cannot be empty"));
    }

    let as_path = Path::new(executable);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        let candidate = base_dir.join(as_path);
        return if candidate.is_file() {
            Ok(candidate)
        } else {
            Err(ProcessError::configuration(
                id,
                format!("Executable not found: {}", candidate.display()),
            ))
        };
    }

    which::which(executable).map_err(|e| {
        ProcessError::configuration(id, format!("Executable '{}' not found on PATH: {}", executable, e))
    })
}

/// Resolve a script argument relative to `base_dir` and check it exists.
pub fn resolve_script(id: &str, script: &str, base_dir: &Path) -> ProcessResult<PathBuf> {
    let candidate = base_dir.join(script);
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(ProcessError::configuration(
            id,
            format!("Script file not found: {}", candidate.display()),
        ))
    }
}
