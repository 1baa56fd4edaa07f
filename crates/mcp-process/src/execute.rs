//! Process execution primitives.
//!
//! Children are spawned detached from the supervisor's terminal: all three
//! standard streams go to the null device, and on Unix the child leads its
//! own process group so a terminal Ctrl-C reaches only the supervisor.

use mcp_common::{ProcessError, ProcessResult};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Everything needed to start one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub environment: BTreeMap<String, OsString>,
}

impl ExecutionConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_directory: None,
            environment: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// Spawn a detached child process without waiting for it.
///
/// The returned child is killed if it is dropped before being waited on, so
/// a supervisor that unwinds never leaves orphans behind.
pub fn execute_detached(id: &str, execution: &ExecutionConfig) -> ProcessResult<Child> {
    let mut cmd = Command::new(&execution.executable);
    cmd.args(&execution.args);

    if let Some(ref wd) = execution.working_directory {
        cmd.current_dir(wd);
    }

    for (key, value) in &execution.environment {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    debug!(
        "Spawning {}: {} {:?}",
        id,
        execution.executable.display(),
        execution.args
    );

    cmd.spawn()
        .map_err(|e| ProcessError::spawn_failed(id, format!("{}: {}", execution.executable.display(), e)))
}

/// Build a search-path value with `root` in front of `existing`.
///
/// An existing value is kept after the root, never replaced; an empty or
/// missing one yields just the root.
///
/// ```
/// use mcp_process::prepend_search_path;
/// use std::path::Path;
///
/// let value = prepend_search_path(Path::new("/srv/app"), None).unwrap();
/// assert_eq!(value, "/srv/app");
/// ```
pub fn prepend_search_path(root: &Path, existing: Option<OsString>) -> ProcessResult<OsString> {
    let mut paths = vec![root.to_path_buf()];
    if let Some(existing) = existing.filter(|v| !v.is_empty()) {
        paths.extend(std::env::split_paths(&existing));
    }

    std::env::join_paths(paths).map_err(|e| {
        ProcessError::configuration(root.display().to_string(), format!("invalid search path: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_keeps_existing_value() {
        let existing = std::env::join_paths(["/opt/lib", "/usr/lib/site"]).unwrap();
        let value = prepend_search_path(Path::new("/srv/app"), Some(existing)).unwrap();

        let parts: Vec<PathBuf> = std::env::split_paths(&value).collect();
        assert_eq!(
            parts,
            vec![
                PathBuf::from("/srv/app"),
                PathBuf::from("/opt/lib"),
                PathBuf::from("/usr/lib/site"),
            ]
        );
    }

    #[test]
    fn test_prepend_ignores_empty_value() {
        let value = prepend_search_path(Path::new("/srv/app"), Some(OsString::new())).unwrap();
        assert_eq!(value, OsString::from("/srv/app"));
    }

    #[tokio::test]
    async fn test_execute_missing_executable_is_spawn_failure() {
        let execution = ExecutionConfig::new("/definitely/not/here/tool-server");
        let err = execute_detached("ghost", &execution).unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { ref id, .. } if id == "ghost"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_passes_environment_and_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let execution = ExecutionConfig::new("/bin/sh")
            .with_args(["-c", "printf '%s' \"$TOOL_MARKER\" > marker.txt"])
            .with_working_directory(dir.path())
            .with_env("TOOL_MARKER", "hello");

        let mut child = execute_detached("env-check", &execution).unwrap();
        let status = child.wait().await.unwrap();
        assert!(status.success());

        let written = std::fs::read_to_string(dir.path().join("marker.txt")).unwrap();
        assert_eq!(written, "hello");
    }
}
