//! # MCP Process File
//!
//! Run-time pid files for supervised services.
//!
//! While a supervisor runs, each launched service has a small JSON record
//! (`<id>.pid.json`) naming its pid and port. A separate `status` invocation
//! reads these records to probe the live processes. Records are removed once
//! a service is stopped; they are never used to re-attach to processes after
//! a supervisor restart.

use chrono::{DateTime, Utc};
use mcp_common::{ProcessError, ProcessResult, ServiceId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const PID_FILE_EXTENSION: &str = ".pid.json";

/// Process file data structure (persisted as JSON)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFile {
    pub service_id: ServiceId,
    pub pid: u32,
    pub port: u16,
    pub started_at: DateTime<Utc>,
}

impl ProcessFile {
    pub fn new(service_id: ServiceId, pid: u32, port: u16, started_at: DateTime<Utc>) -> Self {
        Self {
            service_id,
            pid,
            port,
            started_at,
        }
    }
}

/// Directory of process files, one per service.
#[derive(Debug, Clone)]
pub struct ProcessFileStore {
    dir: PathBuf,
}

impl ProcessFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the process file for `id`
    pub fn path_for(&self, id: &ServiceId) -> PathBuf {
        self.dir.join(format!("{}{}", id, PID_FILE_EXTENSION))
    }

    /// Save process file to disk (atomic write).
    pub async fn save(&self, file: &ProcessFile) -> ProcessResult<()> {
        let id = file.service_id.as_str();

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ProcessError::configuration(
                id,
                format!("Failed to create directory {}: {}", self.dir.display(), e),
            )
        })?;

        let json = serde_json::to_string_pretty(file).map_err(|e| {
            ProcessError::configuration(id, format!("Failed to serialize process file: {}", e))
        })?;

        let path = self.path_for(&file.service_id);
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, json).await.map_err(|e| {
            ProcessError::configuration(id, format!("Failed to write process file: {}", e))
        })?;

        tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
            ProcessError::configuration(id, format!("Failed to rename process file: {}", e))
        })?;

        debug!("Wrote process file {}", path.display());
        Ok(())
    }

    /// Load the process file for `id`, `None` when there is none.
    pub async fn load(&self, id: &ServiceId) -> ProcessResult<Option<ProcessFile>> {
        let path = self.path_for(id);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ProcessError::configuration(
                    id.as_str(),
                    format!("Failed to read process file {}: {}", path.display(), e),
                ))
            }
        };

        let file: ProcessFile = serde_json::from_str(&content).map_err(|e| {
            ProcessError::configuration(
                id.as_str(),
                format!("Failed to parse process file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(file))
    }

    /// Delete the process file for `id`. Missing files are not an error.
    pub async fn remove(&self, id: &ServiceId) -> ProcessResult<()> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed process file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessError::configuration(
                id.as_str(),
                format!("Failed to delete process file {}: {}", path.display(), e),
            )),
        }
    }
}
