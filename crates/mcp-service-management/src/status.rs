//! One-shot status query over the services a running supervisor recorded.

use crate::registry::ServiceSpec;
use mcp_common::ServiceId;
use mcp_monitoring::{Health, HealthProbe, Probeable};
use mcp_process_file::{ProcessFile, ProcessFileStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A pid file record seen as a probe target.
#[derive(Debug, Clone)]
pub struct RecordedService {
    record: ProcessFile,
}

impl RecordedService {
    pub fn new(record: ProcessFile) -> Self {
        Self { record }
    }

    pub fn pid(&self) -> u32 {
        self.record.pid
    }
}

impl Probeable for RecordedService {
    fn probe_id(&self) -> &str {
        self.record.service_id.as_str()
    }

    fn probe_port(&self) -> u16 {
        self.record.port
    }

    fn has_exited(&mut self) -> bool {
        match mcp_process::process_exists(self.record.pid) {
            Ok(exists) => !exists,
            Err(e) => {
                // without a liveness check, let the port decide
                debug!("Liveness check unavailable for {}: {}", self.record.service_id, e);
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// No pid file: no supervisor launched it
    NotStarted,
    /// The pid file exists but could not be read
    Unknown(String),
    Probed(Health),
}

impl ServiceStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, ServiceStatus::Probed(health) if health.is_healthy())
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::NotStarted => write!(f, "down (not started)"),
            ServiceStatus::Unknown(reason) => write!(f, "unknown ({})", reason),
            ServiceStatus::Probed(health) => write!(f, "{}", health),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub id: ServiceId,
    pub display_name: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub status: ServiceStatus,
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<24} port {:<5} ", self.display_name, self.port)?;
        match self.pid {
            Some(pid) => write!(f, "pid {:<7} ", pid)?,
            None => write!(f, "pid {:<7} ", "-")?,
        }
        write!(f, "{}", self.status)
    }
}

/// Probe every service once, without the grace sleep and without spawning
/// anything. Services with no pid file are reported as not started.
pub async fn check_status(
    specs: &[Arc<ServiceSpec>],
    pid_files: &ProcessFileStore,
    probe: &HealthProbe,
) -> Vec<StatusEntry> {
    let mut entries = Vec::with_capacity(specs.len());

    for spec in specs {
        let (pid, port, status) = match pid_files.load(&spec.id).await {
            Ok(None) => (None, spec.port, ServiceStatus::NotStarted),
            Ok(Some(record)) => {
                // the recorded port is the one that process was given
                let port = record.port;
                let mut target = RecordedService::new(record);
                let health = probe.check_now(&mut target).await;
                (Some(target.pid()), port, ServiceStatus::Probed(health))
            }
            Err(e) => {
                warn!("{}", e);
                (None, spec.port, ServiceStatus::Unknown(e.to_string()))
            }
        };

        entries.push(StatusEntry {
            id: spec.id.clone(),
            display_name: spec.display_name.clone(),
            port,
            pid,
            status,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LaunchCommand;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn spec(id: &str, port: u16) -> Arc<ServiceSpec> {
        Arc::new(ServiceSpec {
            id: ServiceId::from(id),
            display_name: id.to_string(),
            command: LaunchCommand {
                executable: "python3".to_string(),
                script: None,
                args: Vec::new(),
            },
            port,
            port_env: None,
        })
    }

    fn probe() -> HealthProbe {
        HealthProbe::new(Duration::from_secs(5), Duration::from_millis(500)).with_host("127.0.0.1")
    }

    #[tokio::test]
    async fn test_no_pid_files_means_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessFileStore::new(dir.path());

        let entries = check_status(&[spec("trade", 8002), spec("news", 8006)], &store, &probe()).await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.status == ServiceStatus::NotStarted));
        let line = entries[0].to_string();
        assert!(line.starts_with("trade"));
        assert!(line.ends_with("down (not started)"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recorded_live_process_is_probed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessFileStore::new(dir.path());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // this test process stands in for the recorded service
        let record = ProcessFile::new(ServiceId::from("trade"), std::process::id(), port, Utc::now());
        store.save(&record).await.unwrap();

        let started = std::time::Instant::now();
        let entries = check_status(&[spec("trade", 8002)], &store, &probe()).await;
        assert!(started.elapsed() < Duration::from_secs(5), "status must not sleep the grace period");

        assert_eq!(entries[0].pid, Some(std::process::id()));
        assert_eq!(entries[0].port, port);
        assert!(entries[0].status.is_up());
    }

    #[tokio::test]
    async fn test_corrupt_pid_file_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessFileStore::new(dir.path());
        std::fs::write(store.path_for(&ServiceId::from("macro")), "{").unwrap();

        let entries = check_status(&[spec("macro", 8007)], &store, &probe()).await;
        assert!(matches!(entries[0].status, ServiceStatus::Unknown(_)));
    }
}
