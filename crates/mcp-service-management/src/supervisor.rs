//! The supervisor: launch, initial probe pass, monitor loop, and teardown.

use crate::config::SupervisorOptions;
use crate::handle::ServiceHandle;
use crate::launcher::ProcessLauncher;
use crate::registry::ServiceRegistry;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport, FORCE_KILL_TIMEOUT};
use mcp_common::{ProcessError, ProcessResult, ServiceId};
use mcp_monitoring::{Health, HealthProbe};
use mcp_process_file::{ProcessFile, ProcessFileStore};
use mcp_service_state::ServiceState;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Resolved supervisor settings, with every path absolute.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub project_root: PathBuf,
    pub log_dir: PathBuf,
    pub run_dir: PathBuf,
    pub search_path_var: String,
    pub poll_interval: Duration,
    pub startup_delay: Duration,
    pub probe_grace: Duration,
    pub probe_timeout: Duration,
    pub probe_host: String,
    pub graceful_timeout: Duration,
    pub force_kill_timeout: Duration,
}

impl SupervisorSettings {
    pub fn from_options(options: &SupervisorOptions, project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            log_dir: options.log_dir(project_root),
            run_dir: options.run_dir(project_root),
            search_path_var: options.search_path_var.clone(),
            poll_interval: options.poll_interval,
            startup_delay: options.startup_delay,
            probe_grace: options.probe_grace,
            probe_timeout: options.probe_timeout,
            probe_host: options.probe_host.clone(),
            graceful_timeout: options.graceful_timeout,
            force_kill_timeout: FORCE_KILL_TIMEOUT,
        }
    }

    pub fn health_probe(&self) -> HealthProbe {
        HealthProbe::new(self.probe_grace, self.probe_timeout).with_host(self.probe_host.clone())
    }

    /// Where a service writes its own logs.
    pub fn service_log_dir(&self, id: &ServiceId) -> PathBuf {
        self.log_dir.join(format!("{}_tool", id))
    }
}

/// A service that was spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedService {
    pub id: ServiceId,
    pub display_name: String,
    pub pid: u32,
    pub port: u16,
}

/// What happened between the first launch and the start of monitoring.
#[derive(Debug, Default)]
pub struct StartupReport {
    pub launched: Vec<LaunchedService>,
    /// Spawn failures; those services are skipped
    pub failed: Vec<ProcessError>,
    /// Initial probe verdict per launched service, in launch order
    pub health: Vec<(ServiceId, Health)>,
    /// Shutdown was requested before startup finished
    pub interrupted: bool,
}

/// Why the monitor loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    ShutdownRequested,
    ServiceCrashed(ProcessError),
}

impl ExitReason {
    /// Process exit code for a run that ended this way.
    pub fn exit_code(&self, report: &ShutdownReport) -> u8 {
        match self {
            ExitReason::ShutdownRequested if report.is_clean() => 0,
            _ => 1,
        }
    }
}

/// Hooks into [`Supervisor::run`] between its phases.
pub trait RunObserver {
    /// Startup finished; monitoring begins unless it was interrupted.
    fn started(&self, _supervisor: &Supervisor, _startup: &StartupReport) {}

    /// The run is ending and shutdown is about to begin.
    fn stopping(&self, _reason: &ExitReason) {}

    fn stopped(&self, _supervisor: &Supervisor, _report: &ShutdownReport) {}
}

impl RunObserver for () {}

/// Owns every service handle for the duration of one run.
pub struct Supervisor {
    registry: ServiceRegistry,
    settings: SupervisorSettings,
    launcher: ProcessLauncher,
    probe: HealthProbe,
    coordinator: ShutdownCoordinator,
    pid_files: ProcessFileStore,
    handles: Vec<ServiceHandle>,
}

impl Supervisor {
    pub fn new(registry: ServiceRegistry, settings: SupervisorSettings) -> Self {
        let launcher = ProcessLauncher::new(&settings.project_root, settings.search_path_var.clone());
        let probe = settings.health_probe();
        let coordinator = ShutdownCoordinator::new(settings.graceful_timeout)
            .with_force_kill_timeout(settings.force_kill_timeout);
        let pid_files = ProcessFileStore::new(&settings.run_dir);

        Self {
            registry,
            settings,
            launcher,
            probe,
            coordinator,
            pid_files,
            handles: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn handles(&self) -> &[ServiceHandle] {
        &self.handles
    }

    pub fn handle(&self, id: &str) -> Option<&ServiceHandle> {
        self.handles.iter().find(|h| h.id().as_str() == id)
    }

    /// Launch every registered service, wait the settle delay, then probe
    /// each one once.
    ///
    /// Probe results only move handles to `Running` or `Unhealthy`; an
    /// unhealthy service is still monitored, so one that already exited is
    /// marked `Crashed` on the first monitor tick. A cancelled token cuts the
    /// delay and the probe pass short.
    pub async fn start(&mut self, token: &CancellationToken) -> ProcessResult<StartupReport> {
        let mut report = StartupReport::default();

        tokio::fs::create_dir_all(&self.settings.log_dir).await.map_err(|e| {
            ProcessError::configuration(
                "supervisor",
                format!("Failed to create log directory {}: {}", self.settings.log_dir.display(), e),
            )
        })?;

        info!("Starting {} service(s)", self.registry.len());
        for spec in self.registry.specs() {
            let handle = match self.launcher.launch(spec.clone()) {
                Ok(handle) => handle,
                Err(e) => {
                    error!("Failed to launch {}: {}", spec.id, e);
                    report.failed.push(e);
                    continue;
                }
            };

            let record = ProcessFile::new(spec.id.clone(), handle.pid(), spec.port, handle.started_at());
            if let Err(e) = self.pid_files.save(&record).await {
                warn!("Failed to write pid file for {}: {}", spec.id, e);
            }

            report.launched.push(LaunchedService {
                id: spec.id.clone(),
                display_name: spec.display_name.clone(),
                pid: handle.pid(),
                port: spec.port,
            });
            self.handles.push(handle);
        }

        if !self.settings.startup_delay.is_zero() {
            debug!("Waiting {:?} for services to settle", self.settings.startup_delay);
            tokio::select! {
                _ = token.cancelled() => {
                    report.interrupted = true;
                    return Ok(report);
                }
                _ = tokio::time::sleep(self.settings.startup_delay) => {}
            }
        }

        let window_ms = (self.settings.probe_grace + self.settings.probe_timeout).as_millis() as u64;
        for handle in self.handles.iter_mut() {
            let health = tokio::select! {
                _ = token.cancelled() => {
                    report.interrupted = true;
                    break;
                }
                health = self.probe.check(&mut *handle) => health,
            };

            match health {
                Health::Healthy => handle.transition(ServiceState::Running, "health probe succeeded"),
                Health::Unreachable(ref e) => {
                    let timeout = e.clone().into_probe_timeout(window_ms);
                    warn!(
                        "{} (see {})",
                        timeout,
                        self.settings.service_log_dir(handle.id()).display()
                    );
                    handle.transition(ServiceState::Unhealthy, timeout.to_string());
                }
                Health::ProcessExited => {
                    handle.transition(ServiceState::Unhealthy, "process exited during startup")
                }
            }
            report.health.push((handle.id().clone(), health));
        }

        Ok(report)
    }

    /// Poll every live handle until one exits or the token fires.
    ///
    /// The first observed exit marks that service `Crashed` and ends the
    /// loop; the caller then shuts the group down.
    pub async fn monitor(&mut self, token: &CancellationToken) -> ExitReason {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Monitoring {} service(s)", self.handles.len());
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Shutdown requested");
                    return ExitReason::ShutdownRequested;
                }
                _ = ticker.tick() => {}
            }

            if let Some(e) = self.poll_once() {
                return ExitReason::ServiceCrashed(e);
            }
        }
    }

    /// One non-blocking liveness pass. Returns the first crash found.
    fn poll_once(&mut self) -> Option<ProcessError> {
        for handle in self.handles.iter_mut() {
            if !handle.state().is_expected_running() {
                continue;
            }

            let crash = match handle.poll_exit() {
                Ok(None) => continue,
                Ok(Some(status)) => ProcessError::unexpected_exit(handle.id().as_str(), status.to_string()),
                Err(e) => e,
            };

            error!("❌ {}", crash);
            handle.transition(ServiceState::Crashed, crash.to_string());
            return Some(crash);
        }
        None
    }

    /// Stop every service that is not yet stopped and drop the pid files of
    /// those that reached `Stopped`. Safe to call more than once.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        info!("Shutting down services");
        let report = self.coordinator.shutdown_all(&mut self.handles).await;

        for handle in self.handles.iter().filter(|h| h.state() == ServiceState::Stopped) {
            if let Err(e) = self.pid_files.remove(handle.id()).await {
                warn!("Failed to delete pid file for {}: {}", handle.id(), e);
            }
        }

        if report.is_clean() {
            info!("All services stopped");
        } else {
            error!("Shutdown finished with {} error(s)", report.errors().count());
        }
        report
    }

    /// Start, monitor, and shut down. Returns why the run ended together with
    /// the shutdown report.
    pub async fn run<O>(
        &mut self,
        token: &CancellationToken,
        observer: &O,
    ) -> ProcessResult<(ExitReason, ShutdownReport)>
    where
        O: RunObserver + ?Sized,
    {
        let startup = self.start(token).await?;
        observer.started(self, &startup);

        let reason = if startup.interrupted {
            ExitReason::ShutdownRequested
        } else {
            self.monitor(token).await
        };
        observer.stopping(&reason);

        let report = self.shutdown().await;
        observer.stopped(self, &report);
        Ok((reason, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::StopOutcome;

    #[test]
    fn test_exit_code() {
        let clean = ShutdownReport::default();
        assert_eq!(ExitReason::ShutdownRequested.exit_code(&clean), 0);

        let crashed = ExitReason::ServiceCrashed(ProcessError::unexpected_exit("trade", "exit status: 1"));
        assert_eq!(crashed.exit_code(&clean), 1);
    }

    #[test]
    fn test_stop_error_fails_a_requested_shutdown() {
        let mut report = ShutdownReport::default();
        report.push(ServiceId::from("trade"), StopOutcome::GracefulStop);
        report.push(ServiceId::from("news"), StopOutcome::Error("kill failed: EPERM".to_string()));

        assert!(!report.is_clean());
        assert_eq!(report.errors().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["news"]);
        assert_eq!(ExitReason::ShutdownRequested.exit_code(&report), 1);
    }

    #[test]
    fn test_settings_paths() {
        let options = SupervisorOptions::default();
        let settings = SupervisorSettings::from_options(&options, Path::new("/srv/agent"));

        assert_eq!(settings.run_dir, PathBuf::from("/srv/agent/logs/run"));
        assert_eq!(
            settings.service_log_dir(&ServiceId::from("news")),
            PathBuf::from("/srv/agent/logs/news_tool")
        );
        assert_eq!(settings.force_kill_timeout, FORCE_KILL_TIMEOUT);
    }
}
