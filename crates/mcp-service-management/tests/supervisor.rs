//! Supervisor scenarios against real child processes.
#![cfg(unix)]

use mcp_common::ServiceId;
use mcp_monitoring::Health;
use mcp_service_management::{
    ExitReason, LaunchCommand, ProcessError, ServiceRegistry, ServiceSpec, ServiceState, StopOutcome,
    Supervisor, SupervisorSettings,
};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const SLEEPER: &str = "exec sleep 30";
const SEARCH_PATH_VAR: &str = "MCP_SUPERVISOR_TEST_SEARCH_PATH";

fn settings(root: &Path) -> SupervisorSettings {
    SupervisorSettings {
        project_root: root.to_path_buf(),
        log_dir: root.join("logs"),
        run_dir: root.join("logs").join("run"),
        search_path_var: SEARCH_PATH_VAR.to_string(),
        poll_interval: Duration::from_millis(50),
        startup_delay: Duration::ZERO,
        probe_grace: Duration::from_millis(10),
        probe_timeout: Duration::from_millis(500),
        probe_host: "127.0.0.1".to_string(),
        graceful_timeout: Duration::from_secs(2),
        force_kill_timeout: Duration::from_secs(2),
    }
}

fn sh_service(id: &str, port: u16, script: &str) -> ServiceSpec {
    ServiceSpec {
        id: ServiceId::from(id),
        display_name: id.to_string(),
        command: LaunchCommand {
            executable: "/bin/sh".to_string(),
            script: None,
            args: vec!["-c".to_string(), script.to_string()],
        },
        port,
        port_env: None,
    }
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn unused_port() -> u16 {
    listener().await.1
}

fn supervisor(root: &TempDir, specs: Vec<ServiceSpec>, settings: SupervisorSettings) -> Supervisor {
    let load = ServiceRegistry::load(specs, root.path()).unwrap();
    assert!(load.rejected.is_empty(), "unexpected rejects: {:?}", load.rejected);
    Supervisor::new(load.registry, settings)
}

fn is_alive(pid: u32) -> bool {
    mcp_process::process_exists(pid).unwrap()
}

#[tokio::test]
async fn test_launch_and_probe_healthy() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let (_b, port_b) = listener().await;
    let mut sup = supervisor(
        &root,
        vec![sh_service("a", port_a, SLEEPER), sh_service("b", port_b, SLEEPER)],
        settings(root.path()),
    );
    let token = CancellationToken::new();

    let startup = sup.start(&token).await.unwrap();
    assert_eq!(startup.launched.len(), 2);
    assert!(startup.failed.is_empty());
    assert!(!startup.interrupted);
    assert!(startup.health.iter().all(|(_, h)| *h == Health::Healthy));

    for handle in sup.handles() {
        assert!(is_alive(handle.pid()));
        assert_eq!(handle.state(), ServiceState::Running);
    }
    assert!(root.path().join("logs").is_dir());
    assert!(root.path().join("logs/run/a.pid.json").is_file());

    let report = sup.shutdown().await;
    assert_eq!(report.get("a"), Some(&StopOutcome::GracefulStop));
    assert_eq!(report.get("b"), Some(&StopOutcome::GracefulStop));
    assert!(!root.path().join("logs/run/a.pid.json").exists());
}

#[tokio::test]
async fn test_crash_tears_down_the_group() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let (_b, port_b) = listener().await;
    let mut sup = supervisor(
        &root,
        vec![sh_service("a", port_a, SLEEPER), sh_service("b", port_b, SLEEPER)],
        settings(root.path()),
    );
    let token = CancellationToken::new();
    sup.start(&token).await.unwrap();

    let victim = sup.handle("a").unwrap().pid();
    let survivor = sup.handle("b").unwrap().pid();
    kill(Pid::from_raw(victim as i32), Signal::SIGKILL).unwrap();

    // two polling periods plus scheduling slack
    let reason = tokio::time::timeout(Duration::from_secs(2), sup.monitor(&token))
        .await
        .expect("crash should be detected");
    match reason {
        ExitReason::ServiceCrashed(ProcessError::UnexpectedExit { ref id, .. }) => assert_eq!(id, "a"),
        ref other => panic!("expected a crash of a, got {:?}", other),
    }
    assert_eq!(sup.handle("a").unwrap().state(), ServiceState::Crashed);

    let report = sup.shutdown().await;
    assert!(matches!(report.get("a"), Some(StopOutcome::Exited(_))));
    assert_eq!(report.get("b"), Some(&StopOutcome::GracefulStop));
    assert!(sup.handles().iter().all(|h| h.state() == ServiceState::Stopped));
    assert!(!is_alive(survivor));
    assert_eq!(reason.exit_code(&report), 1);
}

#[tokio::test]
async fn test_cancelled_token_gives_clean_exit() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let mut sup = supervisor(&root, vec![sh_service("a", port_a, SLEEPER)], settings(root.path()));
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let (reason, report) = tokio::time::timeout(Duration::from_secs(5), sup.run(&token, &()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, ExitReason::ShutdownRequested);
    assert_eq!(report.get("a"), Some(&StopOutcome::GracefulStop));
    assert_eq!(reason.exit_code(&report), 0);
}

#[tokio::test]
async fn test_cancel_during_startup_delay() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let mut config = settings(root.path());
    config.startup_delay = Duration::from_secs(30);
    let mut sup = supervisor(&root, vec![sh_service("a", port_a, SLEEPER)], config);
    let token = CancellationToken::new();
    token.cancel();

    let (reason, report) = tokio::time::timeout(Duration::from_secs(5), sup.run(&token, &()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, ExitReason::ShutdownRequested);
    assert_eq!(report.len(), 1);
    assert_eq!(sup.handle("a").unwrap().state(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_term_ignoring_service_is_killed() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let mut config = settings(root.path());
    config.graceful_timeout = Duration::from_millis(300);
    // give the shell time to install the trap before it is signalled
    config.startup_delay = Duration::from_millis(300);
    let mut sup = supervisor(&root, vec![sh_service("stubborn", port_a, "trap '' TERM; exec sleep 30")], config);
    let token = CancellationToken::new();
    sup.start(&token).await.unwrap();
    let pid = sup.handle("stubborn").unwrap().pid();

    let report = sup.shutdown().await;
    assert_eq!(report.get("stubborn"), Some(&StopOutcome::ForcedStop));
    assert!(report.is_clean());
    assert!(!is_alive(pid));
}

#[tokio::test]
async fn test_second_shutdown_is_empty() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let (_b, port_b) = listener().await;
    let mut sup = supervisor(
        &root,
        vec![sh_service("a", port_a, SLEEPER), sh_service("b", port_b, SLEEPER)],
        settings(root.path()),
    );
    sup.start(&CancellationToken::new()).await.unwrap();

    let first = sup.shutdown().await;
    assert_eq!(first.len(), 2);

    let second = sup.shutdown().await;
    assert!(second.is_empty());
    assert!(sup.handles().iter().all(|h| h.state() == ServiceState::Stopped));
}

#[tokio::test]
async fn test_unreachable_port_marks_unhealthy_but_keeps_monitoring() {
    let root = tempfile::tempdir().unwrap();
    let port = unused_port().await;
    let mut sup = supervisor(&root, vec![sh_service("quiet", port, SLEEPER)], settings(root.path()));
    let token = CancellationToken::new();

    let startup = sup.start(&token).await.unwrap();
    assert!(matches!(startup.health[0].1, Health::Unreachable(ref e) if e.port() == port));

    let handle = sup.handle("quiet").unwrap();
    assert_eq!(handle.state(), ServiceState::Unhealthy);
    assert!(is_alive(handle.pid()));

    // still monitored: a crash now is detected
    kill(Pid::from_raw(handle.pid() as i32), Signal::SIGKILL).unwrap();
    let exit = tokio::time::timeout(Duration::from_secs(2), sup.monitor(&token))
        .await
        .unwrap();
    assert!(matches!(exit, ExitReason::ServiceCrashed(_)));
    sup.shutdown().await;
}

#[tokio::test]
async fn test_exit_during_startup_is_unhealthy_then_crashed() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let mut config = settings(root.path());
    config.startup_delay = Duration::from_millis(300);
    let mut sup = supervisor(&root, vec![sh_service("early", port_a, "exit 3")], config);
    let token = CancellationToken::new();

    let startup = sup.start(&token).await.unwrap();
    assert_eq!(startup.health[0].1, Health::ProcessExited);
    assert_eq!(sup.handle("early").unwrap().state(), ServiceState::Unhealthy);

    let exit = tokio::time::timeout(Duration::from_secs(2), sup.monitor(&token))
        .await
        .unwrap();
    match exit {
        ExitReason::ServiceCrashed(ProcessError::UnexpectedExit { status, .. }) => {
            assert!(status.contains('3'), "status was {}", status)
        }
        other => panic!("expected a crash, got {:?}", other),
    }
    assert_eq!(sup.handle("early").unwrap().state(), ServiceState::Crashed);

    let report = sup.shutdown().await;
    assert!(matches!(report.get("early"), Some(StopOutcome::Exited(_))));
}

#[tokio::test]
async fn test_missing_script_is_skipped() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let mut missing = sh_service("missing", unused_port().await, SLEEPER);
    missing.command.script = Some("agent_tools/not_there.py".to_string());

    let load = ServiceRegistry::load(vec![sh_service("a", port_a, SLEEPER), missing], root.path()).unwrap();
    assert_eq!(load.rejected.len(), 1);
    assert!(matches!(load.rejected[0], ProcessError::Configuration { ref id, .. } if id == "missing"));

    let mut sup = Supervisor::new(load.registry, settings(root.path()));
    let startup = sup.start(&CancellationToken::new()).await.unwrap();
    assert_eq!(startup.launched.len(), 1);
    assert_eq!(startup.launched[0].id.as_str(), "a");
    sup.shutdown().await;
}

#[tokio::test]
async fn test_spawn_failure_is_reported_and_skipped() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let binary = root.path().join("noexec.bin");
    std::fs::write(&binary, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();

    let mut bad = sh_service("bad", unused_port().await, SLEEPER);
    bad.command.executable = binary.display().to_string();
    bad.command.args.clear();
    let mut sup = supervisor(
        &root,
        vec![sh_service("a", port_a, SLEEPER), bad],
        settings(root.path()),
    );

    let startup = sup.start(&CancellationToken::new()).await.unwrap();
    assert_eq!(startup.failed.len(), 1);
    assert!(matches!(startup.failed[0], ProcessError::SpawnFailed { ref id, .. } if id == "bad"));
    let launched: Vec<&str> = startup.launched.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(launched, vec!["a"]);
    assert!(sup.handle("bad").is_none());
    assert!(!root.path().join("logs/run/bad.pid.json").exists());

    let report = sup.shutdown().await;
    assert_eq!(report.len(), 1);
    assert_eq!(report.get("a"), Some(&StopOutcome::GracefulStop));
}

#[tokio::test]
async fn test_child_sees_project_root_on_search_path() {
    let root = tempfile::tempdir().unwrap();
    let (_a, port_a) = listener().await;
    let script = format!("printf '%s' \"${}\" > search_path.txt; {}", SEARCH_PATH_VAR, SLEEPER);
    let mut sup = supervisor(&root, vec![sh_service("env", port_a, &script)], settings(root.path()));
    sup.start(&CancellationToken::new()).await.unwrap();

    let marker = root.path().join("search_path.txt");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !marker.exists() && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // allow the write to finish
    tokio::time::sleep(Duration::from_millis(50)).await;

    let value = std::fs::read_to_string(&marker).unwrap();
    let first = std::env::split_paths(&value).next().unwrap();
    assert_eq!(first, root.path());
    sup.shutdown().await;
}
