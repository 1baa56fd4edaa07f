//! Health probe - process liveness plus port reachability.

use crate::tcp::check_tcp_port;
use crate::{Health, Probeable};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default host every tool server listens on.
pub const DEFAULT_PROBE_HOST: &str = "localhost";

/// Probes one target at a time.
///
/// A probe never mutates the target beyond the liveness query; whatever the
/// verdict means for the service's state is up to the caller.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    host: String,
    /// Delay before the port check, giving the listener time to bind
    grace: Duration,
    /// Bound on the TCP connect
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(grace: Duration, timeout: Duration) -> Self {
        Self {
            host: DEFAULT_PROBE_HOST.to_string(),
            grace,
            timeout,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Full probe: exit check, grace sleep, exit check, port check.
    pub async fn check<T: Probeable + ?Sized>(&self, target: &mut T) -> Health {
        if target.has_exited() {
            info!("Probe skipped for {}: process already exited", target.probe_id());
            return Health::ProcessExited;
        }

        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
            if target.has_exited() {
                info!("{} exited during the probe grace period", target.probe_id());
                return Health::ProcessExited;
            }
        }

        self.probe_port(target.probe_id(), target.probe_port()).await
    }

    /// Probe without the grace sleep, for one-shot status queries.
    pub async fn check_now<T: Probeable + ?Sized>(&self, target: &mut T) -> Health {
        if target.has_exited() {
            return Health::ProcessExited;
        }
        self.probe_port(target.probe_id(), target.probe_port()).await
    }

    /// Port reachability only; says nothing about which process listens.
    pub async fn probe_port(&self, id: &str, port: u16) -> Health {
        match check_tcp_port(id, &self.host, port, self.timeout).await {
            Ok(elapsed) => {
                debug!("{} healthy on port {} ({:?})", id, port, elapsed);
                Health::Healthy
            }
            Err(e) => {
                warn!("❌ Health probe failed for {}: {}", id, e);
                Health::Unreachable(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HealthCheckError;
    use tokio::net::TcpListener;

    struct FakeTarget {
        port: u16,
        exited: bool,
        polls: usize,
    }

    impl Probeable for FakeTarget {
        fn probe_id(&self) -> &str {
            "fake"
        }

        fn probe_port(&self) -> u16 {
            self.port
        }

        fn has_exited(&mut self) -> bool {
            self.polls += 1;
            self.exited
        }
    }

    fn probe() -> HealthProbe {
        HealthProbe::new(Duration::from_millis(10), Duration::from_millis(500)).with_host("127.0.0.1")
    }

    #[tokio::test]
    async fn test_alive_and_listening_is_healthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut target = FakeTarget {
            port: listener.local_addr().unwrap().port(),
            exited: false,
            polls: 0,
        };

        assert_eq!(probe().check(&mut target).await, Health::Healthy);
        // checked before and after the grace sleep
        assert_eq!(target.polls, 2);
    }

    #[tokio::test]
    async fn test_exited_wins_over_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut target = FakeTarget {
            port: listener.local_addr().unwrap().port(),
            exited: true,
            polls: 0,
        };

        assert_eq!(probe().check(&mut target).await, Health::ProcessExited);
        assert_eq!(probe().check_now(&mut target).await, Health::ProcessExited);
    }

    #[tokio::test]
    async fn test_alive_but_closed_is_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut target = FakeTarget {
            port,
            exited: false,
            polls: 0,
        };

        match probe().check_now(&mut target).await {
            Health::Unreachable(HealthCheckError::ConnectionFailed { port: p, .. })
            | Health::Unreachable(HealthCheckError::Timeout { port: p, .. }) => assert_eq!(p, port),
            other => panic!("expected unreachable, got {:?}", other),
        }
    }
}
