// TCP port health check implementation

use crate::{HealthCheckError, HealthCheckResult};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Try to open a TCP connection to `host:port` within `check_timeout`.
///
/// Returns the time the connection took. The connection is closed right
/// away; nothing is sent over it.
pub async fn check_tcp_port(
    id: &str,
    host: &str,
    port: u16,
    check_timeout: Duration,
) -> HealthCheckResult<Duration> {
    let start = Instant::now();

    match timeout(check_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            let elapsed = start.elapsed();
            debug!("Port check passed for {} ({}:{}) in {:?}", id, host, port, elapsed);
            Ok(elapsed)
        }
        Ok(Err(e)) => {
            debug!("Port check failed for {} ({}:{}): {}", id, host, port, e);
            Err(HealthCheckError::ConnectionFailed {
                id: id.to_string(),
                port,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            debug!("Port check timed out for {} ({}:{})", id, host, port);
            Err(HealthCheckError::Timeout {
                id: id.to_string(),
                port,
                timeout_ms: check_timeout.as_millis() as u64,
            })
        }
    }
}
