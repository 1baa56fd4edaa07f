//! Turns process signals into a shutdown request.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Listens for SIGINT/SIGTERM (Ctrl-C elsewhere) and cancels a token.
///
/// The listener only logs and cancels; all teardown happens on whoever
/// awaits the token. Further signals after the first are logged and ignored.
#[derive(Debug)]
pub struct SignalBridge {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SignalBridge {
    /// Register the handlers and start listening. Must run inside a tokio
    /// runtime.
    pub fn install() -> std::io::Result<Self> {
        Self::install_with(CancellationToken::new())
    }

    fn install_with(token: CancellationToken) -> std::io::Result<Self> {
        let task = spawn_listener(token.clone())?;
        Ok(Self { token, task })
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn request_shutdown(token: &CancellationToken, signal: &str) {
    if token.is_cancelled() {
        warn!("Received {} again, shutdown already in progress", signal);
    } else {
        info!("Received {}, shutting down", signal);
        token.cancel();
    }
}

#[cfg(unix)]
fn spawn_listener(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = sigint.recv() => "SIGINT",
                Some(()) = sigterm.recv() => "SIGTERM",
                else => break,
            };
            request_shutdown(&token, name);
        }
    }))
}

#[cfg(not(unix))]
fn spawn_listener(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            request_shutdown(&token, "Ctrl-C");
        }
    }))
}
