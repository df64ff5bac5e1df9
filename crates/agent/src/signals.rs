//! Shutdown signal handling.
//!
//! Resolves once the process receives SIGINT or SIGTERM (Ctrl-C elsewhere).

use std::io;
use tracing::{debug, info};

/// Signal that triggered shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Wait for the next shutdown signal
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
#[cfg(unix)]
pub async fn shutdown_signal() -> io::Result<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    debug!("Installed SIGINT and SIGTERM handlers");

    let received = tokio::select! {
        _ = interrupt.recv() => ShutdownSignal::Interrupt,
        _ = terminate.recv() => ShutdownSignal::Terminate,
    };
    info!(signal = %received, "Received shutdown signal");
    Ok(received)
}

/// Wait for the next shutdown signal
///
/// # Errors
///
/// Returns an error if the Ctrl-C handler cannot be installed.
#[cfg(not(unix))]
pub async fn shutdown_signal() -> io::Result<ShutdownSignal> {
    debug!("Installed Ctrl-C handler");
    tokio::signal::ctrl_c().await?;
    info!(signal = %ShutdownSignal::Interrupt, "Received shutdown signal");
    Ok(ShutdownSignal::Interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }
}
