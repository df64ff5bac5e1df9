//! Post-hook subscriber
//!
//! Runs an operator-supplied shell command after every issued certificate,
//! e.g. to reload a web server. Output is forwarded to the log line by line.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use origin_cert_common::ObserverBus;

use crate::errors::HookError;
use crate::types::{AgentEvent, CertKeyPair};

/// Mailbox capacity of the hook subscriber
pub const HOOK_MAILBOX_CAPACITY: usize = 2;

/// Environment variable carrying the new certificate's identifier
pub const CERT_ID_ENV: &str = "ORIGIN_CERT_ID";

/// Shell command run after each issuance
#[derive(Debug, Clone)]
pub struct PostHook {
    command: String,
}

impl PostHook {
    /// Hook running `command` through the platform shell
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The configured command line
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Attach to `bus` and process events on a background task
    ///
    /// The task ends with `Ok(())` once every bus handle has been dropped, or
    /// with the first hook failure.
    pub fn spawn(self, bus: &ObserverBus<AgentEvent>) -> JoinHandle<Result<(), HookError>> {
        let (_, mut mailbox) = bus.subscribe(HOOK_MAILBOX_CAPACITY);
        info!(command = %self.command, "Post hook subscribed");

        tokio::spawn(async move {
            while let Some(event) = mailbox.recv().await {
                match event {
                    AgentEvent::CertificateIssued(pair) => self.execute(&pair).await?,
                    AgentEvent::CertificateRevoked { id, outcome } => {
                        debug!(cert_id = %id, outcome = ?outcome, "Post hook ignoring revocation");
                    }
                }
            }
            debug!("Event bus closed, post hook exiting");
            Ok(())
        })
    }

    /// Run the command once for `pair` and wait for it to finish
    pub async fn execute(&self, pair: &CertKeyPair) -> Result<(), HookError> {
        info!(cert_id = %pair.id(), command = %self.command, "Running post hook");

        let mut child = shell_command(&self.command)
            .env(CERT_ID_ENV, pair.id().as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HookError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, (), ()) = tokio::join!(
            child.wait(),
            forward_lines(stdout, "stdout"),
            forward_lines(stderr, "stderr"),
        );

        let status = status.map_err(|source| HookError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        if !status.success() {
            error!(
                cert_id = %pair.id(),
                command = %self.command,
                status = %status,
                "Post hook failed"
            );
            return Err(HookError::Failed {
                command: self.command.clone(),
                status: status.to_string(),
            });
        }

        info!(cert_id = %pair.id(), "Post hook completed");
        Ok(())
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

async fn forward_lines<R>(reader: Option<R>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if stream == "stderr" => warn!(stream, "{line}"),
            Ok(Some(line)) => info!(stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                warn!(stream, error = %e, "Failed to read post hook output");
                break;
            }
        }
    }
}
