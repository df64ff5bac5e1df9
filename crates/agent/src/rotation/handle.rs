//! Owner-side handle to a running rotation engine

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use origin_cert_common::CertificateId;

use crate::errors::{AgentError, EngineError};
use crate::types::CertKeyPair;

/// Cache reads answered by the engine task
pub(super) enum Request {
    CertKeyPair {
        offset: usize,
        reply: oneshot::Sender<Result<Arc<CertKeyPair>, EngineError>>,
    },
    CachedIds {
        reply: oneshot::Sender<Vec<CertificateId>>,
    },
}

/// Handle to a running [`RotationEngine`](super::RotationEngine)
///
/// Dropping the handle does not stop the engine; call
/// [`shutdown`](Self::shutdown) or cancel the token passed to `run`.
#[derive(Debug)]
pub struct RotationHandle {
    requests: mpsc::Sender<Request>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), AgentError>>>,
}

impl RotationHandle {
    pub(super) fn new(
        requests: mpsc::Sender<Request>,
        cancel: CancellationToken,
        task: JoinHandle<Result<(), AgentError>>,
    ) -> Self {
        Self {
            requests,
            cancel,
            task: Some(task),
        }
    }

    /// Cached pair at `offset` from the current one (0 = current)
    ///
    /// Answered by the engine task between rotations, so the result always
    /// reflects a settled cache. Once the engine has terminated every offset
    /// is out of range.
    pub async fn cert_key_pair(&self, offset: usize) -> Result<Arc<CertKeyPair>, EngineError> {
        let (reply, response) = oneshot::channel();
        let terminated = EngineError::NoMoreCredentials { offset, cached: 0 };

        if self
            .requests
            .send(Request::CertKeyPair { offset, reply })
            .await
            .is_err()
        {
            return Err(terminated);
        }
        response.await.unwrap_or(Err(terminated))
    }

    /// Identifiers of the cached certificates, newest first
    ///
    /// Empty once the engine has terminated.
    pub async fn cached_ids(&self) -> Vec<CertificateId> {
        let (reply, response) = oneshot::channel();
        if self
            .requests
            .send(Request::CachedIds { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Request cancellation; the engine revokes its cache and exits
    pub fn shutdown(&self) {
        debug!("Rotation shutdown requested");
        self.cancel.cancel();
    }

    /// Token that cancels the engine
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the engine task has finished
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the engine task to finish
    ///
    /// Returns the fatal error that stopped the engine, if any. Safe to use
    /// in `select!`: if the future is dropped early the task can still be
    /// joined later.
    pub async fn join(&mut self) -> Result<(), AgentError> {
        let Some(task) = self.task.as_mut() else {
            return Err(AgentError::Task("rotation task already joined".to_string()));
        };
        let joined = task.await;
        self.task = None;

        match joined {
            Ok(result) => result,
            Err(e) => Err(AgentError::Task(e.to_string())),
        }
    }

    /// Wait at most `limit` for the engine task to finish
    ///
    /// On timeout the task is aborted and [`AgentError::ShutdownTimeout`] is
    /// returned; revocations still in flight are abandoned.
    pub async fn join_with_timeout(&mut self, limit: Duration) -> Result<(), AgentError> {
        match tokio::time::timeout(limit, self.join()).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(task) = self.task.take() {
                    warn!(
                        timeout_secs = limit.as_secs(),
                        "Rotation task did not finish in time, aborting"
                    );
                    task.abort();
                }
                Err(AgentError::ShutdownTimeout(limit))
            }
        }
    }
}
