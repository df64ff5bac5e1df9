//! Rotation control loop

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use origin_cert_common::{CertificateId, ObserverBus};
use origin_cert_config::Validity;

use super::handle::{Request, RotationHandle};
use super::EngineConfig;
use crate::authority::{CertificateAuthority, CreateCertificate};
use crate::csr::{generate_off_thread, normalize_newlines, CsrGenerator};
use crate::errors::{AgentError, AuthorityError, EngineError};
use crate::sink::OutputSink;
use crate::types::{AgentEvent, CertKeyPair, RevokeOutcome};

/// Pending accessor requests allowed while the engine is busy rotating
const REQUEST_QUEUE_DEPTH: usize = 32;

/// Which cache entries a cleanup pass revokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanupScope {
    /// Everything except the current certificate
    Superseded,
    /// Everything
    All,
}

impl CleanupScope {
    fn keep(self, cached: usize) -> usize {
        match self {
            CleanupScope::Superseded => cached.min(1),
            CleanupScope::All => 0,
        }
    }
}

/// Certificate rotation engine
///
/// Construction performs no network I/O. Attach subscribers through
/// [`RotationEngine::bus`] before calling [`RotationEngine::run`] to observe
/// the first issuance.
pub struct RotationEngine {
    config: EngineConfig,
    authority: Arc<dyn CertificateAuthority>,
    sink: Arc<dyn OutputSink>,
    generator: Arc<dyn CsrGenerator>,
    bus: ObserverBus<AgentEvent>,
}

impl RotationEngine {
    /// Create an engine
    pub fn new(
        config: EngineConfig,
        authority: Arc<dyn CertificateAuthority>,
        sink: Arc<dyn OutputSink>,
        generator: Arc<dyn CsrGenerator>,
    ) -> Self {
        Self {
            config,
            authority,
            sink,
            generator,
            bus: ObserverBus::new(),
        }
    }

    /// Create an engine from a raw validity in days
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if `validity_days` is not an allowed
    /// validity. No network call is made either way.
    pub fn from_days(
        domain: impl Into<String>,
        period: Duration,
        validity_days: u32,
        api_timeout: Duration,
        authority: Arc<dyn CertificateAuthority>,
        sink: Arc<dyn OutputSink>,
        generator: Arc<dyn CsrGenerator>,
    ) -> Result<Self, AgentError> {
        let validity = Validity::try_from(validity_days)?;
        let config = EngineConfig {
            domain: domain.into(),
            period,
            validity,
            api_timeout,
        };
        Ok(Self::new(config, authority, sink, generator))
    }

    /// Rotation parameters
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Event bus the engine publishes to
    pub fn bus(&self) -> &ObserverBus<AgentEvent> {
        &self.bus
    }

    /// Start the control loop on its own task
    ///
    /// The loop runs until `cancel` fires or a fatal error occurs.
    pub fn run(self, cancel: CancellationToken) -> RotationHandle {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);

        let control = ControlLoop {
            config: self.config,
            authority: self.authority,
            sink: self.sink,
            generator: self.generator,
            bus: self.bus,
            cache: Vec::new(),
            requests: requests_rx,
        };
        let task = tokio::spawn(control.run(cancel.clone()));

        RotationHandle::new(requests_tx, cancel, task)
    }
}

impl std::fmt::Debug for RotationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationEngine")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

/// State owned by the engine task
struct ControlLoop {
    config: EngineConfig,
    authority: Arc<dyn CertificateAuthority>,
    sink: Arc<dyn OutputSink>,
    generator: Arc<dyn CsrGenerator>,
    bus: ObserverBus<AgentEvent>,
    /// Newest first; index 0 is the live certificate
    cache: Vec<Arc<CertKeyPair>>,
    requests: mpsc::Receiver<Request>,
}

impl ControlLoop {
    async fn run(mut self, cancel: CancellationToken) -> Result<(), AgentError> {
        info!(
            domain = %self.config.domain,
            period_secs = self.config.period.as_secs(),
            validity_days = self.config.validity.days(),
            "Starting certificate rotation"
        );

        if let Err(e) = self.generate().await {
            return self.fail(e).await;
        }

        while self.wait(&cancel).await {
            debug!("Rotation period elapsed");
            if let Err(e) = self.generate().await {
                return self.fail(e).await;
            }
            self.cleanup(CleanupScope::Superseded).await;
        }

        info!(cached = self.cache.len(), "Rotation cancelled, revoking cached certificates");
        self.cleanup(CleanupScope::All).await;
        info!("Certificate rotation stopped");
        Ok(())
    }

    /// Serve accessor requests until the period elapses (`true`) or
    /// cancellation fires (`false`)
    async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        // Saturates to the far future instead of overflowing on huge periods
        let tick = sleep(self.config.period);
        tokio::pin!(tick);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = &mut tick => return true,
                Some(request) = self.requests.recv() => self.serve(request),
            }
        }
    }

    fn serve(&self, request: Request) {
        match request {
            Request::CertKeyPair { offset, reply } => {
                let result = self.cache.get(offset).cloned().ok_or(
                    EngineError::NoMoreCredentials {
                        offset,
                        cached: self.cache.len(),
                    },
                );
                let _ = reply.send(result);
            }
            Request::CachedIds { reply } => {
                let _ = reply.send(self.cached_ids());
            }
        }
    }

    fn cached_ids(&self) -> Vec<CertificateId> {
        self.cache.iter().map(|pair| pair.id().clone()).collect()
    }

    /// Issue a new certificate, make it current, persist it and publish it
    async fn generate(&mut self) -> Result<(), AgentError> {
        let started = Instant::now();
        let hostnames = self.config.hostnames();

        let generated = generate_off_thread(
            Arc::clone(&self.generator),
            self.config.subject(),
            hostnames.clone(),
        )
        .await?;

        let request = CreateCertificate {
            hostnames,
            validity: self.config.validity,
            csr_pem: normalize_newlines(&generated.csr_pem),
        };

        let api_timeout = self.config.api_timeout;
        let issued = match timeout(api_timeout, self.authority.create(&request)).await {
            Ok(Ok(issued)) => issued,
            Ok(Err(e)) => return Err(AgentError::Create(e)),
            Err(_) => return Err(AgentError::CreateTimeout(api_timeout)),
        };

        let pair = Arc::new(CertKeyPair::new(
            issued.id,
            issued.certificate_pem,
            generated.private_key_pem,
        ));
        self.cache.insert(0, Arc::clone(&pair));

        info!(
            cert_id = %pair.id(),
            cached = self.cache.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Issued origin certificate"
        );

        match self.sink.write(&pair).await {
            Ok(outcome) => debug!(cert_id = %pair.id(), outcome = ?outcome, "Output sink updated"),
            Err(e) => warn!(cert_id = %pair.id(), error = %e, "Failed to persist certificate"),
        }

        let delivered = self.bus.notify(AgentEvent::CertificateIssued(pair)).await;
        debug!(subscribers = delivered, "Published certificate");
        Ok(())
    }

    /// Revoke entries in parallel, wait for every attempt, then trim the cache
    async fn cleanup(&mut self, scope: CleanupScope) {
        let keep = scope.keep(self.cache.len());
        let stale: Vec<CertificateId> = self.cache[keep..]
            .iter()
            .map(|pair| pair.id().clone())
            .collect();

        if stale.is_empty() {
            debug!(scope = ?scope, "Nothing to revoke");
            return;
        }

        debug!(scope = ?scope, count = stale.len(), "Revoking certificates");
        let authority = &self.authority;
        let api_timeout = self.config.api_timeout;
        let attempts = stale.into_iter().map(|id| async move {
            let outcome = match timeout(api_timeout, authority.revoke(&id)).await {
                Ok(Ok(())) => {
                    info!(cert_id = %id, "Revoked certificate");
                    RevokeOutcome::Revoked
                }
                Ok(Err(e)) => {
                    warn!(cert_id = %id, error = %e, "Failed to revoke certificate");
                    RevokeOutcome::Failed(e.to_string())
                }
                Err(_) => {
                    let e = AuthorityError::Timeout(api_timeout);
                    warn!(cert_id = %id, error = %e, "Failed to revoke certificate");
                    RevokeOutcome::Failed(e.to_string())
                }
            };
            (id, outcome)
        });
        let results = join_all(attempts).await;

        self.cache.truncate(keep);
        debug!(cached = self.cache.len(), "Cleanup complete");

        for (id, outcome) in results {
            self.bus
                .notify(AgentEvent::CertificateRevoked { id, outcome })
                .await;
        }
    }

    /// Revoke whatever is cached and return the fatal error
    async fn fail(mut self, e: AgentError) -> Result<(), AgentError> {
        error!(error = %e, cached = self.cache.len(), "Certificate rotation failed");
        self.cleanup(CleanupScope::All).await;
        Err(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_scope_keep() {
        assert_eq!(CleanupScope::Superseded.keep(0), 0);
        assert_eq!(CleanupScope::Superseded.keep(1), 1);
        assert_eq!(CleanupScope::Superseded.keep(3), 1);
        assert_eq!(CleanupScope::All.keep(3), 0);
    }
}
