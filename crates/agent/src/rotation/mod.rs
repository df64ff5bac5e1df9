//! Certificate rotation engine
//!
//! A single task owns the certificate cache for its whole life. It issues a
//! certificate on start, then on every period tick issues a new one and
//! revokes the ones it superseded. On cancellation it revokes everything it
//! still holds and exits.
//!
//! ```text
//! Idle ─► Generating ─► Published ─► Waiting(period) ─┐
//!             ▲                           │           │
//!             └──── partial cleanup ◄─────┘ tick      │ cancel
//!                                                     ▼
//!                                    full cleanup ─► Terminated
//! ```
//!
//! Cache reads from other tasks go through [`RotationHandle`] as
//! request/response messages and are only answered while the engine is
//! waiting, so a reader never observes a rotation half done.

mod engine;
mod handle;

pub use engine::RotationEngine;
pub use handle::RotationHandle;

use std::time::Duration;

use origin_cert_config::{AgentConfig, Validity};

/// Rotation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Apex domain; certificates cover it and its wildcard
    pub domain: String,
    /// Time between issuances
    pub period: Duration,
    /// Requested certificate lifetime
    pub validity: Validity,
    /// Deadline for each authority call
    pub api_timeout: Duration,
}

impl EngineConfig {
    /// CSR subject (`*.{domain}`)
    pub fn subject(&self) -> String {
        format!("*.{}", self.domain)
    }

    /// Hostnames requested for each certificate, apex first
    pub fn hostnames(&self) -> Vec<String> {
        vec![self.domain.clone(), self.subject()]
    }
}

impl From<&AgentConfig> for EngineConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            period: config.rotation_period,
            validity: config.validity,
            api_timeout: config.api_timeout,
        }
    }
}
