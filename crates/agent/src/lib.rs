//! Origin Certificate Agent Library
//!
//! Keeps a Cloudflare origin certificate continuously valid for a domain.
//! The agent periodically issues a fresh certificate, persists the live
//! key/certificate pair and revokes the certificates it superseded.
//!
//! - **Rotation**: single-task engine that owns the certificate cache
//! - **Authority**: Origin CA API client behind the [`CertificateAuthority`] trait
//! - **CSR**: fresh RSA key and signing request per rotation
//! - **Sink**: owner-only PEM files, written once per certificate
//! - **Hook**: shell command run after each issuance
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use origin_cert_agent::{EngineConfig, FilesystemSink, OriginCaClient, RotationEngine, RsaCsrGenerator};
//! use tokio_util::sync::CancellationToken;
//!
//! let authority = Arc::new(OriginCaClient::new(key, api_url, api_timeout)?);
//! let sink = Arc::new(FilesystemSink::new("cert.pem", "key.pem"));
//! let engine = RotationEngine::new(config, authority, sink, Arc::new(RsaCsrGenerator::default()));
//!
//! let mut handle = engine.run(CancellationToken::new());
//! handle.shutdown();
//! handle.join().await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod authority;
pub mod csr;
pub mod errors;
pub mod hook;
pub mod rotation;
pub mod signals;
pub mod sink;
pub mod types;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Errors
pub use errors::{AgentError, AuthorityError, CsrError, EngineError, HookError, SinkError};

// Certificate material and events
pub use types::{AgentEvent, CertKeyPair, RevokeOutcome};

// Collaborators
pub use authority::{CertificateAuthority, CreateCertificate, IssuedCertificate, OriginCaClient};
pub use csr::{normalize_newlines, CsrGenerator, GeneratedCsr, RsaCsrGenerator};
pub use hook::PostHook;
pub use sink::{FilesystemSink, OutputSink, WriteOutcome};

// Rotation
pub use rotation::{EngineConfig, RotationEngine, RotationHandle};

// Shared building blocks
pub use origin_cert_common::{CertificateId, ObserverBus};
pub use origin_cert_config::{AgentConfig, Validity};
