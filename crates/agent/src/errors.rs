//! Agent error types.
//!
//! Errors are split along the fatal/best-effort line:
//!
//! - [`AgentError`] ends the rotation engine (and the agent).
//! - [`AuthorityError`] from `revoke`, [`SinkError`] and teardown I/O errors
//!   are logged by their callers and never abort rotation.

use std::time::Duration;
use thiserror::Error;

use origin_cert_config::ConfigError;

/// Fatal agent errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration rejected before any network activity
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Certificate authority client could not be constructed
    #[error("failed to construct certificate authority client: {0}")]
    AuthorityClient(#[source] AuthorityError),

    /// Key or CSR generation failed
    #[error("CSR generation failed: {0}")]
    Csr(#[from] CsrError),

    /// Certificate creation was rejected or failed in transport
    #[error("certificate creation failed: {0}")]
    Create(#[source] AuthorityError),

    /// Certificate creation did not complete within the API deadline
    #[error("certificate creation timed out after {0:?}")]
    CreateTimeout(Duration),

    /// Post-hook action failed
    #[error("post hook failed: {0}")]
    Hook(#[from] HookError),

    /// Rotation task panicked or was aborted
    #[error("rotation task failed: {0}")]
    Task(String),

    /// Final cleanup did not finish within the shutdown bound
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Errors from the rotation engine's accessor
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Requested offset is beyond the cached credentials
    #[error("no more credentials (offset {offset}, cached {cached})")]
    NoMoreCredentials { offset: usize, cached: usize },
}

/// Certificate authority client errors
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Missing or unusable credential
    #[error("invalid credential: {0}")]
    Credential(String),

    /// HTTP transport failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authority answered with an error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The authority's response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Call did not complete within the deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Key and CSR generation errors
#[derive(Debug, Error)]
pub enum CsrError {
    /// Key generation failed (entropy or arithmetic failure)
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Key encoding failed
    #[error("key encoding failed: {0}")]
    Encoding(String),

    /// CSR construction or signing failed
    #[error("CSR signing failed: {0}")]
    Signing(#[from] rcgen::Error),

    /// Blocking generation task did not complete
    #[error("generation task failed: {0}")]
    Task(String),
}

/// Output sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing the certificate file failed
    #[error("unable to write certificate file {path}: {source}")]
    Certificate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the private key file failed
    #[error("unable to write key file {path}: {source}")]
    Key {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Post-hook errors
#[derive(Debug, Error)]
pub enum HookError {
    /// Hook process could not be started or awaited
    #[error("failed to run post hook {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Hook process exited unsuccessfully
    #[error("post hook {command:?} exited with {status}")]
    Failed { command: String, status: String },
}
