//! Configuration for the origin certificate agent
//!
//! The agent is configured entirely from command-line flags and their
//! environment-variable bindings; this crate holds the parsed, validated
//! form of that surface so the binary and tests share one definition.
//!
//! Validation runs before any network activity. A configuration that
//! fails validation rejects startup outright.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;
use validator::Validate;

pub mod duration;
pub mod errors;
pub mod validity;

pub use duration::parse_duration;
pub use errors::ConfigError;
pub use validity::Validity;

// ============================================================================
// Defaults
// ============================================================================

/// Default rotation period (one week)
pub const DEFAULT_ROTATION_PERIOD: Duration = Duration::from_secs(7 * 24 * 3600);

/// Longest accepted rotation period (ten years)
pub const MAX_ROTATION_PERIOD: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Default Origin CA API base URL
pub const DEFAULT_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// Default deadline for a single certificate authority call
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on the final cleanup pass at shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default certificate output path
pub const DEFAULT_CERT_OUT: &str = "./cert.pem";

/// Default private key output path
pub const DEFAULT_KEY_OUT: &str = "./key.pem";

// ============================================================================
// Agent configuration
// ============================================================================

/// Complete agent configuration
#[derive(Clone, Validate)]
pub struct AgentConfig {
    /// Origin CA service key
    #[validate(length(min = 1, message = "origin-api-key is a required parameter"))]
    pub api_key: String,

    /// Interval between certificate rotations
    pub rotation_period: Duration,

    /// Requested certificate lifetime
    pub validity: Validity,

    /// Domain the certificate covers (apex and wildcard)
    #[validate(length(min = 1, message = "domain is a required parameter"))]
    pub domain: String,

    /// Certificate output path
    pub cert_out: PathBuf,

    /// Private key output path
    pub key_out: PathBuf,

    /// Command run after each new certificate
    pub post_hook: Option<String>,

    /// Origin CA API base URL
    #[validate(url(message = "api-url must be an absolute URL"))]
    pub api_url: String,

    /// Deadline for a single certificate authority call
    pub api_timeout: Duration,

    /// Bound on the final cleanup pass at shutdown
    pub shutdown_timeout: Duration,
}

impl AgentConfig {
    /// Create a configuration with defaults for everything but the credential and domain
    pub fn new(api_key: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            rotation_period: DEFAULT_ROTATION_PERIOD,
            validity: Validity::default(),
            domain: domain.into(),
            cert_out: PathBuf::from(DEFAULT_CERT_OUT),
            key_out: PathBuf::from(DEFAULT_KEY_OUT),
            post_hook: None,
            api_url: DEFAULT_API_URL.to_string(),
            api_timeout: DEFAULT_API_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Validate field constraints and cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        Validate::validate(self)?;

        if self.rotation_period.is_zero() {
            return Err(ConfigError::Invalid(
                "rotation-frequency must be greater than zero".to_string(),
            ));
        }
        if self.rotation_period > MAX_ROTATION_PERIOD {
            return Err(ConfigError::Invalid(format!(
                "rotation-frequency must be at most {}h",
                MAX_ROTATION_PERIOD.as_secs() / 3600
            )));
        }
        if self.api_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "api-timeout must be greater than zero".to_string(),
            ));
        }
        if self.cert_out == self.key_out {
            return Err(ConfigError::Invalid(format!(
                "certout and keyout must differ (both are {})",
                self.cert_out.display()
            )));
        }
        if self.post_hook.as_deref().is_some_and(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "post-hook must not be blank when set".to_string(),
            ));
        }

        debug!(
            domain = %self.domain,
            validity_days = self.validity.days(),
            rotation_period_secs = self.rotation_period.as_secs(),
            "Configuration validated"
        );
        Ok(())
    }

    /// Certificate subject: the wildcard of the configured domain
    pub fn subject(&self) -> String {
        format!("*.{}", self.domain)
    }

    /// Hostnames requested on every certificate: apex first, then wildcard
    pub fn hostnames(&self) -> Vec<String> {
        vec![self.domain.clone(), self.subject()]
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_key", &"<redacted>")
            .field("rotation_period", &self.rotation_period)
            .field("validity", &self.validity)
            .field("domain", &self.domain)
            .field("cert_out", &self.cert_out)
            .field("key_out", &self.key_out)
            .field("post_hook", &self.post_hook)
            .field("api_url", &self.api_url)
            .field("api_timeout", &self.api_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
