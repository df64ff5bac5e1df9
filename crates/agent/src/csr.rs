//! Key and certificate signing request generation
//!
//! Every call produces a brand-new RSA key; keys are never reused across
//! rotations.

use std::sync::Arc;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::errors::CsrError;

/// Default RSA modulus size
pub const DEFAULT_RSA_BITS: usize = 2048;

/// A fresh private key and the CSR signed with it
pub struct GeneratedCsr {
    /// PEM-encoded PKCS#1 private key (`RSA PRIVATE KEY`)
    pub private_key_pem: Zeroizing<String>,
    /// PEM-encoded CSR (`CERTIFICATE REQUEST`)
    pub csr_pem: String,
}

impl std::fmt::Debug for GeneratedCsr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedCsr")
            .field("private_key_pem", &"<redacted>")
            .field("csr_pem", &self.csr_pem)
            .finish()
    }
}

/// Produces a new key pair and CSR for a subject and hostname set
pub trait CsrGenerator: Send + Sync {
    /// Generate an independent key and a CSR for `subject` covering `hostnames`
    fn generate(&self, subject: &str, hostnames: &[String]) -> Result<GeneratedCsr, CsrError>;
}

/// SHA256-with-RSA CSR generator
#[derive(Debug, Clone)]
pub struct RsaCsrGenerator {
    bits: usize,
}

impl RsaCsrGenerator {
    /// Generator with a custom modulus size
    pub fn with_bits(bits: usize) -> Self {
        Self { bits }
    }
}

impl Default for RsaCsrGenerator {
    fn default() -> Self {
        Self {
            bits: DEFAULT_RSA_BITS,
        }
    }
}

impl CsrGenerator for RsaCsrGenerator {
    fn generate(&self, subject: &str, hostnames: &[String]) -> Result<GeneratedCsr, CsrError> {
        trace!(subject = %subject, bits = self.bits, "Generating RSA key");

        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, self.bits)
            .map_err(|e| CsrError::KeyGeneration(e.to_string()))?;

        let private_key_pem = key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CsrError::Encoding(e.to_string()))?;

        // rcgen signs from PKCS#8; the PKCS#1 form above is what gets persisted.
        let pkcs8_pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CsrError::Encoding(e.to_string()))?;
        let signing_key = KeyPair::from_pem(pkcs8_pem.as_str())?;

        let mut params = CertificateParams::new(hostnames.to_vec())?;
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, subject);

        let csr_pem = params.serialize_request(&signing_key)?.pem()?;

        debug!(
            subject = %subject,
            hostnames = ?hostnames,
            "Generated key and certificate signing request"
        );

        Ok(GeneratedCsr {
            private_key_pem,
            csr_pem,
        })
    }
}

/// Run a generator on the blocking pool
///
/// Key generation is CPU-bound; keeping it off the async workers means the
/// runtime stays responsive while a rotation is in progress.
pub async fn generate_off_thread(
    generator: Arc<dyn CsrGenerator>,
    subject: String,
    hostnames: Vec<String>,
) -> Result<GeneratedCsr, CsrError> {
    tokio::task::spawn_blocking(move || generator.generate(&subject, &hostnames))
        .await
        .map_err(|e| CsrError::Task(e.to_string()))?
}

/// Collapse every line-ending variant (`\r\n`, lone `\r`) to `\n`
///
/// The Origin CA API rejects CSRs carrying carriage returns.
pub fn normalize_newlines(pem: &str) -> String {
    pem.replace("\r\n", "\n").replace('\r', "\n")
}
