//! Certificate authority client
//!
//! The rotation engine only needs two operations from the authority:
//! issue a certificate for a CSR, and revoke a certificate by identifier.
//! [`CertificateAuthority`] is that seam; [`OriginCaClient`] implements it
//! against the Cloudflare Origin CA API.

mod origin_ca;

pub use origin_ca::{OriginCaClient, ORIGIN_RSA_REQUEST_TYPE};

use async_trait::async_trait;

use origin_cert_common::CertificateId;
use origin_cert_config::Validity;

use crate::errors::AuthorityError;

/// Parameters of a certificate creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCertificate {
    /// Hostnames the certificate must cover, in order
    pub hostnames: Vec<String>,
    /// Requested lifetime
    pub validity: Validity,
    /// PEM-encoded CSR with normalized line endings
    pub csr_pem: String,
}

/// A certificate as returned by the authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// Authority-assigned identifier
    pub id: CertificateId,
    /// PEM-encoded X.509 certificate
    pub certificate_pem: String,
}

/// Issues and revokes certificates
///
/// Implementations should not retry internally; the engine owns the
/// deadline and decides whether a failure is fatal.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Issue a certificate for the given CSR
    async fn create(&self, request: &CreateCertificate)
        -> Result<IssuedCertificate, AuthorityError>;

    /// Revoke a previously issued certificate
    async fn revoke(&self, id: &CertificateId) -> Result<(), AuthorityError>;
}
