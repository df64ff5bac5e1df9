//! Type-safe identifier newtypes for the origin certificate agent.
//!
//! Identifiers assigned by the certificate authority are opaque strings.
//! Wrapping them prevents accidentally passing a hostname or a PEM blob
//! where a certificate identifier is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authority-assigned certificate identifier.
///
/// Unique per issued certificate. It is the handle used to revoke the
/// certificate and the key the output sink uses to suppress duplicate writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    /// Create from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CertificateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CertificateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_id() {
        let id = CertificateId::new("328578533902268680212849205732770752308931942346");
        assert_eq!(
            id.as_str(),
            "328578533902268680212849205732770752308931942346"
        );
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn test_certificate_id_equality() {
        let a = CertificateId::from("abc");
        let b = CertificateId::from("abc".to_string());
        assert_eq!(a, b);
        assert_ne!(a, CertificateId::new("abd"));
    }
}
