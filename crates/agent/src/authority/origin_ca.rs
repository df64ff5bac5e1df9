//! Cloudflare Origin CA API client

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use origin_cert_common::CertificateId;

use super::{CertificateAuthority, CreateCertificate, IssuedCertificate};
use crate::errors::AuthorityError;

/// Header carrying the Origin CA service key
const SERVICE_KEY_HEADER: &str = "X-Auth-User-Service-Key";

/// Request type for RSA origin certificates
pub const ORIGIN_RSA_REQUEST_TYPE: &str = "origin-rsa";

#[derive(Debug, Serialize)]
struct CreateRequestBody<'a> {
    hostnames: &'a [String],
    requested_validity: u32,
    request_type: &'static str,
    csr: &'a str,
}

#[derive(Debug, Deserialize)]
struct CertificateResult {
    id: String,
    #[serde(default)]
    certificate: String,
}

#[derive(Debug, Deserialize)]
struct RevokeResult {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn error_message(&self) -> String {
        if self.errors.is_empty() {
            return "request was not successful".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Origin CA client authenticated with a service key
pub struct OriginCaClient {
    http: Client,
    base_url: String,
    service_key: String,
}

impl OriginCaClient {
    /// Create a client for the API at `base_url`
    ///
    /// `timeout` bounds every request made by this client.
    ///
    /// # Errors
    ///
    /// Returns an error if the service key is empty or the HTTP client
    /// cannot be built.
    pub fn new(
        service_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AuthorityError> {
        let service_key = service_key.into();
        if service_key.trim().is_empty() {
            return Err(AuthorityError::Credential(
                "origin CA service key is empty".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("origin-cert-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(
            base_url = %base_url,
            timeout_secs = timeout.as_secs(),
            "Created Origin CA client"
        );

        Ok(Self {
            http,
            base_url,
            service_key,
        })
    }

    /// API base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, AuthorityError> {
        let response = request
            .header(SERVICE_KEY_HEADER, &self.service_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        trace!(status = status.as_u16(), body_len = body.len(), "Origin CA response");

        let envelope: ApiEnvelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(AuthorityError::InvalidResponse(e.to_string()));
            }
            Err(_) => {
                return Err(AuthorityError::Api {
                    status: status.as_u16(),
                    message: body.chars().take(256).collect(),
                });
            }
        };

        if !status.is_success() || !envelope.success {
            return Err(AuthorityError::Api {
                status: status.as_u16(),
                message: envelope.error_message(),
            });
        }

        envelope
            .result
            .ok_or_else(|| AuthorityError::InvalidResponse("response has no result".to_string()))
    }
}

#[async_trait]
impl CertificateAuthority for OriginCaClient {
    async fn create(
        &self,
        request: &CreateCertificate,
    ) -> Result<IssuedCertificate, AuthorityError> {
        let body = CreateRequestBody {
            hostnames: &request.hostnames,
            requested_validity: request.validity.days(),
            request_type: ORIGIN_RSA_REQUEST_TYPE,
            csr: &request.csr_pem,
        };

        debug!(
            hostnames = ?request.hostnames,
            requested_validity = body.requested_validity,
            "Requesting origin certificate"
        );

        let result: CertificateResult = self
            .send(
                self.http
                    .post(format!("{}/certificates", self.base_url))
                    .json(&body),
            )
            .await?;

        if result.certificate.is_empty() {
            return Err(AuthorityError::InvalidResponse(format!(
                "certificate {} returned without PEM content",
                result.id
            )));
        }

        Ok(IssuedCertificate {
            id: CertificateId::new(result.id),
            certificate_pem: result.certificate,
        })
    }

    async fn revoke(&self, id: &CertificateId) -> Result<(), AuthorityError> {
        debug!(cert_id = %id, "Revoking origin certificate");
        let _: RevokeResult = self
            .send(
                self.http
                    .delete(format!("{}/certificates/{}", self.base_url, id)),
            )
            .await?;
        Ok(())
    }
}

impl fmt::Debug for OriginCaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginCaClient")
            .field("base_url", &self.base_url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}
