//! Android SafetyNet attestation responses.
//! <https://developer.android.com/training/safetynet/attestation>

use std::str::FromStr;
use std::time::SystemTime;

use base64urlsafedata::Base64UrlSafeData;
use openssl::{nid, x509};
use serde::{Deserialize, Serialize};

use crate::certificates::verify_attestation_ca_chain;
use crate::constants::SAFETYNET_HOSTNAME;
use crate::error::AttestationError;

/// The claims of a SafetyNet attestation response.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNetResponse {
    /// When the response was generated, in milliseconds since the epoch.
    pub timestamp_ms: u64,
    /// The nonce the client supplied.
    pub nonce: Base64UrlSafeData,
    /// The package name of the calling application.
    #[serde(default)]
    pub apk_package_name: Option<String>,
    /// Digests of the calling application's signing certificates.
    #[serde(default)]
    pub apk_certificate_digest_sha256: Vec<Base64UrlSafeData>,
    /// If the device passed the compatibility test suite profile check.
    pub cts_profile_match: bool,
    /// If the device passed the basic integrity check.
    pub basic_integrity: bool,
    /// How integrity was evaluated.
    #[serde(default)]
    pub evaluation_type: Option<String>,
}

/// Reasons a SafetyNet token could not be verified.
#[derive(Debug, thiserror::Error)]
pub enum SafetyNetError {
    /// The token is not a valid JWS, or its signature does not verify.
    #[error("JWT error: {0:?}")]
    Jwt(#[from] compact_jwt::JwtError),

    /// The token does not embed its signing certificate chain.
    #[error("No cert in chain")]
    MissingCertChain,

    /// The signing certificate was not issued to the attestation service.
    #[error("hostname invalid")]
    InvalidHostname,

    /// The signing certificate chain does not lead to a trusted root.
    #[error("untrusted certificate chain: {0}")]
    Untrusted(String),

    /// The cryptographic provider failed.
    #[error("openssl: {0:?}")]
    OpenSSL(#[from] openssl::error::ErrorStack),
}

/// Decodes and authenticates SafetyNet responses.
pub trait SafetyNetVerifier: Send + Sync {
    /// Decode `token` and authenticate it against `roots` at `now`.
    ///
    /// `Ok(None)` means the token was understood but carried no statement.
    fn parse_and_verify(
        &self,
        token: &str,
        roots: &[x509::X509],
        now: SystemTime,
    ) -> Result<Option<SafetyNetResponse>, SafetyNetError>;
}

/// Verifies SafetyNet responses without contacting Google: the JWS signature is checked with
/// the embedded leaf certificate, and that certificate's chain with the supplied roots.
#[derive(Debug, Default, Clone)]
pub struct OfflineSafetyNetVerifier {
    danger_disable_certificate_time_checks: bool,
}

impl OfflineSafetyNetVerifier {
    /// Create a verifier.
    pub fn new(danger_disable_certificate_time_checks: bool) -> Self {
        OfflineSafetyNetVerifier {
            danger_disable_certificate_time_checks,
        }
    }
}

fn common_name(certificate: &x509::X509) -> Result<String, SafetyNetError> {
    let name = certificate
        .subject_name()
        .entries_by_nid(nid::Nid::COMMONNAME)
        .next()
        .ok_or(SafetyNetError::InvalidHostname)?;
    Ok(name.data().as_utf8()?.to_string())
}

impl SafetyNetVerifier for OfflineSafetyNetVerifier {
    fn parse_and_verify(
        &self,
        token: &str,
        roots: &[x509::X509],
        now: SystemTime,
    ) -> Result<Option<SafetyNetResponse>, SafetyNetError> {
        trace!(?token);
        let jwsu = compact_jwt::JwsUnverified::from_str(token)?;

        let certs = jwsu
            .get_x5c_chain()?
            .ok_or(SafetyNetError::MissingCertChain)?;

        let leaf_cert = certs.first().ok_or(SafetyNetError::MissingCertChain)?;

        // Verify that the attestation certificate is issued to the hostname "attest.android.com"
        if common_name(leaf_cert)? != SAFETYNET_HOSTNAME {
            return Err(SafetyNetError::InvalidHostname);
        }

        verify_attestation_ca_chain(
            &certs,
            roots,
            now,
            self.danger_disable_certificate_time_checks,
        )
        .map_err(|e| SafetyNetError::Untrusted(e.to_string()))?;

        // Verify with the internal certificate.
        let jws: compact_jwt::Jws<SafetyNetResponse> = jwsu.validate_embeded()?;

        Ok(Some(jws.into_inner()))
    }
}

impl From<SafetyNetError> for AttestationError {
    fn from(e: SafetyNetError) -> Self {
        AttestationError::integrity(format!("Invalid safety net attestation: {e}"))
    }
}
