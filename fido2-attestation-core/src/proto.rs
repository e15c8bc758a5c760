//! Data types consumed and produced by attestation verification. The outputs are designed
//! to allow persistance and should not change.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::*;
use crate::formats::AttestationFormat;

/// Representation of an AAGUID
/// <https://www.w3.org/TR/webauthn/#aaguid>
pub type Aaguid = [u8; 16];

/// The attested credential block of authenticator data.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestedCredentialData {
    /// The model identifier of the authenticator.
    pub aaguid: Aaguid,
    /// The credential id, as chosen by the authenticator.
    pub credential_id: Vec<u8>,
    /// The COSE public key of the credential, decoded.
    pub credential_pk: serde_cbor_2::Value,
    /// The exact bytes of the COSE public key as they appeared in authenticator data.
    pub credential_pk_bytes: Vec<u8>,
}

/// Authenticator data as signed by the authenticator during registration.
/// <https://w3c.github.io/webauthn/#sctn-authenticator-data>
///
/// Values of this type are parsed once with `TryFrom<&[u8]>` and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    /// SHA-256 of the relying party id the credential is scoped to.
    pub rp_id_hash: [u8; 32],
    /// Raw flag bits.
    pub flags: u8,
    /// Signature counter.
    pub counter: u32,
    /// Attested credential data, present when the AT flag is set.
    pub acd: Option<AttestedCredentialData>,
    /// Authenticator extension outputs, present when the ED flag is set.
    pub extensions: Option<serde_cbor_2::Value>,
    /// The bytes this structure was parsed from. Signatures are always computed over these.
    pub raw: Vec<u8>,
}

impl AuthenticatorData {
    /// If the user present flag is set.
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    /// If the user verified flag is set.
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }
}

/// The trust level an attestation statement conveyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationType {
    /// Signed by a batch certificate that chains to a known root.
    Basic,
    /// Signed with the credential key itself, or a self signed certificate.
    #[serde(rename = "self")]
    SelfAttestation,
    /// Signed by an attestation key certified by an attestation CA.
    AttCa,
    /// Signed by a per credential certificate from an anonymisation CA.
    AnonCa,
    /// No attestation was provided, or verification was skipped.
    None,
    /// Verification failed but the credential was accepted for monitoring.
    Uncertain,
}

/// The security level of an Android keystore, as reported in the key description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// The key lives in the Android system.
    Software,
    /// The key lives in a trusted execution environment.
    TrustedEnvironment,
    /// The key lives in a dedicated secure element.
    StrongBox,
}

/// Format specific facts gathered while verifying an attestation statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationMetadata {
    /// No metadata available.
    None,
    /// Packed attestation.
    Packed {
        /// The authenticator model.
        aaguid: Uuid,
    },
    /// TPM attestation.
    Tpm {
        /// The authenticator model.
        aaguid: Uuid,
        /// The firmware version reported in the TPM clock info.
        firmware_version: u64,
    },
    /// Android hardware key attestation.
    AndroidKey {
        /// The version of the key attestation schema.
        attestation_version: i64,
        /// Where the attestation was generated.
        attestation_security_level: SecurityLevel,
        /// The keymaster version.
        keymaster_version: i64,
        /// Where the key is held.
        keymaster_security_level: SecurityLevel,
    },
    /// Android SafetyNet attestation.
    AndroidSafetyNet {
        /// The package name of the calling application.
        apk_package_name: Option<String>,
        /// Base64 digests of the calling application's signing certificates.
        apk_certificate_digest_sha256: Vec<String>,
        /// If the device passed the compatibility test suite profile check.
        cts_profile_match: bool,
        /// If the device passed the basic integrity check.
        basic_integrity: bool,
        /// How integrity was evaluated.
        evaluation_type: Option<String>,
    },
}

/// The result of a successful attestation verification: the credential to store and how
/// far it can be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredAndCounterData {
    /// The credential id, Base64URL without padding.
    pub credential_id: String,
    /// The COSE public key bytes from authenticator data, Base64URL without padding.
    pub public_key: String,
    /// The initial signature counter.
    pub counter: u32,
    /// The attestation type the statement conveyed.
    pub attestation_type: AttestationType,
    /// The COSE algorithm of the credential key.
    pub signature_algorithm: i64,
    /// The format of the statement that was verified.
    pub attestation_format: AttestationFormat,
    /// Format specific facts.
    pub metadata: AttestationMetadata,
}

impl CredAndCounterData {
    /// If this credential was accepted on the strength of a verified attestation signature.
    pub fn is_trusted(&self) -> bool {
        !matches!(
            self.attestation_type,
            AttestationType::None | AttestationType::Uncertain
        )
    }
}

/// The registration ceremony a statement is verified for. The verified credential is
/// written back into this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationData {
    /// The relying party origin the client reported, or the bare relying party id.
    pub origin: String,
    /// The challenge issued for this ceremony.
    pub challenge: String,
    /// The verified credential, once attestation succeeds.
    pub attestation: Option<CredAndCounterData>,
}

impl RegistrationData {
    /// Start a registration for `origin` with the issued `challenge`.
    pub fn new(origin: impl Into<String>, challenge: impl Into<String>) -> Self {
        RegistrationData {
            origin: origin.into(),
            challenge: challenge.into(),
            attestation: None,
        }
    }
}
