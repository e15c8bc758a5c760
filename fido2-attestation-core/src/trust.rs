//! Trust anchor resolution and attestation policy.
//!
//! The engine never fetches anything itself. Root certificates come from a [TrustResolver]
//! (locally cached anchors) or a [MetadataService], both borrowed for the duration of a
//! verification, and the [AttestationModePolicy] decides what a failed verification means.

use std::sync::RwLock;

use fido2_attestation_ca::{AttestationCa, AttestationCaList};
use openssl::x509;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{SAFETYNET_FUTURE_TOLERANCE_MS, SAFETYNET_MAX_AGE_MS};
use crate::error::AttestationError;
use crate::proto::Aaguid;

/// Looks up root certificates that may terminate an attestation chain.
pub trait TrustResolver: Send + Sync {
    /// Roots that may attest to authenticators of model `aaguid`.
    fn roots_for_aaguid(&self, aaguid: &Aaguid) -> Vec<x509::X509>;

    /// Roots whose subject distinguished name is `dn`, restricted to those that may attest to
    /// authenticators of model `aaguid`.
    fn roots_for_issuer_dn(&self, dn: &str, aaguid: &Aaguid) -> Vec<x509::X509>;
}

/// The parts of an authenticator's metadata statement the engine consumes.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// The authenticator model.
    pub aaguid: Uuid,
    /// A human readable description of the model.
    pub description: Option<String>,
    /// Roots that may terminate attestation chains of this model.
    pub attestation_root_certificates: Vec<x509::X509>,
}

/// A source of authenticator metadata, such as the FIDO Metadata Service.
pub trait MetadataService: Send + Sync {
    /// Fetch the metadata statement of `aaguid`, if the service knows the model.
    fn fetch_metadata(&self, aaguid: &Aaguid) -> Result<Option<Metadata>, AttestationError>;
}

/// A [MetadataService] that knows no authenticators.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadataService;

impl MetadataService for NoMetadataService {
    fn fetch_metadata(&self, _aaguid: &Aaguid) -> Result<Option<Metadata>, AttestationError> {
        Ok(None)
    }
}

/// A local, shareable cache of trust anchors.
#[derive(Debug, Default)]
pub struct TrustAnchorStore {
    cas: RwLock<AttestationCaList>,
}

impl TrustAnchorStore {
    /// Create a store holding `cas`.
    pub fn new(cas: AttestationCaList) -> Self {
        TrustAnchorStore {
            cas: RwLock::new(cas),
        }
    }

    /// Add an anchor, merging its AAGUIDs into an existing entry for the same certificate.
    pub fn insert(&self, ca: AttestationCa) -> Result<(), AttestationError> {
        let mut guard = match self.cas.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("trust anchor store lock was poisoned");
                poisoned.into_inner()
            }
        };
        guard.insert(ca).map_err(AttestationError::from)
    }

    /// Replace every anchor with `cas`.
    pub fn replace(&self, cas: AttestationCaList) {
        let mut guard = match self.cas.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = cas;
    }

    fn read<T>(&self, f: impl FnOnce(&AttestationCaList) -> T) -> T {
        match self.cas.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// The number of distinct anchors held.
    pub fn len(&self) -> usize {
        self.read(|cas| cas.len())
    }

    /// If no anchors are held.
    pub fn is_empty(&self) -> bool {
        self.read(|cas| cas.is_empty())
    }
}

impl TrustResolver for TrustAnchorStore {
    fn roots_for_aaguid(&self, aaguid: &Aaguid) -> Vec<x509::X509> {
        let aaguid = Uuid::from_bytes(*aaguid);
        self.read(|cas| cas.roots_for_aaguid(&aaguid))
    }

    fn roots_for_issuer_dn(&self, dn: &str, aaguid: &Aaguid) -> Vec<x509::X509> {
        let aaguid = Uuid::from_bytes(*aaguid);
        self.read(|cas| cas.roots_for_subject_dn(dn, &aaguid))
    }
}

/// How attestation failures affect a registration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationMode {
    /// A failed verification rejects the registration.
    #[default]
    Strict,
    /// A failed verification is logged and the credential is accepted as `uncertain`.
    Monitor,
    /// Statements are not verified. Credentials are accepted with attestation type `none`.
    Disabled,
}

/// Supplies the [AttestationMode] to apply to a registration.
pub trait AttestationModePolicy: Send + Sync {
    /// The mode in force.
    fn mode(&self) -> AttestationMode;
}

/// Verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationConfig {
    /// What a failed verification means.
    pub mode: AttestationMode,
    /// Resolve roots only from locally provisioned (enterprise) anchors, never the metadata
    /// service.
    pub enterprise_attestation: bool,
    /// The largest age of a SafetyNet response, in milliseconds.
    pub safetynet_max_age_ms: u64,
    /// How far in the future a SafetyNet response may claim to be, in milliseconds.
    pub safetynet_future_tolerance_ms: u64,
    /// Skip certificate validity window checks. Only for replaying recorded test vectors
    /// whose certificates have since expired.
    pub danger_disable_certificate_time_checks: bool,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        AttestationConfig {
            mode: AttestationMode::Strict,
            enterprise_attestation: false,
            safetynet_max_age_ms: SAFETYNET_MAX_AGE_MS,
            safetynet_future_tolerance_ms: SAFETYNET_FUTURE_TOLERANCE_MS,
            danger_disable_certificate_time_checks: false,
        }
    }
}

impl AttestationConfig {
    /// Set the [AttestationMode]. Defaults to [AttestationMode::Strict].
    pub fn attestation_mode(mut self, mode: AttestationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve roots from local anchors only. Defaults to "false".
    pub fn enterprise_attestation(mut self, enabled: bool) -> Self {
        self.enterprise_attestation = enabled;
        self
    }

    /// Set the largest accepted SafetyNet response age.
    pub fn safetynet_max_age_ms(mut self, ms: u64) -> Self {
        self.safetynet_max_age_ms = ms;
        self
    }

    /// Set the clock skew allowed for SafetyNet responses from the future.
    pub fn safetynet_future_tolerance_ms(mut self, ms: u64) -> Self {
        self.safetynet_future_tolerance_ms = ms;
        self
    }

    /// Setting this flag disables certificate validity window checks.
    ///
    /// If in doubt, do NOT change this value. Defaults to "false".
    pub fn danger_disable_certificate_time_checks(mut self, disable: bool) -> Self {
        self.danger_disable_certificate_time_checks = disable;
        self
    }
}

impl AttestationModePolicy for AttestationConfig {
    fn mode(&self) -> AttestationMode {
        self.mode
    }
}
