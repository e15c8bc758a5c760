//! Descriptions of the attestation root certificate authorities that a relying party
//! is willing to trust. A root can be scoped to a set of authenticator models (AAGUIDs),
//! and is found either by AAGUID or by its subject distinguished name.

#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

use base64urlsafedata::Base64UrlSafeData;
use openssl::error::ErrorStack as OpenSSLErrorStack;
use openssl::{hash, x509};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

/// A serialised Attestation CA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialisableAttestationCa {
    pub(crate) ca: Base64UrlSafeData,
    pub(crate) aaguids: BTreeSet<Uuid>,
}

/// A root certificate that attestation chains may terminate at, and the authenticator
/// models it is allowed to vouch for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "SerialisableAttestationCa",
    into = "SerialisableAttestationCa"
)]
pub struct AttestationCa {
    /// The x509 root CA of the attestation chain.
    pub ca: x509::X509,
    /// If not empty, the AAGUIDs this root may attest. An empty set means this root is
    /// offered for every AAGUID.
    pub aaguids: BTreeSet<Uuid>,
}

impl From<AttestationCa> for SerialisableAttestationCa {
    fn from(att_ca: AttestationCa) -> SerialisableAttestationCa {
        // A certificate that was parsed from DER always re-encodes.
        let der = att_ca.ca.to_der().unwrap_or_default();
        SerialisableAttestationCa {
            ca: Base64UrlSafeData(der),
            aaguids: att_ca.aaguids,
        }
    }
}

impl TryFrom<SerialisableAttestationCa> for AttestationCa {
    type Error = OpenSSLErrorStack;

    fn try_from(data: SerialisableAttestationCa) -> Result<Self, Self::Error> {
        Ok(AttestationCa {
            ca: x509::X509::from_der(&data.ca.0)?,
            aaguids: data.aaguids,
        })
    }
}

impl AttestationCa {
    /// Create an attestation CA from a DER encoded certificate. It is offered for all
    /// AAGUIDs until [AttestationCa::insert_aaguid] narrows it.
    pub fn new_from_der(data: &[u8]) -> Result<Self, OpenSSLErrorStack> {
        Ok(AttestationCa {
            ca: x509::X509::from_der(data)?,
            aaguids: BTreeSet::default(),
        })
    }

    /// Create an attestation CA from a PEM encoded certificate.
    pub fn new_from_pem(data: &[u8]) -> Result<Self, OpenSSLErrorStack> {
        Ok(AttestationCa {
            ca: x509::X509::from_pem(data)?,
            aaguids: BTreeSet::default(),
        })
    }

    /// Retrieve the Key Identifier (sha256 of the certificate) for this Attestation Ca
    pub fn get_kid(&self) -> Result<Vec<u8>, OpenSSLErrorStack> {
        self.ca
            .digest(hash::MessageDigest::sha256())
            .map(|bytes| bytes.to_vec())
    }

    /// Narrow the set of AAGUIDs this CA may attest by adding one.
    pub fn insert_aaguid(&mut self, aaguid: Uuid) {
        self.aaguids.insert(aaguid);
    }

    /// If this CA is offered for the authenticator model `aaguid`.
    pub fn allows_aaguid(&self, aaguid: &Uuid) -> bool {
        self.aaguids.is_empty() || self.aaguids.contains(aaguid)
    }

    /// The subject distinguished name of this CA, rendered by [x509_name_to_string].
    pub fn subject_dn(&self) -> String {
        x509_name_to_string(self.ca.subject_name())
    }
}

/// Render a distinguished name as `SN=value` pairs joined by `, ` in certificate order.
/// Issuer names of attestation certificates are rendered the same way, so the output
/// is comparable with [AttestationCa::subject_dn].
pub fn x509_name_to_string(name: &x509::X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("UNKNOWN");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_default();
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// A list of AttestationCas, keyed by their Key Identifier.
#[derive(Debug, Default, Clone)]
pub struct AttestationCaList {
    cas: BTreeMap<Vec<u8>, AttestationCa>,
}

impl TryFrom<AttestationCa> for AttestationCaList {
    type Error = OpenSSLErrorStack;

    fn try_from(att_ca: AttestationCa) -> Result<Self, Self::Error> {
        let mut new = Self::default();
        new.insert(att_ca)?;
        Ok(new)
    }
}

impl AttestationCaList {
    /// Build a list from `(root, aaguid)` pairs. The same root listed for several
    /// AAGUIDs is stored once with the union of those AAGUIDs.
    pub fn from_iter<I: IntoIterator<Item = (x509::X509, Uuid)>>(
        iter: I,
    ) -> Result<Self, OpenSSLErrorStack> {
        let mut new = Self::default();
        for (ca, aaguid) in iter {
            let mut aaguids = BTreeSet::default();
            aaguids.insert(aaguid);
            new.insert(AttestationCa { ca, aaguids })?;
        }
        Ok(new)
    }

    /// Determine if this attestation list contains any members.
    pub fn is_empty(&self) -> bool {
        self.cas.is_empty()
    }

    /// The number of distinct roots in this list.
    pub fn len(&self) -> usize {
        self.cas.len()
    }

    /// Insert an attestation CA. If the same root is already present the AAGUID sets
    /// are merged, unless either side is unrestricted in which case the result is too.
    pub fn insert(&mut self, att_ca: AttestationCa) -> Result<(), OpenSSLErrorStack> {
        let kid = att_ca.get_kid()?;
        match self.cas.get_mut(&kid) {
            Some(existing) => {
                if existing.aaguids.is_empty() || att_ca.aaguids.is_empty() {
                    existing.aaguids.clear();
                } else {
                    existing.aaguids.extend(att_ca.aaguids);
                }
            }
            None => {
                tracing::debug!(subject = %att_ca.subject_dn(), "adding attestation ca");
                self.cas.insert(kid, att_ca);
            }
        }
        Ok(())
    }

    /// Iterate over the attestation CAs in this list.
    pub fn iter(&self) -> impl Iterator<Item = &AttestationCa> {
        self.cas.values()
    }

    /// The roots that may attest the authenticator model `aaguid`.
    pub fn roots_for_aaguid(&self, aaguid: &Uuid) -> Vec<x509::X509> {
        self.cas
            .values()
            .filter(|att_ca| att_ca.allows_aaguid(aaguid))
            .map(|att_ca| att_ca.ca.clone())
            .collect()
    }

    /// The roots whose subject matches the distinguished name `dn`, and that may attest the
    /// authenticator model `aaguid`.
    pub fn roots_for_subject_dn(&self, dn: &str, aaguid: &Uuid) -> Vec<x509::X509> {
        self.cas
            .values()
            .filter(|att_ca| att_ca.subject_dn() == dn && att_ca.allows_aaguid(aaguid))
            .map(|att_ca| att_ca.ca.clone())
            .collect()
    }
}
