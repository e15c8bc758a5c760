//! Packed attestation.
//! <https://w3c.github.io/webauthn/#sctn-packed-attestation>

use openssl::x509;
use serde_cbor_2::Value;
use uuid::Uuid;

use super::{optional_bytes, required_alg, required_bytes, statement_map, verification_data};
use crate::attestation::VerificationContext;
use crate::certificates::{is_self_signed, parse_x5c};
use crate::crypto::{assert_packed_attest_req, verify_signature};
use crate::error::{AttestationError, AttestationResult};
use crate::extensions::{validate_extension, FidoGenCeAaguid};
use crate::proto::{AttestationMetadata, AttestationType, AuthenticatorData, CredAndCounterData};
use crate::verifiers::verify_algorithm;

/// How a packed statement proves its origin.
#[derive(Debug, Clone)]
pub enum PackedTrust {
    /// An attestation certificate, followed by its chain.
    X5c(Vec<x509::X509>),
    /// An ECDAA key id.
    Ecdaa(Vec<u8>),
    /// The credential key signed its own registration.
    SelfAttestation,
}

/// A structurally valid packed statement.
#[derive(Debug, Clone)]
pub struct PackedStatement {
    /// The declared signature algorithm.
    pub alg: i128,
    /// The attestation signature.
    pub sig: Vec<u8>,
    /// The trust path.
    pub trust: PackedTrust,
}

pub(crate) fn parse(att_stmt: &Value) -> AttestationResult<PackedStatement> {
    let map = statement_map(att_stmt)?;
    let alg = required_alg(map)?;
    let sig = required_bytes(map, "sig")?;

    let trust = match (super::field(map, "x5c"), optional_bytes(map, "ecdaaKeyId")?) {
        (Some(x5c), _) => PackedTrust::X5c(parse_x5c(x5c)?),
        (None, Some(key_id)) => PackedTrust::Ecdaa(key_id),
        (None, None) => PackedTrust::SelfAttestation,
    };

    Ok(PackedStatement { alg, sig, trust })
}

pub(crate) fn process(
    ctx: &VerificationContext<'_>,
    stmt: &PackedStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    out: &mut CredAndCounterData,
) -> AttestationResult<()> {
    let acd = auth_data.attested_credential()?;
    let credential_key = auth_data.credential_key()?;
    let alg = verify_algorithm(stmt.alg, credential_key.type_)?;

    let verification_data = verification_data(auth_data, client_data_hash);

    match &stmt.trust {
        PackedTrust::X5c(arr_x509) => {
            // The attestation certificate attestnCert MUST be the first element in the array.
            let attestn_cert = arr_x509
                .first()
                .ok_or_else(|| AttestationError::malformed("x5c is empty"))?;

            trace!(subject = ?attestn_cert.subject_name());

            // Verify that sig is a valid signature over the concatenation of authenticatorData
            // and clientDataHash using the attestation public key in attestnCert with the
            // algorithm specified in alg.
            if !verify_signature(alg, attestn_cert, &stmt.sig, &verification_data)? {
                debug!("packed x509 signature invalid");
                return Err(AttestationError::integrity("Unable to verify signature"));
            }

            assert_packed_attest_req(attestn_cert)?;

            // If attestnCert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
            // (id-fido-gen-ce-aaguid) verify that the value of this extension matches the aaguid
            // in authenticatorData.
            validate_extension::<FidoGenCeAaguid>(attestn_cert, &acd.aaguid)?;

            let roots = ctx.roots_for(&acd.aaguid, arr_x509)?;

            out.attestation_type = if roots.is_empty() {
                if is_self_signed(attestn_cert) {
                    debug!("packed self signed certificate without trust anchors");
                    AttestationType::SelfAttestation
                } else {
                    debug!(aaguid = %Uuid::from_bytes(acd.aaguid), "no packed trust anchors");
                    return Err(AttestationError::untrusted(
                        "No trust anchors for attestation certificate",
                    ));
                }
            } else {
                ctx.verify_chain(arr_x509, &roots)?;
                if arr_x509.len() > 1 {
                    AttestationType::AttCa
                } else {
                    AttestationType::Basic
                }
            };

            out.metadata = AttestationMetadata::Packed {
                aaguid: Uuid::from_bytes(acd.aaguid),
            };
        }
        PackedTrust::Ecdaa(_) => {
            warn!("packed ECDAA attestation is not supported");
            return Err(AttestationError::UnsupportedFeature(
                "ECDAA attestation".to_string(),
            ));
        }
        PackedTrust::SelfAttestation => {
            // Verify that sig is a valid signature over the concatenation of
            // authenticatorData and clientDataHash using the credential public key with alg.
            if !credential_key.verify_signature(&stmt.sig, &verification_data)? {
                debug!("packed self attestation signature invalid");
                return Err(AttestationError::integrity("Unable to verify signature"));
            }

            out.attestation_type = AttestationType::SelfAttestation;
            out.metadata = AttestationMetadata::Packed {
                aaguid: Uuid::from_bytes(acd.aaguid),
            };
        }
    }

    Ok(())
}
