//! FIDO U2F attestation.
//! <https://w3c.github.io/webauthn/#sctn-fido-u2f-attestation>

use openssl::x509;
use serde_cbor_2::Value;

use super::{field, optional_bytes, required_bytes, statement_map};
use crate::attestation::VerificationContext;
use crate::certificates::{issuer_dn, parse_x5c};
use crate::crypto::{verify_signature, COSEAlgorithm};
use crate::error::{AttestationError, AttestationResult};
use crate::proto::{AttestationType, AuthenticatorData, CredAndCounterData, RegistrationData};
use crate::verifiers::{
    verify_aaguid_zeroed, verify_algorithm, verify_rp_id_hash, verify_user_present,
};

/// A structurally valid fido-u2f statement.
#[derive(Debug, Clone)]
pub struct U2fStatement {
    /// The attestation signature.
    pub sig: Vec<u8>,
    /// The attestation certificate, if the authenticator sent one.
    pub x5c: Option<Vec<x509::X509>>,
    /// The ECDAA key identifier, if the authenticator sent one.
    pub ecdaa_key_id: Option<Vec<u8>>,
}

pub(crate) fn parse(att_stmt: &Value) -> AttestationResult<U2fStatement> {
    let map = statement_map(att_stmt)?;
    let sig = required_bytes(map, "sig")?;
    let x5c = field(map, "x5c").map(parse_x5c).transpose()?;
    let ecdaa_key_id = optional_bytes(map, "ecdaaKeyId")?;
    Ok(U2fStatement {
        sig,
        x5c,
        ecdaa_key_id,
    })
}

/// `0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F`
fn u2f_verification_data(
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
) -> AttestationResult<Vec<u8>> {
    let acd = auth_data.attested_credential()?;
    let public_key_u2f = auth_data.credential_key()?.get_alg_key_ecc_x962_raw()?;

    let r: [u8; 1] = [0x00];
    Ok(r.iter()
        .chain(auth_data.rp_id_hash.iter())
        .chain(client_data_hash.iter())
        .chain(acd.credential_id.iter())
        .chain(public_key_u2f.iter())
        .copied()
        .collect())
}

pub(crate) fn process(
    ctx: &VerificationContext<'_>,
    stmt: &U2fStatement,
    auth_data: &AuthenticatorData,
    registration: &RegistrationData,
    client_data_hash: &[u8],
    out: &mut CredAndCounterData,
) -> AttestationResult<()> {
    let acd = auth_data.attested_credential()?;
    let credential_key = auth_data.credential_key()?;

    verify_aaguid_zeroed(auth_data)?;
    verify_user_present(auth_data)?;
    verify_rp_id_hash(auth_data, &registration.origin)?;

    // U2F keys are always P-256.
    verify_algorithm(
        i128::from(i64::from(COSEAlgorithm::ES256)),
        credential_key.type_,
    )?;

    let verification_data = u2f_verification_data(auth_data, client_data_hash)?;

    match (&stmt.x5c, &stmt.ecdaa_key_id) {
        (Some(x5c), _) => {
            let att_cert = x5c
                .first()
                .ok_or_else(|| AttestationError::malformed("x5c is empty"))?;

            if !verify_signature(COSEAlgorithm::ES256, att_cert, &stmt.sig, &verification_data)? {
                debug!("u2f attestation signature invalid");
                return Err(AttestationError::integrity("Unable to verify signature"));
            }

            let roots = ctx.roots_for(&acd.aaguid, x5c)?;
            if let Err(e) = ctx.verify_chain(x5c, &roots) {
                if roots.is_empty() {
                    return Err(e);
                }
                warn!(
                    issuer = %issuer_dn(att_cert),
                    ?e,
                    "Failed to find attestation validation signature public certificate"
                );
                return Err(AttestationError::untrusted(
                    "Failed to find attestation validation signature public certificate",
                ));
            }

            out.attestation_type = AttestationType::Basic;
        }
        (None, Some(_)) => {
            warn!("ECDAA u2f attestation is not supported");
            return Err(AttestationError::UnsupportedFeature(
                "ECDAA attestation is not supported".to_string(),
            ));
        }
        (None, None) => {
            // Without a certificate the signature can only be checked with the credential's own
            // EC point.
            if !credential_key.verify_signature(&stmt.sig, &verification_data)? {
                debug!("u2f self attestation signature invalid");
                return Err(AttestationError::integrity("Unable to verify signature"));
            }
            out.attestation_type = AttestationType::SelfAttestation;
        }
    }

    Ok(())
}
