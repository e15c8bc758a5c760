//! TPM attestation.
//! <https://w3c.github.io/webauthn/#sctn-tpm-attestation>

use openssl::x509;
use serde_cbor_2::Value;
use uuid::Uuid;

use super::{required, required_alg, required_bytes, statement_map, verification_data};
use crate::attestation::VerificationContext;
use crate::certificates::parse_x5c;
use crate::constants::*;
use crate::crypto::{
    assert_tpm_attest_req, only_hash_from_type, verify_signature, COSEAlgorithm, COSEEC2Key,
    COSEKeyType, ECDSACurve,
};
use crate::error::{AttestationError, AttestationResult};
use crate::extensions::{validate_extension, FidoGenCeAaguid};
use crate::proto::{AttestationMetadata, AttestationType, AuthenticatorData, CredAndCounterData};
use crate::tpm::{tpm_name, TpmiEccCurve, TpmsAttest, TpmtPublic, TpmuPublicId, TpmuPublicParms};

/// A structurally valid TPM statement.
#[derive(Debug, Clone)]
pub struct TpmStatement {
    /// The algorithm of the AIK signature.
    pub alg: COSEAlgorithm,
    /// The AIK certificate, followed by its chain.
    pub x5c: Vec<x509::X509>,
    /// The AIK signature over `cert_info_bytes`.
    pub sig: Vec<u8>,
    /// The decoded TPMS_ATTEST.
    pub cert_info: TpmsAttest,
    /// The TPMS_ATTEST bytes as signed.
    pub cert_info_bytes: Vec<u8>,
    /// The decoded TPMT_PUBLIC.
    pub pub_area: TpmtPublic,
    /// The TPMT_PUBLIC bytes, from which the TPM name is computed.
    pub pub_area_bytes: Vec<u8>,
}

pub(crate) fn parse(att_stmt: &Value) -> AttestationResult<TpmStatement> {
    let map = statement_map(att_stmt)?;

    // The version of the TPM specification to which the signature conforms. Nothing else is
    // examined for other versions.
    let ver = cbor_try_string!(required(map, "ver")?)
        .map_err(|_| AttestationError::malformed("attStmt ver must be a text string"))?;
    if ver != TPM_VERSION {
        debug!(%ver, "unsupported tpm version");
        return Err(AttestationError::malformed(format!(
            "Unsupported TPM version {ver}"
        )));
    }

    let alg = COSEAlgorithm::try_from(required_alg(map)?)?;
    let sig = required_bytes(map, "sig")?;

    let cert_info_bytes = required_bytes(map, "certInfo")?;
    let cert_info = TpmsAttest::try_from(cert_info_bytes.as_slice())?;

    let pub_area_bytes = required_bytes(map, "pubArea")?;
    let pub_area = TpmtPublic::try_from(pub_area_bytes.as_slice())?;

    if super::field(map, "ecdaaKeyId").is_some() && super::field(map, "x5c").is_none() {
        warn!("tpm ECDAA attestation is not supported");
        return Err(AttestationError::UnsupportedFeature(
            "ECDAA attestation".to_string(),
        ));
    }
    let x5c = parse_x5c(required(map, "x5c")?)?;

    Ok(TpmStatement {
        alg,
        x5c,
        sig,
        cert_info,
        cert_info_bytes,
        pub_area,
        pub_area_bytes,
    })
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    let bytes = strip_leading_zeros(bytes);
    let mut v = vec![0; len.saturating_sub(bytes.len())];
    v.extend_from_slice(bytes);
    v
}

/// Check the public area describes the credential public key.
fn verify_pub_area_key(pub_area: &TpmtPublic, key: &COSEKeyType) -> AttestationResult<()> {
    let mismatch = || AttestationError::integrity("pubArea does not match credential key");

    match (key, &pub_area.parameters, &pub_area.unique) {
        (
            COSEKeyType::RSA(cose_rsa),
            TpmuPublicParms::Rsa { exponent, .. },
            TpmuPublicId::Rsa(tpm_modulus),
        ) => {
            if strip_leading_zeros(&cose_rsa.n) != strip_leading_zeros(tpm_modulus) {
                debug!("tpm modulus mismatch");
                return Err(mismatch());
            }
            let exponent = match *exponent {
                0 => TPM_RSA_DEFAULT_EXPONENT,
                e => e,
            };
            if strip_leading_zeros(&cose_rsa.e) != strip_leading_zeros(&exponent.to_be_bytes()) {
                debug!(?exponent, "tpm exponent mismatch");
                return Err(mismatch());
            }
        }
        (
            COSEKeyType::EC_EC2(COSEEC2Key { curve, x, y }),
            TpmuPublicParms::Ecc { curve_id, .. },
            TpmuPublicId::Ecc { x: tpm_x, y: tpm_y },
        ) => {
            match (curve, curve_id) {
                (ECDSACurve::SECP256R1, TpmiEccCurve::NistP256)
                | (ECDSACurve::SECP384R1, TpmiEccCurve::NistP384)
                | (ECDSACurve::SECP521R1, TpmiEccCurve::NistP521) => {}
                c_mismatch => {
                    debug!(?c_mismatch, "TpmiEccCurve ID mismatch");
                    return Err(mismatch());
                }
            }

            let size = curve.coordinate_size();
            if left_pad(x, size) != left_pad(tpm_x, size) || left_pad(y, size) != left_pad(tpm_y, size)
            {
                debug!("Invalid X or Y coords in TpmuPublicId");
                return Err(mismatch());
            }
        }
        ex => {
            debug!(?ex, "Unrecognised combination");
            return Err(mismatch());
        }
    }
    Ok(())
}

pub(crate) fn process(
    ctx: &VerificationContext<'_>,
    stmt: &TpmStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    out: &mut CredAndCounterData,
) -> AttestationResult<()> {
    let acd = auth_data.attested_credential()?;
    let credential_key = auth_data.credential_key()?;

    // Verify that the public key specified by the parameters and unique fields of pubArea is
    // identical to the credentialPublicKey in the attestedCredentialData in authenticatorData.
    verify_pub_area_key(&stmt.pub_area, &credential_key.key)?;

    let certinfo = &stmt.cert_info;

    // Verify that magic is set to TPM_GENERATED_VALUE.
    if certinfo.magic != TPM_GENERATED_VALUE {
        return Err(AttestationError::malformed(
            "certInfo magic is not TPM_GENERATED_VALUE",
        ));
    }

    // Verify that type is set to TPM_ST_ATTEST_CERTIFY.
    if certinfo.type_ != TPM_ST_ATTEST_CERTIFY {
        return Err(AttestationError::malformed(
            "certInfo type is not TPM_ST_ATTEST_CERTIFY",
        ));
    }

    // Verify that extraData is set to the hash of attToBeSigned using the hash algorithm
    // employed in "alg".
    let att_to_be_signed = verification_data(auth_data, client_data_hash);
    if only_hash_from_type(stmt.alg, &att_to_be_signed)? != certinfo.extra_data {
        debug!("tpm extraData mismatch");
        return Err(AttestationError::origin("Hashes don't match"));
    }

    // Verify that attested contains a TPMS_CERTIFY_INFO structure whose name field contains a
    // valid Name for pubArea, as computed using the algorithm in the nameAlg field of pubArea.
    if tpm_name(stmt.pub_area.name_alg, &stmt.pub_area_bytes)? != certinfo.name {
        debug!("tpm name does not match pubArea");
        return Err(AttestationError::integrity("certInfo name does not match pubArea"));
    }

    // qualifiedSigner, clockInfo and firmwareVersion are not verified. The firmware version is
    // reported in the metadata.
    trace!(clock_info = ?certinfo.clock_info, firmware_version = certinfo.firmware_version);

    // Verify the sig is a valid signature over certInfo using the attestation public key in
    // aik_cert with the algorithm specified in alg.
    let aik_cert = stmt
        .x5c
        .first()
        .ok_or_else(|| AttestationError::malformed("x5c is empty"))?;

    if !verify_signature(stmt.alg, aik_cert, &stmt.sig, &stmt.cert_info_bytes)? {
        debug!("tpm aik signature invalid");
        return Err(AttestationError::integrity("Unable to verify signature"));
    }

    // Verify that aik_cert meets the requirements in § 8.3.1 TPM Attestation Statement
    // Certificate Requirements.
    assert_tpm_attest_req(aik_cert)?;

    // If aik_cert contains an extension with OID 1 3 6 1 4 1 45724 1 1 4 (id-fido-gen-ce-aaguid)
    // verify that the value of this extension matches the aaguid in authenticatorData.
    validate_extension::<FidoGenCeAaguid>(aik_cert, &acd.aaguid)?;

    let roots = ctx.roots_for(&acd.aaguid, &stmt.x5c)?;
    if roots.is_empty() {
        debug!(aaguid = %Uuid::from_bytes(acd.aaguid), "no tpm trust anchors");
        return Err(AttestationError::untrusted(
            "No trust anchors for AIK certificate",
        ));
    }
    ctx.verify_chain(&stmt.x5c, &roots)?;

    out.attestation_type = AttestationType::AttCa;
    out.metadata = AttestationMetadata::Tpm {
        aaguid: Uuid::from_bytes(acd.aaguid),
        firmware_version: certinfo.firmware_version,
    };

    Ok(())
}
