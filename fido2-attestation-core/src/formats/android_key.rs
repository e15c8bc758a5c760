//! Android key attestation.
//! <https://w3c.github.io/webauthn/#sctn-android-key-attestation>

use openssl::x509;
use serde_cbor_2::Value;

use super::{required, required_alg, required_bytes, statement_map, verification_data};
use crate::attestation::VerificationContext;
use crate::certificates::parse_x5c;
use crate::crypto::{verify_signature, COSEKey};
use crate::error::{AttestationError, AttestationResult};
use crate::extensions::{validate_extension, AndroidKeyAttestationExtensionData};
use crate::proto::{AttestationType, AuthenticatorData, CredAndCounterData};
use crate::verifiers::verify_algorithm;

/// A structurally valid android-key statement.
#[derive(Debug, Clone)]
pub struct AndroidKeyStatement {
    /// The declared signature algorithm.
    pub alg: i128,
    /// The credential key's signature over the registration.
    pub sig: Vec<u8>,
    /// The credential certificate, followed by its chain.
    pub x5c: Vec<x509::X509>,
}

pub(crate) fn parse(att_stmt: &Value) -> AttestationResult<AndroidKeyStatement> {
    let map = statement_map(att_stmt)?;
    let alg = required_alg(map)?;
    let sig = required_bytes(map, "sig")?;
    let x5c = parse_x5c(required(map, "x5c")?)?;
    Ok(AndroidKeyStatement { alg, sig, x5c })
}

pub(crate) fn process(
    ctx: &VerificationContext<'_>,
    stmt: &AndroidKeyStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    out: &mut CredAndCounterData,
) -> AttestationResult<()> {
    let acd = auth_data.attested_credential()?;
    let credential_key = auth_data.credential_key()?;
    let alg = verify_algorithm(stmt.alg, credential_key.type_)?;

    let attestation_cert = stmt
        .x5c
        .first()
        .ok_or_else(|| AttestationError::malformed("x5c is empty"))?;

    // Verify that sig is a valid signature over the concatenation of authenticatorData and
    // clientDataHash using the public key in the first certificate in x5c with the algorithm
    // specified in alg.
    let verification_data = verification_data(auth_data, client_data_hash);
    if !verify_signature(alg, attestation_cert, &stmt.sig, &verification_data)? {
        debug!("android key signature invalid");
        return Err(AttestationError::integrity("Unable to verify signature"));
    }

    // Verify that the public key in the first certificate in x5c matches the
    // credentialPublicKey in the attestedCredentialData in authenticatorData.
    let cert_key = COSEKey::try_from((alg, attestation_cert))?;
    if cert_key.key != credential_key.key {
        debug!("android key certificate does not hold the credential key");
        return Err(AttestationError::integrity("public key doesn't match"));
    }

    // Verify that the attestationChallenge field in the attestation certificate extension data
    // is identical to clientDataHash, and the authorization lists meet our requirements.
    let metadata = validate_extension::<AndroidKeyAttestationExtensionData>(
        attestation_cert,
        &client_data_hash.to_vec(),
    )?;

    let roots = ctx.roots_for(&acd.aaguid, &stmt.x5c)?;
    if roots.is_empty() {
        debug!("no android key trust anchors");
        return Err(AttestationError::untrusted(
            "No trust anchors for Android key attestation",
        ));
    }
    ctx.verify_chain(&stmt.x5c, &roots)?;

    out.attestation_type = AttestationType::Basic;
    out.metadata = metadata;

    Ok(())
}
