//! Apple anonymous attestation.
//! <https://www.w3.org/TR/webauthn/#sctn-apple-anonymous-attestation>

use openssl::x509;
use serde_cbor_2::Value;

use super::{required, statement_map, verification_data};
use crate::attestation::VerificationContext;
use crate::certificates::parse_x5c;
use crate::crypto::{compute_sha256, COSEKey};
use crate::error::{AttestationError, AttestationResult};
use crate::extensions::{validate_extension, AppleAnonymousNonce};
use crate::proto::{AttestationType, AuthenticatorData, CredAndCounterData};

/// A structurally valid apple statement.
#[derive(Debug, Clone)]
pub struct AppleStatement {
    /// The credential certificate, followed by its chain.
    pub x5c: Vec<x509::X509>,
}

pub(crate) fn parse(att_stmt: &Value) -> AttestationResult<AppleStatement> {
    let map = statement_map(att_stmt)?;
    let x5c = parse_x5c(required(map, "x5c")?)?;
    Ok(AppleStatement { x5c })
}

pub(crate) fn process(
    ctx: &VerificationContext<'_>,
    stmt: &AppleStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    out: &mut CredAndCounterData,
) -> AttestationResult<()> {
    let credential_key = auth_data.credential_key()?;

    let cred_cert = stmt
        .x5c
        .first()
        .ok_or_else(|| AttestationError::malformed("x5c is empty"))?;

    // Apple's anonymisation CA is only known by name.
    let aaguid = auth_data.attested_credential()?.aaguid;
    let roots = ctx.roots_for_chain_issuer(&aaguid, &stmt.x5c);
    if roots.is_empty() {
        debug!("no apple trust anchors");
        return Err(AttestationError::untrusted(
            "No trust anchors for Apple attestation",
        ));
    }
    ctx.verify_chain(&stmt.x5c, &roots)?;

    // Perform SHA-256 hash of the concatenation of authenticatorData and clientDataHash to form
    // nonce, and verify it equals the value of the extension with
    // OID ( 1.2.840.113635.100.8.2 ) in credCert.
    let nonce = compute_sha256(&verification_data(auth_data, client_data_hash));
    validate_extension::<AppleAnonymousNonce>(cred_cert, &nonce)?;

    // Verify credential public key matches the Subject Public Key of credCert.
    let subject_public_key = COSEKey::try_from((credential_key.type_, cred_cert))?;
    if credential_key.key != subject_public_key.key {
        debug!("apple credential certificate does not hold the credential key");
        return Err(AttestationError::integrity("public key doesn't match"));
    }

    out.attestation_type = AttestationType::AnonCa;

    Ok(())
}
