//! Android SafetyNet attestation.
//! <https://w3c.github.io/webauthn/#sctn-android-safetynet-attestation>

use std::time::UNIX_EPOCH;

use serde_cbor_2::Value;

use super::{required, required_bytes, statement_map, verification_data};
use crate::attestation::VerificationContext;
use crate::crypto::compute_sha256;
use crate::error::{AttestationError, AttestationResult};
use crate::proto::{AttestationMetadata, AttestationType, AuthenticatorData, CredAndCounterData};
use crate::safetynet::SafetyNetResponse;

/// A structurally valid android-safetynet statement.
#[derive(Debug, Clone)]
pub struct SafetyNetStatement {
    /// The version of Google Play Services responsible for the response.
    pub ver: String,
    /// The compact JWS of the SafetyNet response.
    pub response: String,
}

pub(crate) fn parse(att_stmt: &Value) -> AttestationResult<SafetyNetStatement> {
    let map = statement_map(att_stmt)?;

    // there's only 1 version now
    let ver = cbor_try_string!(required(map, "ver")?)
        .map_err(|_| AttestationError::malformed("attStmt ver must be a text string"))?
        .clone();
    if ver.is_empty() {
        return Err(AttestationError::malformed("attStmt ver is empty"));
    }

    let response = required_bytes(map, "response")?;
    let response = String::from_utf8(response)
        .map_err(|_| AttestationError::malformed("SafetyNet response is not UTF-8"))?;

    Ok(SafetyNetStatement { ver, response })
}

fn check_timestamp(
    ctx: &VerificationContext<'_>,
    response: &SafetyNetResponse,
) -> AttestationResult<()> {
    let now_ms = ctx
        .now
        .duration_since(UNIX_EPOCH)
        .map_err(|_| AttestationError::integrity("Verification time precedes the epoch"))?
        .as_millis();
    let timestamp_ms = u128::from(response.timestamp_ms);

    if timestamp_ms > now_ms + u128::from(ctx.config.safetynet_future_tolerance_ms) {
        debug!(?timestamp_ms, ?now_ms, "safetynet response from the future");
        return Err(AttestationError::integrity(
            "SafetyNet response timestamp is in the future",
        ));
    }

    if timestamp_ms + u128::from(ctx.config.safetynet_max_age_ms) < now_ms {
        debug!(?timestamp_ms, ?now_ms, "safetynet response expired");
        return Err(AttestationError::integrity(
            "SafetyNet response timestamp is too old",
        ));
    }

    Ok(())
}

pub(crate) fn process(
    ctx: &VerificationContext<'_>,
    stmt: &SafetyNetStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    out: &mut CredAndCounterData,
) -> AttestationResult<()> {
    let acd = auth_data.attested_credential()?;
    trace!(ver = %stmt.ver);

    // Verify that response is a valid SafetyNet response of version ver.
    let roots = ctx.roots_for_aaguid(&acd.aaguid)?;
    let response = match ctx.safetynet.parse_and_verify(&stmt.response, &roots, ctx.now) {
        Ok(Some(response)) => response,
        Ok(None) => {
            debug!("safetynet verifier returned no statement");
            return Err(AttestationError::integrity("stmt is null"));
        }
        Err(e) => {
            error!(?e, "jwt safety-net error");
            return Err(e.into());
        }
    };

    // Verify that the nonce attribute in the payload of response is identical to the Base64
    // encoding of the SHA-256 hash of the concatenation of authenticatorData and clientDataHash.
    let nonce = compute_sha256(&verification_data(auth_data, client_data_hash));
    if response.nonce.0 != nonce {
        debug!("safetynet nonce mismatch");
        return Err(AttestationError::origin("SafetyNet nonce does not match"));
    }

    // Verify that the ctsProfileMatch attribute in the payload of response is true.
    if !response.cts_profile_match {
        return Err(AttestationError::integrity("False CTS Profile Match"));
    }

    check_timestamp(ctx, &response)?;

    let SafetyNetResponse {
        timestamp_ms: _,
        nonce: _,
        apk_package_name,
        apk_certificate_digest_sha256,
        cts_profile_match,
        basic_integrity,
        evaluation_type,
    } = response;

    out.attestation_type = AttestationType::Basic;
    out.metadata = AttestationMetadata::AndroidSafetyNet {
        apk_package_name,
        apk_certificate_digest_sha256: apk_certificate_digest_sha256
            .into_iter()
            .map(|d| d.to_string())
            .collect(),
        cts_profile_match,
        basic_integrity,
        evaluation_type,
    };

    Ok(())
}
