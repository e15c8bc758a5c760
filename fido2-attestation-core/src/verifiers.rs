//! Field checks shared by the attestation statement formats.

use base64urlsafedata::Base64UrlSafeData;

use crate::crypto::{compute_sha256, COSEAlgorithm};
use crate::error::{AttestationError, AttestationResult};
use crate::proto::AuthenticatorData;

/// Check the algorithm declared by a statement is the algorithm of the credential key.
pub fn verify_algorithm(
    statement_alg: i128,
    credential_alg: COSEAlgorithm,
) -> AttestationResult<COSEAlgorithm> {
    match COSEAlgorithm::try_from(statement_alg) {
        Ok(alg) if alg == credential_alg => Ok(alg),
        _ => {
            debug!(?statement_alg, ?credential_alg, "Wrong algorithm");
            Err(AttestationError::AlgorithmMismatch {
                statement: i64::try_from(statement_alg).unwrap_or(i64::MIN),
                credential: credential_alg.into(),
            })
        }
    }
}

/// Decode a non empty Base64 or Base64URL string.
pub fn verify_base64_string(value: &str) -> AttestationResult<Vec<u8>> {
    if value.is_empty() {
        return Err(AttestationError::malformed("Invalid data"));
    }
    Base64UrlSafeData::try_from(value)
        .map(|data| data.0)
        .map_err(|_| AttestationError::malformed("Invalid data"))
}

/// Encode bytes as unpadded Base64URL.
pub fn encode_b64url(data: &[u8]) -> String {
    Base64UrlSafeData(data.to_vec()).to_string()
}

/// The relying party id an origin implies. Origins that are not URLs are taken to be a
/// relying party id already.
pub fn effective_rp_id(origin: &str) -> String {
    match url::Url::parse(origin) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_string(),
            None => origin.to_string(),
        },
        Err(_) => origin.to_string(),
    }
}

/// Check the authenticator data is scoped to the relying party of `origin`.
pub fn verify_rp_id_hash(auth_data: &AuthenticatorData, origin: &str) -> AttestationResult<()> {
    let rp_id = effective_rp_id(origin);
    if compute_sha256(rp_id.as_bytes()) != auth_data.rp_id_hash {
        debug!(%rp_id, "rpIdHash mismatch");
        return Err(AttestationError::origin("Hashes don't match"));
    }
    Ok(())
}

/// Authenticators without a model identity, such as U2F devices, report an all zero AAGUID.
pub fn verify_aaguid_zeroed(auth_data: &AuthenticatorData) -> AttestationResult<()> {
    if auth_data
        .attested_credential()?
        .aaguid
        .iter()
        .all(|b| *b == 0)
    {
        Ok(())
    } else {
        Err(AttestationError::malformed("Invalid AAGUID"))
    }
}

/// Check the user present flag is set.
pub fn verify_user_present(auth_data: &AuthenticatorData) -> AttestationResult<()> {
    if auth_data.user_present() {
        Ok(())
    } else {
        Err(AttestationError::integrity("User not present"))
    }
}
