//! No attestation.
//! <https://w3c.github.io/webauthn/#sctn-none-attestation>

use serde_cbor_2::Value;

use super::statement_map;
use crate::error::{AttestationError, AttestationResult};
use crate::proto::{AttestationType, AuthenticatorData, CredAndCounterData};

pub(crate) fn parse(att_stmt: &Value) -> AttestationResult<()> {
    let map = statement_map(att_stmt)?;
    if !map.is_empty() {
        debug!(fields = map.len(), "none attestation with a statement");
        return Err(AttestationError::malformed("Problem with None attestation"));
    }
    Ok(())
}

pub(crate) fn process(
    auth_data: &AuthenticatorData,
    out: &mut CredAndCounterData,
) -> AttestationResult<()> {
    // The credential must still decode, there is nothing else to check.
    auth_data.credential_key()?;
    out.attestation_type = AttestationType::None;
    Ok(())
}
