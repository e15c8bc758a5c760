//! Parsing of the binary authenticator data structure.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::IResult;

use crate::constants::*;
use crate::crypto::COSEKey;
use crate::error::{AttestationError, AttestationResult};
use crate::proto::{Aaguid, AttestedCredentialData, AuthenticatorData};

// CBOR has no framing, so decode one value and ask the deserializer how far it read.
fn cbor_parser(i: &[u8]) -> IResult<&[u8], (serde_cbor_2::Value, &[u8])> {
    let mut deserializer = serde_cbor_2::Deserializer::from_slice(i);
    let v = serde::de::Deserialize::deserialize(&mut deserializer).map_err(|e| {
        debug!(?e, "cbor_parser");
        nom::Err::Failure(nom::error::Error::new(i, nom::error::ErrorKind::Fail))
    })?;

    let len = deserializer.byte_offset();
    let (i, raw) = take(len)(i)?;
    Ok((i, (v, raw)))
}

fn acd_parser(i: &[u8]) -> IResult<&[u8], AttestedCredentialData> {
    let (i, aaguid) = take(AAGUID_LEN)(i)?;
    let (i, cred_id_len) = be_u16(i)?;
    let (i, credential_id) = take(cred_id_len as usize)(i)?;
    let (i, (credential_pk, credential_pk_bytes)) = cbor_parser(i)?;

    let mut aaguid_fixed: Aaguid = [0; AAGUID_LEN];
    aaguid_fixed.copy_from_slice(aaguid);

    Ok((
        i,
        AttestedCredentialData {
            aaguid: aaguid_fixed,
            credential_id: credential_id.to_vec(),
            credential_pk,
            credential_pk_bytes: credential_pk_bytes.to_vec(),
        },
    ))
}

type RawAuthenticatorData = (
    [u8; 32],
    u8,
    u32,
    Option<AttestedCredentialData>,
    Option<serde_cbor_2::Value>,
);

fn authenticator_data_parser(i: &[u8]) -> IResult<&[u8], RawAuthenticatorData> {
    let (i, rp_id_hash) = take(RP_ID_HASH_LEN)(i)?;
    let (i, flags) = be_u8(i)?;
    let (i, counter) = be_u32(i)?;

    let (i, acd) = if flags & FLAG_ATTESTED_CREDENTIAL_DATA != 0 {
        let (i, acd) = acd_parser(i)?;
        (i, Some(acd))
    } else {
        (i, None)
    };

    let (i, extensions) = if flags & FLAG_EXTENSION_DATA != 0 {
        let (i, (extensions, _)) = cbor_parser(i)?;
        (i, Some(extensions))
    } else {
        (i, None)
    };

    let mut rp_id_hash_fixed = [0; RP_ID_HASH_LEN];
    rp_id_hash_fixed.copy_from_slice(rp_id_hash);

    Ok((i, (rp_id_hash_fixed, flags, counter, acd, extensions)))
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = AttestationError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let (rem, (rp_id_hash, flags, counter, acd, extensions)) =
            authenticator_data_parser(data).map_err(|e| {
                debug!(?e, "authenticator_data_parser");
                AttestationError::malformed("Invalid attestation data buffer")
            })?;

        if !rem.is_empty() {
            debug!(leftover = rem.len(), "authenticator data has trailing bytes");
            return Err(AttestationError::malformed(
                "Invalid attestation data buffer: leftovers",
            ));
        }

        Ok(AuthenticatorData {
            rp_id_hash,
            flags,
            counter,
            acd,
            extensions,
            raw: data.to_vec(),
        })
    }
}

impl AuthenticatorData {
    /// The attested credential data. Registration requires it, so absence is malformed input.
    pub fn attested_credential(&self) -> AttestationResult<&AttestedCredentialData> {
        self.acd
            .as_ref()
            .ok_or_else(|| AttestationError::malformed("Missing attested credential data"))
    }

    /// The decoded credential public key.
    pub fn credential_key(&self) -> AttestationResult<COSEKey> {
        COSEKey::try_from(&self.attested_credential()?.credential_pk)
    }
}
