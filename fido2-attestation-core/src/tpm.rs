//! TPM 2.0 structures carried by the `tpm` attestation format.
//! <https://trustedcomputinggroup.org/wp-content/uploads/TPM-Rev-2.0-Part-2-Structures-01.38.pdf>

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32, be_u64, be_u8};
use nom::IResult;
use openssl::hash;

use crate::error::{AttestationError, AttestationResult};

/// TPM_ALG_ID values this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmAlgId {
    /// TPM_ALG_RSA
    Rsa,
    /// TPM_ALG_SHA1
    Sha1,
    /// TPM_ALG_SHA256
    Sha256,
    /// TPM_ALG_SHA384
    Sha384,
    /// TPM_ALG_SHA512
    Sha512,
    /// TPM_ALG_NULL
    Null,
    /// TPM_ALG_ECC
    Ecc,
    /// Any other algorithm
    Other(u16),
}

impl From<u16> for TpmAlgId {
    fn from(v: u16) -> Self {
        match v {
            0x0001 => TpmAlgId::Rsa,
            0x0004 => TpmAlgId::Sha1,
            0x000B => TpmAlgId::Sha256,
            0x000C => TpmAlgId::Sha384,
            0x000D => TpmAlgId::Sha512,
            0x0010 => TpmAlgId::Null,
            0x0023 => TpmAlgId::Ecc,
            v => TpmAlgId::Other(v),
        }
    }
}

impl From<TpmAlgId> for u16 {
    fn from(alg: TpmAlgId) -> u16 {
        match alg {
            TpmAlgId::Rsa => 0x0001,
            TpmAlgId::Sha1 => 0x0004,
            TpmAlgId::Sha256 => 0x000B,
            TpmAlgId::Sha384 => 0x000C,
            TpmAlgId::Sha512 => 0x000D,
            TpmAlgId::Null => 0x0010,
            TpmAlgId::Ecc => 0x0023,
            TpmAlgId::Other(v) => v,
        }
    }
}

impl TpmAlgId {
    fn message_digest(self) -> Option<hash::MessageDigest> {
        match self {
            TpmAlgId::Sha1 => Some(hash::MessageDigest::sha1()),
            TpmAlgId::Sha256 => Some(hash::MessageDigest::sha256()),
            TpmAlgId::Sha384 => Some(hash::MessageDigest::sha384()),
            TpmAlgId::Sha512 => Some(hash::MessageDigest::sha512()),
            _ => None,
        }
    }
}

/// TPM_ECC_CURVE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmiEccCurve {
    /// TPM_ECC_NIST_P256
    NistP256,
    /// TPM_ECC_NIST_P384
    NistP384,
    /// TPM_ECC_NIST_P521
    NistP521,
    /// Any other curve
    Other(u16),
}

impl From<u16> for TpmiEccCurve {
    fn from(v: u16) -> Self {
        match v {
            0x0003 => TpmiEccCurve::NistP256,
            0x0004 => TpmiEccCurve::NistP384,
            0x0005 => TpmiEccCurve::NistP521,
            v => TpmiEccCurve::Other(v),
        }
    }
}

/// TPMS_CLOCK_INFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsClockInfo {
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: bool,
}

/// TPMS_ATTEST, restricted to the TPMS_CERTIFY_INFO body webauthn uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    pub magic: u32,
    pub type_: u16,
    pub qualified_signer: Vec<u8>,
    pub extra_data: Vec<u8>,
    pub clock_info: TpmsClockInfo,
    pub firmware_version: u64,
    /// TPMS_CERTIFY_INFO.name
    pub name: Vec<u8>,
    /// TPMS_CERTIFY_INFO.qualifiedName
    pub qualified_name: Vec<u8>,
}

/// TPMS_RSA_PARMS / TPMS_ECC_PARMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicParms {
    Rsa {
        symmetric: TpmAlgId,
        scheme: TpmAlgId,
        key_bits: u16,
        /// Zero selects the default exponent 65537.
        exponent: u32,
    },
    Ecc {
        symmetric: TpmAlgId,
        scheme: TpmAlgId,
        curve_id: TpmiEccCurve,
        kdf: TpmAlgId,
    },
}

/// TPMU_PUBLIC_ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicId {
    Rsa(Vec<u8>),
    Ecc { x: Vec<u8>, y: Vec<u8> },
}

/// TPMT_PUBLIC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    pub type_: TpmAlgId,
    pub name_alg: TpmAlgId,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub parameters: TpmuPublicParms,
    pub unique: TpmuPublicId,
}

fn tpm2b_parser(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (i, size) = be_u16(i)?;
    let (i, data) = take(size as usize)(i)?;
    Ok((i, data.to_vec()))
}

fn alg_parser(i: &[u8]) -> IResult<&[u8], TpmAlgId> {
    let (i, v) = be_u16(i)?;
    Ok((i, TpmAlgId::from(v)))
}

fn clock_info_parser(i: &[u8]) -> IResult<&[u8], TpmsClockInfo> {
    let (i, clock) = be_u64(i)?;
    let (i, reset_count) = be_u32(i)?;
    let (i, restart_count) = be_u32(i)?;
    let (i, safe) = be_u8(i)?;
    Ok((
        i,
        TpmsClockInfo {
            clock,
            reset_count,
            restart_count,
            safe: safe != 0,
        },
    ))
}

fn tpmsattest_parser(i: &[u8]) -> IResult<&[u8], TpmsAttest> {
    let (i, magic) = be_u32(i)?;
    let (i, type_) = be_u16(i)?;
    let (i, qualified_signer) = tpm2b_parser(i)?;
    let (i, extra_data) = tpm2b_parser(i)?;
    let (i, clock_info) = clock_info_parser(i)?;
    let (i, firmware_version) = be_u64(i)?;
    let (i, name) = tpm2b_parser(i)?;
    let (i, qualified_name) = tpm2b_parser(i)?;

    Ok((
        i,
        TpmsAttest {
            magic,
            type_,
            qualified_signer,
            extra_data,
            clock_info,
            firmware_version,
            name,
            qualified_name,
        },
    ))
}

// TPMT_SYM_DEF_OBJECT: an algorithm, then key bits and mode unless it is NULL.
fn symmetric_parser(i: &[u8]) -> IResult<&[u8], TpmAlgId> {
    let (i, alg) = alg_parser(i)?;
    if alg == TpmAlgId::Null {
        Ok((i, alg))
    } else {
        let (i, _key_bits) = be_u16(i)?;
        let (i, _mode) = be_u16(i)?;
        Ok((i, alg))
    }
}

// TPMT_*_SCHEME: a scheme, then its hash algorithm unless it is NULL.
fn scheme_parser(i: &[u8]) -> IResult<&[u8], TpmAlgId> {
    let (i, alg) = alg_parser(i)?;
    if alg == TpmAlgId::Null {
        Ok((i, alg))
    } else {
        let (i, _hash_alg) = be_u16(i)?;
        Ok((i, alg))
    }
}

fn tpmtpublic_parser(i: &[u8]) -> IResult<&[u8], TpmtPublic> {
    let (i, type_) = alg_parser(i)?;
    let (i, name_alg) = alg_parser(i)?;
    let (i, object_attributes) = be_u32(i)?;
    let (i, auth_policy) = tpm2b_parser(i)?;

    let (i, parameters, unique) = match type_ {
        TpmAlgId::Rsa => {
            let (i, symmetric) = symmetric_parser(i)?;
            let (i, scheme) = scheme_parser(i)?;
            let (i, key_bits) = be_u16(i)?;
            let (i, exponent) = be_u32(i)?;
            let (i, n) = tpm2b_parser(i)?;
            (
                i,
                TpmuPublicParms::Rsa {
                    symmetric,
                    scheme,
                    key_bits,
                    exponent,
                },
                TpmuPublicId::Rsa(n),
            )
        }
        TpmAlgId::Ecc => {
            let (i, symmetric) = symmetric_parser(i)?;
            let (i, scheme) = scheme_parser(i)?;
            let (i, curve_id) = be_u16(i)?;
            let (i, kdf) = scheme_parser(i)?;
            let (i, x) = tpm2b_parser(i)?;
            let (i, y) = tpm2b_parser(i)?;
            (
                i,
                TpmuPublicParms::Ecc {
                    symmetric,
                    scheme,
                    curve_id: TpmiEccCurve::from(curve_id),
                    kdf,
                },
                TpmuPublicId::Ecc { x, y },
            )
        }
        _ => {
            return Err(nom::Err::Failure(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Switch,
            )))
        }
    };

    Ok((
        i,
        TpmtPublic {
            type_,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
            unique,
        },
    ))
}

fn parse_complete<'a, T>(
    what: &str,
    data: &'a [u8],
    parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T>,
) -> AttestationResult<T> {
    let (rem, value) = parser(data).map_err(|e| {
        debug!(?e, "{} parser", what);
        AttestationError::malformed(format!("Invalid {what} structure: {e}"))
    })?;
    if !rem.is_empty() {
        return Err(AttestationError::malformed(format!(
            "Invalid {what} structure: {} trailing bytes",
            rem.len()
        )));
    }
    Ok(value)
}

impl TryFrom<&[u8]> for TpmsAttest {
    type Error = AttestationError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        parse_complete("certInfo", data, tpmsattest_parser)
    }
}

impl TryFrom<&[u8]> for TpmtPublic {
    type Error = AttestationError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        parse_complete("pubArea", data, tpmtpublic_parser)
    }
}

/// The TPM Name of a public area: `nameAlg || H_nameAlg(pubArea)`.
pub(crate) fn tpm_name(name_alg: TpmAlgId, pub_area_bytes: &[u8]) -> AttestationResult<Vec<u8>> {
    let digest = name_alg.message_digest().ok_or_else(|| {
        AttestationError::UnsupportedFeature(format!("TPM name algorithm {name_alg:?}"))
    })?;
    let h = hash::hash(digest, pub_area_bytes)?;
    Ok(u16::from(name_alg)
        .to_be_bytes()
        .iter()
        .chain(h.iter())
        .copied()
        .collect())
}
