//! Byte layouts, flag bits and object identifiers used throughout attestation processing.

use der_parser::oid::Oid;

/// User Present
pub const FLAG_USER_PRESENT: u8 = 0x01;
/// User Verified
pub const FLAG_USER_VERIFIED: u8 = 0x04;
/// Attested credential data included
pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
/// Extension data included
pub const FLAG_EXTENSION_DATA: u8 = 0x80;

pub(crate) const RP_ID_HASH_LEN: usize = 32;
pub(crate) const AAGUID_LEN: usize = 16;

// id-fido-gen-ce-aaguid
pub(crate) const OID_FIDO_GEN_CE_AAGUID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);
pub(crate) const OID_APPLE_NONCE: Oid<'static> = der_parser::oid!(1.2.840 .113635 .100 .8 .2);
pub(crate) const OID_ANDROID_KEY_DESCRIPTION: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);
// tcg-kp-AIKCertificate
pub(crate) const OID_TCG_KP_AIK_CERTIFICATE: Oid<'static> = der_parser::oid!(2.23.133 .8 .3);

pub(crate) const PACKED_SUBJECT_OU: &str = "Authenticator Attestation";
pub(crate) const SAFETYNET_HOSTNAME: &str = "attest.android.com";

pub(crate) const TPM_VERSION: &str = "2.0";
pub(crate) const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub(crate) const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;
pub(crate) const TPM_RSA_DEFAULT_EXPONENT: u32 = 65537;

/// Default largest age of a SafetyNet response.
pub const SAFETYNET_MAX_AGE_MS: u64 = 60_000;
/// Default clock skew allowed for SafetyNet responses from the future.
pub const SAFETYNET_FUTURE_TOLERANCE_MS: u64 = 1_000;
