//! x509 certificate extensions are validated during attestation by checking that the value of
//! the extension is equal to some other value.

use der_parser::oid::Oid;
use openssl::x509;
use uuid::Uuid;

use crate::constants::*;
use crate::error::{AttestationError, AttestationResult};
use crate::proto::{Aaguid, AttestationMetadata};

/// An x509 extension whose value binds the certificate to the registration.
pub trait AttestationX509Extension {
    /// the type of the value in the certificate extension
    type Output: Eq;

    /// the oid of the extension
    const OID: Oid<'static>;

    /// if `true`, then validating this certificate fails if this extension is
    /// missing
    const IS_REQUIRED: bool;

    /// how to parse the value out of the certificate extension
    fn parse(i: &[u8]) -> der_parser::error::BerResult<(Self::Output, AttestationMetadata)>;

    /// what error to return if the value in the extension is not the expected one
    fn validation_error() -> AttestationError;
}

/// The Fido AAGUID x509 extension
pub struct FidoGenCeAaguid;

/// The Apple anonymous attestation nonce extension
pub struct AppleAnonymousNonce;

/// The Android key attestation description extension
pub struct AndroidKeyAttestationExtensionData;

impl AttestationX509Extension for FidoGenCeAaguid {
    type Output = Aaguid;

    const OID: Oid<'static> = OID_FIDO_GEN_CE_AAGUID;

    const IS_REQUIRED: bool = false;

    fn parse(i: &[u8]) -> der_parser::error::BerResult<(Self::Output, AttestationMetadata)> {
        let (rem, aaguid) = der_parser::der::parse_der_octetstring(i)?;
        let aaguid: Aaguid = aaguid
            .as_slice()?
            .try_into()
            .map_err(|_| der_parser::error::BerError::InvalidLength)?;

        Ok((
            rem,
            (
                aaguid,
                AttestationMetadata::Packed {
                    aaguid: Uuid::from_bytes(aaguid),
                },
            ),
        ))
    }

    fn validation_error() -> AttestationError {
        AttestationError::integrity("Attestation certificate AAGUID does not match")
    }
}

impl AttestationX509Extension for AppleAnonymousNonce {
    type Output = [u8; 32];

    const OID: Oid<'static> = OID_APPLE_NONCE;

    const IS_REQUIRED: bool = true;

    fn parse(i: &[u8]) -> der_parser::error::BerResult<(Self::Output, AttestationMetadata)> {
        use der_parser::{der::*, error::BerError};
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let (i, tagged_nonce) = parse_der_tagged_explicit(1, parse_der_octetstring)(i)?;
            let (class, _tag, nonce) = tagged_nonce.as_tagged()?;
            if class != Class::ContextSpecific {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let nonce = nonce
                .as_slice()?
                .try_into()
                .map_err(|_| BerError::InvalidLength)?;
            Ok((i, (nonce, AttestationMetadata::None)))
        })(i)
    }

    fn validation_error() -> AttestationError {
        AttestationError::origin("extension does not match nonce")
    }
}

pub(crate) mod android_key_attestation {
    use der_parser::der::*;
    use der_parser::error::{BerError, BerResult};

    use crate::proto::{AttestationMetadata, SecurityLevel};

    pub const KM_ORIGIN_GENERATED: u32 = 0;
    pub const KM_PURPOSE_SIGN: u32 = 2;

    const KM_TAG_PURPOSE: u32 = 1;
    const KM_TAG_ALL_APPLICATIONS: u32 = 600;
    const KM_TAG_ORIGIN: u32 = 702;

    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct AuthorizationList {
        pub all_applications: bool,
        pub origin: Option<u32>,
        pub purpose: Vec<u32>,
    }

    // One element of an AuthorizationList: the explicit context tag and the wrapped TLV.
    fn tagged_element<'a>(i: &'a [u8]) -> BerResult<'a, (u32, &'a [u8])> {
        parse_der_container(|content: &'a [u8], hdr: Header<'a>| {
            Ok((&content[content.len()..], (hdr.tag().0, content)))
        })(i)
    }

    impl AuthorizationList {
        pub fn parse(i: &[u8]) -> BerResult<Self> {
            parse_der_container(|mut i: &[u8], hdr: Header| {
                if hdr.tag() != Tag::Sequence {
                    return Err(nom::Err::Error(BerError::BerTypeError));
                }

                let mut al = AuthorizationList::default();

                while !i.is_empty() {
                    let (rem, (tag, content)) = tagged_element(i)?;
                    match tag {
                        KM_TAG_ALL_APPLICATIONS => al.all_applications = true,
                        KM_TAG_ORIGIN => {
                            let (_, origin) = parse_der_integer(content)?;
                            al.origin = Some(origin.as_u32()?);
                        }
                        KM_TAG_PURPOSE => {
                            let (_, purposes) = parse_der_set(content)?;
                            for purpose in purposes.as_set()? {
                                al.purpose.push(purpose.as_u32()?);
                            }
                        }
                        _ => {}
                    }
                    i = rem;
                }

                Ok((i, al))
            })(i)
        }
    }

    fn security_level(level: u32) -> Result<SecurityLevel, BerError> {
        match level {
            0 => Ok(SecurityLevel::Software),
            1 => Ok(SecurityLevel::TrustedEnvironment),
            2 => Ok(SecurityLevel::StrongBox),
            _ => Err(BerError::InvalidTag),
        }
    }

    /// Parse a KeyDescription, returning the attestation challenge.
    pub fn parse(i: &[u8]) -> BerResult<(Vec<u8>, AttestationMetadata)> {
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let (i, attestation_version) = parse_der_integer(i)?;
            let attestation_version = attestation_version.as_i64()?;

            let (i, attest_sec_level) = parse_der_enum(i)?;
            let attestation_security_level = security_level(attest_sec_level.as_u32()?)?;
            let (i, keymaster_version) = parse_der_integer(i)?;
            let keymaster_version = keymaster_version.as_i64()?;
            let (i, km_sec_level) = parse_der_enum(i)?;
            let keymaster_security_level = security_level(km_sec_level.as_u32()?)?;

            let (i, attestation_challenge) = parse_der_octetstring(i)?;
            let attestation_challenge = attestation_challenge.as_slice()?.to_vec();

            let (i, _unique_id) = parse_der_octetstring(i)?;

            let (i, software_enforced) = AuthorizationList::parse(i)?;
            let (i, tee_enforced) = AuthorizationList::parse(i)?;

            // ensure it is origin bound
            if software_enforced.all_applications || tee_enforced.all_applications {
                return Err(BerError::InvalidValue {
                    tag: Tag(KM_TAG_ALL_APPLICATIONS),
                    msg: "all_applications must not be set".to_string(),
                })?;
            }

            // The key must have been generated on the device, for signing. Either list may
            // carry these, so check the union.
            let origin = tee_enforced.origin.or(software_enforced.origin);
            if origin != Some(KM_ORIGIN_GENERATED) {
                return Err(BerError::InvalidValue {
                    tag: Tag(KM_TAG_ORIGIN),
                    msg: "key was not generated by the keystore".to_string(),
                })?;
            }

            let signs = tee_enforced
                .purpose
                .iter()
                .chain(software_enforced.purpose.iter())
                .any(|p| *p == KM_PURPOSE_SIGN);
            if !signs {
                return Err(BerError::InvalidValue {
                    tag: Tag(KM_TAG_PURPOSE),
                    msg: "key purpose does not include sign".to_string(),
                })?;
            }

            let metadata = AttestationMetadata::AndroidKey {
                attestation_version,
                attestation_security_level,
                keymaster_version,
                keymaster_security_level,
            };

            Ok((i, (attestation_challenge, metadata)))
        })(i)
    }
}

impl AttestationX509Extension for AndroidKeyAttestationExtensionData {
    type Output = Vec<u8>;

    const OID: Oid<'static> = OID_ANDROID_KEY_DESCRIPTION;

    const IS_REQUIRED: bool = true;

    fn parse(i: &[u8]) -> der_parser::error::BerResult<(Self::Output, AttestationMetadata)> {
        android_key_attestation::parse(i)
    }

    fn validation_error() -> AttestationError {
        AttestationError::origin("Attestation challenge does not match client data hash")
    }
}

/// Validate an x509 extension is present in an x509 certificate, and holds `data`.
pub fn validate_extension<T>(
    x509: &x509::X509,
    data: &<T as AttestationX509Extension>::Output,
) -> AttestationResult<AttestationMetadata>
where
    T: AttestationX509Extension,
{
    let der_bytes = x509.to_der()?;
    x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| AttestationError::malformed("x5c certificate could not be parsed"))?
        .1
        .extensions()
        .iter()
        .find_map(|extension| {
            (extension.oid == T::OID).then(|| {
                T::parse(extension.value)
                    .map_err(|e| {
                        debug!(?e, oid = %T::OID, "invalid extension");
                        AttestationError::malformed(format!("Invalid extension {}", T::OID))
                    })
                    .and_then(|(_, (output, metadata))| {
                        if &output == data {
                            Ok(metadata)
                        } else {
                            Err(T::validation_error())
                        }
                    })
            })
        })
        .unwrap_or_else(|| {
            if T::IS_REQUIRED {
                Err(AttestationError::malformed(format!(
                    "Missing extension {}",
                    T::OID
                )))
            } else {
                Ok(AttestationMetadata::None)
            }
        })
}
