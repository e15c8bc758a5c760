//! Cryptographic operation wrapper for attestation verification. This module exists to
//! allow ease of auditing, safe operation wrappers, and cryptographic provider abstraction.
//! This module uses OpenSSL as the cryptographic primitive provider.

#![allow(non_camel_case_types)]

use openssl::{bn, ec, hash, nid, pkey, rsa, sha, sign, x509};
use serde::{Deserialize, Serialize};
use x509_parser::extensions::ParsedExtension;

use crate::constants::*;
use crate::error::{AttestationError, AttestationResult};

/// A COSE signature algorithm identifier.
/// <https://www.iana.org/assignments/cose/cose.xhtml#algorithms>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum COSEAlgorithm {
    /// ECDSA with SHA-256
    ES256 = -7,
    /// ECDSA with SHA-384
    ES384 = -35,
    /// ECDSA with SHA-512
    ES512 = -36,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256 = -257,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384 = -258,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512 = -259,
    /// RSASSA-PSS with SHA-256
    PS256 = -37,
    /// RSASSA-PSS with SHA-384
    PS384 = -38,
    /// RSASSA-PSS with SHA-512
    PS512 = -39,
    /// EdDSA
    EDDSA = -8,
    /// RSASSA-PKCS1-v1_5 with SHA-1. Recognised so it can be refused by name.
    INSECURE_RS1 = -65535,
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = AttestationError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            -257 => Ok(COSEAlgorithm::RS256),
            -258 => Ok(COSEAlgorithm::RS384),
            -259 => Ok(COSEAlgorithm::RS512),
            -37 => Ok(COSEAlgorithm::PS256),
            -38 => Ok(COSEAlgorithm::PS384),
            -39 => Ok(COSEAlgorithm::PS512),
            -8 => Ok(COSEAlgorithm::EDDSA),
            -65535 => Ok(COSEAlgorithm::INSECURE_RS1),
            _ => Err(AttestationError::malformed(format!(
                "Unknown COSE algorithm {i}"
            ))),
        }
    }
}

impl From<COSEAlgorithm> for i64 {
    fn from(alg: COSEAlgorithm) -> i64 {
        alg as i64
    }
}

impl COSEAlgorithm {
    fn is_pss(self) -> bool {
        matches!(
            self,
            COSEAlgorithm::PS256 | COSEAlgorithm::PS384 | COSEAlgorithm::PS512
        )
    }

    fn message_digest(self) -> AttestationResult<hash::MessageDigest> {
        match self {
            COSEAlgorithm::ES256 | COSEAlgorithm::RS256 | COSEAlgorithm::PS256 => {
                Ok(hash::MessageDigest::sha256())
            }
            COSEAlgorithm::ES384 | COSEAlgorithm::RS384 | COSEAlgorithm::PS384 => {
                Ok(hash::MessageDigest::sha384())
            }
            COSEAlgorithm::ES512 | COSEAlgorithm::RS512 | COSEAlgorithm::PS512 => {
                Ok(hash::MessageDigest::sha512())
            }
            COSEAlgorithm::INSECURE_RS1 => {
                warn!("INSECURE SHA1 USAGE DETECTED");
                Err(AttestationError::UnsupportedFeature(
                    "SHA-1 signatures are not accepted".to_string(),
                ))
            }
            COSEAlgorithm::EDDSA => Err(AttestationError::UnsupportedFeature(
                "EdDSA has no separate digest".to_string(),
            )),
        }
    }
}

/// An ECDSA curve identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ECDSACurve {
    // +---------+-------+----------+------------------------------------+
    // | Name    | Value | Key Type | Description                        |
    // +---------+-------+----------+------------------------------------+
    // | P-256   | 1     | EC2      | NIST P-256 also known as secp256r1 |
    // | P-384   | 2     | EC2      | NIST P-384 also known as secp384r1 |
    // | P-521   | 3     | EC2      | NIST P-521 also known as secp521r1 |
    // +---------+-------+----------+------------------------------------+
    /// Identifies this curve as SECP256R1 (X9_62_PRIME256V1 in OpenSSL)
    SECP256R1 = 1,
    /// Identifies this curve as SECP384R1
    SECP384R1 = 2,
    /// Identifies this curve as SECP521R1
    SECP521R1 = 3,
}

impl TryFrom<i128> for ECDSACurve {
    type Error = AttestationError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(AttestationError::malformed(format!("Unknown EC curve {i}"))),
        }
    }
}

impl ECDSACurve {
    fn to_openssl_nid(self) -> nid::Nid {
        match self {
            ECDSACurve::SECP256R1 => nid::Nid::X9_62_PRIME256V1,
            ECDSACurve::SECP384R1 => nid::Nid::SECP384R1,
            ECDSACurve::SECP521R1 => nid::Nid::SECP521R1,
        }
    }

    fn from_openssl_nid(nid: nid::Nid) -> Option<Self> {
        match nid {
            nid::Nid::X9_62_PRIME256V1 => Some(ECDSACurve::SECP256R1),
            nid::Nid::SECP384R1 => Some(ECDSACurve::SECP384R1),
            nid::Nid::SECP521R1 => Some(ECDSACurve::SECP521R1),
            _ => None,
        }
    }

    /// The size of a single affine coordinate in bytes.
    pub fn coordinate_size(self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }
}

/// An EdDSA curve identifier. Only Ed25519 is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EDDSACurve {
    /// Identifies this OKP as ED25519
    ED25519 = 6,
}

/// A COSE Elliptic Curve public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEEC2Key {
    /// The curve that this key references.
    pub curve: ECDSACurve,
    /// The key's public X coordinate.
    pub x: Vec<u8>,
    /// The key's public Y coordinate.
    pub y: Vec<u8>,
}

/// A COSE RSA public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSERSAKey {
    /// An RSA modulus, without leading zero bytes.
    pub n: Vec<u8>,
    /// An RSA exponent, without leading zero bytes.
    pub e: Vec<u8>,
}

/// A COSE Octet Key Pair public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEOKPKey {
    /// The curve that this key references.
    pub curve: EDDSACurve,
    /// The public key bytes.
    pub x: Vec<u8>,
}

/// The type of key contained within a COSE value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEKeyType {
    /// Identifies this as an Elliptic Curve EC2 key
    EC_EC2(COSEEC2Key),
    /// Identifies this as an RSA key
    RSA(COSERSAKey),
    /// Identifies this as an Octet Key Pair
    EC_OKP(COSEOKPKey),
}

/// COSE `kty` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum COSEKeyTypeId {
    /// Octet Key Pair
    EC_OKP = 1,
    /// Elliptic Curve with x and y
    EC_EC2 = 2,
    /// RSA
    EC_RSA = 3,
}

/// A COSE public key together with the algorithm it is used with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEKey {
    /// The algorithm this key signs with.
    pub type_: COSEAlgorithm,
    /// The public key.
    pub key: COSEKeyType,
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

impl TryFrom<&serde_cbor_2::Value> for COSEKey {
    type Error = AttestationError;

    fn try_from(d: &serde_cbor_2::Value) -> Result<COSEKey, Self::Error> {
        let m = cbor_try_map!(d)?;

        // See also https://tools.ietf.org/html/rfc8152#section-3.1
        //  1: kty, 3: alg, and negative labels are per key type.
        let key_type_value = m
            .get(&serde_cbor_2::Value::Integer(1))
            .ok_or_else(|| AttestationError::malformed("COSE key missing kty"))?;
        let key_type = cbor_try_i128!(key_type_value)?;

        let content_type_value = m
            .get(&serde_cbor_2::Value::Integer(3))
            .ok_or_else(|| AttestationError::malformed("COSE key missing alg"))?;
        let type_ = cbor_try_i128!(content_type_value).and_then(COSEAlgorithm::try_from)?;

        let label_bytes = |label: i128| -> AttestationResult<&Vec<u8>> {
            m.get(&serde_cbor_2::Value::Integer(label))
                .ok_or_else(|| AttestationError::malformed(format!("COSE key missing {label}")))
                .and_then(|v| cbor_try_bytes!(v))
        };

        let key = if key_type == COSEKeyTypeId::EC_EC2 as i128
            && matches!(
                type_,
                COSEAlgorithm::ES256 | COSEAlgorithm::ES384 | COSEAlgorithm::ES512
            ) {
            let curve_type_value = m
                .get(&serde_cbor_2::Value::Integer(-1))
                .ok_or_else(|| AttestationError::malformed("COSE key missing crv"))?;
            let curve = cbor_try_i128!(curve_type_value).and_then(ECDSACurve::try_from)?;

            let x = label_bytes(-2)?;
            let y = label_bytes(-3)?;

            let coord_len = curve.coordinate_size();
            if x.len() != coord_len || y.len() != coord_len {
                return Err(AttestationError::malformed("COSE EC2 coordinates invalid"));
            }

            COSEKeyType::EC_EC2(COSEEC2Key {
                curve,
                x: x.clone(),
                y: y.clone(),
            })
        } else if key_type == COSEKeyTypeId::EC_RSA as i128
            && matches!(
                type_,
                COSEAlgorithm::RS256
                    | COSEAlgorithm::RS384
                    | COSEAlgorithm::RS512
                    | COSEAlgorithm::PS256
                    | COSEAlgorithm::PS384
                    | COSEAlgorithm::PS512
                    | COSEAlgorithm::INSECURE_RS1
            )
        {
            let n = strip_leading_zeros(label_bytes(-1)?);
            let e = strip_leading_zeros(label_bytes(-2)?);

            if n.is_empty() || e.is_empty() {
                return Err(AttestationError::malformed("COSE RSA parameters invalid"));
            }

            COSEKeyType::RSA(COSERSAKey { n, e })
        } else if key_type == COSEKeyTypeId::EC_OKP as i128 && type_ == COSEAlgorithm::EDDSA {
            let curve_type_value = m
                .get(&serde_cbor_2::Value::Integer(-1))
                .ok_or_else(|| AttestationError::malformed("COSE key missing crv"))?;
            let curve = match cbor_try_i128!(curve_type_value)? {
                6 => EDDSACurve::ED25519,
                c => {
                    return Err(AttestationError::malformed(format!(
                        "Unsupported OKP curve {c}"
                    )))
                }
            };

            let x = label_bytes(-2)?;
            if x.len() != 32 {
                return Err(AttestationError::malformed("COSE OKP key invalid"));
            }

            COSEKeyType::EC_OKP(COSEOKPKey {
                curve,
                x: x.clone(),
            })
        } else {
            debug!(?key_type, ?type_, "COSE key type and algorithm disagree");
            return Err(AttestationError::malformed("COSE key type invalid"));
        };

        let cose_key = COSEKey { type_, key };

        // The rfc additionally states:
        //   "   Applications MUST check that the curve and the key type are
        //     consistent and reject a key if they are not."
        // this means feeding the values to openssl to validate them for us!
        cose_key.validate()?;
        Ok(cose_key)
    }
}

impl TryFrom<(COSEAlgorithm, &x509::X509)> for COSEKey {
    type Error = AttestationError;

    fn try_from((alg, certificate): (COSEAlgorithm, &x509::X509)) -> Result<COSEKey, Self::Error> {
        let public_key = certificate.public_key()?;

        let key = match alg {
            COSEAlgorithm::ES256 | COSEAlgorithm::ES384 | COSEAlgorithm::ES512 => {
                let ec_key = public_key.ec_key().map_err(|_| {
                    AttestationError::integrity("certificate key is not an EC key")
                })?;
                let curve = ec_key
                    .group()
                    .curve_name()
                    .and_then(ECDSACurve::from_openssl_nid)
                    .ok_or_else(|| AttestationError::integrity("certificate curve unsupported"))?;

                let mut ctx = bn::BigNumContext::new()?;
                let mut xbn = bn::BigNum::new()?;
                let mut ybn = bn::BigNum::new()?;
                ec_key.public_key().affine_coordinates_gfp(
                    ec_key.group(),
                    &mut xbn,
                    &mut ybn,
                    &mut ctx,
                )?;

                let coord_len = curve.coordinate_size() as i32;
                COSEKeyType::EC_EC2(COSEEC2Key {
                    curve,
                    x: xbn.to_vec_padded(coord_len)?,
                    y: ybn.to_vec_padded(coord_len)?,
                })
            }
            COSEAlgorithm::RS256
            | COSEAlgorithm::RS384
            | COSEAlgorithm::RS512
            | COSEAlgorithm::PS256
            | COSEAlgorithm::PS384
            | COSEAlgorithm::PS512
            | COSEAlgorithm::INSECURE_RS1 => {
                let rsa = public_key.rsa().map_err(|_| {
                    AttestationError::integrity("certificate key is not an RSA key")
                })?;
                COSEKeyType::RSA(COSERSAKey {
                    n: rsa.n().to_vec(),
                    e: rsa.e().to_vec(),
                })
            }
            COSEAlgorithm::EDDSA => {
                if public_key.id() != pkey::Id::ED25519 {
                    return Err(AttestationError::integrity(
                        "certificate key is not an Ed25519 key",
                    ));
                }
                COSEKeyType::EC_OKP(COSEOKPKey {
                    curve: EDDSACurve::ED25519,
                    x: public_key.raw_public_key()?,
                })
            }
        };

        Ok(COSEKey { type_: alg, key })
    }
}

impl COSEKey {
    /// The raw ANSI X9.62 uncompressed point `0x04 || x || y` of an EC2 key.
    pub(crate) fn get_alg_key_ecc_x962_raw(&self) -> AttestationResult<Vec<u8>> {
        match &self.key {
            COSEKeyType::EC_EC2(ecpk) => {
                let r: [u8; 1] = [0x04];
                Ok(r.iter()
                    .chain(ecpk.x.iter())
                    .chain(ecpk.y.iter())
                    .copied()
                    .collect())
            }
            _ => {
                debug!("get_alg_key_ecc_x962_raw");
                Err(AttestationError::malformed("credential key is not an EC2 key"))
            }
        }
    }

    pub(crate) fn validate(&self) -> AttestationResult<()> {
        self.get_openssl_pkey().map(|_| ())
    }

    fn get_openssl_pkey(&self) -> AttestationResult<pkey::PKey<pkey::Public>> {
        match &self.key {
            COSEKeyType::EC_EC2(ec2k) => {
                let ec_group = ec::EcGroup::from_curve_name(ec2k.curve.to_openssl_nid())?;
                let xbn = bn::BigNum::from_slice(&ec2k.x)?;
                let ybn = bn::BigNum::from_slice(&ec2k.y)?;

                let ec_key = ec::EcKey::from_public_key_affine_coordinates(&ec_group, &xbn, &ybn)
                    .map_err(|e| {
                        debug!(?e, "EC point not on curve");
                        AttestationError::malformed("COSE EC2 point invalid")
                    })?;
                ec_key
                    .check_key()
                    .map_err(|_| AttestationError::malformed("COSE EC2 point invalid"))?;

                Ok(pkey::PKey::from_ec_key(ec_key)?)
            }
            COSEKeyType::RSA(rsak) => {
                let n = bn::BigNum::from_slice(&rsak.n)?;
                let e = bn::BigNum::from_slice(&rsak.e)?;
                let rsa_key = rsa::Rsa::from_public_components(n, e)?;
                Ok(pkey::PKey::from_rsa(rsa_key)?)
            }
            COSEKeyType::EC_OKP(edk) => match edk.curve {
                EDDSACurve::ED25519 => {
                    pkey::PKey::public_key_from_raw_bytes(&edk.x, pkey::Id::ED25519)
                        .map_err(|_| AttestationError::malformed("COSE OKP key invalid"))
                }
            },
        }
    }

    /// Verifies data was signed with this [COSEKey].
    pub fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> AttestationResult<bool> {
        let pkey = self.get_openssl_pkey()?;
        verify_pkey_signature(self.type_, &pkey, signature, verification_data)
    }
}

fn verify_pkey_signature(
    alg: COSEAlgorithm,
    pkey: &pkey::PKeyRef<pkey::Public>,
    signature: &[u8],
    verification_data: &[u8],
) -> AttestationResult<bool> {
    if alg == COSEAlgorithm::EDDSA {
        let mut verifier = sign::Verifier::new_without_digest(pkey)?;
        return Ok(verifier
            .verify_oneshot(signature, verification_data)
            .unwrap_or_else(|e| {
                debug!(?e, "EdDSA signature rejected by provider");
                false
            }));
    }

    let digest = alg.message_digest()?;
    let mut verifier = sign::Verifier::new(digest, pkey)?;
    if alg.is_pss() {
        verifier.set_rsa_padding(rsa::Padding::PKCS1_PSS)?;
        verifier.set_rsa_mgf1_md(digest)?;
        verifier.set_rsa_pss_saltlen(sign::RsaPssSaltlen::DIGEST_LENGTH)?;
    }
    verifier.update(verification_data)?;

    // A malformed signature encoding is reported as an error by openssl. For our purposes it is
    // just an invalid signature.
    Ok(verifier.verify(signature).unwrap_or_else(|e| {
        debug!(?e, "signature rejected by provider");
        false
    }))
}

/// Validate an x509 signature is valid for the supplied data
pub(crate) fn verify_signature(
    alg: COSEAlgorithm,
    certificate: &x509::X509,
    signature: &[u8],
    verification_data: &[u8],
) -> AttestationResult<bool> {
    let pkey = certificate.public_key()?;
    verify_pkey_signature(alg, &pkey, signature, verification_data)
}

/// Hash `input` with the digest `alg` signs with.
pub(crate) fn only_hash_from_type(alg: COSEAlgorithm, input: &[u8]) -> AttestationResult<Vec<u8>> {
    let digest = alg.message_digest()?;
    Ok(hash::hash(digest, input)?.to_vec())
}

/// Compute the sha256 of a slice of data.
pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
    sha::sha256(data)
}

fn first_entry_utf8(name: &x509::X509NameRef, nid: nid::Nid) -> Option<String> {
    name.entries_by_nid(nid)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|s| s.to_string())
}

fn parsed_extensions<T>(
    certificate: &x509::X509,
    f: impl FnOnce(&x509_parser::certificate::X509Certificate<'_>) -> T,
) -> AttestationResult<T> {
    let der_bytes = certificate.to_der()?;
    let (_, cert) = x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| AttestationError::malformed("x5c certificate could not be parsed"))?;
    Ok(f(&cert))
}

fn is_ca(cert: &x509_parser::certificate::X509Certificate<'_>) -> bool {
    cert.extensions()
        .iter()
        .any(|ext| matches!(ext.parsed_extension(), ParsedExtension::BasicConstraints(bc) if bc.ca))
}

/// Verify that attestnCert meets the requirements in § 8.2.1 Packed Attestation Statement
/// Certificate Requirements.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation-cert-requirements>
pub(crate) fn assert_packed_attest_req(certificate: &x509::X509) -> AttestationResult<()> {
    // Version MUST be set to 3 (which is indicated by an ASN.1 INTEGER with value 2).
    if certificate.version() != 2 {
        return Err(AttestationError::malformed(
            "Attestation certificate must be version 3",
        ));
    }

    // Subject-C, Subject-O, Subject-OU = "Authenticator Attestation", Subject-CN
    let subject_name_ref = certificate.subject_name();
    let subject_c = first_entry_utf8(subject_name_ref, nid::Nid::COUNTRYNAME);
    let subject_o = first_entry_utf8(subject_name_ref, nid::Nid::ORGANIZATIONNAME);
    let subject_ou = first_entry_utf8(subject_name_ref, nid::Nid::ORGANIZATIONALUNITNAME);
    let subject_cn = first_entry_utf8(subject_name_ref, nid::Nid::COMMONNAME);

    if subject_c.is_none() || subject_o.is_none() || subject_cn.is_none() {
        return Err(AttestationError::malformed(
            "Attestation certificate subject is incomplete",
        ));
    }

    if subject_ou.as_deref() != Some(PACKED_SUBJECT_OU) {
        return Err(AttestationError::malformed(
            "Attestation certificate subject OU is invalid",
        ));
    }

    // The Basic Constraints extension MUST have the CA component set to false.
    if parsed_extensions(certificate, is_ca)? {
        return Err(AttestationError::malformed(
            "Attestation certificate must not be a CA",
        ));
    }

    Ok(())
}

/// Verify that aik_cert meets the requirements in § 8.3.1 TPM Attestation Statement
/// Certificate Requirements.
pub(crate) fn assert_tpm_attest_req(certificate: &x509::X509) -> AttestationResult<()> {
    if certificate.version() != 2 {
        return Err(AttestationError::malformed("AIK certificate must be version 3"));
    }

    let (ca, aik_eku) = parsed_extensions(certificate, |cert| {
        let aik_eku = cert.extensions().iter().any(|ext| {
            matches!(
                ext.parsed_extension(),
                ParsedExtension::ExtendedKeyUsage(eku)
                    if eku.other.contains(&OID_TCG_KP_AIK_CERTIFICATE)
            )
        });
        (is_ca(cert), aik_eku)
    })?;

    if ca {
        return Err(AttestationError::malformed("AIK certificate must not be a CA"));
    }

    // The Extended Key Usage extension MUST contain the OID 2.23.133.8.3
    if !aik_eku {
        return Err(AttestationError::malformed(
            "AIK certificate is missing the tcg-kp-AIKCertificate usage",
        ));
    }

    Ok(())
}
