//! Builders for keys, certificates and statements used by the unit tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use der_parser::oid::Oid;
use openssl::asn1::{Asn1Integer, Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Signer};
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::{X509Builder, X509Extension, X509NameBuilder, X509};
use serde_cbor_2::Value;
use uuid::Uuid;

use crate::constants::*;
use crate::crypto::{compute_sha256, COSEAlgorithm};
use crate::error::AttestationError;
use crate::proto::{Aaguid, AuthenticatorData};
use crate::safetynet::{SafetyNetError, SafetyNetResponse, SafetyNetVerifier};
use crate::trust::{Metadata, MetadataService, TrustResolver};

fn digest_for(alg: COSEAlgorithm) -> MessageDigest {
    match alg {
        COSEAlgorithm::ES384 | COSEAlgorithm::RS384 | COSEAlgorithm::PS384 => {
            MessageDigest::sha384()
        }
        COSEAlgorithm::ES512 | COSEAlgorithm::RS512 | COSEAlgorithm::PS512 => {
            MessageDigest::sha512()
        }
        COSEAlgorithm::INSECURE_RS1 => MessageDigest::sha1(),
        COSEAlgorithm::EDDSA => MessageDigest::null(),
        _ => MessageDigest::sha256(),
    }
}

fn curve_for(alg: COSEAlgorithm) -> Option<(Nid, i128, usize, u16)> {
    // (openssl curve, COSE crv, coordinate size, TPM_ECC_CURVE)
    match alg {
        COSEAlgorithm::ES256 => Some((Nid::X9_62_PRIME256V1, 1, 32, 0x0003)),
        COSEAlgorithm::ES384 => Some((Nid::SECP384R1, 2, 48, 0x0004)),
        COSEAlgorithm::ES512 => Some((Nid::SECP521R1, 3, 66, 0x0005)),
        _ => None,
    }
}

/// A freshly generated key pair for one COSE algorithm.
pub(crate) struct TestKey {
    pub(crate) alg: COSEAlgorithm,
    pub(crate) pkey: PKey<Private>,
}

impl TestKey {
    pub(crate) fn generate(alg: COSEAlgorithm) -> Self {
        let pkey = match (alg, curve_for(alg)) {
            (_, Some((nid, ..))) => {
                let group = EcGroup::from_curve_name(nid).unwrap();
                PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
            }
            (COSEAlgorithm::EDDSA, None) => PKey::generate_ed25519().unwrap(),
            (_, None) => PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap(),
        };
        TestKey { alg, pkey }
    }

    fn ec_coordinates(&self) -> (Vec<u8>, Vec<u8>) {
        let (_, _, size, _) = curve_for(self.alg).unwrap();
        let ec = self.pkey.ec_key().unwrap();
        let mut ctx = BigNumContext::new().unwrap();
        let mut x = BigNum::new().unwrap();
        let mut y = BigNum::new().unwrap();
        ec.public_key()
            .affine_coordinates_gfp(ec.group(), &mut x, &mut y, &mut ctx)
            .unwrap();
        (
            x.to_vec_padded(size as i32).unwrap(),
            y.to_vec_padded(size as i32).unwrap(),
        )
    }

    fn rsa_components(&self) -> (Vec<u8>, Vec<u8>) {
        let rsa = self.pkey.rsa().unwrap();
        (rsa.n().to_vec(), rsa.e().to_vec())
    }

    /// The public key as a COSE_Key map.
    pub(crate) fn cose_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert(
            Value::Integer(3),
            Value::Integer(i128::from(i64::from(self.alg))),
        );
        if let Some((_, crv, ..)) = curve_for(self.alg) {
            let (x, y) = self.ec_coordinates();
            m.insert(Value::Integer(1), Value::Integer(2));
            m.insert(Value::Integer(-1), Value::Integer(crv));
            m.insert(Value::Integer(-2), Value::Bytes(x));
            m.insert(Value::Integer(-3), Value::Bytes(y));
        } else if self.alg == COSEAlgorithm::EDDSA {
            m.insert(Value::Integer(1), Value::Integer(1));
            m.insert(Value::Integer(-1), Value::Integer(6));
            m.insert(
                Value::Integer(-2),
                Value::Bytes(self.pkey.raw_public_key().unwrap()),
            );
        } else {
            let (n, e) = self.rsa_components();
            m.insert(Value::Integer(1), Value::Integer(3));
            m.insert(Value::Integer(-1), Value::Bytes(n));
            m.insert(Value::Integer(-2), Value::Bytes(e));
        }
        Value::Map(m)
    }

    pub(crate) fn cose_bytes(&self) -> Vec<u8> {
        serde_cbor_2::to_vec(&self.cose_value()).unwrap()
    }

    pub(crate) fn sign(&self, data: &[u8]) -> Vec<u8> {
        if self.alg == COSEAlgorithm::EDDSA {
            let mut signer = Signer::new_without_digest(&self.pkey).unwrap();
            return signer.sign_oneshot_to_vec(data).unwrap();
        }

        let digest = digest_for(self.alg);
        let mut signer = Signer::new(digest, &self.pkey).unwrap();
        if matches!(
            self.alg,
            COSEAlgorithm::PS256 | COSEAlgorithm::PS384 | COSEAlgorithm::PS512
        ) {
            signer.set_rsa_padding(Padding::PKCS1_PSS).unwrap();
            signer.set_rsa_mgf1_md(digest).unwrap();
            signer
                .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .unwrap();
        }
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }
}

/// Builds version 3 certificates, valid from an hour ago for thirty days.
pub(crate) struct CertBuilder {
    subject: Vec<(Nid, String)>,
    ca: bool,
    aik_eku: bool,
    extensions: Vec<(String, Vec<u8>)>,
}

impl CertBuilder {
    /// A subject holding only a common name.
    pub(crate) fn leaf(cn: &str) -> Self {
        CertBuilder {
            subject: vec![(Nid::COMMONNAME, cn.to_string())],
            ca: false,
            aik_eku: false,
            extensions: Vec::new(),
        }
    }

    /// A subject shaped the way packed attestation requires.
    pub(crate) fn packed(cn: &str) -> Self {
        CertBuilder {
            subject: vec![
                (Nid::COUNTRYNAME, "AU".to_string()),
                (Nid::ORGANIZATIONNAME, "Fido2 Test Vendor".to_string()),
                (Nid::ORGANIZATIONALUNITNAME, PACKED_SUBJECT_OU.to_string()),
                (Nid::COMMONNAME, cn.to_string()),
            ],
            ca: false,
            aik_eku: false,
            extensions: Vec::new(),
        }
    }

    pub(crate) fn ou(mut self, ou: &str) -> Self {
        self.subject.retain(|(nid, _)| *nid != Nid::ORGANIZATIONALUNITNAME);
        let at = self.subject.len().min(2);
        self.subject
            .insert(at, (Nid::ORGANIZATIONALUNITNAME, ou.to_string()));
        self
    }

    pub(crate) fn ca(mut self) -> Self {
        self.ca = true;
        self
    }

    pub(crate) fn aik_eku(mut self) -> Self {
        self.aik_eku = true;
        self
    }

    /// Add a non critical extension whose value is `der`.
    pub(crate) fn extension(mut self, oid: &Oid<'_>, der: &[u8]) -> Self {
        self.extensions.push((oid.to_id_string(), der.to_vec()));
        self
    }

    pub(crate) fn self_signed(self, key: &TestKey) -> X509 {
        let name = self.name();
        self.build(key, &name, key)
    }

    pub(crate) fn issued_by(self, key: &TestKey, issuer: &X509, issuer_key: &TestKey) -> X509 {
        self.build(key, issuer.subject_name(), issuer_key)
    }

    fn name(&self) -> openssl::x509::X509Name {
        let mut name = X509NameBuilder::new().unwrap();
        for (nid, value) in &self.subject {
            name.append_entry_by_nid(*nid, value).unwrap();
        }
        name.build()
    }

    fn build(
        self,
        key: &TestKey,
        issuer: &openssl::x509::X509NameRef,
        issuer_key: &TestKey,
    ) -> X509 {
        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();

        let mut serial = BigNum::new().unwrap();
        serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
        let serial: Asn1Integer = serial.to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();

        builder.set_subject_name(&self.name()).unwrap();
        builder.set_issuer_name(issuer).unwrap();
        builder.set_pubkey(&key.pkey).unwrap();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        builder
            .set_not_before(&Asn1Time::from_unix(now - 3600).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(30).unwrap())
            .unwrap();

        if self.ca {
            builder
                .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                .unwrap();
            builder
                .append_extension(
                    KeyUsage::new()
                        .critical()
                        .key_cert_sign()
                        .crl_sign()
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }

        if self.aik_eku {
            builder
                .append_extension(
                    ExtendedKeyUsage::new()
                        .other(&OID_TCG_KP_AIK_CERTIFICATE.to_id_string())
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }

        for (oid, der) in &self.extensions {
            let oid = Asn1Object::from_str(oid).unwrap();
            let value = Asn1OctetString::new_from_bytes(der).unwrap();
            builder
                .append_extension(X509Extension::new_from_der(&oid, false, &value).unwrap())
                .unwrap();
        }

        builder
            .sign(&issuer_key.pkey, digest_for(issuer_key.alg))
            .unwrap();
        builder.build()
    }
}

/// A self signed root that issues test attestation certificates.
pub(crate) struct TestPki {
    pub(crate) ca_key: TestKey,
    pub(crate) ca_cert: X509,
}

impl TestPki {
    pub(crate) fn new(alg: COSEAlgorithm) -> Self {
        let ca_key = TestKey::generate(alg);
        let ca_cert = CertBuilder::leaf("Test Attestation Root")
            .ca()
            .self_signed(&ca_key);
        TestPki { ca_key, ca_cert }
    }
}

/// Serialises registration authenticator data, then parses it the way a relying party would.
pub(crate) struct AuthDataBuilder {
    rp_id: String,
    flags: u8,
    counter: u32,
    aaguid: Aaguid,
    credential_id: Vec<u8>,
    credential_pk: Option<Vec<u8>>,
    with_credential: bool,
}

impl AuthDataBuilder {
    pub(crate) fn new(rp_id: &str) -> Self {
        AuthDataBuilder {
            rp_id: rp_id.to_string(),
            flags: FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL_DATA,
            counter: 0,
            aaguid: [0; 16],
            credential_id: vec![0x01, 0x02, 0x03, 0x04],
            credential_pk: None,
            with_credential: true,
        }
    }

    pub(crate) fn aaguid(mut self, aaguid: Aaguid) -> Self {
        self.aaguid = aaguid;
        self
    }

    pub(crate) fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn credential_id(mut self, credential_id: Vec<u8>) -> Self {
        self.credential_id = credential_id;
        self
    }

    pub(crate) fn credential_key(mut self, key: &TestKey) -> Self {
        self.credential_pk = Some(key.cose_bytes());
        self
    }

    pub(crate) fn counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }

    pub(crate) fn without_credential(mut self) -> Self {
        self.with_credential = false;
        self
    }

    pub(crate) fn build(self) -> AuthenticatorData {
        let flags = if self.with_credential {
            self.flags | FLAG_ATTESTED_CREDENTIAL_DATA
        } else {
            self.flags & !FLAG_ATTESTED_CREDENTIAL_DATA
        };

        let mut raw = compute_sha256(self.rp_id.as_bytes()).to_vec();
        raw.push(flags);
        raw.extend_from_slice(&self.counter.to_be_bytes());

        if self.with_credential {
            let credential_pk = self
                .credential_pk
                .unwrap_or_else(|| TestKey::generate(COSEAlgorithm::ES256).cose_bytes());
            raw.extend_from_slice(&self.aaguid);
            raw.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            raw.extend_from_slice(&self.credential_id);
            raw.extend_from_slice(&credential_pk);
        }

        AuthenticatorData::try_from(raw.as_slice()).unwrap()
    }
}

/// Builds an `attStmt` map.
#[derive(Default)]
pub(crate) struct StatementBuilder {
    m: BTreeMap<Value, Value>,
}

impl StatementBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alg(mut self, alg: COSEAlgorithm) -> Self {
        self.m.insert(
            Value::Text("alg".to_string()),
            Value::Integer(i128::from(i64::from(alg))),
        );
        self
    }

    pub(crate) fn bytes(mut self, key: &str, value: Vec<u8>) -> Self {
        self.m.insert(Value::Text(key.to_string()), Value::Bytes(value));
        self
    }

    pub(crate) fn text(mut self, key: &str, value: &str) -> Self {
        self.m
            .insert(Value::Text(key.to_string()), Value::Text(value.to_string()));
        self
    }

    pub(crate) fn x5c(mut self, chain: &[&X509]) -> Self {
        let chain = chain
            .iter()
            .map(|c| Value::Bytes(c.to_der().unwrap()))
            .collect();
        self.m
            .insert(Value::Text("x5c".to_string()), Value::Array(chain));
        self
    }

    pub(crate) fn build(self) -> Value {
        Value::Map(self.m)
    }
}

/// A [TrustResolver] holding fixed roots, counting lookups.
#[derive(Default)]
pub(crate) struct FakeTrustResolver {
    roots: Vec<X509>,
    issuer_dn: Option<String>,
    calls: AtomicUsize,
}

impl FakeTrustResolver {
    /// Roots returned for every AAGUID and every issuer.
    pub(crate) fn with_roots(roots: Vec<X509>) -> Self {
        FakeTrustResolver {
            roots,
            ..Default::default()
        }
    }

    /// Roots returned only for the issuer `dn`.
    pub(crate) fn with_issuer(dn: &str, roots: Vec<X509>) -> Self {
        FakeTrustResolver {
            roots,
            issuer_dn: Some(dn.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrustResolver for FakeTrustResolver {
    fn roots_for_aaguid(&self, _aaguid: &Aaguid) -> Vec<X509> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.issuer_dn {
            Some(_) => Vec::new(),
            None => self.roots.clone(),
        }
    }

    fn roots_for_issuer_dn(&self, dn: &str, _aaguid: &Aaguid) -> Vec<X509> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.issuer_dn {
            Some(expected) if expected != dn => Vec::new(),
            _ => self.roots.clone(),
        }
    }
}

/// A [MetadataService] that describes every AAGUID with the same roots.
#[derive(Default)]
pub(crate) struct FakeMetadataService {
    roots: Vec<X509>,
    calls: AtomicUsize,
}

impl FakeMetadataService {
    pub(crate) fn with_roots(roots: Vec<X509>) -> Self {
        FakeMetadataService {
            roots,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataService for FakeMetadataService {
    fn fetch_metadata(&self, aaguid: &Aaguid) -> Result<Option<Metadata>, AttestationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.roots.is_empty() {
            return Ok(None);
        }
        Ok(Some(Metadata {
            aaguid: Uuid::from_bytes(*aaguid),
            description: Some("Test Authenticator".to_string()),
            attestation_root_certificates: self.roots.clone(),
        }))
    }
}

type SafetyNetOutcome = Result<Option<SafetyNetResponse>, SafetyNetError>;

/// A [SafetyNetVerifier] that answers once with a prepared outcome.
#[derive(Default)]
pub(crate) struct FakeSafetyNetVerifier {
    outcome: Mutex<Option<SafetyNetOutcome>>,
    last_token: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl FakeSafetyNetVerifier {
    pub(crate) fn returning(outcome: SafetyNetOutcome) -> Self {
        FakeSafetyNetVerifier {
            outcome: Mutex::new(Some(outcome)),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_token(&self) -> Option<String> {
        self.last_token.lock().unwrap().clone()
    }
}

impl SafetyNetVerifier for FakeSafetyNetVerifier {
    fn parse_and_verify(
        &self,
        token: &str,
        _roots: &[X509],
        _now: SystemTime,
    ) -> SafetyNetOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_token.lock().unwrap() = Some(token.to_string());
        self.outcome.lock().unwrap().take().unwrap_or(Ok(None))
    }
}

/// Serialises a TPMT_PUBLIC for a test key.
pub(crate) struct TpmPubAreaBuilder {
    alg: COSEAlgorithm,
    unique: Vec<Vec<u8>>,
    exponent: u32,
}

impl TpmPubAreaBuilder {
    pub(crate) fn for_key(key: &TestKey) -> Self {
        let unique = if curve_for(key.alg).is_some() {
            let (x, y) = key.ec_coordinates();
            vec![x, y]
        } else {
            vec![key.rsa_components().0]
        };
        TpmPubAreaBuilder {
            alg: key.alg,
            unique,
            exponent: 0,
        }
    }

    /// The RSA exponent field. Zero stands for 65537.
    pub(crate) fn exponent(mut self, exponent: u32) -> Self {
        self.exponent = exponent;
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        const TPM_ALG_RSA: u16 = 0x0001;
        const TPM_ALG_SHA256: u16 = 0x000B;
        const TPM_ALG_NULL: u16 = 0x0010;
        const TPM_ALG_ECC: u16 = 0x0023;
        // fixedTPM | fixedParent | sensitiveDataOrigin | userWithAuth | noDA | sign
        const OBJECT_ATTRIBUTES: u32 = 0x0006_0472;

        let mut out = Vec::new();
        let curve = curve_for(self.alg);
        let type_ = if curve.is_some() {
            TPM_ALG_ECC
        } else {
            TPM_ALG_RSA
        };
        out.extend_from_slice(&type_.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        out.extend_from_slice(&OBJECT_ATTRIBUTES.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // authPolicy
        out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // symmetric
        out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // scheme

        match curve {
            Some((_, _, _, curve_id)) => {
                out.extend_from_slice(&curve_id.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // kdf
            }
            None => {
                let key_bits = (self.unique[0].len() * 8) as u16;
                out.extend_from_slice(&key_bits.to_be_bytes());
                out.extend_from_slice(&self.exponent.to_be_bytes());
            }
        }

        for part in &self.unique {
            out.extend_from_slice(&(part.len() as u16).to_be_bytes());
            out.extend_from_slice(part);
        }
        out
    }
}

/// Serialises a TPMS_ATTEST of type TPM_ST_ATTEST_CERTIFY.
#[derive(Clone)]
pub(crate) struct TpmCertInfoBuilder {
    magic: u32,
    attest_type: u16,
    extra_data: Vec<u8>,
    firmware_version: u64,
    name: Vec<u8>,
}

impl TpmCertInfoBuilder {
    pub(crate) fn new(extra_data: Vec<u8>, name: Vec<u8>) -> Self {
        TpmCertInfoBuilder {
            magic: TPM_GENERATED_VALUE,
            attest_type: TPM_ST_ATTEST_CERTIFY,
            extra_data,
            firmware_version: 0x2000_0000_0000_0001,
            name,
        }
    }

    pub(crate) fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub(crate) fn attest_type(mut self, attest_type: u16) -> Self {
        self.attest_type = attest_type;
        self
    }

    pub(crate) fn firmware_version(mut self, firmware_version: u64) -> Self {
        self.firmware_version = firmware_version;
        self
    }

    pub(crate) fn extra_data(&self) -> Vec<u8> {
        self.extra_data.clone()
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let tpm2b = |out: &mut Vec<u8>, data: &[u8]| {
            out.extend_from_slice(&(data.len() as u16).to_be_bytes());
            out.extend_from_slice(data);
        };

        let mut out = Vec::new();
        out.extend_from_slice(&self.magic.to_be_bytes());
        out.extend_from_slice(&self.attest_type.to_be_bytes());
        tpm2b(&mut out, &[0x00, 0x0b, 0xaa, 0xbb]); // qualifiedSigner
        tpm2b(&mut out, &self.extra_data);
        // clockInfo
        out.extend_from_slice(&0x0000_0001_0000_0000u64.to_be_bytes());
        out.extend_from_slice(&7u32.to_be_bytes());
        out.extend_from_slice(&3u32.to_be_bytes());
        out.push(1);
        out.extend_from_slice(&self.firmware_version.to_be_bytes());
        tpm2b(&mut out, &self.name);
        tpm2b(&mut out, &self.name); // qualifiedName
        out
    }
}

fn der_tlv(tag: &[u8], content: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
    out.extend_from_slice(content);
    out
}

fn der_integer(tag: u8, v: u32) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(3);
    let mut content = bytes[start..].to_vec();
    if content[0] & 0x80 != 0 {
        content.insert(0, 0);
    }
    der_tlv(&[tag], &content)
}

pub(crate) fn der_octet_string(data: &[u8]) -> Vec<u8> {
    der_tlv(&[0x04], data)
}

/// SEQUENCE { [1] EXPLICIT OCTET STRING nonce }
pub(crate) fn apple_nonce_extension(nonce: &[u8; 32]) -> Vec<u8> {
    der_tlv(&[0x30], &der_tlv(&[0xa1], &der_octet_string(nonce)))
}

/// An Android KeyDescription, as found in keystore attestation certificates.
pub(crate) struct AndroidKeyDescription {
    challenge: Vec<u8>,
    attestation_version: u32,
    security_level: u32,
    keymaster_version: u32,
    all_applications: bool,
    origin: u32,
}

impl AndroidKeyDescription {
    /// A TEE generated signing key bound to `challenge`.
    pub(crate) fn new(challenge: &[u8]) -> Self {
        AndroidKeyDescription {
            challenge: challenge.to_vec(),
            attestation_version: 3,
            security_level: 1,
            keymaster_version: 4,
            all_applications: false,
            origin: 0,
        }
    }

    pub(crate) fn all_applications(mut self) -> Self {
        self.all_applications = true;
        self
    }

    pub(crate) fn origin(mut self, origin: u32) -> Self {
        self.origin = origin;
        self
    }

    pub(crate) fn security_level(mut self, level: u32) -> Self {
        self.security_level = level;
        self
    }

    pub(crate) fn to_der(&self) -> Vec<u8> {
        // [1] purpose SET OF INTEGER { SIGN }
        let mut tee = der_tlv(&[0xa1], &der_tlv(&[0x31], &der_integer(0x02, 2)));
        if self.all_applications {
            // [600] NULL
            tee.extend(der_tlv(&[0xbf, 0x84, 0x58], &[0x05, 0x00]));
        }
        // [702] origin INTEGER
        tee.extend(der_tlv(&[0xbf, 0x85, 0x3e], &der_integer(0x02, self.origin)));

        let mut content = der_integer(0x02, self.attestation_version);
        content.extend(der_integer(0x0a, self.security_level));
        content.extend(der_integer(0x02, self.keymaster_version));
        content.extend(der_integer(0x0a, self.security_level));
        content.extend(der_octet_string(&self.challenge));
        content.extend(der_octet_string(&[]));
        content.extend(der_tlv(&[0x30], &[]));
        content.extend(der_tlv(&[0x30], &tee));
        der_tlv(&[0x30], &content)
    }
}
