//! Attestation statement verification. The entry point is [AttestationVerifier], which
//! selects the processor for the declared format and applies the attestation mode policy.

use std::time::SystemTime;

use openssl::x509;
use serde_cbor_2::Value;

use crate::certificates::{issuer_dn, verify_attestation_ca_chain};
use crate::error::{AttestationError, AttestationResult};
use crate::formats::{
    android_key, android_safetynet, apple, fido_u2f, none, packed, tpm, AttestationFormat,
    AttestationStatement,
};
use crate::proto::{
    Aaguid, AttestationMetadata, AttestationType, AuthenticatorData, CredAndCounterData,
    RegistrationData,
};
use crate::safetynet::SafetyNetVerifier;
use crate::trust::{
    AttestationConfig, AttestationMode, AttestationModePolicy, MetadataService, TrustResolver,
};
use crate::verifiers::encode_b64url;

/// The collaborators and settings of one verification, with the single instant every time
/// sensitive check uses.
pub(crate) struct VerificationContext<'a> {
    pub(crate) trust: &'a dyn TrustResolver,
    pub(crate) metadata: &'a dyn MetadataService,
    pub(crate) safetynet: &'a dyn SafetyNetVerifier,
    pub(crate) config: &'a AttestationConfig,
    pub(crate) now: SystemTime,
}

impl VerificationContext<'_> {
    /// Roots for an authenticator model. Enterprise deployments only trust their local
    /// anchors. Otherwise the metadata service is asked first.
    pub(crate) fn roots_for_aaguid(&self, aaguid: &Aaguid) -> AttestationResult<Vec<x509::X509>> {
        if self.config.enterprise_attestation {
            return Ok(self.trust.roots_for_aaguid(aaguid));
        }

        let from_metadata = self
            .metadata
            .fetch_metadata(aaguid)?
            .map(|md| {
                trace!(aaguid = %md.aaguid, description = ?md.description, "metadata found");
                md.attestation_root_certificates
            })
            .unwrap_or_default();

        if from_metadata.is_empty() {
            Ok(self.trust.roots_for_aaguid(aaguid))
        } else {
            Ok(from_metadata)
        }
    }

    /// Roots named by the issuer of the last certificate of a chain, that may attest `aaguid`.
    pub(crate) fn roots_for_chain_issuer(
        &self,
        aaguid: &Aaguid,
        chain: &[x509::X509],
    ) -> Vec<x509::X509> {
        chain
            .last()
            .map(|top| {
                let dn = issuer_dn(top);
                trace!(%dn, "resolving roots by issuer");
                self.trust.roots_for_issuer_dn(&dn, aaguid)
            })
            .unwrap_or_default()
    }

    /// Roots for a model, falling back to the chain's issuer when the model is unknown.
    pub(crate) fn roots_for(
        &self,
        aaguid: &Aaguid,
        chain: &[x509::X509],
    ) -> AttestationResult<Vec<x509::X509>> {
        let roots = self.roots_for_aaguid(aaguid)?;
        if roots.is_empty() && !self.config.enterprise_attestation {
            Ok(self.roots_for_chain_issuer(aaguid, chain))
        } else {
            Ok(roots)
        }
    }

    pub(crate) fn verify_chain(
        &self,
        chain: &[x509::X509],
        roots: &[x509::X509],
    ) -> AttestationResult<()> {
        verify_attestation_ca_chain(
            chain,
            roots,
            self.now,
            self.config.danger_disable_certificate_time_checks,
        )
    }
}

/// Verifies registration attestation statements.
///
/// Collaborators are borrowed for the lifetime of the verifier. The verifier itself holds no
/// mutable state and may be shared between threads.
pub struct AttestationVerifier<'a> {
    trust: &'a dyn TrustResolver,
    metadata: &'a dyn MetadataService,
    safetynet: &'a dyn SafetyNetVerifier,
    config: AttestationConfig,
}

impl<'a> AttestationVerifier<'a> {
    /// Create a verifier from its collaborators.
    pub fn new(
        trust: &'a dyn TrustResolver,
        metadata: &'a dyn MetadataService,
        safetynet: &'a dyn SafetyNetVerifier,
        config: AttestationConfig,
    ) -> Self {
        AttestationVerifier {
            trust,
            metadata,
            safetynet,
            config,
        }
    }

    /// The settings of this verifier.
    pub fn config(&self) -> &AttestationConfig {
        &self.config
    }

    /// Verify the attestation statement `att_stmt` of format `format`.
    ///
    /// On success the credential and how far its attestation could be trusted is returned.
    /// Every failure is terminal.
    pub fn verify_attestation(
        &self,
        format: &str,
        att_stmt: &Value,
        auth_data: &AuthenticatorData,
        registration: &RegistrationData,
        client_data_hash: &[u8],
    ) -> AttestationResult<CredAndCounterData> {
        self.verify_attestation_at(
            SystemTime::now(),
            format,
            att_stmt,
            auth_data,
            registration,
            client_data_hash,
        )
    }

    /// As [AttestationVerifier::verify_attestation], judging certificates and timestamps at
    /// `now`.
    pub fn verify_attestation_at(
        &self,
        now: SystemTime,
        format: &str,
        att_stmt: &Value,
        auth_data: &AuthenticatorData,
        registration: &RegistrationData,
        client_data_hash: &[u8],
    ) -> AttestationResult<CredAndCounterData> {
        let format = AttestationFormat::try_from(format)?;
        let statement = AttestationStatement::parse(format, att_stmt)?;
        let mut out = credential_data(format, auth_data)?;

        let ctx = VerificationContext {
            trust: self.trust,
            metadata: self.metadata,
            safetynet: self.safetynet,
            config: &self.config,
            now,
        };

        debug!(%format, "begin attestation verification");

        let r = match &statement {
            AttestationStatement::Packed(stmt) => {
                packed::process(&ctx, stmt, auth_data, client_data_hash, &mut out)
            }
            AttestationStatement::Tpm(stmt) => {
                tpm::process(&ctx, stmt, auth_data, client_data_hash, &mut out)
            }
            AttestationStatement::AndroidKey(stmt) => {
                android_key::process(&ctx, stmt, auth_data, client_data_hash, &mut out)
            }
            AttestationStatement::AndroidSafetyNet(stmt) => {
                android_safetynet::process(&ctx, stmt, auth_data, client_data_hash, &mut out)
            }
            AttestationStatement::FIDOU2F(stmt) => {
                fido_u2f::process(&ctx, stmt, auth_data, registration, client_data_hash, &mut out)
            }
            AttestationStatement::AppleAnonymous(stmt) => {
                apple::process(&ctx, stmt, auth_data, client_data_hash, &mut out)
            }
            AttestationStatement::None => none::process(auth_data, &mut out),
        };

        match r {
            Ok(()) => {
                debug!(%format, attestation_type = ?out.attestation_type, "attestation verified");
                Ok(out)
            }
            Err(e) => {
                debug!(%format, ?e, "attestation rejected");
                Err(e)
            }
        }
    }

    /// Verify an attestation statement under the attestation mode of `policy`.
    ///
    /// * [AttestationMode::Strict]: failures are returned.
    /// * [AttestationMode::Monitor]: failures are logged, and the credential is returned with
    ///   attestation type `uncertain`.
    /// * [AttestationMode::Disabled]: the statement is not verified, and the credential is
    ///   returned with attestation type `none`.
    ///
    /// An unknown format, or authenticator data that does not describe a credential, is always
    /// an error.
    pub fn verify_with_policy(
        &self,
        policy: &dyn AttestationModePolicy,
        format: &str,
        att_stmt: &Value,
        auth_data: &AuthenticatorData,
        registration: &RegistrationData,
        client_data_hash: &[u8],
    ) -> AttestationResult<CredAndCounterData> {
        let attestation_format = AttestationFormat::try_from(format)?;

        match policy.mode() {
            AttestationMode::Strict => self.verify_attestation(
                format,
                att_stmt,
                auth_data,
                registration,
                client_data_hash,
            ),
            AttestationMode::Monitor => {
                match self.verify_attestation(
                    format,
                    att_stmt,
                    auth_data,
                    registration,
                    client_data_hash,
                ) {
                    Ok(out) => Ok(out),
                    Err(e) => {
                        warn!(?e, %format, "attestation failed, accepting in monitor mode");
                        let mut out = credential_data(attestation_format, auth_data)?;
                        out.attestation_type = AttestationType::Uncertain;
                        Ok(out)
                    }
                }
            }
            AttestationMode::Disabled => {
                debug!(%format, "attestation verification disabled");
                let mut out = credential_data(AttestationFormat::None, auth_data)?;
                out.attestation_type = AttestationType::None;
                Ok(out)
            }
        }
    }

    /// Verify an attestation statement under this verifier's configured mode, and store the
    /// result in `registration`.
    pub fn verify_registration(
        &self,
        format: &str,
        att_stmt: &Value,
        auth_data: &AuthenticatorData,
        registration: &mut RegistrationData,
        client_data_hash: &[u8],
    ) -> AttestationResult<()> {
        let out = self.verify_with_policy(
            &self.config,
            format,
            att_stmt,
            auth_data,
            registration,
            client_data_hash,
        )?;
        registration.attestation = Some(out);
        Ok(())
    }
}

/// The credential half of the result, before the statement says anything about trust.
fn credential_data(
    format: AttestationFormat,
    auth_data: &AuthenticatorData,
) -> AttestationResult<CredAndCounterData> {
    let acd = auth_data.attested_credential()?;
    let credential_key = auth_data.credential_key()?;

    Ok(CredAndCounterData {
        credential_id: encode_b64url(&acd.credential_id),
        public_key: encode_b64url(&acd.credential_pk_bytes),
        counter: auth_data.counter,
        attestation_type: AttestationType::None,
        signature_algorithm: credential_key.type_.into(),
        attestation_format: format,
        metadata: AttestationMetadata::None,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use crate::crypto::COSEAlgorithm;
    use crate::test_utils::*;
    use crate::trust::{NoMetadataService, TrustAnchorStore};
    use fido2_attestation_ca::AttestationCaList;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn empty_map() -> Value {
        Value::Map(BTreeMap::new())
    }

    /// A packed statement whose batch certificate is issued directly by the root of `pki`.
    fn packed_basic(pki: &TestPki, aaguid: Aaguid) -> (AuthenticatorData, Value, [u8; 32]) {
        let cred_key = TestKey::generate(COSEAlgorithm::ES256);
        let att_key = TestKey::generate(COSEAlgorithm::ES256);
        let auth_data = AuthDataBuilder::new("example.com")
            .aaguid(aaguid)
            .credential_key(&cred_key)
            .build();
        let cdh = [9; 32];

        let batch = CertBuilder::packed("Batch").issued_by(&att_key, &pki.ca_cert, &pki.ca_key);
        let stmt = StatementBuilder::new()
            .alg(COSEAlgorithm::ES256)
            .bytes("sig", att_key.sign(&[auth_data.raw.as_slice(), &cdh[..]].concat()))
            .x5c(&[&batch])
            .build();
        (auth_data, stmt, cdh)
    }

    #[test]
    fn none_end_to_end() {
        let _ = tracing_subscriber::fmt::try_init();

        let trust = FakeTrustResolver::default();
        let metadata = FakeMetadataService::default();
        let safetynet = FakeSafetyNetVerifier::default();
        let verifier =
            AttestationVerifier::new(&trust, &metadata, &safetynet, AttestationConfig::default());

        let key = TestKey::generate(COSEAlgorithm::ES256);
        let auth_data = AuthDataBuilder::new("example.com")
            .credential_id(vec![0x01, 0x02, 0x03, 0x04])
            .credential_key(&key)
            .counter(0)
            .build();
        let registration = RegistrationData::new("https://example.com", "challenge");

        let out = verifier
            .verify_attestation("none", &empty_map(), &auth_data, &registration, &[0; 32])
            .unwrap();

        assert_eq!(out.credential_id, "AQIDBA");
        assert_eq!(out.public_key, encode_b64url(&key.cose_bytes()));
        assert_eq!(out.counter, 0);
        assert_eq!(out.attestation_type, AttestationType::None);
        assert_eq!(out.signature_algorithm, -7);
        assert_eq!(out.attestation_format, AttestationFormat::None);
        assert!(!out.is_trusted());

        assert_eq!(trust.calls(), 0);
        assert_eq!(metadata.calls(), 0);
    }

    #[test]
    fn unknown_format() {
        let trust = FakeTrustResolver::default();
        let safetynet = FakeSafetyNetVerifier::default();
        let verifier = AttestationVerifier::new(
            &trust,
            &NoMetadataService,
            &safetynet,
            AttestationConfig::default(),
        );
        let auth_data = AuthDataBuilder::new("example.com").build();
        let registration = RegistrationData::new("https://example.com", "challenge");

        match verifier.verify_attestation("fido-u3f", &empty_map(), &auth_data, &registration, &[0; 32]) {
            Err(AttestationError::UnsupportedFormat(f)) => assert_eq!(f, "fido-u3f"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_format_fails_in_every_mode() {
        let trust = FakeTrustResolver::default();
        let safetynet = FakeSafetyNetVerifier::default();
        let verifier = AttestationVerifier::new(
            &trust,
            &NoMetadataService,
            &safetynet,
            AttestationConfig::default(),
        );
        let auth_data = AuthDataBuilder::new("example.com").build();
        let registration = RegistrationData::new("https://example.com", "challenge");

        for mode in [
            AttestationMode::Strict,
            AttestationMode::Monitor,
            AttestationMode::Disabled,
        ] {
            let policy = AttestationConfig::default().attestation_mode(mode);
            match verifier.verify_with_policy(
                &policy,
                "made-up-format",
                &Value::Null,
                &auth_data,
                &registration,
                &[0; 32],
            ) {
                Err(AttestationError::UnsupportedFormat(f)) => assert_eq!(f, "made-up-format"),
                other => panic!("{mode:?}: unexpected {other:?}"),
            }
        }
        assert_eq!(trust.calls(), 0);
    }

    #[test]
    fn scoped_roots_are_not_reached_by_issuer() {
        let _ = tracing_subscriber::fmt::try_init();

        let pki = TestPki::new(COSEAlgorithm::ES256);
        let vendor = [7; 16];
        let store = TrustAnchorStore::new(
            AttestationCaList::from_iter([(pki.ca_cert.clone(), Uuid::from_bytes(vendor))])
                .unwrap(),
        );
        let safetynet = FakeSafetyNetVerifier::default();
        let verifier = AttestationVerifier::new(
            &store,
            &NoMetadataService,
            &safetynet,
            AttestationConfig::default(),
        );
        let registration = RegistrationData::new("https://example.com", "challenge");

        // The model the root was provisioned for.
        let (auth_data, stmt, cdh) = packed_basic(&pki, vendor);
        let out = verifier
            .verify_attestation("packed", &stmt, &auth_data, &registration, &cdh)
            .unwrap();
        assert_eq!(out.attestation_type, AttestationType::Basic);

        // Another model presenting a chain from the same root.
        let (auth_data, stmt, cdh) = packed_basic(&pki, [8; 16]);
        assert!(matches!(
            verifier.verify_attestation("packed", &stmt, &auth_data, &registration, &cdh),
            Err(AttestationError::UntrustedChain(_))
        ));

        // An unscoped root serves every model.
        store.replace(
            AttestationCaList::try_from(fido2_attestation_ca::AttestationCa {
                ca: pki.ca_cert.clone(),
                aaguids: Default::default(),
            })
            .unwrap(),
        );
        let out = verifier
            .verify_attestation("packed", &stmt, &auth_data, &registration, &cdh)
            .unwrap();
        assert_eq!(out.attestation_type, AttestationType::Basic);
    }

    #[test]
    fn enterprise_attestation_uses_local_roots_only() {
        let pki = TestPki::new(COSEAlgorithm::ES256);
        let unrelated = TestPki::new(COSEAlgorithm::ES256);
        let (auth_data, stmt, cdh) = packed_basic(&pki, [0x11; 16]);
        let registration = RegistrationData::new("https://example.com", "challenge");
        let safetynet = FakeSafetyNetVerifier::default();
        let enterprise = AttestationConfig::default().enterprise_attestation(true);

        // Local roots by AAGUID verify the chain, the metadata service is never asked.
        let trust = FakeTrustResolver::with_roots(vec![pki.ca_cert.clone()]);
        let metadata = FakeMetadataService::with_roots(vec![unrelated.ca_cert.clone()]);
        let verifier = AttestationVerifier::new(&trust, &metadata, &safetynet, enterprise.clone());
        let out = verifier
            .verify_attestation("packed", &stmt, &auth_data, &registration, &cdh)
            .unwrap();
        assert_eq!(out.attestation_type, AttestationType::Basic);
        assert_eq!(metadata.calls(), 0);
        assert_eq!(trust.calls(), 1);

        // Roots known only by issuer name are not consulted.
        let by_issuer =
            FakeTrustResolver::with_issuer("CN=Test Attestation Root", vec![pki.ca_cert.clone()]);
        let metadata = FakeMetadataService::default();
        let verifier = AttestationVerifier::new(&by_issuer, &metadata, &safetynet, enterprise);
        assert!(matches!(
            verifier.verify_attestation("packed", &stmt, &auth_data, &registration, &cdh),
            Err(AttestationError::UntrustedChain(_))
        ));
        assert_eq!(by_issuer.calls(), 1);
        assert_eq!(metadata.calls(), 0);

        // Outside of enterprise mode the same resolver is reached by issuer.
        let by_issuer =
            FakeTrustResolver::with_issuer("CN=Test Attestation Root", vec![pki.ca_cert.clone()]);
        let verifier =
            AttestationVerifier::new(&by_issuer, &metadata, &safetynet, AttestationConfig::default());
        let out = verifier
            .verify_attestation("packed", &stmt, &auth_data, &registration, &cdh)
            .unwrap();
        assert_eq!(out.attestation_type, AttestationType::Basic);
        assert_eq!(by_issuer.calls(), 2);
        assert_eq!(metadata.calls(), 1);
    }

    #[test]
    fn malformed_statements_never_reach_collaborators() {
        let trust = FakeTrustResolver::default();
        let metadata = FakeMetadataService::default();
        let safetynet = FakeSafetyNetVerifier::default();
        let verifier =
            AttestationVerifier::new(&trust, &metadata, &safetynet, AttestationConfig::default());
        let auth_data = AuthDataBuilder::new("example.com").build();
        let registration = RegistrationData::new("https://example.com", "challenge");

        let mut wrong_types = BTreeMap::new();
        wrong_types.insert(Value::Text("alg".to_string()), Value::Text("ES256".to_string()));
        wrong_types.insert(Value::Text("sig".to_string()), Value::Integer(1));
        wrong_types.insert(Value::Text("x5c".to_string()), Value::Bytes(vec![1]));
        wrong_types.insert(Value::Text("ver".to_string()), Value::Integer(2));
        wrong_types.insert(Value::Text("response".to_string()), Value::Integer(3));
        let wrong_types = Value::Map(wrong_types);

        for format in [
            "packed",
            "tpm",
            "android-key",
            "android-safetynet",
            "fido-u2f",
            "apple",
            "none",
        ] {
            for stmt in [Value::Null, Value::Bytes(vec![0xa0]), wrong_types.clone()] {
                let r = verifier.verify_attestation(format, &stmt, &auth_data, &registration, &[0; 32]);
                assert!(
                    matches!(r, Err(AttestationError::MalformedInput(_))),
                    "{format}: {r:?}"
                );
            }
        }

        assert_eq!(trust.calls(), 0);
        assert_eq!(metadata.calls(), 0);
        assert_eq!(safetynet.calls(), 0);
    }

    #[test]
    fn policy_modes() {
        let trust = FakeTrustResolver::default();
        let safetynet = FakeSafetyNetVerifier::default();
        let verifier = AttestationVerifier::new(
            &trust,
            &NoMetadataService,
            &safetynet,
            AttestationConfig::default(),
        );
        let auth_data = AuthDataBuilder::new("example.com").build();
        let registration = RegistrationData::new("https://example.com", "challenge");

        let mut bad = BTreeMap::new();
        bad.insert(Value::Text("unexpected".to_string()), Value::Integer(1));
        let bad = Value::Map(bad);

        let strict = AttestationConfig::default();
        assert!(verifier
            .verify_with_policy(&strict, "none", &bad, &auth_data, &registration, &[0; 32])
            .is_err());

        let monitor = AttestationConfig::default().attestation_mode(AttestationMode::Monitor);
        let out = verifier
            .verify_with_policy(&monitor, "none", &bad, &auth_data, &registration, &[0; 32])
            .unwrap();
        assert_eq!(out.attestation_type, AttestationType::Uncertain);
        assert!(!out.is_trusted());

        let disabled = AttestationConfig::default().attestation_mode(AttestationMode::Disabled);
        let out = verifier
            .verify_with_policy(&disabled, "packed", &bad, &auth_data, &registration, &[0; 32])
            .unwrap();
        assert_eq!(out.attestation_type, AttestationType::None);

        // Monitoring never hides a credential that cannot be decoded.
        let no_credential = AuthDataBuilder::new("example.com").without_credential().build();
        assert!(verifier
            .verify_with_policy(&monitor, "none", &bad, &no_credential, &registration, &[0; 32])
            .is_err());
    }

    #[test]
    fn registration_receives_result() {
        let trust = FakeTrustResolver::default();
        let safetynet = FakeSafetyNetVerifier::default();
        let verifier = AttestationVerifier::new(
            &trust,
            &NoMetadataService,
            &safetynet,
            AttestationConfig::default(),
        );
        let auth_data = AuthDataBuilder::new("example.com").build();
        let mut registration = RegistrationData::new("https://example.com", "challenge");

        verifier
            .verify_registration("none", &empty_map(), &auth_data, &mut registration, &[0; 32])
            .unwrap();
        assert!(matches!(
            registration.attestation,
            Some(CredAndCounterData {
                attestation_type: AttestationType::None,
                ..
            })
        ));
    }
}
