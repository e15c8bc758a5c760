//! Attestation certificate chain handling.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::{stack, x509};
use openssl::x509::{store, verify};

use crate::error::{AttestationError, AttestationResult};

/// Decode an `x5c` array. The leaf (attestation) certificate is the first element and
/// must be present.
pub(crate) fn parse_x5c(value: &serde_cbor_2::Value) -> AttestationResult<Vec<x509::X509>> {
    let x5c_array_ref = cbor_try_array!(value)
        .map_err(|_| AttestationError::malformed("x5c must be an array"))?;

    let arr_x509 = x5c_array_ref
        .iter()
        .map(|values| {
            cbor_try_bytes!(values)
                .map_err(|_| AttestationError::malformed("x5c entries must be byte strings"))
                .and_then(|b| {
                    x509::X509::from_der(b).map_err(|e| {
                        debug!(?e, "x5c entry is not a certificate");
                        AttestationError::malformed("x5c entry is not a DER certificate")
                    })
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if arr_x509.is_empty() {
        return Err(AttestationError::malformed("x5c is empty"));
    }

    Ok(arr_x509)
}

/// If the certificate is issued by, and signed with, its own key.
pub(crate) fn is_self_signed(certificate: &x509::X509) -> bool {
    certificate.issued(certificate) == x509::X509VerifyResult::OK
        && certificate
            .public_key()
            .and_then(|pkey| certificate.verify(&pkey))
            .unwrap_or(false)
}

/// The issuer distinguished name of a certificate, formatted the same way trust anchor
/// subjects are, so it can be used to look roots up.
pub(crate) fn issuer_dn(certificate: &x509::X509) -> String {
    fido2_attestation_ca::x509_name_to_string(certificate.issuer_name())
}

fn unix_seconds(now: SystemTime) -> AttestationResult<i64> {
    now.duration_since(UNIX_EPOCH)
        .map_err(|_| AttestationError::untrusted("Verification time precedes the epoch"))
        .and_then(|d| {
            i64::try_from(d.as_secs())
                .map_err(|_| AttestationError::untrusted("Verification time out of range"))
        })
}

fn check_validity_window(certificate: &x509::X509Ref, now: &Asn1Time) -> AttestationResult<()> {
    let not_yet_valid = certificate.not_before().compare(now)? == Ordering::Greater;
    let expired = certificate.not_after().compare(now)? == Ordering::Less;
    if not_yet_valid || expired {
        debug!(subject = ?certificate.subject_name(), "certificate outside of validity window");
        return Err(AttestationError::untrusted(
            "Certificate is outside of its validity window",
        ));
    }
    Ok(())
}

/// Verify that `fullchain` (leaf first) terminates at one of `roots`. Signatures, basic
/// constraints and, unless disabled, every certificate's validity window at `now` are checked.
pub(crate) fn verify_attestation_ca_chain(
    fullchain: &[x509::X509],
    roots: &[x509::X509],
    now: SystemTime,
    danger_disable_certificate_time_checks: bool,
) -> AttestationResult<()> {
    // If there are no roots, immediately fail since no valid attestation can be created.
    if roots.is_empty() {
        return Err(AttestationError::untrusted("No trust anchors available"));
    }

    for crt in fullchain {
        trace!(subject = ?crt.subject_name(), issuer = ?crt.issuer_name(), "x5c");
    }

    let (leaf, chain) = fullchain
        .split_first()
        .ok_or_else(|| AttestationError::malformed("x5c is empty"))?;

    // Convert the chain to a stackref so that openssl can use it.
    let mut chain_stack = stack::Stack::new()?;
    for crt in chain.iter() {
        chain_stack.push(crt.clone())?;
    }

    // Create the x509 store that we will validate against. Time is checked separately so that
    // every certificate is judged at the same instant.
    let mut ca_store = store::X509StoreBuilder::new()?;
    ca_store.set_flags(verify::X509VerifyFlags::NO_CHECK_TIME)?;
    for ca_crt in roots {
        ca_store.add_cert(ca_crt.clone())?;
    }
    let ca_store = ca_store.build();

    let mut ca_ctx = x509::X509StoreContext::new()?;

    // Note this is a result<result ... because the inner .init must return an errorstack
    // for openssl.
    let res: Result<Vec<x509::X509>, AttestationError> = ca_ctx
        .init(&ca_store, leaf, &chain_stack, |ca_ctx_ref| {
            ca_ctx_ref.verify_cert().map(|_| {
                // The value as passed in is a boolean that we ignore in favour of the richer error type.
                let res = ca_ctx_ref.error();
                if res == x509::X509VerifyResult::OK {
                    Ok(ca_ctx_ref
                        .chain()
                        .map(|chain| chain.iter().map(|c| c.to_owned()).collect())
                        .unwrap_or_default())
                } else {
                    debug!(
                        "ca_ctx_ref verify cert - error depth={}, sn={:?}",
                        ca_ctx_ref.error_depth(),
                        ca_ctx_ref.current_cert().map(|crt| crt.subject_name())
                    );
                    Err(AttestationError::untrusted(res.to_string()))
                }
            })
        })
        .map_err(|e| {
            // If an openssl error occured, dump it here.
            error!(?e);
            e
        })?;

    let verified_chain = res?;

    if !danger_disable_certificate_time_checks {
        let now = Asn1Time::from_unix(unix_seconds(now)?)?;
        for crt in &verified_chain {
            check_validity_window(crt, &now)?;
        }
    }

    Ok(())
}
