//! Attestation statement formats.
//!
//! Each format is a module with a statement type, a `parse` that only checks structure, and a
//! `process` that runs the format's verification procedure. Parsing never consults a
//! collaborator, so malformed statements are rejected before any trust lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_cbor_2::Value;

use crate::error::{AttestationError, AttestationResult};
use crate::proto::AuthenticatorData;

pub mod android_key;
pub mod android_safetynet;
pub mod apple;
pub mod fido_u2f;
pub mod none;
pub mod packed;
pub mod tpm;

/// The attestation statement format of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationFormat {
    /// Packed attestation
    Packed,
    /// TPM attestation (like Microsoft)
    Tpm,
    /// Android hardware attestation
    AndroidKey,
    /// Older Android Safety Net
    AndroidSafetyNet,
    /// Old U2F attestation type
    FIDOU2F,
    /// Apple touchID/faceID
    AppleAnonymous,
    /// No attestation
    None,
}

impl TryFrom<&str> for AttestationFormat {
    type Error = AttestationError;

    fn try_from(a: &str) -> Result<AttestationFormat, Self::Error> {
        match a {
            "packed" => Ok(AttestationFormat::Packed),
            "tpm" => Ok(AttestationFormat::Tpm),
            "android-key" => Ok(AttestationFormat::AndroidKey),
            "android-safetynet" => Ok(AttestationFormat::AndroidSafetyNet),
            "fido-u2f" => Ok(AttestationFormat::FIDOU2F),
            "apple" => Ok(AttestationFormat::AppleAnonymous),
            "none" => Ok(AttestationFormat::None),
            _ => {
                debug!(format = %a, "unknown attestation format");
                Err(AttestationError::UnsupportedFormat(a.to_string()))
            }
        }
    }
}

impl AttestationFormat {
    /// The identifier of this format in an attestation object.
    pub fn format_tag(&self) -> &'static str {
        match self {
            AttestationFormat::Packed => "packed",
            AttestationFormat::Tpm => "tpm",
            AttestationFormat::AndroidKey => "android-key",
            AttestationFormat::AndroidSafetyNet => "android-safetynet",
            AttestationFormat::FIDOU2F => "fido-u2f",
            AttestationFormat::AppleAnonymous => "apple",
            AttestationFormat::None => "none",
        }
    }
}

impl std::fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.format_tag())
    }
}

/// A structurally valid attestation statement.
#[derive(Debug, Clone)]
pub enum AttestationStatement {
    /// `packed`
    Packed(packed::PackedStatement),
    /// `tpm`
    Tpm(tpm::TpmStatement),
    /// `android-key`
    AndroidKey(android_key::AndroidKeyStatement),
    /// `android-safetynet`
    AndroidSafetyNet(android_safetynet::SafetyNetStatement),
    /// `fido-u2f`
    FIDOU2F(fido_u2f::U2fStatement),
    /// `apple`
    AppleAnonymous(apple::AppleStatement),
    /// `none`
    None,
}

impl AttestationStatement {
    /// Check the shape of `att_stmt` against the rules of `format`.
    pub fn parse(format: AttestationFormat, att_stmt: &Value) -> AttestationResult<Self> {
        trace!(%format, ?att_stmt);
        match format {
            AttestationFormat::Packed => packed::parse(att_stmt).map(AttestationStatement::Packed),
            AttestationFormat::Tpm => tpm::parse(att_stmt).map(AttestationStatement::Tpm),
            AttestationFormat::AndroidKey => {
                android_key::parse(att_stmt).map(AttestationStatement::AndroidKey)
            }
            AttestationFormat::AndroidSafetyNet => {
                android_safetynet::parse(att_stmt).map(AttestationStatement::AndroidSafetyNet)
            }
            AttestationFormat::FIDOU2F => {
                fido_u2f::parse(att_stmt).map(AttestationStatement::FIDOU2F)
            }
            AttestationFormat::AppleAnonymous => {
                apple::parse(att_stmt).map(AttestationStatement::AppleAnonymous)
            }
            AttestationFormat::None => none::parse(att_stmt).map(|()| AttestationStatement::None),
        }
    }
}

type StatementMap = BTreeMap<Value, Value>;

fn statement_map(att_stmt: &Value) -> AttestationResult<&StatementMap> {
    cbor_try_map!(att_stmt).map_err(|_| AttestationError::malformed("attStmt must be a map"))
}

fn field<'a>(map: &'a StatementMap, key: &str) -> Option<&'a Value> {
    map.get(&Value::Text(key.to_string()))
}

fn required<'a>(map: &'a StatementMap, key: &str) -> AttestationResult<&'a Value> {
    field(map, key).ok_or_else(|| AttestationError::malformed(format!("attStmt is missing {key}")))
}

fn required_bytes(map: &StatementMap, key: &str) -> AttestationResult<Vec<u8>> {
    cbor_try_bytes!(required(map, key)?)
        .map(|b| b.clone())
        .map_err(|_| AttestationError::malformed(format!("attStmt {key} must be a byte string")))
}

fn required_alg(map: &StatementMap) -> AttestationResult<i128> {
    cbor_try_i128!(required(map, "alg")?)
        .map_err(|_| AttestationError::malformed("attStmt alg must be an integer"))
}

fn optional_bytes(map: &StatementMap, key: &str) -> AttestationResult<Option<Vec<u8>>> {
    field(map, key)
        .map(|v| {
            cbor_try_bytes!(v).map(|b| b.clone()).map_err(|_| {
                AttestationError::malformed(format!("attStmt {key} must be a byte string"))
            })
        })
        .transpose()
}

/// `authenticatorData || clientDataHash`, the bytes most statements sign.
fn verification_data(auth_data: &AuthenticatorData, client_data_hash: &[u8]) -> Vec<u8> {
    auth_data
        .raw
        .iter()
        .chain(client_data_hash.iter())
        .copied()
        .collect()
}
