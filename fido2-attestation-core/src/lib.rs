//! fido2-attestation-core - FIDO2 attestation statement verification for Rust servers
//!
//! During a WebAuthn registration an authenticator may prove what it is by returning an
//! attestation statement alongside the new credential. This library verifies such statements
//! for the `packed`, `tpm`, `android-key`, `android-safetynet`, `fido-u2f`, `apple` and `none`
//! formats, and reports how far the credential can be trusted.
//!
//! The entry point is [AttestationVerifier]. It borrows a [TrustResolver] for local trust
//! anchors, a [MetadataService] for authenticator model metadata and a [SafetyNetVerifier]
//! for SafetyNet responses, and is configured with an [AttestationConfig].
//!
//! This library performs no network access. Collaborators that need it are expected to cache.

#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

pub mod constants;

mod authenticator_data;
mod certificates;
mod tpm;

pub mod attestation;
pub mod crypto;
pub mod error;
pub mod extensions;
pub mod formats;
pub mod proto;
pub mod safetynet;
pub mod trust;
pub mod verifiers;

#[cfg(test)]
mod test_utils;

pub use crate::attestation::AttestationVerifier;
pub use crate::error::{AttestationError, AttestationResult};
pub use crate::formats::{AttestationFormat, AttestationStatement};
pub use crate::proto::{
    Aaguid, AttestationMetadata, AttestationType, AuthenticatorData, CredAndCounterData,
    RegistrationData,
};
pub use crate::safetynet::{
    OfflineSafetyNetVerifier, SafetyNetError, SafetyNetResponse, SafetyNetVerifier,
};
pub use crate::trust::{
    AttestationConfig, AttestationMode, AttestationModePolicy, Metadata, MetadataService,
    NoMetadataService, TrustAnchorStore, TrustResolver,
};

pub use fido2_attestation_ca::{AttestationCa, AttestationCaList};
