//! Possible errors that may occur during attestation verification.

use thiserror::Error;

/// A wrapper for `Result<T, AttestationError>`
pub type AttestationResult<T> = core::result::Result<T, AttestationError>;

/// Possible errors that may occur while verifying an attestation statement. Every error is
/// terminal: the registration it relates to must be rejected.
///
/// The `Display` output of an error may contain details from the attacker supplied input or
/// from the cryptographic provider. Use [AttestationError::reason] for text that is safe to
/// return to a client.
#[derive(Debug, Error)]
pub enum AttestationError {
    /// The statement, authenticator data or an embedded structure is not shaped as required.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The statement's `alg` disagrees with the credential public key.
    #[error("Wrong algorithm: statement {statement}, credential {credential}")]
    AlgorithmMismatch {
        /// The COSE algorithm declared by the attestation statement.
        statement: i64,
        /// The COSE algorithm of the credential public key.
        credential: i64,
    },

    /// The relying party id hash, nonce or challenge does not bind to this ceremony.
    #[error("Origin mismatch: {0}")]
    OriginMismatch(String),

    /// The certificate chain could not be validated to any resolved trust anchor.
    #[error("Untrusted certificate chain: {0}")]
    UntrustedChain(String),

    /// A signature, digest or key comparison failed.
    #[error("Integrity failure: {0}")]
    IntegrityFailure(String),

    /// The attestation statement format is not known.
    #[error("Unsupported attestation format {0}")]
    UnsupportedFormat(String),

    /// The statement requests a feature this engine will not verify, such as ECDAA.
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// The cryptographic provider failed.
    #[error("OpenSSL Error")]
    OpenSSL(#[from] openssl::error::ErrorStack),
}

impl AttestationError {
    /// A sanitised, kind level reason suitable for a client facing error response. It never
    /// contains input derived text or cryptographic provider messages.
    pub fn reason(&self) -> &'static str {
        match self {
            AttestationError::MalformedInput(_) => "Invalid attestation data",
            AttestationError::AlgorithmMismatch { .. } => "Wrong algorithm",
            AttestationError::OriginMismatch(_) => "Hashes don't match",
            AttestationError::UntrustedChain(_) => "Attestation certificate is not trusted",
            AttestationError::IntegrityFailure(_) => "Unable to verify signature",
            AttestationError::UnsupportedFormat(_) => "Unsupported attestation format",
            AttestationError::UnsupportedFeature(_) => "Unsupported attestation feature",
            AttestationError::OpenSSL(_) => "Problem with crypto",
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        AttestationError::MalformedInput(msg.into())
    }

    pub(crate) fn integrity(msg: impl Into<String>) -> Self {
        AttestationError::IntegrityFailure(msg.into())
    }

    pub(crate) fn untrusted(msg: impl Into<String>) -> Self {
        AttestationError::UntrustedChain(msg.into())
    }

    pub(crate) fn origin(msg: impl Into<String>) -> Self {
        AttestationError::OriginMismatch(msg.into())
    }
}
