//! Error types for certificate issuance and the certificate ledger.
//!
//! ```
//! use certledger::error::{IssueError, ValidationError};
//! use certledger::request::Request;
//!
//! let request = Request::new();
//! match certledger::engine::issue_ca(request) {
//!     Err(IssueError::Validation(ValidationError::InvalidCommonName)) => {}
//!     other => panic!("unexpected: {:?}", other.map(|_| ())),
//! }
//! ```

use thiserror::Error;

/// Structural defects in a [`Request`](crate::request::Request).
///
/// These are user input errors. Retrying with the same request always fails the same way.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid common name")]
    InvalidCommonName,

    #[error("invalid subject alt name")]
    InvalidSubjectAltName,

    #[error("invalid key strength: {0} bits")]
    InvalidKeyStrength(usize),
}

/// Failures of the PKI primitives: key generation, signing, encoding and parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// Error while producing a signature.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The CA certificate or key could not be loaded, or they do not belong together.
    #[error("Invalid CA key material: {0}")]
    InvalidCaKeyMaterial(String),

    /// The certificate signing request could not be decoded.
    #[error("Invalid certificate signing request: {0}")]
    InvalidCsr(String),

    /// The operating system entropy source failed.
    #[error("Randomness unavailable: {0}")]
    RandomnessUnavailable(String),
}

impl From<der::Error> for CryptoError {
    fn from(err: der::Error) -> Self {
        CryptoError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for CryptoError {
    fn from(err: rsa::Error) -> Self {
        CryptoError::KeyGeneration(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for CryptoError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        CryptoError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::Error> for CryptoError {
    fn from(err: pkcs8::Error) -> Self {
        CryptoError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for CryptoError {
    fn from(err: pkcs8::spki::Error) -> Self {
        CryptoError::EncodingError(err.to_string())
    }
}

impl From<pem::PemError> for CryptoError {
    fn from(err: pem::PemError) -> Self {
        CryptoError::DecodingError(err.to_string())
    }
}

/// Any failure of an issuance call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IssueError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Storage-layer conditions reported by a [`Ledger`](crate::ledger::Ledger).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A record with this name serial number already exists.
    #[error("object is a duplicate: {0}")]
    DuplicateRecord(String),

    #[error("object not found: {0}")]
    NotFound(String),

    /// The backend has not been opened, or has been closed.
    #[error("connection is not available")]
    ConnectionUnavailable,

    #[error("operation not implemented by this backend: {0}")]
    NotImplemented(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(String),

    /// The record cannot be stored as given.
    #[error("invalid certificate record: {0}")]
    InvalidRecord(String),
}

impl LedgerError {
    /// True when the caller can recover by choosing a different identifier.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::DuplicateRecord(_))
    }
}

pub type IssueResult<T> = std::result::Result<T, IssueError>;
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
