//! # certledger - private CA issuance with a certificate ledger
//!
//! certledger issues X.509 certificates for a small private PKI, built
//! entirely with rustcrypto libraries. A self-signed CA is issued first; leaf
//! certificates are then issued from a [`Request`](request::Request) or from a
//! PKCS#10 signing request and signed by that CA. Metadata about every issued
//! certificate can be kept in a [`Ledger`](ledger::Ledger) backed by a JSON file
//! or by SQLite.
//!
//! ## Keys and Formats
//!
//! - **RSA** 2048 and 4096-bit keys, signatures are `sha256WithRSAEncryption`
//! - Certificates are written as `CERTIFICATE` PEM blocks
//! - Private keys are written as PKCS#1 `RSA PRIVATE KEY`; CA keys are read as
//!   PKCS#1 or PKCS#8 `PRIVATE KEY`
//!
//! ## Quick Start
//!
//! ### Issuing a CA and a leaf certificate
//!
//! ```rust,no_run
//! use certledger::{engine, request::Request};
//!
//! # fn main() -> Result<(), certledger::error::IssueError> {
//! let ca = engine::issue_ca(Request {
//!     organization: "Example Corp".to_string(),
//!     ..Request::with_common_name("test.local")
//! })?;
//!
//! let leaf = engine::issue_leaf(
//!     Request {
//!         subject_alt_names: vec!["alt.test.local".to_string()],
//!         ..Request::with_common_name("leaf.test.local")
//!     },
//!     &ca.certificate_pem,
//!     &ca.private_key_pem,
//! )?;
//!
//! println!("{}", leaf.certificate_pem);
//! # Ok(())
//! # }
//! ```
//!
//! ### Recording an issued certificate
//!
//! ```rust,no_run
//! use certledger::{config::LedgerConfig, engine, ledger::CertificateRecord, request::Request};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = LedgerConfig::default().connect()?;
//!
//! let mut request = Request::with_common_name("test.local");
//! request.assign_name_serial_number();
//! let ca = engine::issue_ca(request)?;
//!
//! ledger.create(&CertificateRecord::from_issued(&ca))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Issuance fails with [`IssueError`](error::IssueError), which separates bad
//! requests from cryptographic failures:
//!
//! ```rust
//! use certledger::{engine, error::{CryptoError, IssueError}, request::Request};
//!
//! match engine::issue_leaf(Request::with_common_name("leaf.local"), "not a cert", "not a key") {
//!     Err(IssueError::Crypto(CryptoError::InvalidCaKeyMaterial(msg))) => println!("bad CA: {msg}"),
//!     Err(IssueError::Validation(e)) => println!("bad request: {e}"),
//!     Err(e) => println!("other error: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`request`]: The issuance request and its validation rules
//! - [`subject`]: Request fields to subject distinguished name
//! - [`serial`]: Certificate serial numbers and their allocation
//! - [`engine`]: CA, leaf and CSR-driven issuance
//! - [`csr`]: PKCS#10 request decoding
//! - [`ledger`]: Certificate metadata records and their storage backends
//! - [`config`]: Ledger backend selection
//! - [`key`]: RSA key generation, import/export and signatures
//! - [`cert`]: Certificate encoding, decoding and inspection
//! - [`issuer`]: Certificate signing
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod cert;
pub mod config;
pub mod csr;
pub mod engine;
pub mod error;
pub mod issuer;
pub mod key;
pub mod ledger;
pub mod pem_utils;
pub mod request;
pub mod serial;
pub mod subject;
pub mod tbs_certificate;
