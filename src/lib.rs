//! XAdES (ETSI TS 101 903 / EN 319 132-1) signature production and
//! verification over XML-DSig.
//!
//! ## Description
//!
//! - [`orchestrator::Orchestrator`]: the top-level `sign`/`verify`/
//!   `counter_sign` entry point (C6), wiring every other component together.
//! - [`tree`]: the generic XML element tree (C1 substrate) and the typed
//!   XAdES qualifying-properties layer built on it.
//! - [`reference`]: `<ds:Reference>` construction and validation (C3).
//! - [`signature`]: `<ds:SignedInfo>`/`<ds:SignatureValue>`/`<ds:KeyInfo>`
//!   assembly and the key-backed sign/verify driver (C4).
//! - [`certbind`]: `SigningCertificateV2`/`SigningCertificate` binding (C5).
//! - [`timestamp`]: RFC 3161 `<SignatureTimeStamp>` attach/validate (C7).
//! - [`countersign`]: nested counter-signature production/validation (C8).
//!
//! Cryptographic primitives (RSA/EC signing and verification), X.509/ASN.1
//! parsing beyond certificate-field extraction, TSA/OCSP network exchange,
//! and file/URL I/O are out-of-scope collaborators: this crate defines the
//! trait boundary each one sits behind ([`signature::Signer`]/
//! [`signature::Verifier`], [`certbind::X509Info`],
//! [`timestamp::TimestampAuthority`], [`orchestrator::DocumentIo`]) and
//! drives them, rather than reimplementing them.
//!
//! ## Example
//!
//! ```no_run
//! use xades_core::canonical::{C14nMethod, DigestAlgorithm};
//! use xades_core::certbind::X509CertInfo;
//! use xades_core::config::SignatureConfig;
//! use xades_core::model::ResourceInput;
//! use xades_core::orchestrator::Orchestrator;
//!
//! # fn run(signer: &impl signature::Signer<Vec<u8>>, cert_der: &[u8]) -> xades_core::error::Result<()> {
//! let config = SignatureConfig {
//!     c14n_method: C14nMethod::ExclusiveC14N,
//!     digest_method: DigestAlgorithm::Sha256,
//!     ..Default::default()
//! };
//! let orchestrator = Orchestrator::new(config);
//! let signer_cert = X509CertInfo::from_der(cert_der)?;
//! let input = ResourceInput::inline_bytes_detached(
//!     b"<payload/>".to_vec(),
//!     "payload.xml",
//!     ".",
//!     "signature",
//! )?;
//! let _document =
//!     orchestrator.sign(&input, &signer_cert, &[], signer, None, None, None, None)?;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod canonical;
pub mod certbind;
pub mod config;
pub mod countersign;
pub mod error;
pub mod idregistry;
pub mod model;
pub mod orchestrator;
pub mod reference;
pub mod report;
pub mod signature;
pub mod timestamp;
pub mod tree;

pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
