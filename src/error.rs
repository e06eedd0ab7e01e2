//! Error taxonomy for signature production and verification.

use thiserror::Error;

/// Errors produced while building, attaching, or validating a qualifying
/// signature.
///
/// Every fatal kind named by the signing/verification design has its own
/// variant so callers can match on outcome without string-sniffing.
/// `TimestampInconclusive` is the one kind that is constructed but never
/// escapes [`crate::orchestrator::Orchestrator::verify`] as an `Err` — it is
/// folded into the [`crate::report::VerificationReport`] instead, since an
/// unreachable TSA/OCSP responder must not fail an otherwise-valid signature.
#[derive(Debug, Error)]
pub enum Error {
    /// A `ResourceInput` or other caller-supplied descriptor violates its
    /// construction invariant.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Signing was requested in enveloped/enveloping mode against a document
    /// that already carries a `<ds:Signature>`.
    #[error("document already contains a ds:Signature and the requested mode is not detached")]
    DocumentConflict,

    /// A required XAdES element is missing, out of order, or carries the
    /// wrong namespace/attributes on verify.
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// A `<Reference>`'s recomputed digest does not match `<DigestValue>`.
    #[error("reference digest mismatch for URI {uri:?}")]
    ReferenceDigestMismatch {
        /// The `@URI` of the offending reference.
        uri: String,
    },

    /// `<SignatureValue>` does not verify against the canonical `<SignedInfo>`.
    #[error("SignatureValue does not verify against the canonical SignedInfo")]
    SignatureCryptoInvalid,

    /// The signer certificate's serial/issuer does not match
    /// `SigningCertificateV2`/`SigningCertificate`.
    #[error("signing certificate binding mismatch: {0}")]
    CertificateBindingMismatch(String),

    /// A `<SignatureTimeStamp>` imprint does not match, or the TST itself does
    /// not verify.
    #[error("time-stamp invalid: {0}")]
    TimestampInvalid(String),

    /// The TSA/OCSP collaborator could not be reached to validate a
    /// time-stamp; logged, never fatal.
    #[error("time-stamp validation inconclusive: {0}")]
    TimestampInconclusive(String),

    /// A nested counter-signature failed its own verification.
    #[error("counter-signature invalid: {0}")]
    CounterSignatureInvalid(String),

    /// `SignaturePolicyIdentifier` names an explicit policy but no policy
    /// document was supplied/fetched.
    #[error("signature policy document missing")]
    PolicyMissing,

    /// The fetched policy document's digest does not match
    /// `SignaturePolicyIdentifier/SignaturePolicyId/SigPolicyHash`.
    #[error("signature policy digest mismatch")]
    PolicyDigestMismatch,

    /// A collaborator that reaches outside the process (policy URL, TSA,
    /// OCSP) failed.
    #[error("external fetch failed: {0}")]
    ExternalFetchFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Propagated from the XML substrate.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Propagated from the XML substrate while reading attributes.
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// Propagated from DER (de)serialization.
    #[error("der error: {0}")]
    Der(#[from] der::Error),

    /// Propagated from base64 decoding of `<DigestValue>`/`<SignatureValue>`/etc.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Propagated from the `signature` crate's verifier/signer.
    #[error("signing/verification error: {0}")]
    Signing(#[from] signature::Error),

    /// Propagated from UTF-8 decoding of XML text content.
    #[error("utf8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Propagated from the XML substrate's underlying writer I/O.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the one kind that is reported, not raised.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Error::TimestampInconclusive(_))
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
