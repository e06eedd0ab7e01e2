//! Time-stamp Attacher/Validator (C7): RFC 3161 `<SignatureTimeStamp>`
//! attach and validate flows.
//!
//! The TSA itself — HTTP exchange, DER TST parsing, OCSP-backed issuer
//! signature check — is the out-of-scope collaborator named in §1; this
//! module defines the contract it must satisfy and the logic that sits on
//! either side of it.

use crate::canonical::{canonicalize, C14nMethod};
use crate::error::{Error, Result};
use crate::tree::xades::SignatureTimeStamp;

/// The outcome a TSA collaborator reports for one TST it was asked to
/// validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TstOutcome {
    /// Issuer signature verifies and the imprint matches.
    Valid,
    /// The TSA/OCSP responder could not be reached; not fatal (§4.7 step 3,
    /// §7).
    Inconclusive(String),
    /// Issuer signature does not verify, or the imprint does not match.
    Invalid(String),
}

/// A time-stamping authority: requests fresh tokens and validates existing
/// ones. `imprint` is always `digest(C14N(<SignatureValue>))` under the
/// signature's own canonicalization method; `hash_alg` names the digest the
/// TSA should use inside the token.
pub trait TimestampAuthority {
    /// Requests a DER-encoded RFC 3161 TimeStampToken over `imprint`.
    fn request_tst(&self, imprint: &[u8], hash_alg: &str) -> Result<Vec<u8>>;

    /// Validates `der_tst` against the `canonical_bytes` it should have been
    /// issued over: verifies the TSA's own signature on the token and
    /// confirms `MessageImprint.hashedMessage == hash(canonical_bytes)`.
    fn verify_tst(&self, der_tst: &[u8], canonical_bytes: &[u8]) -> TstOutcome;
}

/// Canonicalizes `signature_value_element` (the `<ds:SignatureValue>`
/// fragment, exactly as serialized) under `method`, the imprint a TSA must
/// be asked to stamp (§4.7 attach step 1).
pub fn signature_value_imprint_source(
    signature_value_element: &[u8],
    method: C14nMethod,
) -> Result<Vec<u8>> {
    canonicalize(signature_value_element, method)
}

/// Requests a fresh TST over `signature_value_element` and wraps it as a
/// `<SignatureTimeStamp>` (§4.7 attach).
pub fn attach_timestamp(
    tsa: &dyn TimestampAuthority,
    signature_value_element: &[u8],
    method: C14nMethod,
    hash_alg: &str,
) -> Result<SignatureTimeStamp> {
    let canonical = signature_value_imprint_source(signature_value_element, method)?;
    let der_tst = tsa.request_tst(&canonical, hash_alg)?;
    Ok(SignatureTimeStamp {
        canonicalization_method: method,
        encapsulated_time_stamp: der_tst,
    })
}

/// Validates one `<SignatureTimeStamp>` against the parent signature's
/// `<ds:SignatureValue>` element (§4.7 validate).
///
/// Returns `Ok(())` for a valid or inconclusive timestamp (the caller is
/// expected to fold `Inconclusive` into a [`crate::report::VerificationReport`]
/// rather than fail outright); returns `Err(Error::TimestampInvalid)` for an
/// imprint mismatch or signature failure.
pub fn validate_timestamp(
    tsa: &dyn TimestampAuthority,
    timestamp: &SignatureTimeStamp,
    signature_value_element: &[u8],
) -> Result<TstOutcome> {
    let canonical = signature_value_imprint_source(
        signature_value_element,
        timestamp.canonicalization_method,
    )?;
    match tsa.verify_tst(&timestamp.encapsulated_time_stamp, &canonical) {
        TstOutcome::Valid => Ok(TstOutcome::Valid),
        TstOutcome::Inconclusive(reason) => {
            tracing::warn!(reason = %reason, "timestamp validation inconclusive, not failing verification");
            Ok(TstOutcome::Inconclusive(reason))
        }
        TstOutcome::Invalid(reason) => Err(Error::TimestampInvalid(reason)),
    }
}

/// Validates every `<SignatureTimeStamp>` in order, short-circuiting on the
/// first fatal failure; inconclusive outcomes are collected rather than
/// discarded so the caller can surface them in a
/// [`crate::report::VerificationReport`].
pub fn validate_timestamps(
    tsa: &dyn TimestampAuthority,
    timestamps: &[SignatureTimeStamp],
    signature_value_element: &[u8],
) -> Result<Vec<TstOutcome>> {
    timestamps
        .iter()
        .map(|ts| validate_timestamp(tsa, ts, signature_value_element))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::DigestAlgorithm;

    /// A deterministic mock TSA that just echoes `SHA-256(imprint)` as its
    /// "token" and treats a byte mismatch as invalid — enough to exercise
    /// the attach/validate plumbing without a real RFC 3161 stack (mirrors
    /// scenario S4).
    struct MockTsa;

    impl TimestampAuthority for MockTsa {
        fn request_tst(&self, imprint: &[u8], _hash_alg: &str) -> Result<Vec<u8>> {
            Ok(DigestAlgorithm::Sha256.digest(imprint))
        }

        fn verify_tst(&self, der_tst: &[u8], canonical_bytes: &[u8]) -> TstOutcome {
            let expected = DigestAlgorithm::Sha256.digest(canonical_bytes);
            if der_tst == expected {
                TstOutcome::Valid
            } else {
                TstOutcome::Invalid("message imprint mismatch".into())
            }
        }
    }

    struct UnreachableTsa;

    impl TimestampAuthority for UnreachableTsa {
        fn request_tst(&self, _imprint: &[u8], _hash_alg: &str) -> Result<Vec<u8>> {
            Err(Error::ExternalFetchFailed(Box::<
                dyn std::error::Error + Send + Sync,
            >::from("tsa unreachable")))
        }

        fn verify_tst(&self, _der_tst: &[u8], _canonical_bytes: &[u8]) -> TstOutcome {
            TstOutcome::Inconclusive("OCSP responder unreachable".into())
        }
    }

    #[test]
    fn attach_then_validate_succeeds() {
        let tsa = MockTsa;
        let sig_value_el = br#"<ds:SignatureValue>abc123</ds:SignatureValue>"#;
        let ts = attach_timestamp(&tsa, sig_value_el, C14nMethod::ExclusiveC14N, "SHA256").unwrap();
        let outcome = validate_timestamp(&tsa, &ts, sig_value_el).unwrap();
        assert_eq!(outcome, TstOutcome::Valid);
    }

    #[test]
    fn mutated_signature_value_invalidates_timestamp() {
        let tsa = MockTsa;
        let sig_value_el = br#"<ds:SignatureValue>abc123</ds:SignatureValue>"#;
        let ts = attach_timestamp(&tsa, sig_value_el, C14nMethod::ExclusiveC14N, "SHA256").unwrap();
        let mutated = br#"<ds:SignatureValue>xyz999</ds:SignatureValue>"#;
        let err = validate_timestamp(&tsa, &ts, mutated).unwrap_err();
        assert!(matches!(err, Error::TimestampInvalid(_)));
    }

    #[test]
    fn unreachable_tsa_is_inconclusive_not_fatal() {
        let tsa = UnreachableTsa;
        let ts = SignatureTimeStamp {
            canonicalization_method: C14nMethod::ExclusiveC14N,
            encapsulated_time_stamp: vec![0; 4],
        };
        let sig_value_el = br#"<ds:SignatureValue>abc123</ds:SignatureValue>"#;
        let outcome = validate_timestamp(&tsa, &ts, sig_value_el).unwrap();
        assert!(matches!(outcome, TstOutcome::Inconclusive(_)));
    }
}
