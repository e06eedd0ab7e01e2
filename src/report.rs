//! Verification outcome reporting.
//!
//! `verify()` cannot simply return `Result<(), Error>`: §7 requires
//! `TimestampInconclusive` to be logged without failing an otherwise-valid
//! signature, and §4.7/§4.8 each produce a sub-outcome per timestamp/
//! counter-signature rather than a single pass/fail bit. `VerificationReport`
//! carries the overall fatal-or-not result alongside every sub-outcome so a
//! caller can inspect what actually happened.

use crate::timestamp::TstOutcome;

/// The result of validating one `<SignatureTimeStamp>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampOutcome {
    /// Index of the timestamp within `UnsignedSignatureProperties`, in
    /// attach order.
    pub index: usize,
    /// What the TSA collaborator reported.
    pub outcome: TstOutcome,
}

/// The result of validating one nested counter-signature.
#[derive(Debug, Clone)]
pub struct CounterSignatureOutcome {
    /// `@Id` of the inner `<ds:Signature>`, if present.
    pub signature_id: Option<String>,
    /// `Ok(())` if the inner signature verified as a stand-alone signature
    /// and its `@Type`/`@URI` correctly names the outer `SignatureValue`;
    /// `Err` with a human-readable reason otherwise.
    pub result: Result<(), String>,
}

/// The full outcome of one `verify()` call.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    /// Outcome for every `<SignatureTimeStamp>` found, in order.
    pub timestamps: Vec<TimestampOutcome>,
    /// Outcome for every nested counter-signature found.
    pub counter_signatures: Vec<CounterSignatureOutcome>,
}

impl VerificationReport {
    /// True if no timestamp came back inconclusive — callers that want to
    /// treat "inconclusive" as a soft failure can check this in addition to
    /// `verify()`'s `Ok(())`.
    pub fn all_timestamps_conclusive(&self) -> bool {
        self.timestamps
            .iter()
            .all(|t| !matches!(t.outcome, TstOutcome::Inconclusive(_)))
    }

    /// True if every counter-signature in the report verified.
    pub fn all_counter_signatures_valid(&self) -> bool {
        self.counter_signatures.iter().all(|c| c.result.is_ok())
    }
}
