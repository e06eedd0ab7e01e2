//! Signing configuration and the policy strategy hook.
//!
//! §9 turns the source tree model's deep inheritance (subclasses overriding
//! policy-identifier/validation/filename behavior) into a small strategy
//! interface the orchestrator consults instead of being subclassed.

use crate::canonical::{C14nMethod, DigestAlgorithm};
use crate::error::Result;
use crate::tree::xades::SignedProperties;

/// Tunables for one `sign()` call: canonicalization/digest choice, the
/// XAdES element prefix, and whether to attach a timestamp immediately.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// C14N method for `<SignedInfo>` and every `<Reference>`'s transform.
    pub c14n_method: C14nMethod,
    /// Digest algorithm for references and the certificate binding.
    pub digest_method: DigestAlgorithm,
    /// Namespace prefix XAdES elements are emitted under.
    pub xades_prefix: String,
    /// Request a `<SignatureTimeStamp>` as part of the same `sign()` call.
    pub add_timestamp: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        SignatureConfig {
            c14n_method: C14nMethod::default(),
            digest_method: DigestAlgorithm::default(),
            xades_prefix: "xa".to_owned(),
            add_timestamp: false,
        }
    }
}

/// The strategy hook §9 carves out of the source's inheritance hierarchy:
/// policy identification, implied/explicit policy validation, and output
/// naming. The default strategy does nothing beyond what the orchestrator
/// already does on its own.
pub trait PolicyStrategy {
    /// Returns the `SignaturePolicyIdentifier` to embed, if this strategy
    /// wants one beyond what the caller already supplied.
    fn policy_identifier(&self) -> Option<crate::tree::xades::SignaturePolicyIdentifier> {
        None
    }

    /// Validates an implied-policy signature; the default accepts any
    /// implied policy unconditionally, since §1's Non-goals exclude policy
    /// validation beyond parsing and digest check.
    fn validate_implied(&self, _signed_properties: &SignedProperties) -> Result<()> {
        Ok(())
    }

    /// Validates an explicit policy's digest against the fetched policy
    /// document bytes, if one was supplied. The default performs no fetch
    /// and accepts unconditionally; a caller wanting the digest check wires
    /// a strategy that fetches `policy_document_url` and compares.
    fn validate_explicit(
        &self,
        _signed_properties: &SignedProperties,
        _policy_document: Option<&[u8]>,
    ) -> Result<()> {
        Ok(())
    }

    /// The filename a signature for `(save_location, save_name)` should use.
    /// The default orchestrator behavior (§4.6's `.xml` default-extension
    /// rule) already covers every case this crate needs, so the default
    /// defers to it.
    fn signature_filename(&self, save_location: &str, save_name: &str) -> String {
        format!("{save_location}/{save_name}")
    }

    /// The URL a policy identifier's OID/URN should be fetched from, if this
    /// strategy knows how to resolve one.
    fn policy_document_url(&self, _identifier: &str) -> Option<String> {
        None
    }
}

/// The do-nothing strategy every `sign()`/`verify()` call gets unless a
/// caller supplies their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicyStrategy;

impl PolicyStrategy for DefaultPolicyStrategy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_exclusive_c14n_and_sha256() {
        let config = SignatureConfig::default();
        assert_eq!(config.c14n_method, C14nMethod::ExclusiveC14N);
        assert_eq!(config.digest_method, DigestAlgorithm::Sha256);
        assert!(!config.add_timestamp);
    }

    #[test]
    fn default_strategy_accepts_any_implied_policy() {
        let strategy = DefaultPolicyStrategy;
        let sp = SignedProperties {
            id: "sp".into(),
            signed_signature_properties: crate::tree::xades::SignedSignatureProperties {
                signing_time: chrono::Utc::now(),
                signing_certificate: crate::tree::xades::SigningCertificateChoice::V2(
                    crate::tree::xades::SigningCertificateV2::default(),
                ),
                signature_policy_identifier: None,
                signature_production_place: None,
                signer_role: None,
            },
            signed_data_object_properties: Default::default(),
        };
        assert!(strategy.validate_implied(&sp).is_ok());
    }
}
