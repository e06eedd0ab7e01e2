//! SignedInfo / Signature Driver (C4): assembling `<ds:SignedInfo>`,
//! canonicalizing it, and driving the key-backed signer/verifier.
//!
//! Adapted from the teacher crate's own `crypto::sign_document`, which built
//! `SignedInfo` from a format string and signed it with a `signature::Signer<
//! Vec<u8>> + Digest` bound. This generalizes that to the full XAdES
//! reference set (payload + SignedProperties) and any canonicalization/
//! signature-method pair, and splits signing from verification.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use signature::{Signer, Verifier};

use crate::canonical::{rsa_signature_method_uri, C14nMethod, DigestAlgorithm};
use crate::error::{Error, Result};
use crate::reference::Reference;
use crate::tree::raw::XmlElement;

/// The declarative half of `<ds:SignedInfo>`.
#[derive(Debug, Clone)]
pub struct SignedInfoSpec {
    /// `<CanonicalizationMethod>`.
    pub c14n_method: C14nMethod,
    /// `<SignatureMethod Algorithm="...">`.
    pub signature_method: String,
    /// Ordered `<Reference>` entries; by convention (§5) the payload
    /// reference comes first and the SignedProperties reference second.
    pub references: Vec<Reference>,
}

impl SignedInfoSpec {
    /// Builds a `SignedInfoSpec` with the default RSA signature method for
    /// `digest`.
    pub fn new(references: Vec<Reference>, c14n_method: C14nMethod, digest: DigestAlgorithm) -> Self {
        SignedInfoSpec {
            c14n_method,
            signature_method: rsa_signature_method_uri(digest).to_owned(),
            references,
        }
    }

    /// Renders to `<ds:SignedInfo>`.
    pub fn to_element(&self) -> XmlElement {
        let mut el = XmlElement::new(Some("ds"), "SignedInfo")
            .child(
                XmlElement::new(Some("ds"), "CanonicalizationMethod")
                    .attr("Algorithm", self.c14n_method.algorithm_uri()),
            )
            .child(
                XmlElement::new(Some("ds"), "SignatureMethod")
                    .attr("Algorithm", self.signature_method.clone()),
            );
        for reference in &self.references {
            el = el.child(reference.to_element());
        }
        el
    }

    /// Parses from `<ds:SignedInfo>`, using the method it declares for its
    /// own canonicalization (§4.4 verification step 1: "canonicalize its
    /// `<SignedInfo>` using the method declared inside").
    pub fn from_element(el: &XmlElement) -> Result<Self> {
        if el.local_name != "SignedInfo" {
            return Err(Error::StructuralMismatch("expected SignedInfo element".into()));
        }
        let c14n_uri = el
            .child_named("CanonicalizationMethod")
            .and_then(|e| e.attribute("Algorithm"))
            .ok_or_else(|| {
                Error::StructuralMismatch("SignedInfo missing CanonicalizationMethod".into())
            })?;
        let signature_method = el
            .child_named("SignatureMethod")
            .and_then(|e| e.attribute("Algorithm"))
            .ok_or_else(|| Error::StructuralMismatch("SignedInfo missing SignatureMethod".into()))?
            .to_owned();
        let references = el
            .children_named("Reference")
            .map(Reference::from_element)
            .collect::<Result<Vec<_>>>()?;
        Ok(SignedInfoSpec {
            c14n_method: C14nMethod::from_uri(c14n_uri)?,
            signature_method,
            references,
        })
    }
}

/// Canonicalizes `<ds:SignedInfo>` under its own declared method. This is
/// exactly what an in-process signer signs, and what an out-of-process
/// signer (HSM, remote signer) must be handed instead (§4.4: "the returned
/// bytes must be exactly what an in-process signer would have signed").
pub fn canonical_signed_info_bytes(spec: &SignedInfoSpec) -> Result<Vec<u8>> {
    let bytes = spec.to_element().to_bytes()?;
    crate::canonical::canonicalize(&bytes, spec.c14n_method)
}

/// Signs the canonical `<SignedInfo>` bytes, returning the raw
/// `<SignatureValue>` bytes (not yet base64-encoded).
pub fn sign_signed_info<S>(spec: &SignedInfoSpec, signer: &S) -> Result<Vec<u8>>
where
    S: Signer<Vec<u8>>,
{
    let canonical = canonical_signed_info_bytes(spec)?;
    Ok(signer.try_sign(&canonical)?)
}

/// Verifies `signature_value` against the canonical `<SignedInfo>` bytes
/// (§4.4 verification step 4).
pub fn verify_signed_info<V>(
    spec: &SignedInfoSpec,
    verifier: &V,
    signature_value: &[u8],
) -> Result<()>
where
    V: Verifier<Vec<u8>> + ?Sized,
{
    let canonical = canonical_signed_info_bytes(spec)?;
    verifier
        .verify(&canonical, &signature_value.to_vec())
        .map_err(|_| Error::SignatureCryptoInvalid)
}

/// `<ds:KeyInfo>/<ds:X509Data>`: the signer certificate plus an optional
/// issuer chain (§4.4 step 4).
#[derive(Debug, Clone)]
pub struct KeyInfo {
    /// DER bytes of the signer's own certificate.
    pub certificate_der: Vec<u8>,
    /// DER bytes of any issuer certificates, signer-to-root order.
    pub chain_der: Vec<Vec<u8>>,
}

impl KeyInfo {
    /// Renders to `<ds:KeyInfo>`.
    pub fn to_element(&self) -> XmlElement {
        let mut x509_data = XmlElement::new(Some("ds"), "X509Data");
        for der in std::iter::once(&self.certificate_der).chain(self.chain_der.iter()) {
            x509_data = x509_data.child(
                XmlElement::new(Some("ds"), "X509Certificate").text(BASE64.encode(der)),
            );
        }
        XmlElement::new(Some("ds"), "KeyInfo").child(x509_data)
    }

    /// Parses from `<ds:KeyInfo>`; the first `<X509Certificate>` is the
    /// signer, the rest (if any) the issuer chain.
    pub fn from_element(el: &XmlElement) -> Result<Self> {
        let x509_data = el
            .child_named("X509Data")
            .ok_or_else(|| Error::StructuralMismatch("KeyInfo missing X509Data".into()))?;
        let mut certs = x509_data
            .children_named("X509Certificate")
            .map(|e| {
                let text = e.text.as_deref().ok_or_else(|| {
                    Error::StructuralMismatch("X509Certificate has no text content".into())
                })?;
                Ok(BASE64.decode(text)?)
            })
            .collect::<Result<Vec<Vec<u8>>>>()?;
        if certs.is_empty() {
            return Err(Error::StructuralMismatch(
                "X509Data has no X509Certificate entries".into(),
            ));
        }
        let certificate_der = certs.remove(0);
        Ok(KeyInfo {
            certificate_der,
            chain_der: certs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::DigestAlgorithm;
    use crate::reference::{Reference, ReferenceSpec};
    use signature::Error as SignatureError;

    /// A deterministic stand-in signer/verifier pair for exercising C4
    /// without a real asymmetric key: "sign" is `SHA-256(key || message)`,
    /// which `verify` recomputes and compares.
    struct FakeKeyedSigner {
        key: Vec<u8>,
    }

    impl Signer<Vec<u8>> for FakeKeyedSigner {
        fn try_sign(&self, msg: &[u8]) -> std::result::Result<Vec<u8>, SignatureError> {
            Ok(DigestAlgorithm::Sha256.digest(&[self.key.as_slice(), msg].concat()))
        }
    }

    impl Verifier<Vec<u8>> for FakeKeyedSigner {
        fn verify(&self, msg: &[u8], signature: &Vec<u8>) -> std::result::Result<(), SignatureError> {
            let expected = DigestAlgorithm::Sha256.digest(&[self.key.as_slice(), msg].concat());
            if &expected == signature {
                Ok(())
            } else {
                Err(SignatureError::new())
            }
        }
    }

    fn sample_reference() -> Reference {
        Reference {
            spec: ReferenceSpec {
                id: None,
                uri: "".into(),
                ref_type: None,
                transforms: vec![],
                digest_method: DigestAlgorithm::Sha256,
            },
            digest_value: vec![1, 2, 3],
        }
    }

    #[test]
    fn signed_info_round_trips_through_element() {
        let spec = SignedInfoSpec::new(vec![sample_reference()], C14nMethod::ExclusiveC14N, DigestAlgorithm::Sha256);
        let el = spec.to_element();
        let bytes = el.to_bytes().unwrap();
        let reparsed = XmlElement::parse(&bytes).unwrap();
        let back = SignedInfoSpec::from_element(&reparsed).unwrap();
        assert_eq!(back.references.len(), 1);
        assert_eq!(back.signature_method, spec.signature_method);
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let spec = SignedInfoSpec::new(vec![sample_reference()], C14nMethod::ExclusiveC14N, DigestAlgorithm::Sha256);
        let signer = FakeKeyedSigner { key: b"k1".to_vec() };
        let sig = sign_signed_info(&spec, &signer).unwrap();
        verify_signed_info(&spec, &signer, &sig).unwrap();
    }

    #[test]
    fn tampered_signature_value_fails() {
        let spec = SignedInfoSpec::new(vec![sample_reference()], C14nMethod::ExclusiveC14N, DigestAlgorithm::Sha256);
        let signer = FakeKeyedSigner { key: b"k1".to_vec() };
        let mut sig = sign_signed_info(&spec, &signer).unwrap();
        sig[0] ^= 0xFF;
        let err = verify_signed_info(&spec, &signer, &sig).unwrap_err();
        assert!(matches!(err, Error::SignatureCryptoInvalid));
    }

    #[test]
    fn key_info_round_trips_with_chain() {
        let key_info = KeyInfo {
            certificate_der: b"leaf-cert".to_vec(),
            chain_der: vec![b"issuer-cert".to_vec()],
        };
        let el = key_info.to_element();
        let bytes = el.to_bytes().unwrap();
        let reparsed = XmlElement::parse(&bytes).unwrap();
        let back = KeyInfo::from_element(&reparsed).unwrap();
        assert_eq!(back.certificate_der, b"leaf-cert".to_vec());
        assert_eq!(back.chain_der, vec![b"issuer-cert".to_vec()]);
    }
}
