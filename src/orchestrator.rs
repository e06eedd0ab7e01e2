//! XAdES Orchestrator (C6): the top-level sign / verify / counter-sign
//! flows that wire every other component together.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use signature::{Signer, Verifier};

use crate::canonical::DigestAlgorithm;
use crate::certbind::{self, X509CertInfo, X509Info};
use crate::config::{DefaultPolicyStrategy, PolicyStrategy, SignatureConfig};
use crate::countersign;
use crate::error::{Error, Result};
use crate::idregistry::IdRegistry;
use crate::model::{ResourceInput, SignatureDocument};
use crate::reference::{self, DocumentResolver, Reference, ReferenceSpec, TransformStep};
use crate::report::{CounterSignatureOutcome, TimestampOutcome, VerificationReport};
use crate::signature::{self as sigdriver, KeyInfo, SignedInfoSpec};
use crate::timestamp::{self, TimestampAuthority};
use crate::tree::raw::XmlElement;
use crate::tree::xades::{
    normalize_xades_prefix, QualifyingProperties, SignaturePolicyIdentifier,
    SignatureProductionPlace, SignedDataObjectProperties, SignedProperties,
    SignedSignatureProperties, SignerRole, SIGNED_PROPERTIES_TYPE,
};

/// Sign-side state machine (§4.6). Transitions are asserted inline in
/// [`Orchestrator::sign`] rather than carried in a returned value — there is
/// nothing a caller can usefully do with an in-flight state, only with the
/// eventual `Ok`/`Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignState {
    Init,
    DocLoaded,
    QPBuilt,
    ReferencesAdded,
    SignedInfoCanonicalized,
    Signed,
    Emitted,
}

/// Reads a [`ResourceInput`]'s bytes (for `File`/`Url` variants, which
/// require real I/O) and writes the final document to its resolved output
/// path. File I/O is named out of scope in §1; this is that collaborator's
/// contract.
pub trait DocumentIo {
    /// Reads the bytes a `File`/`Url` input names.
    fn read(&self, input: &ResourceInput) -> Result<Vec<u8>>;
    /// Writes `bytes` to `path`, creating/truncating as needed.
    fn write(&self, path: &std::path::Path, bytes: &[u8]) -> Result<()>;
}

/// Resolves a certificate's public key into something that can check a
/// signature over arbitrary bytes. RSA/EC key parsing itself is the
/// out-of-scope cryptographic-primitive collaborator named in §1.
pub trait VerifyingKeyResolver {
    /// Builds a verifier for `cert`'s public key.
    fn resolve(&self, cert: &dyn X509Info) -> Result<Box<dyn Verifier<Vec<u8>>>>;
}

/// A certificate resolved from either `<KeyInfo>` or a caller-supplied trust
/// anchor, with its fields already extracted so the rest of verification
/// doesn't care which source it came from.
struct ResolvedCert {
    der: Vec<u8>,
    serial: Vec<u8>,
    issuer: String,
}

impl X509Info for ResolvedCert {
    fn der_bytes(&self) -> &[u8] {
        &self.der
    }

    fn serial_bytes(&self) -> Vec<u8> {
        self.serial.clone()
    }

    fn issuer_name(&self) -> String {
        self.issuer.clone()
    }
}

impl ResolvedCert {
    fn from_info(info: &dyn X509Info) -> Self {
        ResolvedCert {
            der: info.der_bytes().to_vec(),
            serial: info.serial_bytes(),
            issuer: info.issuer_name(),
        }
    }
}

/// Top-level sign/verify/counter-sign entrypoint (C6). Owns a
/// [`SignatureConfig`] and a [`PolicyStrategy`]; holds no other state, so one
/// instance can drive any number of independent sign/verify calls (§5: "a
/// sign or verify call owns its DOM tree exclusively").
pub struct Orchestrator<P: PolicyStrategy = DefaultPolicyStrategy> {
    /// C14N/digest/prefix/timestamp tunables.
    pub config: SignatureConfig,
    /// The policy/filename strategy hook (§9).
    pub policy: P,
}

impl Orchestrator<DefaultPolicyStrategy> {
    /// Builds an orchestrator with the default (no-op) policy strategy.
    pub fn new(config: SignatureConfig) -> Self {
        Orchestrator {
            config,
            policy: DefaultPolicyStrategy,
        }
    }
}

impl<P: PolicyStrategy> Orchestrator<P> {
    /// Builds an orchestrator with a caller-supplied policy strategy.
    pub fn with_policy(config: SignatureConfig, policy: P) -> Self {
        Orchestrator { config, policy }
    }

    /// Signs `input`, producing a `<ds:Signature>` with XAdES qualifying
    /// properties (§4.6 sign). Returns the emitted document bytes (the full
    /// host document for enveloped mode, the bare `<ds:Signature>` for
    /// detached); also writes them via `doc_io` to `input.output_path()` when
    /// a `DocumentIo` is supplied.
    ///
    /// `issuer_chain` lists the signer's issuer certificates, immediate
    /// issuer first; an empty slice omits `IssuerSerialV2` and emits a
    /// digest-only `SigningCertificateV2` instead. Each entry also becomes a
    /// `<ds:X509Certificate>` in `<KeyInfo>`'s chain.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip_all, err, fields(detached = input.detached()))]
    pub fn sign<S>(
        &self,
        input: &ResourceInput,
        signer_cert: &dyn X509Info,
        issuer_chain: &[&dyn X509Info],
        signing_key: &S,
        production_place: Option<SignatureProductionPlace>,
        signer_role: Option<SignerRole>,
        tsa: Option<&dyn TimestampAuthority>,
        doc_io: Option<&dyn DocumentIo>,
    ) -> Result<Vec<u8>>
    where
        S: Signer<Vec<u8>>,
    {
        input.validate()?;
        let mut state = SignState::Init;

        let source_bytes = load_input_bytes(input, doc_io)?;
        let detached = input.detached();
        tracing::debug!(bytes = source_bytes.len(), detached, "loaded sign input");

        if !detached {
            let doc = SignatureDocument::from_string(String::from_utf8_lossy(&source_bytes).into_owned());
            if doc.has_signature() {
                return Err(Error::DocumentConflict);
            }
        }
        state = SignState::DocLoaded;

        let mut registry = IdRegistry::new();
        let signature_id = registry.fresh_id("sig");
        let signature_value_id = registry.fresh_id("xmldsig-sig-value");
        let signed_properties_id = registry.fresh_id("signed-properties");

        let signing_certificate = if issuer_chain.is_empty() {
            certbind::build_signing_certificate_v2_digest_only(signer_cert, self.config.digest_method)
        } else {
            certbind::build_signing_certificate_v2(signer_cert, issuer_chain, self.config.digest_method)?
        };

        let signed_signature_properties = SignedSignatureProperties {
            signing_time: chrono::Utc::now(),
            signing_certificate,
            signature_policy_identifier: self.policy.policy_identifier(),
            signature_production_place: production_place,
            signer_role,
        };
        let signed_properties = SignedProperties {
            id: signed_properties_id.clone(),
            signed_signature_properties,
            signed_data_object_properties: SignedDataObjectProperties::default(),
        };
        let mut qualifying_properties = QualifyingProperties {
            target: format!("#{signature_id}"),
            signed_properties,
            unsigned_properties: None,
        };
        qualifying_properties.validate_structure()?;
        let mut qp_element = qualifying_properties.to_element(&self.config.xades_prefix);
        normalize_xades_prefix(&mut qp_element, &self.config.xades_prefix);
        state = SignState::QPBuilt;

        let sp_bytes = qp_element
            .child_named("SignedProperties")
            .expect("just built")
            .to_bytes()?;
        let sp_transforms = vec![TransformStep::c14n(self.config.c14n_method)];
        let sp_transformed = reference::apply_transforms(sp_bytes, &sp_transforms)?;
        let signed_properties_reference = Reference {
            spec: ReferenceSpec {
                id: None,
                uri: format!("#{signed_properties_id}"),
                ref_type: Some(SIGNED_PROPERTIES_TYPE.to_owned()),
                transforms: sp_transforms,
                digest_method: self.config.digest_method,
            },
            digest_value: self.config.digest_method.digest(&sp_transformed),
        };

        tracing::trace!("building payload reference");
        let payload_reference = if detached {
            let uri = input.reference_uri()?;
            let empty_root = XmlElement::new(None, "placeholder");
            let resolver = DocumentResolver {
                root: &empty_root,
                external: Some((uri.as_str(), source_bytes.as_slice())),
            };
            reference::build_reference(
                &resolver,
                &uri,
                None,
                vec![TransformStep::c14n(self.config.c14n_method)],
                self.config.digest_method,
                None,
            )?
        } else {
            let host_root = XmlElement::parse(&source_bytes)?;
            let resolver = DocumentResolver {
                root: &host_root,
                external: None,
            };
            reference::build_reference(
                &resolver,
                "",
                None,
                vec![
                    TransformStep::enveloped(),
                    TransformStep::c14n(self.config.c14n_method),
                ],
                self.config.digest_method,
                None,
            )?
        };

        let mut references = vec![payload_reference];
        reference::add_signed_properties_reference(&mut references, signed_properties_reference);
        reference::assert_signed_properties_reference_present(&references, &signed_properties_id)?;
        state = SignState::ReferencesAdded;

        let signed_info = SignedInfoSpec::new(references, self.config.c14n_method, self.config.digest_method);
        let _canonical_signed_info = sigdriver::canonical_signed_info_bytes(&signed_info)?;
        tracing::debug!(c14n = ?self.config.c14n_method, "canonicalized SignedInfo");
        state = SignState::SignedInfoCanonicalized;

        let signature_value = sigdriver::sign_signed_info(&signed_info, signing_key)?;
        state = SignState::Signed;

        let key_info = KeyInfo {
            certificate_der: signer_cert.der_bytes().to_vec(),
            chain_der: issuer_chain.iter().map(|c| c.der_bytes().to_vec()).collect(),
        };

        let mut signature_value_element =
            XmlElement::new(Some("ds"), "SignatureValue").attr("Id", signature_value_id.clone());
        signature_value_element.text = Some(BASE64.encode(&signature_value));

        let mut signature_element = XmlElement::new(Some("ds"), "Signature")
            .attr("Id", signature_id.clone())
            .child(signed_info.to_element())
            .child(signature_value_element)
            .child(key_info.to_element())
            .child(XmlElement::new(Some("ds"), "Object").child(qp_element));

        if let Some(tsa) = tsa.filter(|_| self.config.add_timestamp) {
            let ts_el = signature_element
                .child_named("SignatureValue")
                .expect("just built")
                .to_bytes()?;
            let timestamp = timestamp::attach_timestamp(
                tsa,
                &ts_el,
                self.config.c14n_method,
                digest_alg_name(self.config.digest_method),
            )?;
            let object = signature_element
                .children
                .iter_mut()
                .find(|c| c.local_name == "Object")
                .expect("just built");
            let qp = object
                .children
                .iter_mut()
                .find(|c| c.local_name == "QualifyingProperties")
                .expect("just built");
            let mut unsigned_properties =
                XmlElement::new(Some(self.config.xades_prefix.as_str()), "UnsignedProperties");
            let mut unsigned_signature_properties = XmlElement::new(
                Some(self.config.xades_prefix.as_str()),
                "UnsignedSignatureProperties",
            );
            unsigned_signature_properties
                .children
                .push(timestamp.to_element(&self.config.xades_prefix));
            unsigned_properties
                .children
                .push(unsigned_signature_properties);
            qp.children.push(unsigned_properties);
        }

        let emitted = if detached {
            signature_element.to_bytes()?
        } else {
            let mut host_root = XmlElement::parse(&source_bytes)?;
            host_root.children.push(signature_element);
            host_root.to_bytes()?
        };
        state = SignState::Emitted;
        debug_assert_eq!(state, SignState::Emitted);

        if let Some(doc_io) = doc_io {
            doc_io.write(&input.output_path(), &emitted)?;
        }

        Ok(emitted)
    }

    /// Verifies a signed document (§4.6 verify): locates the `<ds:Signature>`,
    /// validates every reference, checks the signing-certificate binding,
    /// verifies `<SignatureValue>`, and validates any timestamps/
    /// counter-signatures it finds.
    ///
    /// `external` supplies `(reference_uri, bytes)` for a detached payload
    /// that does not live inside `document_bytes` itself; pass `None` for an
    /// enveloped signature or a detached signature over same-document
    /// fragments only.
    #[tracing::instrument(skip_all, err, fields(bytes = document_bytes.len()))]
    pub fn verify(
        &self,
        document_bytes: &[u8],
        key_resolver: &dyn VerifyingKeyResolver,
        trust_cert: Option<&dyn X509Info>,
        tsa: Option<&dyn TimestampAuthority>,
        external: Option<(&str, &[u8])>,
    ) -> Result<VerificationReport> {
        let mut registry = IdRegistry::new();
        let root = XmlElement::parse(document_bytes)?;
        let signature_element = if root.local_name == "Signature" {
            &root
        } else {
            root.find_by_local_name("Signature")
                .ok_or_else(|| Error::StructuralMismatch("document has no ds:Signature".into()))?
        };
        register_ids(signature_element, &mut registry)?;

        let signed_info_el = signature_element
            .child_named("SignedInfo")
            .ok_or_else(|| Error::StructuralMismatch("Signature missing SignedInfo".into()))?;
        let signed_info = SignedInfoSpec::from_element(signed_info_el)?;

        let resolver = DocumentResolver {
            root: &root,
            external,
        };
        for reference in &signed_info.references {
            tracing::trace!(uri = %reference.spec.uri, "verifying reference digest");
            reference::verify_reference(&resolver, reference)?;
        }

        let resolved_cert = match signature_element.child_named("KeyInfo") {
            Some(ki_el) => {
                let key_info = KeyInfo::from_element(ki_el)?;
                let parsed = X509CertInfo::from_der(&key_info.certificate_der)?;
                ResolvedCert::from_info(&parsed)
            }
            None => {
                let trust = trust_cert.ok_or_else(|| {
                    Error::StructuralMismatch("missing KeyInfo and no trust certificate supplied".into())
                })?;
                ResolvedCert::from_info(trust)
            }
        };

        let signature_value_el = signature_element
            .child_named("SignatureValue")
            .ok_or_else(|| Error::StructuralMismatch("Signature missing SignatureValue".into()))?;
        let signature_value_b64 = signature_value_el
            .text
            .as_deref()
            .ok_or_else(|| Error::StructuralMismatch("SignatureValue has no text content".into()))?;
        let signature_value = BASE64.decode(signature_value_b64)?;

        let verifying_key = key_resolver.resolve(&resolved_cert)?;
        sigdriver::verify_signed_info(&signed_info, verifying_key.as_ref(), &signature_value)?;

        let object_el = signature_element
            .child_named("Object")
            .ok_or_else(|| Error::StructuralMismatch("Signature missing Object".into()))?;
        let qp_el = object_el
            .find_by_local_name("QualifyingProperties")
            .ok_or_else(|| Error::StructuralMismatch("Object missing QualifyingProperties".into()))?;
        let qualifying_properties = QualifyingProperties::from_element(qp_el)?;
        qualifying_properties.validate_structure()?;

        reference::assert_signed_properties_reference_present(
            &signed_info.references,
            &qualifying_properties.signed_properties.id,
        )?;

        certbind::verify_signing_certificate(
            &resolved_cert,
            &qualifying_properties
                .signed_properties
                .signed_signature_properties
                .signing_certificate,
        )?;

        match &qualifying_properties
            .signed_properties
            .signed_signature_properties
            .signature_policy_identifier
        {
            Some(SignaturePolicyIdentifier::Implied) => {
                self.policy.validate_implied(&qualifying_properties.signed_properties)?;
            }
            Some(SignaturePolicyIdentifier::Explicit { .. }) => {
                self.policy
                    .validate_explicit(&qualifying_properties.signed_properties, None)?;
            }
            None => {}
        }

        let mut report = VerificationReport::default();

        if let Some(unsigned) = &qualifying_properties.unsigned_properties {
            let signature_value_bytes = signature_value_el.to_bytes()?;
            if let Some(tsa) = tsa {
                for (index, ts) in unsigned
                    .unsigned_signature_properties
                    .signature_time_stamps
                    .iter()
                    .enumerate()
                {
                    let outcome = timestamp::validate_timestamp(tsa, ts, &signature_value_bytes)?;
                    report.timestamps.push(TimestampOutcome { index, outcome });
                }
            }

            let outer_signature_value_id = signature_value_el.attribute("Id").map(str::to_owned);
            for inner_signature in &unsigned.unsigned_signature_properties.counter_signatures {
                let inner_signed_info_el = inner_signature.child_named("SignedInfo").ok_or_else(|| {
                    Error::CounterSignatureInvalid("counter-signature has no SignedInfo".into())
                })?;
                if let Some(outer_id) = &outer_signature_value_id {
                    countersign::assert_counters_outer(inner_signed_info_el, outer_id)?;
                }
                let inner_bytes = inner_signature.to_bytes()?;
                let inner_report = self.verify(&inner_bytes, key_resolver, None, tsa, None);
                report.counter_signatures.push(CounterSignatureOutcome {
                    signature_id: inner_signature.attribute("Id").map(str::to_owned),
                    result: inner_report.map(|_| ()).map_err(|e| e.to_string()),
                });
            }
        }

        // A failed counter-signature is a soft failure (§8 S5, Testable
        // Property 7): it does not invalidate an outer signature that is
        // otherwise cryptographically and structurally sound. Callers that
        // want counter-signature failures to be fatal check
        // `report.all_counter_signatures_valid()`, the same way timestamp
        // inconclusiveness is surfaced through `all_timestamps_conclusive()`.
        Ok(report)
    }

    /// Counter-signs an existing signed document: builds a fresh, complete
    /// XML-DSig signature over the outer `<ds:SignatureValue>` and appends it
    /// under `UnsignedSignatureProperties/CounterSignature` (§4.8).
    ///
    /// `issuer_chain` has the same meaning as in [`Orchestrator::sign`].
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip_all, err)]
    pub fn counter_sign<S>(
        &self,
        outer_document_bytes: &[u8],
        signer_cert: &dyn X509Info,
        issuer_chain: &[&dyn X509Info],
        signing_key: &S,
    ) -> Result<Vec<u8>>
    where
        S: Signer<Vec<u8>>,
    {
        let mut root = XmlElement::parse(outer_document_bytes)?;
        let outer_signature_index = root
            .children
            .iter()
            .position(|c| c.local_name == "Signature")
            .ok_or_else(|| Error::StructuralMismatch("document has no ds:Signature".into()))?;

        let outer_signature_value_bytes = {
            let outer_signature = &root.children[outer_signature_index];
            let sig_value_el = outer_signature
                .child_named("SignatureValue")
                .ok_or_else(|| Error::StructuralMismatch("Signature missing SignatureValue".into()))?;
            sig_value_el.to_bytes()?
        };
        let outer_signature_value_id = {
            let outer_signature = &root.children[outer_signature_index];
            outer_signature
                .child_named("SignatureValue")
                .and_then(|e| e.attribute("Id"))
                .ok_or_else(|| {
                    Error::StructuralMismatch("SignatureValue has no @Id to counter-sign".into())
                })?
                .to_owned()
        };

        let mut registry = IdRegistry::new();
        let inner_signature_id = registry.fresh_id("sig");
        let inner_signed_properties_id = registry.fresh_id("signed-properties");

        let signing_certificate = if issuer_chain.is_empty() {
            certbind::build_signing_certificate_v2_digest_only(signer_cert, self.config.digest_method)
        } else {
            certbind::build_signing_certificate_v2(signer_cert, issuer_chain, self.config.digest_method)?
        };
        let signed_properties = SignedProperties {
            id: inner_signed_properties_id.clone(),
            signed_signature_properties: SignedSignatureProperties {
                signing_time: chrono::Utc::now(),
                signing_certificate,
                signature_policy_identifier: self.policy.policy_identifier(),
                signature_production_place: None,
                signer_role: None,
            },
            signed_data_object_properties: SignedDataObjectProperties::default(),
        };
        let mut qualifying_properties = QualifyingProperties {
            target: format!("#{inner_signature_id}"),
            signed_properties,
            unsigned_properties: None,
        };
        qualifying_properties.validate_structure()?;
        let mut qp_element = qualifying_properties.to_element(&self.config.xades_prefix);
        normalize_xades_prefix(&mut qp_element, &self.config.xades_prefix);

        let sp_bytes = qp_element
            .child_named("SignedProperties")
            .expect("just built")
            .to_bytes()?;
        let sp_transforms = vec![TransformStep::c14n(self.config.c14n_method)];
        let sp_transformed = reference::apply_transforms(sp_bytes, &sp_transforms)?;
        let signed_properties_reference = Reference {
            spec: ReferenceSpec {
                id: None,
                uri: format!("#{inner_signed_properties_id}"),
                ref_type: Some(SIGNED_PROPERTIES_TYPE.to_owned()),
                transforms: sp_transforms,
                digest_method: self.config.digest_method,
            },
            digest_value: self.config.digest_method.digest(&sp_transformed),
        };

        let counter_reference = countersign::build_counter_signature_reference(
            &outer_signature_value_id,
            &outer_signature_value_bytes,
            self.config.c14n_method,
            self.config.digest_method,
        )?;

        let mut references = vec![counter_reference];
        reference::add_signed_properties_reference(&mut references, signed_properties_reference);

        let signed_info = SignedInfoSpec::new(references, self.config.c14n_method, self.config.digest_method);
        let signature_value = sigdriver::sign_signed_info(&signed_info, signing_key)?;

        let key_info = KeyInfo {
            certificate_der: signer_cert.der_bytes().to_vec(),
            chain_der: issuer_chain.iter().map(|c| c.der_bytes().to_vec()).collect(),
        };
        let mut signature_value_element = XmlElement::new(Some("ds"), "SignatureValue")
            .attr("Id", registry.fresh_id("xmldsig-sig-value"));
        signature_value_element.text = Some(BASE64.encode(&signature_value));

        let inner_signature = XmlElement::new(Some("ds"), "Signature")
            .attr("Id", inner_signature_id)
            .child(signed_info.to_element())
            .child(signature_value_element)
            .child(key_info.to_element())
            .child(XmlElement::new(Some("ds"), "Object").child(qp_element));

        let outer_signature = &mut root.children[outer_signature_index];
        let outer_object = outer_signature
            .children
            .iter_mut()
            .find(|c| c.local_name == "Object")
            .ok_or_else(|| Error::StructuralMismatch("outer Signature missing Object".into()))?;
        let outer_qp = outer_object
            .children
            .iter_mut()
            .find(|c| c.local_name == "QualifyingProperties")
            .ok_or_else(|| Error::StructuralMismatch("outer Object missing QualifyingProperties".into()))?;
        countersign::attach_counter_signature(outer_qp, inner_signature)?;

        root.to_bytes()
    }
}

fn load_input_bytes(input: &ResourceInput, doc_io: Option<&dyn DocumentIo>) -> Result<Vec<u8>> {
    match input {
        ResourceInput::InlineBytes { bytes, .. } => Ok(bytes.clone()),
        ResourceInput::InlineXmlTree { document, .. } => Ok(document.clone().into_bytes()),
        ResourceInput::File { .. } | ResourceInput::Url { .. } => doc_io
            .ok_or_else(|| {
                Error::InvalidInput("File/Url input requires a DocumentIo collaborator".into())
            })?
            .read(input),
    }
}

fn register_ids(el: &XmlElement, registry: &mut IdRegistry) -> Result<()> {
    if let Some(id) = el.attribute("Id") {
        registry.register(id)?;
    }
    for child in &el.children {
        register_ids(child, registry)?;
    }
    Ok(())
}

fn digest_alg_name(alg: DigestAlgorithm) -> &'static str {
    match alg {
        DigestAlgorithm::Sha1 => "SHA1",
        DigestAlgorithm::Sha256 => "SHA256",
        DigestAlgorithm::Sha384 => "SHA384",
        DigestAlgorithm::Sha512 => "SHA512",
    }
}
