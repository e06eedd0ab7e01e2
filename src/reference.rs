//! Reference Engine (C3): building and validating `<ds:Reference>` entries.

use crate::canonical::{C14nMethod, DigestAlgorithm};
use crate::error::{Error, Result};
use crate::tree::raw::XmlElement;
use crate::tree::xades::{DS_NS, SIGNED_PROPERTIES_TYPE};

/// Fixed transform URI for the enveloped-signature transform.
pub const ENVELOPED_SIGNATURE_TRANSFORM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// One `<ds:Transform Algorithm="...">`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformStep {
    /// The transform's algorithm URI.
    pub algorithm: String,
}

impl TransformStep {
    /// The enveloped-signature transform.
    pub fn enveloped() -> Self {
        TransformStep {
            algorithm: ENVELOPED_SIGNATURE_TRANSFORM.to_owned(),
        }
    }

    /// A canonicalization transform.
    pub fn c14n(method: C14nMethod) -> Self {
        TransformStep {
            algorithm: method.algorithm_uri().to_owned(),
        }
    }
}

/// The caller-visible half of a `<ds:Reference>`: everything needed to
/// recompute its digest.
#[derive(Debug, Clone)]
pub struct ReferenceSpec {
    /// `@Id`, if the reference itself is targeted by something else (e.g. a
    /// counter-signature).
    pub id: Option<String>,
    /// `@URI`.
    pub uri: String,
    /// `@Type`, e.g. the XAdES SignedProperties type URI.
    pub ref_type: Option<String>,
    /// Ordered transforms; the last one's output is digested.
    pub transforms: Vec<TransformStep>,
    /// The digest algorithm used.
    pub digest_method: DigestAlgorithm,
}

/// A fully-built `<ds:Reference>`: spec plus the computed/declared digest.
#[derive(Debug, Clone)]
pub struct Reference {
    /// The reference's declarative half.
    pub spec: ReferenceSpec,
    /// `<DigestValue>`.
    pub digest_value: Vec<u8>,
}

impl Reference {
    /// Renders to `<ds:Reference>`.
    pub fn to_element(&self) -> XmlElement {
        let mut el = XmlElement::new(Some("ds"), "Reference").attr("URI", self.spec.uri.clone());
        if let Some(id) = &self.spec.id {
            el = el.attr("Id", id.clone());
        }
        if let Some(t) = &self.spec.ref_type {
            el = el.attr("Type", t.clone());
        }
        let mut transforms_el = XmlElement::new(Some("ds"), "Transforms");
        for t in &self.spec.transforms {
            transforms_el = transforms_el
                .child(XmlElement::new(Some("ds"), "Transform").attr("Algorithm", t.algorithm.clone()));
        }
        el.child(transforms_el)
            .child(
                XmlElement::new(Some("ds"), "DigestMethod")
                    .attr("Algorithm", self.spec.digest_method.algorithm_uri()),
            )
            .child(
                XmlElement::new(Some("ds"), "DigestValue").text(base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    &self.digest_value,
                )),
            )
    }

    /// Parses from `<ds:Reference>`.
    pub fn from_element(el: &XmlElement) -> Result<Self> {
        let uri = el
            .attribute("URI")
            .ok_or_else(|| Error::StructuralMismatch("Reference missing @URI".into()))?
            .to_owned();
        let transforms = el
            .child_named("Transforms")
            .map(|t| {
                t.children_named("Transform")
                    .map(|tr| {
                        tr.attribute("Algorithm")
                            .map(|a| TransformStep {
                                algorithm: a.to_owned(),
                            })
                            .ok_or_else(|| {
                                Error::StructuralMismatch("Transform missing @Algorithm".into())
                            })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();
        let digest_method_uri = el
            .child_named("DigestMethod")
            .and_then(|e| e.attribute("Algorithm"))
            .ok_or_else(|| Error::StructuralMismatch("Reference missing DigestMethod".into()))?;
        let digest_value_b64 = el
            .child_named("DigestValue")
            .and_then(|e| e.text.as_deref())
            .ok_or_else(|| Error::StructuralMismatch("Reference missing DigestValue".into()))?;
        Ok(Reference {
            spec: ReferenceSpec {
                id: el.attribute("Id").map(str::to_owned),
                uri,
                ref_type: el.attribute("Type").map(str::to_owned),
                transforms,
                digest_method: DigestAlgorithm::from_uri(digest_method_uri)?,
            },
            digest_value: base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                digest_value_b64,
            )?,
        })
    }
}

/// Resolves a `<ds:Reference>`'s `@URI` to the raw (pre-transform) octets of
/// its node-set (§4.3 step 1).
pub trait ReferenceResolver {
    /// Resolves `uri` to raw bytes.
    fn resolve(&self, uri: &str) -> Result<Vec<u8>>;
}

/// Resolves references against an in-memory host document, with an optional
/// external byte source for detached mode.
pub struct DocumentResolver<'a> {
    /// The host document root, used for `""` and `"#id"` URIs.
    pub root: &'a XmlElement,
    /// `(uri, bytes)` for a detached external reference.
    pub external: Option<(&'a str, &'a [u8])>,
}

impl<'a> ReferenceResolver for DocumentResolver<'a> {
    fn resolve(&self, uri: &str) -> Result<Vec<u8>> {
        if uri.is_empty() {
            return self.root.to_bytes();
        }
        if let Some(id) = uri.strip_prefix('#') {
            return self
                .root
                .find_by_id(id)
                .ok_or_else(|| {
                    Error::StructuralMismatch(format!("no element with @Id={id:?} for reference"))
                })
                .and_then(XmlElement::to_bytes);
        }
        if let Some((ext_uri, bytes)) = self.external {
            if ext_uri == uri {
                return Ok(bytes.to_vec());
            }
        }
        Err(Error::StructuralMismatch(format!(
            "cannot resolve reference URI {uri:?}"
        )))
    }
}

/// Applies transforms in order; the enveloped-signature transform operates
/// at the tree level (it strips the `ds:Signature` descendant), everything
/// else is treated as a canonicalization algorithm URI.
pub fn apply_transforms(mut bytes: Vec<u8>, transforms: &[TransformStep]) -> Result<Vec<u8>> {
    for t in transforms {
        if t.algorithm == ENVELOPED_SIGNATURE_TRANSFORM {
            let mut el = XmlElement::parse(&bytes)?;
            strip_signature_descendants(&mut el);
            bytes = el.to_bytes()?;
        } else {
            let method = C14nMethod::from_uri(&t.algorithm)?;
            bytes = crate::canonical::canonicalize(&bytes, method)?;
        }
    }
    Ok(bytes)
}

fn strip_signature_descendants(el: &mut XmlElement) {
    el.children
        .retain(|c| !(c.local_name == "Signature" && c.prefix.as_deref() == Some("ds")));
    for c in &mut el.children {
        strip_signature_descendants(c);
    }
}

/// Builds a `<ds:Reference>` over the node-set `uri` resolves to (C3).
pub fn build_reference(
    resolver: &dyn ReferenceResolver,
    uri: &str,
    ref_type: Option<&str>,
    transforms: Vec<TransformStep>,
    digest_method: DigestAlgorithm,
    id: Option<String>,
) -> Result<Reference> {
    let raw = resolver.resolve(uri)?;
    let transformed = apply_transforms(raw, &transforms)?;
    let digest_value = digest_method.digest(&transformed);
    Ok(Reference {
        spec: ReferenceSpec {
            id,
            uri: uri.to_owned(),
            ref_type: ref_type.map(str::to_owned),
            transforms,
            digest_method,
        },
        digest_value,
    })
}

/// Adds the XAdES SignedProperties reference to `references` unless one with
/// that `@Type` already exists — §4.3's "added with `overwrite=false`" rule,
/// so downstream logic never clobbers an existing SignedProperties digest.
pub fn add_signed_properties_reference(references: &mut Vec<Reference>, new_ref: Reference) {
    let already_present = references
        .iter()
        .any(|r| r.spec.ref_type.as_deref() == Some(SIGNED_PROPERTIES_TYPE));
    if !already_present {
        references.push(new_ref);
    }
}

/// Recomputes a reference's digest and compares it byte-for-byte against the
/// declared `<DigestValue>` (§4.3: "any mismatch is a reference-validation
/// failure (fatal)").
pub fn verify_reference(resolver: &dyn ReferenceResolver, reference: &Reference) -> Result<()> {
    let raw = resolver.resolve(&reference.spec.uri)?;
    let transformed = apply_transforms(raw, &reference.spec.transforms)?;
    let recomputed = reference.spec.digest_method.digest(&transformed);
    if recomputed != reference.digest_value {
        return Err(Error::ReferenceDigestMismatch {
            uri: reference.spec.uri.clone(),
        });
    }
    Ok(())
}

/// Asserts the hard convention in §5: within one `<SignedInfo>`, the
/// SignedProperties reference must be present with the correct `@Type` and
/// must target the `<SignedProperties>` element by same-document fragment.
pub fn assert_signed_properties_reference_present(
    references: &[Reference],
    signed_properties_id: &str,
) -> Result<()> {
    let expected_uri = format!("#{signed_properties_id}");
    let found = references.iter().any(|r| {
        r.spec.ref_type.as_deref() == Some(SIGNED_PROPERTIES_TYPE) && r.spec.uri == expected_uri
    });
    if !found {
        return Err(Error::StructuralMismatch(
            "SignedInfo has no Reference covering SignedProperties by same-document fragment"
                .into(),
        ));
    }
    Ok(())
}

#[allow(dead_code)]
fn ds_namespace() -> &'static str {
    DS_NS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_empty_uri_to_whole_document() {
        let root = XmlElement::parse(br#"<root><data>x</data></root>"#).unwrap();
        let resolver = DocumentResolver {
            root: &root,
            external: None,
        };
        let bytes = resolver.resolve("").unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("<data>x</data>"));
    }

    #[test]
    fn resolves_fragment_by_id() {
        let root =
            XmlElement::parse(br#"<root><a Id="target"><b/></a></root>"#).unwrap();
        let resolver = DocumentResolver {
            root: &root,
            external: None,
        };
        let bytes = resolver.resolve("#target").unwrap();
        assert!(String::from_utf8(bytes).unwrap().starts_with("<a Id="));
    }

    #[test]
    fn build_then_verify_reference_round_trips() {
        let root = XmlElement::parse(br#"<root><data>x</data></root>"#).unwrap();
        let resolver = DocumentResolver {
            root: &root,
            external: None,
        };
        let reference = build_reference(
            &resolver,
            "",
            None,
            vec![TransformStep::c14n(C14nMethod::ExclusiveC14N)],
            DigestAlgorithm::Sha256,
            None,
        )
        .unwrap();
        verify_reference(&resolver, &reference).unwrap();
    }

    #[test]
    fn tamper_causes_digest_mismatch() {
        let root = XmlElement::parse(br#"<root><data>x</data></root>"#).unwrap();
        let resolver = DocumentResolver {
            root: &root,
            external: None,
        };
        let mut reference = build_reference(
            &resolver,
            "",
            None,
            vec![TransformStep::c14n(C14nMethod::ExclusiveC14N)],
            DigestAlgorithm::Sha256,
            None,
        )
        .unwrap();
        reference.digest_value[0] ^= 0xFF;
        let err = verify_reference(&resolver, &reference).unwrap_err();
        assert!(matches!(err, Error::ReferenceDigestMismatch { .. }));
    }

    #[test]
    fn overwrite_false_keeps_first_signed_properties_reference() {
        let mut refs = vec![Reference {
            spec: ReferenceSpec {
                id: None,
                uri: "#first".into(),
                ref_type: Some(SIGNED_PROPERTIES_TYPE.into()),
                transforms: vec![],
                digest_method: DigestAlgorithm::Sha256,
            },
            digest_value: vec![1],
        }];
        let second = Reference {
            spec: ReferenceSpec {
                id: None,
                uri: "#second".into(),
                ref_type: Some(SIGNED_PROPERTIES_TYPE.into()),
                transforms: vec![],
                digest_method: DigestAlgorithm::Sha256,
            },
            digest_value: vec![2],
        };
        add_signed_properties_reference(&mut refs, second);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].spec.uri, "#first");
    }
}
