//! Counter-signature Engine (C8): signing and validating a nested
//! `<ds:Signature>` whose sole reference targets a parent's
//! `<SignatureValue>`.

use crate::canonical::{C14nMethod, DigestAlgorithm};
use crate::error::{Error, Result};
use crate::reference::{Reference, ReferenceSpec, TransformStep};
use crate::tree::raw::XmlElement;
use crate::tree::xades::COUNTERSIGNED_SIGNATURE_TYPE;

/// Builds the single `<ds:Reference>` a counter-signature's `<SignedInfo>`
/// must contain (§4.8): it targets the parent's `<SignatureValue>` by
/// same-document fragment, carries the countersignature `@Type`, and is
/// digested over the C14N of that element.
pub fn build_counter_signature_reference(
    outer_signature_value_id: &str,
    outer_signature_value_element: &[u8],
    c14n_method: C14nMethod,
    digest_method: DigestAlgorithm,
) -> Result<Reference> {
    let canonical = crate::canonical::canonicalize(outer_signature_value_element, c14n_method)?;
    let digest_value = digest_method.digest(&canonical);
    Ok(Reference {
        spec: ReferenceSpec {
            id: None,
            uri: format!("#{outer_signature_value_id}"),
            ref_type: Some(COUNTERSIGNED_SIGNATURE_TYPE.to_owned()),
            transforms: vec![TransformStep::c14n(c14n_method)],
            digest_method,
        },
        digest_value,
    })
}

/// Appends `inner_signature` under
/// `…/QualifyingProperties/UnsignedProperties/UnsignedSignatureProperties/CounterSignature`,
/// creating the `UnsignedProperties`/`UnsignedSignatureProperties`
/// intermediates if they are not already present (§4.8). Never writes to
/// the outer `QualifyingProperties` itself — §9 flags the source's habit of
/// doing so (apparently by typo) as a bug this crate does not reproduce.
pub fn attach_counter_signature(
    qualifying_properties: &mut XmlElement,
    inner_signature: XmlElement,
) -> Result<()> {
    if qualifying_properties.local_name != "QualifyingProperties" {
        return Err(Error::StructuralMismatch(
            "attach_counter_signature requires a QualifyingProperties element".into(),
        ));
    }
    let prefix = qualifying_properties.prefix.clone();
    if qualifying_properties.child_named("UnsignedProperties").is_none() {
        qualifying_properties
            .children
            .push(XmlElement::new(prefix.as_deref(), "UnsignedProperties"));
    }
    let unsigned_properties = qualifying_properties
        .children
        .iter_mut()
        .find(|c| c.local_name == "UnsignedProperties")
        .expect("just inserted above");
    if unsigned_properties
        .child_named("UnsignedSignatureProperties")
        .is_none()
    {
        unsigned_properties.children.push(XmlElement::new(
            prefix.as_deref(),
            "UnsignedSignatureProperties",
        ));
    }
    let unsigned_signature_properties = unsigned_properties
        .children
        .iter_mut()
        .find(|c| c.local_name == "UnsignedSignatureProperties")
        .expect("just inserted above");
    let counter_signature_wrapper =
        XmlElement::new(prefix.as_deref(), "CounterSignature").child(inner_signature);
    unsigned_signature_properties
        .children
        .push(counter_signature_wrapper);
    Ok(())
}

/// Extracts every nested `<ds:Signature>` appended under `CounterSignature`
/// wrappers, for standalone verification (§4.8 validate: "each inner
/// `<ds:Signature>` is verified as a stand-alone signature").
pub fn extract_counter_signatures<'a>(
    unsigned_signature_properties: &'a XmlElement,
) -> impl Iterator<Item = &'a XmlElement> {
    unsigned_signature_properties
        .children_named("CounterSignature")
        .filter_map(|cs| cs.child_named("Signature"))
}

/// Confirms a nested signature is in fact a counter-signature of `outer_id`:
/// its sole `<Reference>` must target `#outer_id` with the countersignature
/// `@Type`. Cryptographic verification of the nested signature itself is the
/// caller's job (same path as any stand-alone signature) — this only checks
/// the relationship the `@Type`/`@URI` pair establishes.
pub fn assert_counters_outer(inner_signed_info: &XmlElement, outer_id: &str) -> Result<()> {
    let expected_uri = format!("#{outer_id}");
    let matches = inner_signed_info.children_named("Reference").any(|r| {
        r.attribute("URI") == Some(expected_uri.as_str())
            && r.attribute("Type") == Some(COUNTERSIGNED_SIGNATURE_TYPE)
    });
    if !matches {
        return Err(Error::CounterSignatureInvalid(format!(
            "no Reference targets outer SignatureValue #{outer_id} with the countersignature type"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_reference_over_outer_signature_value() {
        let outer_sig_value = br#"<ds:SignatureValue>abc123</ds:SignatureValue>"#;
        let reference = build_counter_signature_reference(
            "outer-sig-value",
            outer_sig_value,
            C14nMethod::ExclusiveC14N,
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        assert_eq!(reference.spec.uri, "#outer-sig-value");
        assert_eq!(
            reference.spec.ref_type.as_deref(),
            Some(COUNTERSIGNED_SIGNATURE_TYPE)
        );
    }

    #[test]
    fn attach_creates_intermediates_and_appends() {
        let mut qp = XmlElement::new(Some("xa"), "QualifyingProperties");
        let inner = XmlElement::new(Some("ds"), "Signature").attr("Id", "inner-sig");
        attach_counter_signature(&mut qp, inner).unwrap();
        let usp = qp
            .child_named("UnsignedProperties")
            .unwrap()
            .child_named("UnsignedSignatureProperties")
            .unwrap();
        assert_eq!(usp.children_named("CounterSignature").count(), 1);
    }

    #[test]
    fn second_attach_reuses_existing_intermediates() {
        let mut qp = XmlElement::new(Some("xa"), "QualifyingProperties");
        attach_counter_signature(
            &mut qp,
            XmlElement::new(Some("ds"), "Signature").attr("Id", "inner-1"),
        )
        .unwrap();
        attach_counter_signature(
            &mut qp,
            XmlElement::new(Some("ds"), "Signature").attr("Id", "inner-2"),
        )
        .unwrap();
        assert_eq!(qp.children_named("UnsignedProperties").count(), 1);
        let usp = qp
            .child_named("UnsignedProperties")
            .unwrap()
            .child_named("UnsignedSignatureProperties")
            .unwrap();
        assert_eq!(usp.children_named("CounterSignature").count(), 2);
    }

    #[test]
    fn assert_counters_outer_rejects_wrong_target() {
        let signed_info = XmlElement::new(Some("ds"), "SignedInfo").child(
            XmlElement::new(Some("ds"), "Reference")
                .attr("URI", "#some-other-id")
                .attr("Type", COUNTERSIGNED_SIGNATURE_TYPE),
        );
        assert!(assert_counters_outer(&signed_info, "outer-sig-value").is_err());
    }
}
