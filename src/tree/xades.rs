//! Typed XAdES qualifying-properties tree (C1).
//!
//! Every element `spec.md` §3 names gets a typed Rust value with
//! `to_element`/`from_element` rendering to and parsing from the generic
//! [`super::raw::XmlElement`], plus `validate_structure` enforcing the
//! required-children/attribute invariants the data model calls out.

use chrono::{DateTime, SecondsFormat, Utc};

use super::raw::XmlElement;
use crate::canonical::{C14nMethod, DigestAlgorithm};
use crate::error::{Error, Result};

/// XAdES target namespace as of ETSI EN 319 132-1 / TS 101 903 v1.4.1 (2016).
pub const XADES_NS_2016: &str = "http://uri.etsi.org/01903/v1.3.2#";
/// Legacy XAdES namespace (ETSI TS 101 903 v1.2.2, 2003); accepted on verify
/// only (§4.1).
pub const XADES_NS_2003: &str = "http://uri.etsi.org/01903/v1.1.1#";
/// XML-DSig namespace.
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Fixed `@Type` URI for the reference that covers `<SignedProperties>`.
pub const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";
/// Fixed `@Type` URI for a counter-signature's reference to its parent
/// `<SignatureValue>`.
pub const COUNTERSIGNED_SIGNATURE_TYPE: &str = "http://uri.etsi.org/01903#CountersignedSignature";
/// Fixed transform URI for an explicit-policy digest-as-specified transform.
pub const POLICY_SPDOC_DIGEST_TRANSFORM: &str =
    "http://uri.etsi.org/01903/v1.3.2/SignaturePolicy/SPDocDigestAsInSpecification";

/// Rewrites every element whose namespace is the (given) XAdES namespace to
/// carry `prefix` before DOM import, leaving foreign-namespaced children
/// alone (§4.1: "every XAdES element must carry the `xa:` prefix before DOM
/// import, so that importing into a foreign document does not re-declare
/// namespaces").
pub fn normalize_xades_prefix(root: &mut XmlElement, xades_prefix: &str) {
    // This tree only ever holds xades + nested ds:Signature (countersignature)
    // subtrees; "foreign" here means anything not built by this module, i.e.
    // the `ds:` prefixed elements, which traverse_mut still visits but this
    // predicate skips.
    root.traverse_mut(&mut |el| {
        if el.prefix.as_deref() != Some("ds") {
            el.prefix = Some(xades_prefix.to_owned());
        }
    });
}

/// `<xades:QualifyingProperties Target="#sig-id">`.
#[derive(Debug, Clone)]
pub struct QualifyingProperties {
    /// `@Target`, a same-document fragment pointing at the owning
    /// `<ds:Signature>`'s `@Id`.
    pub target: String,
    /// Required.
    pub signed_properties: SignedProperties,
    /// Optional, append-only after signing.
    pub unsigned_properties: Option<UnsignedProperties>,
}

impl QualifyingProperties {
    /// Renders to the generic tree.
    pub fn to_element(&self, prefix: &str) -> XmlElement {
        XmlElement::new(Some(prefix), "QualifyingProperties")
            .attr("Target", self.target.clone())
            .attr("xmlns:xa", XADES_NS_2016)
            .child(self.signed_properties.to_element(prefix))
            .maybe_child(
                self.unsigned_properties
                    .as_ref()
                    .map(|up| up.to_element(prefix)),
            )
    }

    /// Parses from the generic tree, accepting either namespace (§4.1: the
    /// legacy namespace is accepted on verify).
    pub fn from_element(el: &XmlElement) -> Result<Self> {
        if el.local_name != "QualifyingProperties" {
            return Err(Error::StructuralMismatch(
                "expected QualifyingProperties element".into(),
            ));
        }
        let target = el
            .attribute("Target")
            .ok_or_else(|| Error::StructuralMismatch("QualifyingProperties missing @Target".into()))?
            .to_owned();
        let sp_el = el
            .child_named("SignedProperties")
            .ok_or_else(|| Error::StructuralMismatch("QualifyingProperties missing SignedProperties".into()))?;
        let signed_properties = SignedProperties::from_element(sp_el)?;
        let unsigned_properties = el
            .child_named("UnsignedProperties")
            .map(UnsignedProperties::from_element)
            .transpose()?;
        Ok(QualifyingProperties {
            target,
            signed_properties,
            unsigned_properties,
        })
    }

    /// Enforces the ordering/required-child invariant (§4.1 `validate_structure`).
    pub fn validate_structure(&self) -> Result<()> {
        if self.target.is_empty() || !self.target.starts_with('#') {
            return Err(Error::StructuralMismatch(
                "QualifyingProperties @Target must be a same-document fragment".into(),
            ));
        }
        self.signed_properties.validate_structure()
    }
}

/// `<xades:SignedProperties Id="...">`.
#[derive(Debug, Clone)]
pub struct SignedProperties {
    /// `@Id`, referenced by the XAdES `<Reference>` in `<SignedInfo>`.
    pub id: String,
    /// Required.
    pub signed_signature_properties: SignedSignatureProperties,
    /// Required (may be structurally empty).
    pub signed_data_object_properties: SignedDataObjectProperties,
}

impl SignedProperties {
    /// Renders to the generic tree.
    pub fn to_element(&self, prefix: &str) -> XmlElement {
        XmlElement::new(Some(prefix), "SignedProperties")
            .attr("Id", self.id.clone())
            .child(self.signed_signature_properties.to_element(prefix))
            .child(self.signed_data_object_properties.to_element(prefix))
    }

    /// Parses from the generic tree.
    pub fn from_element(el: &XmlElement) -> Result<Self> {
        let id = el
            .attribute("Id")
            .ok_or_else(|| Error::StructuralMismatch("SignedProperties missing @Id".into()))?
            .to_owned();
        let ssp_el = el.child_named("SignedSignatureProperties").ok_or_else(|| {
            Error::StructuralMismatch("SignedProperties missing SignedSignatureProperties".into())
        })?;
        let sdop_el = el.child_named("SignedDataObjectProperties");
        Ok(SignedProperties {
            id,
            signed_signature_properties: SignedSignatureProperties::from_element(ssp_el)?,
            signed_data_object_properties: sdop_el
                .map(SignedDataObjectProperties::from_element)
                .transpose()?
                .unwrap_or_default(),
        })
    }

    fn validate_structure(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::StructuralMismatch("SignedProperties @Id is empty".into()));
        }
        self.signed_signature_properties.validate_structure()
    }
}

/// `SigningCertificate` (V1) or `SigningCertificateV2`; mutually exclusive
/// per §3.
#[derive(Debug, Clone)]
pub enum SigningCertificateChoice {
    /// Legacy v1.1.1-style cert binding.
    V1(SigningCertificate),
    /// ETSI TS 101 903 v1.3.2 cert binding (default on sign).
    V2(SigningCertificateV2),
}

/// `<xades:SignedSignatureProperties>`.
#[derive(Debug, Clone)]
pub struct SignedSignatureProperties {
    /// `xades:SigningTime`, required.
    pub signing_time: DateTime<Utc>,
    /// `SigningCertificate`/`SigningCertificateV2`, required.
    pub signing_certificate: SigningCertificateChoice,
    /// Optional.
    pub signature_policy_identifier: Option<SignaturePolicyIdentifier>,
    /// Optional, V2 form used on sign.
    pub signature_production_place: Option<SignatureProductionPlace>,
    /// Optional, V2 form used on sign.
    pub signer_role: Option<SignerRole>,
}

impl SignedSignatureProperties {
    /// Renders to the generic tree.
    pub fn to_element(&self, prefix: &str) -> XmlElement {
        let cert_el = match &self.signing_certificate {
            SigningCertificateChoice::V1(c) => c.to_element(prefix),
            SigningCertificateChoice::V2(c) => c.to_element(prefix),
        };
        XmlElement::new(Some(prefix), "SignedSignatureProperties")
            .child(
                XmlElement::new(Some(prefix), "SigningTime")
                    .text(self.signing_time.to_rfc3339_opts(SecondsFormat::Secs, true)),
            )
            .child(cert_el)
            .maybe_child(
                self.signature_policy_identifier
                    .as_ref()
                    .map(|p| p.to_element(prefix)),
            )
            .maybe_child(
                self.signature_production_place
                    .as_ref()
                    .map(|p| p.to_element(prefix)),
            )
            .maybe_child(self.signer_role.as_ref().map(|r| r.to_element(prefix)))
    }

    /// Parses from the generic tree.
    pub fn from_element(el: &XmlElement) -> Result<Self> {
        let time_text = el
            .child_named("SigningTime")
            .and_then(|e| e.text.as_deref())
            .ok_or_else(|| Error::StructuralMismatch("missing SigningTime".into()))?;
        let signing_time = DateTime::parse_from_rfc3339(time_text)
            .map_err(|e| Error::StructuralMismatch(format!("invalid SigningTime: {e}")))?
            .with_timezone(&Utc);

        let signing_certificate = if let Some(v2) = el.child_named("SigningCertificateV2") {
            SigningCertificateChoice::V2(SigningCertificateV2::from_element(v2)?)
        } else if let Some(v1) = el.child_named("SigningCertificate") {
            SigningCertificateChoice::V1(SigningCertificate::from_element(v1)?)
        } else {
            return Err(Error::StructuralMismatch(
                "missing SigningCertificate/SigningCertificateV2".into(),
            ));
        };

        Ok(SignedSignatureProperties {
            signing_time,
            signing_certificate,
            signature_policy_identifier: el
                .child_named("SignaturePolicyIdentifier")
                .map(SignaturePolicyIdentifier::from_element)
                .transpose()?,
            signature_production_place: el
                .child_named("SignatureProductionPlaceV2")
                .or_else(|| el.child_named("SignatureProductionPlace"))
                .map(SignatureProductionPlace::from_element)
                .transpose()?,
            signer_role: el
                .child_named("SignerRoleV2")
                .or_else(|| el.child_named("SignerRole"))
                .map(SignerRole::from_element)
                .transpose()?,
        })
    }

    fn validate_structure(&self) -> Result<()> {
        match &self.signing_certificate {
            SigningCertificateChoice::V1(c) if c.certs.is_empty() => Err(
                Error::StructuralMismatch("SigningCertificate has no Cert entries".into()),
            ),
            SigningCertificateChoice::V2(c) if c.certs.is_empty() => Err(
                Error::StructuralMismatch("SigningCertificateV2 has no Cert entries".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// One `CertDigest` + optional `IssuerSerialV2`, inside `SigningCertificateV2`.
#[derive(Debug, Clone)]
pub struct CertV2 {
    /// Digest method/value over the DER certificate.
    pub digest_method: DigestAlgorithm,
    /// The digest bytes.
    pub digest_value: Vec<u8>,
    /// `base64(DER(IssuerSerialV2))`, deferred to OCSP lookup if absent
    /// (§4.5).
    pub issuer_serial_v2: Option<Vec<u8>>,
}

/// `<xades:SigningCertificateV2>`.
#[derive(Debug, Clone, Default)]
pub struct SigningCertificateV2 {
    /// One or more certs; index 0 is the signer, the rest (if any) the chain.
    pub certs: Vec<CertV2>,
}

impl SigningCertificateV2 {
    fn to_element(&self, prefix: &str) -> XmlElement {
        let mut el = XmlElement::new(Some(prefix), "SigningCertificateV2");
        for cert in &self.certs {
            let mut cert_el = XmlElement::new(Some(prefix), "Cert");
            let digest_el = XmlElement::new(Some(prefix), "CertDigest")
                .child(
                    XmlElement::new(Some("ds"), "DigestMethod")
                        .attr("Algorithm", cert.digest_method.algorithm_uri()),
                )
                .child(
                    XmlElement::new(Some("ds"), "DigestValue")
                        .text(base64::Engine::encode(
                            &base64::engine::general_purpose::STANDARD,
                            &cert.digest_value,
                        )),
                );
            cert_el = cert_el.child(digest_el);
            if let Some(issuer_serial) = &cert.issuer_serial_v2 {
                cert_el = cert_el.child(
                    XmlElement::new(Some(prefix), "IssuerSerialV2").text(base64::Engine::encode(
                        &base64::engine::general_purpose::STANDARD,
                        issuer_serial,
                    )),
                );
            }
            el = el.child(cert_el);
        }
        el
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        let mut certs = Vec::new();
        for cert_el in el.children_named("Cert") {
            let digest_el = cert_el
                .child_named("CertDigest")
                .ok_or_else(|| Error::StructuralMismatch("Cert missing CertDigest".into()))?;
            let method_uri = digest_el
                .child_named("DigestMethod")
                .and_then(|e| e.attribute("Algorithm"))
                .ok_or_else(|| Error::StructuralMismatch("CertDigest missing DigestMethod".into()))?;
            let value_b64 = digest_el
                .child_named("DigestValue")
                .and_then(|e| e.text.as_deref())
                .ok_or_else(|| Error::StructuralMismatch("CertDigest missing DigestValue".into()))?;
            let digest_value = base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                value_b64,
            )?;
            let issuer_serial_v2 = cert_el
                .child_named("IssuerSerialV2")
                .and_then(|e| e.text.as_deref())
                .map(|t| {
                    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, t)
                })
                .transpose()?;
            certs.push(CertV2 {
                digest_method: DigestAlgorithm::from_uri(method_uri)?,
                digest_value,
                issuer_serial_v2,
            });
        }
        Ok(SigningCertificateV2 { certs })
    }
}

/// One legacy `Cert` entry inside `SigningCertificate`.
#[derive(Debug, Clone)]
pub struct CertV1 {
    /// Digest method/value over the DER certificate.
    pub digest_method: DigestAlgorithm,
    /// The digest bytes.
    pub digest_value: Vec<u8>,
    /// `IssuerSerial/X509IssuerName` + `X509SerialNumber`.
    pub issuer_serial: Option<(String, String)>,
}

/// `<xades:SigningCertificate>` (v1.1.1 legacy form, verify-only per §1's
/// "XAdES v1.1.1 emission" Non-goal).
#[derive(Debug, Clone, Default)]
pub struct SigningCertificate {
    /// One or more certs.
    pub certs: Vec<CertV1>,
}

impl SigningCertificate {
    fn to_element(&self, prefix: &str) -> XmlElement {
        // Emission is not a supported path (Non-goal); this exists so a
        // round-trip test can still build one to feed through the verify
        // path without constructing raw XML by hand.
        let mut el = XmlElement::new(Some(prefix), "SigningCertificate");
        for cert in &self.certs {
            let mut cert_el = XmlElement::new(Some(prefix), "Cert").child(
                XmlElement::new(Some(prefix), "CertDigest")
                    .child(
                        XmlElement::new(Some("ds"), "DigestMethod")
                            .attr("Algorithm", cert.digest_method.algorithm_uri()),
                    )
                    .child(
                        XmlElement::new(Some("ds"), "DigestValue").text(base64::Engine::encode(
                            &base64::engine::general_purpose::STANDARD,
                            &cert.digest_value,
                        )),
                    ),
            );
            if let Some((issuer, serial)) = &cert.issuer_serial {
                cert_el = cert_el.child(
                    XmlElement::new(Some(prefix), "IssuerSerial")
                        .child(XmlElement::new(Some("ds"), "X509IssuerName").text(issuer.clone()))
                        .child(
                            XmlElement::new(Some("ds"), "X509SerialNumber").text(serial.clone()),
                        ),
                );
            }
            el = el.child(cert_el);
        }
        el
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        let mut certs = Vec::new();
        for cert_el in el.children_named("Cert") {
            let digest_el = cert_el
                .child_named("CertDigest")
                .ok_or_else(|| Error::StructuralMismatch("Cert missing CertDigest".into()))?;
            let method_uri = digest_el
                .child_named("DigestMethod")
                .and_then(|e| e.attribute("Algorithm"))
                .ok_or_else(|| Error::StructuralMismatch("CertDigest missing DigestMethod".into()))?;
            let value_b64 = digest_el
                .child_named("DigestValue")
                .and_then(|e| e.text.as_deref())
                .ok_or_else(|| Error::StructuralMismatch("CertDigest missing DigestValue".into()))?;
            let digest_value = base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                value_b64,
            )?;
            let issuer_serial = cert_el.child_named("IssuerSerial").and_then(|is_el| {
                let issuer = is_el.child_named("X509IssuerName")?.text.clone()?;
                let serial = is_el.child_named("X509SerialNumber")?.text.clone()?;
                Some((issuer, serial))
            });
            certs.push(CertV1 {
                digest_method: DigestAlgorithm::from_uri(method_uri)?,
                digest_value,
                issuer_serial,
            });
        }
        Ok(SigningCertificate { certs })
    }
}

/// `<xades:SignaturePolicyIdentifier>`: either an implied policy or an
/// explicit one with a digest.
#[derive(Debug, Clone)]
pub enum SignaturePolicyIdentifier {
    /// `<SignaturePolicyImplied/>`.
    Implied,
    /// `<SignaturePolicyId>` with an identifier and digest.
    Explicit {
        /// The policy's object identifier (as a URN/OID string).
        identifier: String,
        /// Digest method over the policy document.
        digest_method: DigestAlgorithm,
        /// Digest value over the policy document.
        digest_value: Vec<u8>,
    },
}

impl SignaturePolicyIdentifier {
    fn to_element(&self, prefix: &str) -> XmlElement {
        let inner = match self {
            SignaturePolicyIdentifier::Implied => {
                XmlElement::new(Some(prefix), "SignaturePolicyImplied")
            }
            SignaturePolicyIdentifier::Explicit {
                identifier,
                digest_method,
                digest_value,
            } => XmlElement::new(Some(prefix), "SignaturePolicyId")
                .child(
                    XmlElement::new(Some(prefix), "SigPolicyId")
                        .child(XmlElement::new(Some(prefix), "Identifier").text(identifier.clone())),
                )
                .child(
                    XmlElement::new(Some(prefix), "SigPolicyHash")
                        .child(
                            XmlElement::new(Some("ds"), "DigestMethod")
                                .attr("Algorithm", digest_method.algorithm_uri()),
                        )
                        .child(XmlElement::new(Some("ds"), "DigestValue").text(
                            base64::Engine::encode(
                                &base64::engine::general_purpose::STANDARD,
                                digest_value,
                            ),
                        )),
                ),
        };
        XmlElement::new(Some(prefix), "SignaturePolicyIdentifier").child(inner)
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        if el.child_named("SignaturePolicyImplied").is_some() {
            return Ok(SignaturePolicyIdentifier::Implied);
        }
        let spid = el
            .child_named("SignaturePolicyId")
            .ok_or_else(|| Error::StructuralMismatch("empty SignaturePolicyIdentifier".into()))?;
        let identifier = spid
            .child_named("SigPolicyId")
            .and_then(|e| e.child_named("Identifier"))
            .and_then(|e| e.text.clone())
            .ok_or_else(|| Error::StructuralMismatch("SignaturePolicyId missing Identifier".into()))?;
        let hash_el = spid
            .child_named("SigPolicyHash")
            .ok_or_else(|| Error::StructuralMismatch("SignaturePolicyId missing SigPolicyHash".into()))?;
        let method_uri = hash_el
            .child_named("DigestMethod")
            .and_then(|e| e.attribute("Algorithm"))
            .ok_or_else(|| Error::StructuralMismatch("SigPolicyHash missing DigestMethod".into()))?;
        let value_b64 = hash_el
            .child_named("DigestValue")
            .and_then(|e| e.text.as_deref())
            .ok_or_else(|| Error::StructuralMismatch("SigPolicyHash missing DigestValue".into()))?;
        Ok(SignaturePolicyIdentifier::Explicit {
            identifier,
            digest_method: DigestAlgorithm::from_uri(method_uri)?,
            digest_value: base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                value_b64,
            )?,
        })
    }
}

/// `<xades:SignatureProductionPlaceV2>`.
#[derive(Debug, Clone, Default)]
pub struct SignatureProductionPlace {
    /// `City`.
    pub city: Option<String>,
    /// `StateOrProvince`.
    pub state_or_province: Option<String>,
    /// `PostalCode`, V2-only field.
    pub postal_code: Option<String>,
    /// `CountryName`.
    pub country_name: Option<String>,
}

impl SignatureProductionPlace {
    fn to_element(&self, prefix: &str) -> XmlElement {
        XmlElement::new(Some(prefix), "SignatureProductionPlaceV2")
            .maybe_child(self.city.clone().map(|v| XmlElement::new(Some(prefix), "City").text(v)))
            .maybe_child(
                self.state_or_province
                    .clone()
                    .map(|v| XmlElement::new(Some(prefix), "StateOrProvince").text(v)),
            )
            .maybe_child(
                self.postal_code
                    .clone()
                    .map(|v| XmlElement::new(Some(prefix), "PostalCode").text(v)),
            )
            .maybe_child(
                self.country_name
                    .clone()
                    .map(|v| XmlElement::new(Some(prefix), "CountryName").text(v)),
            )
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        Ok(SignatureProductionPlace {
            city: el.child_named("City").and_then(|e| e.text.clone()),
            state_or_province: el
                .child_named("StateOrProvince")
                .and_then(|e| e.text.clone()),
            postal_code: el.child_named("PostalCode").and_then(|e| e.text.clone()),
            country_name: el.child_named("CountryName").and_then(|e| e.text.clone()),
        })
    }
}

/// `<xades:SignerRoleV2>`.
#[derive(Debug, Clone, Default)]
pub struct SignerRole {
    /// `ClaimedRoles/ClaimedRole` text values.
    pub claimed_roles: Vec<String>,
}

impl SignerRole {
    fn to_element(&self, prefix: &str) -> XmlElement {
        let mut claimed = XmlElement::new(Some(prefix), "ClaimedRoles");
        for role in &self.claimed_roles {
            claimed = claimed.child(XmlElement::new(Some(prefix), "ClaimedRole").text(role.clone()));
        }
        XmlElement::new(Some(prefix), "SignerRoleV2").child(claimed)
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        let claimed_roles = el
            .child_named("ClaimedRoles")
            .map(|cr| {
                cr.children_named("ClaimedRole")
                    .filter_map(|r| r.text.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(SignerRole { claimed_roles })
    }
}

/// `<xades:DataObjectFormat>` entries inside `SignedDataObjectProperties`.
#[derive(Debug, Clone, Default)]
pub struct DataObjectFormat {
    /// `@ObjectReference`, the `@URI` of the `<Reference>` this format describes.
    pub object_reference: String,
    /// `MimeType`.
    pub mime_type: Option<String>,
}

/// `<xades:SignedDataObjectProperties>`. Structurally required but may carry
/// no children.
#[derive(Debug, Clone, Default)]
pub struct SignedDataObjectProperties {
    /// Zero or more format descriptions.
    pub data_object_format: Vec<DataObjectFormat>,
}

impl SignedDataObjectProperties {
    fn to_element(&self, prefix: &str) -> XmlElement {
        let mut el = XmlElement::new(Some(prefix), "SignedDataObjectProperties");
        for fmt in &self.data_object_format {
            let mut fmt_el = XmlElement::new(Some(prefix), "DataObjectFormat")
                .attr("ObjectReference", fmt.object_reference.clone());
            if let Some(mime) = &fmt.mime_type {
                fmt_el = fmt_el.child(XmlElement::new(Some(prefix), "MimeType").text(mime.clone()));
            }
            el = el.child(fmt_el);
        }
        el
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        let data_object_format = el
            .children_named("DataObjectFormat")
            .map(|fmt_el| {
                Ok(DataObjectFormat {
                    object_reference: fmt_el
                        .attribute("ObjectReference")
                        .unwrap_or_default()
                        .to_owned(),
                    mime_type: fmt_el.child_named("MimeType").and_then(|e| e.text.clone()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SignedDataObjectProperties { data_object_format })
    }
}

/// `<xades:UnsignedProperties>`; append-only after signing (§3 Lifecycle).
#[derive(Debug, Clone, Default)]
pub struct UnsignedProperties {
    /// The only child this crate produces/consumes.
    pub unsigned_signature_properties: UnsignedSignatureProperties,
}

impl UnsignedProperties {
    fn to_element(&self, prefix: &str) -> XmlElement {
        XmlElement::new(Some(prefix), "UnsignedProperties")
            .child(self.unsigned_signature_properties.to_element(prefix))
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        let usp_el = el.child_named("UnsignedSignatureProperties");
        Ok(UnsignedProperties {
            unsigned_signature_properties: usp_el
                .map(UnsignedSignatureProperties::from_element)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// `<xades:UnsignedSignatureProperties>`.
#[derive(Debug, Clone, Default)]
pub struct UnsignedSignatureProperties {
    /// Zero or more `<SignatureTimeStamp>` entries, in attach order.
    pub signature_time_stamps: Vec<SignatureTimeStamp>,
    /// Zero or more `<CounterSignature>` wrappers, each holding one nested
    /// `<ds:Signature>`.
    pub counter_signatures: Vec<XmlElement>,
}

impl UnsignedSignatureProperties {
    fn to_element(&self, prefix: &str) -> XmlElement {
        let mut el = XmlElement::new(Some(prefix), "UnsignedSignatureProperties");
        for ts in &self.signature_time_stamps {
            el = el.child(ts.to_element(prefix));
        }
        for cs in &self.counter_signatures {
            el = el.child(
                XmlElement::new(Some(prefix), "CounterSignature").child(cs.clone()),
            );
        }
        el
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        let signature_time_stamps = el
            .children_named("SignatureTimeStamp")
            .map(SignatureTimeStamp::from_element)
            .collect::<Result<Vec<_>>>()?;
        let counter_signatures = el
            .children_named("CounterSignature")
            .filter_map(|cs_el| cs_el.child_named("Signature").cloned())
            .collect();
        Ok(UnsignedSignatureProperties {
            signature_time_stamps,
            counter_signatures,
        })
    }
}

/// `<xades:SignatureTimeStamp>` (C7).
#[derive(Debug, Clone)]
pub struct SignatureTimeStamp {
    /// The C14N method used both to canonicalize `<SignatureValue>` before
    /// timestamping and to re-canonicalize it on validation.
    pub canonicalization_method: C14nMethod,
    /// `base64(DER(RFC 3161 TimeStampToken))`.
    pub encapsulated_time_stamp: Vec<u8>,
}

impl SignatureTimeStamp {
    /// Renders this timestamp as a standalone `<SignatureTimeStamp>` element,
    /// for attaching under a freshly built `UnsignedSignatureProperties`.
    pub fn to_element(&self, prefix: &str) -> XmlElement {
        XmlElement::new(Some(prefix), "SignatureTimeStamp")
            .child(
                XmlElement::new(Some("ds"), "CanonicalizationMethod")
                    .attr("Algorithm", self.canonicalization_method.algorithm_uri()),
            )
            .child(
                XmlElement::new(Some(prefix), "EncapsulatedTimeStamp").text(base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    &self.encapsulated_time_stamp,
                )),
            )
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        let method_uri = el
            .child_named("CanonicalizationMethod")
            .and_then(|e| e.attribute("Algorithm"))
            .ok_or_else(|| {
                Error::StructuralMismatch("SignatureTimeStamp missing CanonicalizationMethod".into())
            })?;
        let tst_b64 = el
            .child_named("EncapsulatedTimeStamp")
            .and_then(|e| e.text.as_deref())
            .ok_or_else(|| {
                Error::StructuralMismatch("SignatureTimeStamp missing EncapsulatedTimeStamp".into())
            })?;
        Ok(SignatureTimeStamp {
            canonicalization_method: C14nMethod::from_uri(method_uri)?,
            encapsulated_time_stamp: base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                tst_b64,
            )?,
        })
    }
}
