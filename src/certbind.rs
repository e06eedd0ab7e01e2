//! Signing-Certificate Binder (C5): `SigningCertificateV2`/`SigningCertificate`
//! production and validation.
//!
//! Grounded on the `der`/`x509-cert`/`spki` stack used by the wider example
//! pack for X.509 and ASN.1 work; the low-level DER/X.509 parsing itself is
//! the out-of-scope collaborator named in §1, here realized concretely
//! against those crates rather than hand-rolled.

use der::asn1::Ia5String;
use der::{Decode, Encode, Sequence};
use x509_cert::Certificate;

use crate::canonical::DigestAlgorithm;
use crate::error::{Error, Result};
use crate::tree::xades::{CertV1, CertV2, SigningCertificate, SigningCertificateChoice, SigningCertificateV2};

/// What the binder needs to know about a certificate: its DER bytes plus the
/// parsed serial/issuer fields used for comparison. A concrete adapter over
/// `x509-cert` implements this for real certificates; tests can supply a
/// fake.
pub trait X509Info {
    /// The certificate's DER encoding, for digesting.
    fn der_bytes(&self) -> &[u8];
    /// The certificate's serial number as a big-endian, minimal-length byte
    /// string (matching DER INTEGER content octets).
    fn serial_bytes(&self) -> Vec<u8>;
    /// The certificate's issuer distinguished name in RFC 4514-style
    /// canonical string form.
    fn issuer_name(&self) -> String;
}

/// A concrete [`X509Info`] backed by a parsed `x509-cert` certificate.
pub struct X509CertInfo {
    der: Vec<u8>,
    cert: Certificate,
}

impl X509CertInfo {
    /// Parses a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der)?;
        Ok(X509CertInfo {
            der: der.to_vec(),
            cert,
        })
    }
}

impl X509Info for X509CertInfo {
    fn der_bytes(&self) -> &[u8] {
        &self.der
    }

    fn serial_bytes(&self) -> Vec<u8> {
        self.cert
            .tbs_certificate
            .serial_number
            .as_bytes()
            .to_vec()
    }

    fn issuer_name(&self) -> String {
        self.cert.tbs_certificate.issuer.to_string()
    }
}

/// The ASN.1 structure IssuerSerialV2 wraps: `Sequence(GeneralNames, INTEGER
/// serial)`. §9's simplification: rather than the full `GeneralName` CHOICE,
/// only the `directoryName` alternative is modeled, stored as its RFC
/// 4514-style string — every XAdES signer in practice names the issuer this
/// way, and the binder only ever compares it back against that same string
/// form.
#[derive(Sequence)]
struct IssuerSerialAsn1 {
    issuer_directory_name: Ia5String,
    serial: der::asn1::Int,
}

/// Encodes `IssuerSerialV2`'s DER payload from an issuer DN string and a
/// serial's big-endian content octets.
pub fn encode_issuer_serial_v2(issuer_name: &str, serial_bytes: &[u8]) -> Result<Vec<u8>> {
    let issuer_directory_name = Ia5String::new(issuer_name).map_err(der::Error::from)?;
    let serial = der::asn1::Int::new(serial_bytes).map_err(der::Error::from)?;
    let asn1 = IssuerSerialAsn1 {
        issuer_directory_name,
        serial,
    };
    Ok(asn1.to_der()?)
}

/// Decodes `IssuerSerialV2`'s DER payload back to `(issuer_name,
/// serial_bytes)`.
pub fn decode_issuer_serial_v2(der_bytes: &[u8]) -> Result<(String, Vec<u8>)> {
    let asn1 = IssuerSerialAsn1::from_der(der_bytes)?;
    Ok((
        asn1.issuer_directory_name.as_str().to_owned(),
        asn1.serial.as_bytes().to_vec(),
    ))
}

/// Renders a big-endian unsigned byte string as a base-10 string, matching
/// the decimal text content XML-DSig uses for `X509SerialNumber`.
fn serial_decimal(bytes: &[u8]) -> String {
    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let v = *d as u32 * 256 + carry;
            *d = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while digits.len() > 1 && *digits.last().unwrap() == 0 {
        digits.pop();
    }
    digits
        .iter()
        .rev()
        .map(|d| char::from(b'0' + d))
        .collect()
}

/// Builds `SigningCertificateV2` for the signer's certificate plus any
/// issuer-chain certificates supplied (§4.5, data model's "one or more
/// `Cert`"). The leaf entry always describes `signer`; each entry in `chain`
/// (immediate issuer first) gets its own `Cert` describing itself by its own
/// digest and its own issuer/serial, so a verifier can walk the whole chain
/// without a separate lookup.
pub fn build_signing_certificate_v2(
    signer: &dyn X509Info,
    chain: &[&dyn X509Info],
    digest_method: DigestAlgorithm,
) -> Result<SigningCertificateChoice> {
    let mut certs = vec![cert_v2_entry(signer, digest_method)?];
    for issuer in chain {
        certs.push(cert_v2_entry(*issuer, digest_method)?);
    }
    Ok(SigningCertificateChoice::V2(SigningCertificateV2 { certs }))
}

fn cert_v2_entry(cert: &dyn X509Info, digest_method: DigestAlgorithm) -> Result<CertV2> {
    Ok(CertV2 {
        digest_method,
        digest_value: digest_method.digest(cert.der_bytes()),
        issuer_serial_v2: Some(encode_issuer_serial_v2(
            &cert.issuer_name(),
            &cert.serial_bytes(),
        )?),
    })
}

/// Builds `SigningCertificateV2` without issuer binding, deferring it to
/// OCSP-based lookup (§4.5's "may still emit `CertDigest`" fallback).
pub fn build_signing_certificate_v2_digest_only(
    signer: &dyn X509Info,
    digest_method: DigestAlgorithm,
) -> SigningCertificateChoice {
    let digest_value = digest_method.digest(signer.der_bytes());
    SigningCertificateChoice::V2(SigningCertificateV2 {
        certs: vec![CertV2 {
            digest_method,
            digest_value,
            issuer_serial_v2: None,
        }],
    })
}

/// Checks the signer certificate extracted from `<KeyInfo>` against the
/// declared `SigningCertificateV2`/`SigningCertificate` (§4.5). The first
/// `Cert` entry is taken to describe the signer (chain entries, if any,
/// follow). Mismatch of serial, issuer, or certificate digest is fatal.
pub fn verify_signing_certificate(
    signer: &dyn X509Info,
    declared: &SigningCertificateChoice,
) -> Result<()> {
    match declared {
        SigningCertificateChoice::V2(v2) => verify_v2(signer, v2),
        SigningCertificateChoice::V1(v1) => verify_v1(signer, v1),
    }
}

fn verify_v2(signer: &dyn X509Info, v2: &SigningCertificateV2) -> Result<()> {
    let cert = v2.certs.first().ok_or_else(|| {
        Error::StructuralMismatch("SigningCertificateV2 has no Cert entries".into())
    })?;
    let expected_digest = cert.digest_method.digest(signer.der_bytes());
    if expected_digest != cert.digest_value {
        return Err(Error::CertificateBindingMismatch(
            "SigningCertificateV2 CertDigest does not match the KeyInfo certificate".into(),
        ));
    }
    if let Some(issuer_serial_der) = &cert.issuer_serial_v2 {
        let (issuer_name, serial_bytes) = decode_issuer_serial_v2(issuer_serial_der)?;
        if serial_bytes != signer.serial_bytes() {
            return Err(Error::CertificateBindingMismatch(
                "IssuerSerialV2 serial does not match the KeyInfo certificate".into(),
            ));
        }
        if issuer_name != signer.issuer_name() {
            return Err(Error::CertificateBindingMismatch(
                "IssuerSerialV2 issuer DN does not match the KeyInfo certificate".into(),
            ));
        }
    }
    Ok(())
}

fn verify_v1(signer: &dyn X509Info, v1: &SigningCertificate) -> Result<()> {
    let cert = v1
        .certs
        .first()
        .ok_or_else(|| Error::StructuralMismatch("SigningCertificate has no Cert entries".into()))?;
    let expected_digest = cert.digest_method.digest(signer.der_bytes());
    if expected_digest != cert.digest_value {
        return Err(Error::CertificateBindingMismatch(
            "SigningCertificate CertDigest does not match the KeyInfo certificate".into(),
        ));
    }
    if let Some((issuer, serial)) = &cert.issuer_serial {
        if *serial != serial_decimal(&signer.serial_bytes()) {
            return Err(Error::CertificateBindingMismatch(
                "X509SerialNumber does not match the KeyInfo certificate".into(),
            ));
        }
        if *issuer != signer.issuer_name() {
            return Err(Error::CertificateBindingMismatch(
                "X509IssuerName does not match the KeyInfo certificate".into(),
            ));
        }
    }
    Ok(())
}

/// Test double for [`X509Info`] that skips real DER parsing.
#[cfg(test)]
struct FakeCert {
    der: Vec<u8>,
    serial: Vec<u8>,
    issuer: String,
}

#[cfg(test)]
impl X509Info for FakeCert {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn cert() -> FakeCert {
        FakeCert {
            der: b"fake certificate bytes".to_vec(),
            serial: vec![0x01, 0x02, 0x03],
            issuer: "CN=Test CA,O=Test Org".into(),
        }
    }

    #[test]
    fn issuer_serial_v2_round_trips() {
        let der = encode_issuer_serial_v2("CN=Test CA,O=Test Org", &[0x01, 0x02, 0x03]).unwrap();
        let (issuer, serial) = decode_issuer_serial_v2(&der).unwrap();
        assert_eq!(issuer, "CN=Test CA,O=Test Org");
        assert_eq!(serial, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn serial_decimal_matches_known_value() {
        assert_eq!(serial_decimal(&[0x01, 0x02, 0x03]), "66051");
        assert_eq!(serial_decimal(&[0x00]), "0");
    }

    #[test]
    fn build_then_verify_v2_succeeds() {
        let signer = cert();
        let declared = build_signing_certificate_v2(&signer, &[], DigestAlgorithm::Sha256).unwrap();
        verify_signing_certificate(&signer, &declared).unwrap();
    }

    #[test]
    fn mismatched_serial_fails() {
        let signer = cert();
        let declared = build_signing_certificate_v2(&signer, &[], DigestAlgorithm::Sha256).unwrap();
        let other = FakeCert {
            der: signer.der.clone(),
            serial: vec![0xFF],
            issuer: signer.issuer.clone(),
        };
        let err = verify_signing_certificate(&other, &declared).unwrap_err();
        assert!(matches!(err, Error::CertificateBindingMismatch(_)));
    }

    #[test]
    fn digest_only_certificate_skips_issuer_check() {
        let signer = cert();
        let declared = build_signing_certificate_v2_digest_only(&signer, DigestAlgorithm::Sha256);
        verify_signing_certificate(&signer, &declared).unwrap();
    }

    #[test]
    fn chain_adds_one_cert_entry_per_issuer() {
        let signer = cert();
        let intermediate = FakeCert {
            der: b"intermediate CA bytes".to_vec(),
            serial: vec![0xAA, 0xBB],
            issuer: "CN=Root CA,O=Test Org".into(),
        };
        let root = FakeCert {
            der: b"root CA bytes".to_vec(),
            serial: vec![0xCC],
            issuer: "CN=Root CA,O=Test Org".into(),
        };
        let chain: Vec<&dyn X509Info> = vec![&intermediate, &root];
        let declared =
            build_signing_certificate_v2(&signer, &chain, DigestAlgorithm::Sha256).unwrap();
        match &declared {
            SigningCertificateChoice::V2(v2) => {
                assert_eq!(v2.certs.len(), 3);
                assert_eq!(
                    v2.certs[1].digest_value,
                    DigestAlgorithm::Sha256.digest(intermediate.der_bytes())
                );
                assert_eq!(
                    v2.certs[2].digest_value,
                    DigestAlgorithm::Sha256.digest(root.der_bytes())
                );
            }
            SigningCertificateChoice::V1(_) => panic!("expected V2"),
        }
        // verify_signing_certificate only checks the leaf entry, so the
        // signer's own binding still holds with chain entries present.
        verify_signing_certificate(&signer, &declared).unwrap();
    }
}
