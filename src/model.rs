//! Core data model: resource descriptors and the document under signature.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Where the XML to sign comes from, and where the result should land.
///
/// Mirrors the discriminated `ResourceInput` of the data model: a file on
/// disk, an inline byte buffer, an already-parsed tree (handed in as source
/// text here, since C1 reparses on demand), or a URL. Each variant carries
/// the `detached` flag and an optional save location/name.
#[derive(Debug, Clone)]
pub enum ResourceInput {
    /// A file on disk. In detached mode its basename becomes the reference
    /// `@URI`.
    File {
        /// Path to the XML payload.
        path: PathBuf,
        /// Detached (signature lives on its own) vs enveloped/enveloping.
        detached: bool,
        /// Directory the signature should be written to.
        save_location: Option<PathBuf>,
        /// Filename (without mandatory extension) for the emitted signature.
        save_name: Option<String>,
    },
    /// Raw bytes supplied by the caller, not backed by a file.
    InlineBytes {
        /// The payload itself.
        bytes: Vec<u8>,
        /// Explicit reference `@URI`; required when `detached` is set, since
        /// inline bytes have no natural name to derive one from.
        uri: Option<String>,
        /// Detached vs enveloped/enveloping.
        detached: bool,
        /// Directory the signature should be written to.
        save_location: Option<PathBuf>,
        /// Filename for the emitted signature.
        save_name: Option<String>,
    },
    /// A document already serialized to XML text by the caller.
    InlineXmlTree {
        /// Serialized XML of the host document.
        document: String,
        /// Explicit reference `@URI`; required when `detached` is set.
        uri: Option<String>,
        /// Detached vs enveloped/enveloping.
        detached: bool,
        /// Directory the signature should be written to.
        save_location: Option<PathBuf>,
        /// Filename for the emitted signature.
        save_name: Option<String>,
    },
    /// A remote document identified by URL.
    Url {
        /// The URL of the payload.
        url: String,
        /// Detached vs enveloped/enveloping.
        detached: bool,
        /// Directory the signature should be written to.
        save_location: Option<PathBuf>,
        /// Filename for the emitted signature.
        save_name: Option<String>,
    },
}

impl ResourceInput {
    /// Builds a file-backed, enveloped/enveloping input.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ResourceInput::File {
            path: path.into(),
            detached: false,
            save_location: None,
            save_name: None,
        }
    }

    /// Builds a detached, file-backed input. `save_location`/`save_name`
    /// default to the input file's own directory/stem, matching the
    /// "for file inputs it is the basename" reference-URI rule (§4.3) and
    /// keeping the invariant below satisfied without forcing callers to
    /// repeat the path.
    pub fn file_detached(path: impl Into<PathBuf>) -> Self {
        ResourceInput::File {
            path: path.into(),
            detached: true,
            save_location: None,
            save_name: None,
        }
    }

    /// Builds a detached input from inline bytes with an explicit reference
    /// URI, validating the construction invariant.
    pub fn inline_bytes_detached(
        bytes: Vec<u8>,
        uri: impl Into<String>,
        save_location: impl Into<PathBuf>,
        save_name: impl Into<String>,
    ) -> Result<Self> {
        let save_location = save_location.into();
        let save_name = save_name.into();
        let uri = uri.into();
        if uri.is_empty() {
            return Err(Error::InvalidInput(
                "detached InlineBytes input requires a non-empty reference URI".into(),
            ));
        }
        Ok(ResourceInput::InlineBytes {
            bytes,
            uri: Some(uri),
            detached: true,
            save_location: Some(save_location),
            save_name: Some(save_name),
        })
    }

    /// True when the signature is produced as a standalone document rather
    /// than embedded in/around the payload.
    pub fn detached(&self) -> bool {
        match self {
            ResourceInput::File { detached, .. } => *detached,
            ResourceInput::InlineBytes { detached, .. } => *detached,
            ResourceInput::InlineXmlTree { detached, .. } => *detached,
            ResourceInput::Url { detached, .. } => *detached,
        }
    }

    /// Validates the `ResourceInput` invariant: a non-detached signature
    /// needs a place to write its host document back to unless the source
    /// is itself a file path (in which case the source path is reused), and
    /// a detached signature over inline content needs an explicit URI.
    pub fn validate(&self) -> Result<()> {
        let is_file = matches!(self, ResourceInput::File { .. });
        if !self.detached() && !is_file {
            let (save_location, save_name) = match self {
                ResourceInput::InlineBytes {
                    save_location,
                    save_name,
                    ..
                }
                | ResourceInput::InlineXmlTree {
                    save_location,
                    save_name,
                    ..
                }
                | ResourceInput::Url {
                    save_location,
                    save_name,
                    ..
                } => (save_location, save_name),
                ResourceInput::File { .. } => unreachable!(),
            };
            if save_location.is_none() || save_name.is_none() {
                return Err(Error::InvalidInput(
                    "non-detached, non-file input requires both save_location and save_name"
                        .into(),
                ));
            }
        }
        if self.detached() {
            match self {
                ResourceInput::InlineBytes { uri, .. } | ResourceInput::InlineXmlTree { uri, .. } => {
                    if uri.is_none() {
                        return Err(Error::InvalidInput(
                            "detached inline input requires an explicit reference URI".into(),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// The reference `@URI` this input resolves to (§4.3): the basename for
    /// files, a percent-encoded URL for `Url`, or the caller-supplied URI for
    /// inline inputs.
    pub fn reference_uri(&self) -> Result<String> {
        match self {
            ResourceInput::File { path, .. } => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_owned)
                .ok_or_else(|| Error::InvalidInput("file path has no basename".into())),
            ResourceInput::Url { url, .. } => Ok(percent_encode(url)),
            ResourceInput::InlineBytes { uri, .. } | ResourceInput::InlineXmlTree { uri, .. } => {
                uri.clone().ok_or_else(|| {
                    Error::InvalidInput("inline input has no reference URI".into())
                })
            }
        }
    }

    /// Resolves the filename to write the signature/document to, applying
    /// the `.xml` default-extension rule from §4.6.
    pub fn output_path(&self) -> PathBuf {
        let (location, name): (Option<&Path>, Option<&str>) = match self {
            ResourceInput::File { path, save_location, save_name, .. } => (
                save_location.as_deref().or_else(|| path.parent()),
                save_name.as_deref(),
            ),
            ResourceInput::InlineBytes { save_location, save_name, .. }
            | ResourceInput::InlineXmlTree { save_location, save_name, .. }
            | ResourceInput::Url { save_location, save_name, .. } => {
                (save_location.as_deref(), save_name.as_deref())
            }
        };
        let dir = location.unwrap_or_else(|| Path::new("."));
        let name = name.unwrap_or("signature");
        let mut file = PathBuf::from(name);
        if file.extension().is_none() {
            file.set_extension("xml");
        }
        dir.join(file)
    }
}

/// Minimal percent-encoding for a reference URI over a detached URL source,
/// reserved characters only (§4.3: "percent-encoded representation of the
/// URL").
fn percent_encode(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for b in url.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// The XML document under signature, tracked for the `DocLoaded -> QPBuilt`
/// conflict check in §4.6's state machine.
#[derive(Debug, Clone)]
pub struct SignatureDocument {
    source: String,
}

impl SignatureDocument {
    /// Wraps already-loaded document text.
    pub fn from_string(source: impl Into<String>) -> Self {
        SignatureDocument {
            source: source.into(),
        }
    }

    /// The raw document text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if the document already contains a `<ds:Signature>` element,
    /// checked with a plain substring probe: the structural parser is only
    /// invoked once a signing decision has been made, so this is a cheap
    /// pre-flight rather than a full parse.
    pub fn has_signature(&self) -> bool {
        self.source.contains("ds:Signature")
            || self
                .source
                .contains("xmlns=\"http://www.w3.org/2000/09/xmldsig#\"")
                && self.source.contains("<Signature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_reference_uri_is_basename() {
        let input = ResourceInput::file_detached("/tmp/payloads/payload.xml");
        assert_eq!(input.reference_uri().unwrap(), "payload.xml");
    }

    #[test]
    fn url_reference_uri_is_percent_encoded() {
        let input = ResourceInput::Url {
            url: "file://payload.xml".into(),
            detached: true,
            save_location: Some(PathBuf::from(".")),
            save_name: Some("signature".into()),
        };
        assert_eq!(input.reference_uri().unwrap(), "file%3A%2F%2Fpayload.xml");
    }

    #[test]
    fn non_detached_inline_without_save_location_is_rejected() {
        let input = ResourceInput::InlineBytes {
            bytes: b"<a/>".to_vec(),
            uri: None,
            detached: false,
            save_location: None,
            save_name: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn detached_inline_without_uri_is_rejected() {
        let input = ResourceInput::InlineBytes {
            bytes: b"<a/>".to_vec(),
            uri: None,
            detached: true,
            save_location: Some(PathBuf::from(".")),
            save_name: Some("sig".into()),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn output_path_appends_xml_extension() {
        let input = ResourceInput::File {
            path: PathBuf::from("payload.xml"),
            detached: true,
            save_location: Some(PathBuf::from("/out")),
            save_name: Some("signature".into()),
        };
        assert_eq!(input.output_path(), PathBuf::from("/out/signature.xml"));
    }
}
