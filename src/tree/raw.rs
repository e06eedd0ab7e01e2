//! Generic element tree (C1 substrate).
//!
//! Adapted from the teacher crate's own `dom::Node` (name, attributes, text,
//! children) but rebuilt against the real, published `quick-xml` reader and
//! writer API rather than the bundled one, with the additions XAdES needs:
//! a prefix, a namespace, an `@Id` index, a `traverse_mut` hook for prefix
//! rewriting, and open/close serialization for every element so an emitted
//! document never contains a self-closing tag (§4.6).
//!
//! This is the thin typed layer every `[MODULE]` element in `tree::xades`
//! renders to and parses from; it does not know XAdES semantics itself.

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

/// A generic XML element: prefix, local name, namespace (if declared on this
/// element), attributes in declaration order, text content, and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Namespace prefix, e.g. `Some("ds")`.
    pub prefix: Option<String>,
    /// Local (unprefixed) element name.
    pub local_name: String,
    /// Attributes in the order they should serialize, `(qualified-name, value)`.
    pub attributes: Vec<(String, String)>,
    /// Text content, if any. XAdES leaves never mix text and children.
    pub text: Option<String>,
    /// Ordered child elements.
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Builds an empty element with the given prefix/name.
    pub fn new(prefix: Option<&str>, local_name: &str) -> Self {
        XmlElement {
            prefix: prefix.map(str::to_owned),
            local_name: local_name.to_owned(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// The qualified name (`prefix:local` or `local`).
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.local_name),
            _ => self.local_name.clone(),
        }
    }

    /// Adds an attribute, returning `self` for chaining.
    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push((name.to_owned(), value.into()));
        self
    }

    /// Sets the text content, returning `self` for chaining.
    pub fn text(mut self, value: impl Into<String>) -> Self {
        self.text = Some(value.into());
        self
    }

    /// Appends a child, returning `self` for chaining.
    pub fn child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Appends a child only if present, returning `self` for chaining.
    pub fn maybe_child(self, child: Option<XmlElement>) -> Self {
        match child {
            Some(c) => self.child(c),
            None => self,
        }
    }

    /// Reads the attribute value, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Depth-first search for the descendant (or self) element whose `@Id`
    /// equals `id`. The source system selected this with a non-standard
    /// XPath predicate that happened to just grab the first child (§9); this
    /// performs the direct, unambiguous lookup that replaces it.
    pub fn find_by_id<'a>(&'a self, id: &str) -> Option<&'a XmlElement> {
        if self.attribute("Id") == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    /// Depth-first search for the first descendant (or self) with the given
    /// local name, ignoring prefix/namespace.
    pub fn find_by_local_name<'a>(&'a self, local_name: &str) -> Option<&'a XmlElement> {
        if self.local_name == local_name {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|c| c.find_by_local_name(local_name))
    }

    /// Returns every direct child with the given local name.
    pub fn children_named<'a, 'b>(
        &'a self,
        local_name: &'b str,
    ) -> impl Iterator<Item = &'a XmlElement> + use<'a, 'b> {
        self.children
            .iter()
            .filter(move |c| c.local_name == local_name)
    }

    /// Returns the first direct child with the given local name.
    pub fn child_named<'a>(&'a self, local_name: &str) -> Option<&'a XmlElement> {
        self.children_named(local_name).next()
    }

    /// Visits every element in the (sub)tree, self first, depth-first.
    pub fn traverse_mut(&mut self, f: &mut impl FnMut(&mut XmlElement)) {
        f(self);
        for child in &mut self.children {
            child.traverse_mut(f);
        }
    }

    /// Parses a standalone fragment (exactly one root element) into an
    /// [`XmlElement`] tree.
    pub fn parse(xml: &[u8]) -> Result<XmlElement> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let elem = start_to_element(&e)?;
                    stack.push(elem);
                }
                Event::Empty(e) => {
                    let elem = start_to_element(&e)?;
                    push_child(&mut stack, &mut root, elem);
                }
                Event::End(_) => {
                    let finished = stack.pop().ok_or_else(|| {
                        Error::StructuralMismatch("unbalanced end tag".into())
                    })?;
                    push_child(&mut stack, &mut root, finished);
                }
                Event::Text(e) => {
                    let text = e.decode().unwrap_or_default().into_owned();
                    if let Some(top) = stack.last_mut() {
                        let existing = top.text.get_or_insert_with(String::new);
                        existing.push_str(&text);
                    }
                }
                Event::CData(e) => {
                    let text = e.decode().unwrap_or_default().into_owned();
                    if let Some(top) = stack.last_mut() {
                        let existing = top.text.get_or_insert_with(String::new);
                        existing.push_str(&text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        root.ok_or_else(|| Error::StructuralMismatch("document has no root element".into()))
    }

    /// Serializes this element (and its subtree) to bytes, always using
    /// explicit open/close tags (never self-closing), matching the
    /// `LIBXML_NOEMPTYTAG`-equivalent rule of §4.6.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write(&mut writer)?;
        Ok(writer.into_inner().into_inner())
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let qname = self.qualified_name();
        let mut start = BytesStart::new(qname.clone());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        writer.write_event(Event::Start(start))?;
        if let Some(text) = &self.text {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(qname)))?;
        Ok(())
    }
}

fn start_to_element(e: &BytesStart) -> Result<XmlElement> {
    let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let (prefix, local_name) = match raw_name.split_once(':') {
        Some((p, l)) => (Some(p.to_owned()), l.to_owned()),
        None => (None, raw_name),
    };
    let mut attributes = Vec::new();
    for a in e.attributes() {
        let a = a?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let value = a.unescape_value().unwrap_or_default().into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        prefix,
        local_name,
        attributes,
        text: None,
        children: Vec::new(),
    })
}

fn push_child(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, child: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(child),
        None => *root = Some(child),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_attributes_and_text() {
        let built = XmlElement::new(Some("xa"), "SignedProperties")
            .attr("Id", "signed-properties")
            .child(XmlElement::new(Some("xa"), "SigningTime").text("2024-01-01T00:00:00Z"));
        let bytes = built.to_bytes().unwrap();
        let parsed = XmlElement::parse(&bytes).unwrap();
        assert_eq!(parsed.local_name, "SignedProperties");
        assert_eq!(parsed.attribute("Id"), Some("signed-properties"));
        assert_eq!(
            parsed.child_named("SigningTime").unwrap().text.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn find_by_id_is_depth_first() {
        let tree = XmlElement::new(None, "a").child(
            XmlElement::new(None, "b").child(XmlElement::new(None, "c").attr("Id", "target")),
        );
        assert!(tree.find_by_id("target").is_some());
        assert!(tree.find_by_id("missing").is_none());
    }

    #[test]
    fn empty_elements_serialize_with_open_close_pair() {
        let el = XmlElement::new(None, "child");
        let bytes = el.to_bytes().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "<child></child>");
    }
}
