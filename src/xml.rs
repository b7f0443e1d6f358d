//! Namespace-aware element tree over quick-xml events.
//!
//! Manifest and metadata documents are small, so both are read into an
//! [`XmlElement`] tree first. Every element remembers its byte span in the
//! source text, which lets unrecognized fragments be carried through verbatim.

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::NsReader;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::ops::Range;
use thiserror::Error;

/// Deepest element nesting accepted in a document
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct XmlError(String);

#[derive(Debug, Clone)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    /// Prefix as written, `None` when unqualified
    pub prefix: Option<String>,
    pub local: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct XmlElement {
    pub namespace: Option<String>,
    /// Prefix as written, `""` when unprefixed
    pub prefix: String,
    pub local: String,
    pub attributes: Vec<XmlAttribute>,
    /// `xmlns` declarations made on this element, prefix `""` for the default
    pub declarations: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Unescaped character data directly inside this element
    pub text: String,
    /// Byte range of the whole element in the source
    pub span: Range<usize>,
    /// Byte offset just past the tag name in the source
    pub name_end: usize,
}

impl XmlElement {
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local == local
    }

    /// Attribute lookup; `None` namespace matches unqualified attributes
    pub fn attr(&self, namespace: Option<&str>, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == namespace && a.local == local)
            .map(|a| a.value.as_str())
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, local))
    }

    pub fn child(&self, namespace: &str, local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(namespace, local))
    }

    /// Trimmed text content, `None` when blank
    pub fn text_content(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Expanded name, `namespace` + `local`, as used for RDF property IRIs
    pub fn expanded_name(&self) -> String {
        format!("{}{}", self.namespace.as_deref().unwrap_or_default(), self.local)
    }

    /// The element's original markup
    pub fn source<'a>(&self, input: &'a str) -> &'a str {
        input.get(self.span.clone()).unwrap_or_default().trim()
    }

    /// Prefixes used in this subtree without a declaration inside it.
    ///
    /// `""` stands for the default namespace of an unprefixed element.
    pub fn free_prefixes(&self) -> BTreeSet<String> {
        let mut free = BTreeSet::new();
        self.collect_free_prefixes(&mut Vec::new(), &mut free);
        free
    }

    fn collect_free_prefixes<'a>(&'a self, bound: &mut Vec<&'a str>, free: &mut BTreeSet<String>) {
        let depth = bound.len();
        bound.extend(self.declarations.iter().map(|(prefix, _)| prefix.as_str()));

        let used = std::iter::once(self.prefix.as_str())
            .chain(self.attributes.iter().filter_map(|a| a.prefix.as_deref()));
        for prefix in used {
            if !matches!(prefix, "xml" | "xmlns") && !bound.contains(&prefix) {
                free.insert(prefix.to_string());
            }
        }
        for child in &self.children {
            child.collect_free_prefixes(bound, free);
        }

        bound.truncate(depth);
    }
}

struct OpenElement {
    element: XmlElement,
    raw_text: String,
}

/// Parse a complete document and return its root element
pub fn parse_document(input: &str) -> Result<XmlElement, XmlError> {
    let mut reader = NsReader::from_str(input);
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| XmlError(format!("XML error at byte {}: {}", start, e)))?;

        match event {
            Event::Start(ref e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError(format!(
                        "elements nested deeper than {} levels",
                        MAX_DEPTH
                    )));
                }
                let element = open_element(&reader, e, tag_start(input, start))?;
                stack.push(OpenElement {
                    element,
                    raw_text: String::new(),
                });
            }
            Event::Empty(ref e) => {
                let mut element = open_element(&reader, e, tag_start(input, start))?;
                element.span.end = reader.buffer_position() as usize;
                attach(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let open = stack
                    .pop()
                    .ok_or_else(|| XmlError("unexpected closing tag".to_string()))?;
                let mut element = open.element;
                element.text = unescape(&open.raw_text)
                    .map_err(|e| XmlError(format!("bad character data: {}", e)))?
                    .into_owned();
                element.span.end = reader.buffer_position() as usize;
                attach(element, &mut stack, &mut root)?;
            }
            Event::Text(ref t) => {
                if let Some(open) = stack.last_mut() {
                    open.raw_text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Event::CData(ref c) => {
                if let Some(open) = stack.last_mut() {
                    open.raw_text.push_str(&escape(String::from_utf8_lossy(c).as_ref()));
                }
            }
            Event::GeneralRef(ref r) => {
                if let Some(open) = stack.last_mut() {
                    open.raw_text.push('&');
                    open.raw_text.push_str(&String::from_utf8_lossy(r));
                    open.raw_text.push(';');
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError("document ended inside an element".to_string()));
    }
    root.ok_or_else(|| XmlError("document has no root element".to_string()))
}

/// Locate the `<` of the tag read from `position`, whether or not the reader
/// already consumed it
fn tag_start(input: &str, position: usize) -> usize {
    let bytes = input.as_bytes();
    match bytes.get(position) {
        Some(b'<') => position,
        _ if position > 0 && bytes.get(position - 1) == Some(&b'<') => position - 1,
        _ => input
            .get(position..)
            .and_then(|rest| rest.find('<'))
            .map_or(position, |offset| position + offset),
    }
}

fn attach(
    element: XmlElement,
    stack: &mut [OpenElement],
    root: &mut Option<XmlElement>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.element.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError("more than one root element".to_string())),
    }
    Ok(())
}

fn namespace_of(result: ResolveResult<'_>) -> Option<String> {
    match result {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
        }
        _ => None,
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn open_element(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    start: usize,
) -> Result<XmlElement, XmlError> {
    let mut declarations = Vec::new();
    let mut attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError(format!("bad attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw_value = std::str::from_utf8(&attr.value)
            .map_err(|_| XmlError(format!("attribute {} is not UTF-8", key)))?;
        let value = unescape(raw_value)
            .map_err(|e| XmlError(format!("bad attribute value for {}: {}", key, e)))?
            .into_owned();

        if key == "xmlns" {
            declarations.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.push((prefix.to_string(), value));
        } else {
            let (namespace, _) = reader.resolve_attribute(QName(key.as_bytes()));
            let (prefix, local) = split_qname(&key);
            attributes.push(XmlAttribute {
                namespace: namespace_of(namespace),
                prefix: prefix.map(str::to_string),
                local: local.to_string(),
                value,
            });
        }
    }

    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let (namespace, _) = reader.resolve_element(e.name());
    let (prefix, local) = split_qname(&qname);

    declarations.sort();
    Ok(XmlElement {
        namespace: namespace_of(namespace),
        prefix: prefix.unwrap_or_default().to_string(),
        local: local.to_string(),
        attributes,
        declarations,
        children: Vec::new(),
        text: String::new(),
        span: start..start,
        name_end: start + 1 + qname.len(),
    })
}

/// Escape text or attribute content for output
pub fn escape_text(text: &str) -> Cow<'_, str> {
    escape(text)
}
