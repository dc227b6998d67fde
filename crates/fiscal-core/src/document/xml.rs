//! # XML Element Tree
//!
//! A small ordered element tree: just enough XML for the fiscal layout.
//!
//! - Children keep insertion order; nothing is ever sorted or deduplicated.
//! - Three renderings: compact (what gets stored and signed), pretty (golden
//!   files, debugging) and canonical (Canonical XML 1.0, for digests).
//! - [`parse_element`] reads text back with `quick-xml`.
//!
//! ## Canonical Form (inclusive C14N 1.0, no comments)
//! ```text
//! <a b="1" xmlns="urn:x"/>   ──►   <a xmlns="urn:x" b="1"></a>
//!
//! • namespace declarations first, then attributes, each sorted
//! • in-scope namespaces of an apex element are rendered on it
//! • empty elements become start + end tag pairs
//! • text escapes & < > and CR; attributes escape & < " TAB LF CR
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::SerializationError;

/// Namespace of the NF-e layout.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Declaration every stored document starts with.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// An element holding only text. Empty text gives an empty element.
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut element = Element::new(name);
        if !text.is_empty() {
            element.children.push(Node::Text(text));
        }
        element
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Appends a text leaf; shorthand for the layout builders.
    pub fn with_leaf(self, name: &str, text: impl Into<String>) -> Self {
        self.with_child(Element::leaf(name, text))
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.name == name)
    }

    /// Follows a path of child names.
    pub fn path(&self, names: &[&str]) -> Option<&Element> {
        names
            .iter()
            .try_fold(self, |current, name| current.child(name))
    }

    /// First descendant (or self) with the given name, depth first.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.elements().find_map(|e| e.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) => e.find_mut(name),
            Node::Text(_) => None,
        })
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text)
    }

    fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    /// Drops indentation between child elements. Text-only elements keep
    /// their text as-is.
    fn drop_layout_whitespace(&mut self) {
        if self.elements().next().is_some() {
            self.children
                .retain(|node| !matches!(node, Node::Text(t) if t.trim().is_empty()));
        }
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Compact form, no whitespace between elements.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_compact(&mut out);
        out
    }

    fn write_start(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            push_attribute(out, name, value);
        }
    }

    fn write_compact(&self, out: &mut String) {
        self.write_start(out);
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(e) => e.write_compact(out),
                Node::Text(t) => out.push_str(&escape_text(t)),
            }
        }
        push_end_tag(out, &self.name);
    }

    /// Two-space indented form. Elements holding only text stay on one line.
    pub fn to_pretty_xml(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0);
        out
    }

    fn write_pretty(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        self.write_start(out);

        if self.children.is_empty() {
            out.push_str("/>\n");
            return;
        }

        if self.elements().next().is_none() {
            out.push('>');
            out.push_str(&escape_text(&self.text()));
            push_end_tag(out, &self.name);
            out.push('\n');
            return;
        }

        out.push_str(">\n");
        for node in &self.children {
            match node {
                Node::Element(e) => e.write_pretty(out, depth + 1),
                Node::Text(t) => {
                    out.push_str(&"  ".repeat(depth + 1));
                    out.push_str(&escape_text(t));
                    out.push('\n');
                }
            }
        }
        out.push_str(&indent);
        push_end_tag(out, &self.name);
        out.push('\n');
    }

    /// Canonical XML 1.0 of this subtree.
    ///
    /// `inherited` holds the namespace declarations `(prefix, uri)` in scope
    /// at this element's parent (`""` is the default namespace). They are
    /// rendered on this element, as inclusive canonicalization of a document
    /// subset requires.
    pub fn canonicalize(&self, inherited: &[(String, String)]) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out, inherited, &[]);
        out
    }

    fn write_canonical(
        &self,
        out: &mut String,
        in_scope: &[(String, String)],
        rendered: &[(String, String)],
    ) {
        let mut scope = in_scope.to_vec();
        let mut attributes: Vec<(&str, &str)> = Vec::new();
        for (name, value) in &self.attributes {
            match namespace_prefix(name) {
                Some(prefix) => bind(&mut scope, prefix, value),
                None => attributes.push((name.as_str(), value.as_str())),
            }
        }

        let mut declarations: Vec<(String, String)> = scope
            .iter()
            .filter(|(prefix, uri)| match lookup(rendered, prefix) {
                Some(current) => current != uri,
                // xmlns="" only matters to undo a rendered default
                None => !(prefix.is_empty() && uri.is_empty()),
            })
            .cloned()
            .collect();
        declarations.sort_by(|a, b| a.0.cmp(&b.0));
        attributes.sort_by(|a, b| a.0.cmp(b.0));

        let mut now_rendered = rendered.to_vec();
        for (prefix, uri) in &declarations {
            bind(&mut now_rendered, prefix, uri);
        }

        out.push('<');
        out.push_str(&self.name);
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                push_attribute(out, "xmlns", uri);
            } else {
                push_attribute(out, &format!("xmlns:{}", prefix), uri);
            }
        }
        for (name, value) in attributes {
            push_attribute(out, name, value);
        }
        out.push('>');

        for node in &self.children {
            match node {
                Node::Element(e) => e.write_canonical(out, &scope, &now_rendered),
                Node::Text(t) => out.push_str(&escape_text(t)),
            }
        }
        push_end_tag(out, &self.name);
    }
}

fn namespace_prefix(attribute: &str) -> Option<&str> {
    if attribute == "xmlns" {
        Some("")
    } else {
        attribute.strip_prefix("xmlns:")
    }
}

fn lookup<'a>(scope: &'a [(String, String)], prefix: &str) -> Option<&'a String> {
    scope.iter().find(|(p, _)| p == prefix).map(|(_, uri)| uri)
}

fn bind(scope: &mut Vec<(String, String)>, prefix: &str, uri: &str) {
    match scope.iter_mut().find(|(p, _)| p == prefix) {
        Some(entry) => entry.1 = uri.to_string(),
        None => scope.push((prefix.to_string(), uri.to_string())),
    }
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attribute(value));
    out.push('"');
}

fn push_end_tag(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Escapes character data (C14N rules, also used for stored documents).
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes an attribute value (C14N rules).
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// Parsing
// =============================================================================

fn malformed(err: impl std::fmt::Display) -> SerializationError {
    SerializationError::MalformedXml(err.to_string())
}

fn utf8(bytes: &[u8]) -> Result<String, SerializationError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(malformed)
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, SerializationError> {
    let mut element = Element::new(utf8(start.name().as_ref())?);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(malformed)?;
        let name = utf8(attribute.key.as_ref())?;
        let value = attribute.unescape_value().map_err(malformed)?;
        element.attributes.push((name, value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), SerializationError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(malformed("more than one root element")),
    }
}

/// Parses a document into its root element.
///
/// Declarations, comments and processing instructions are skipped;
/// whitespace between elements is dropped.
pub fn parse_element(xml: &str) -> Result<Element, SerializationError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected closing tag"))?;
                element.drop_layout_whitespace();
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?;
                match stack.last_mut() {
                    Some(parent) => parent.push_text(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(malformed("text outside the root element")),
                }
            }
            Event::CData(data) => {
                let text = utf8(&data.into_inner())?;
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| malformed("no root element"))
}
