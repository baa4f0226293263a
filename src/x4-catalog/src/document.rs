//! In-memory XML element tree
//!
//! Every game file the pipeline touches (wares library, ware groups, macros,
//! diff patches, language files) is small enough to hold as an owned tree.
//! Whitespace-only text between elements is dropped on load, the same as a
//! blank-text-removing parser would, so serialization can re-indent freely.
//! Language files carry mixed content (`<b>Solar</b> <b>Plant</b>`) and are
//! read with [`Element::parse_mixed`], which keeps every text run.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// A child of an element: either a nested element or a run of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with ordered attributes and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style child appender
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder-style text appender
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, keeping its original position if it already exists
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Remove an attribute, returning whether it was present
    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|(k, _)| k != name);
        self.attributes.len() != before
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements with the given tag name
    pub fn children_named<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a Element> + 'b
    where
        'a: 'b,
    {
        self.elements().filter(move |e| e.name == name)
    }

    /// First child element with the given tag name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    /// Follow a slash-separated chain of child names, taking the first match
    /// at each level (`"properties/production"`)
    pub fn find(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .filter(|step| !step.is_empty())
            .try_fold(self, |current, step| current.child(step))
    }

    /// All descendant elements in pre-order, excluding `self`
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// Concatenation of every text fragment below this element, nested
    /// markup included
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Parse a complete document and return its root element
    pub fn parse(xml: &str) -> Result<Element> {
        parse_document(xml, false)
    }

    /// Parse keeping whitespace-only text runs
    pub fn parse_mixed(xml: &str) -> Result<Element> {
        parse_document(xml, true)
    }

    /// Serialize as an indented document with an XML declaration
    pub fn to_xml_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        self.write_indented(&mut out, 0);
        out
    }

    fn write_indented(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", key, escape(value.as_str())));
        }

        if self.children.is_empty() {
            out.push_str("/>\n");
            return;
        }

        if self.children.iter().all(|c| matches!(c, Node::Text(_))) {
            out.push('>');
            for child in &self.children {
                if let Node::Text(text) = child {
                    out.push_str(&escape(text.as_str()));
                }
            }
            out.push_str(&format!("</{}>\n", self.name));
            return;
        }

        out.push_str(">\n");
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_indented(out, depth + 1),
                Node::Text(text) => {
                    out.push_str(&indent);
                    out.push_str("  ");
                    out.push_str(&escape(text.trim()));
                    out.push('\n');
                }
            }
        }
        out.push_str(&indent);
        out.push_str(&format!("</{}>\n", self.name));
    }
}

/// Read and parse a document from disk
pub fn load(path: &Path) -> Result<Element> {
    load_with(path, Element::parse)
}

/// Read and parse a mixed-content document from disk
pub fn load_mixed(path: &Path) -> Result<Element> {
    load_with(path, Element::parse_mixed)
}

fn load_with(path: &Path, parse: fn(&str) -> Result<Element>) -> Result<Element> {
    let xml = fs::read_to_string(path)?;
    parse(&xml).map_err(|e| Error::Document {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn parse_document(xml: &str, keep_whitespace: bool) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Xml("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                push_text(&mut stack, &text, keep_whitespace);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                push_text(&mut stack, &text, keep_whitespace);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::Xml(format!("unclosed element <{}>", open.name)));
    }

    root.ok_or_else(|| Error::Xml("document has no root element".to_string()))
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str, keep_whitespace: bool) {
    if text.is_empty() || (!keep_whitespace && text.trim().is_empty()) {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Text(text.to_string()));
    }
}

fn collect_descendants<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    for child in element.elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) => collect_text(e, out),
        }
    }
}
