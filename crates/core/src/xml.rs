//! XML text form of [`StateTree`] documents.
//!
//! Whitespace-only text next to child elements is treated as indentation and
//! dropped. Text of a leaf element is kept verbatim, even when it is blank.

use std::borrow::Cow;
use std::str;

use once_cell::sync::Lazy;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use thiserror::Error;

use crate::tree::StateTree;

static XML_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("XML name pattern must compile")
});

/// 是否為可寫出的元素或屬性名稱。 / Whether `name` can be written as an element or attribute name.
pub fn is_valid_name(name: &str) -> bool {
    XML_NAME.is_match(name)
}

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("malformed XML attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("XML names must be UTF-8")]
    Encoding(#[from] str::Utf8Error),
    #[error("document has no root element")]
    MissingRoot,
    #[error("document has more than one root element")]
    MultipleRoots,
    #[error("element <{0}> is never closed")]
    Unclosed(String),
    #[error("`{0}` is not a valid element name")]
    InvalidElement(String),
    #[error("`{name}` is not a valid attribute name on <{element}>")]
    InvalidAttribute { element: String, name: String },
    #[error("serialized XML is not valid UTF-8")]
    Output(#[from] std::string::FromUtf8Error),
}

/// Parses a document into its root element.
pub fn parse(input: &str) -> Result<StateTree, XmlError> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<StateTree> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let element = open_element(&start)?;
                if let Some(parent) = stack.last_mut() {
                    parent.blank.clear();
                }
                stack.push(OpenElement {
                    element,
                    blank: String::new(),
                });
            }
            Event::Empty(start) => {
                let element = open_element(&start)?;
                attach(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                // quick-xml already rejects mismatched end tags.
                if let Some(open) = stack.pop() {
                    attach(open.finish(), &mut stack, &mut root)?;
                }
            }
            Event::Text(text) => {
                let content = text.unescape()?;
                if let Some(current) = stack.last_mut() {
                    current.push_text(&content);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    let raw = data.into_inner();
                    current.push_verbatim(str::from_utf8(&raw)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = stack.pop() {
        return Err(XmlError::Unclosed(unclosed.element.name().to_string()));
    }
    root.ok_or(XmlError::MissingRoot)
}

/// An element being parsed, with blank text held back until it is known
/// whether the element is a leaf.
struct OpenElement {
    element: StateTree,
    blank: String,
}

impl OpenElement {
    fn push_text(&mut self, content: &str) {
        if content.trim().is_empty() {
            if self.element.children().is_empty() {
                self.blank.push_str(content);
            }
        } else {
            self.push_verbatim(content);
        }
    }

    fn push_verbatim(&mut self, content: &str) {
        if !self.blank.is_empty() {
            let blank = std::mem::take(&mut self.blank);
            self.element.append_text(&blank);
        }
        self.element.append_text(content);
    }

    fn finish(mut self) -> StateTree {
        if self.element.children().is_empty() && !self.blank.is_empty() {
            self.element.append_text(&self.blank);
        }
        self.element
    }
}

/// Serializes an element (without XML declaration) using two-space indentation.
pub fn to_string(tree: &StateTree) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_element(&mut writer, tree)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

/// Serializes a full document, prefixed with a UTF-8 XML declaration.
pub fn to_document(tree: &StateTree) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, tree)?;
    let mut output = String::from_utf8(writer.into_inner())?;
    output.push('\n');
    Ok(output)
}

fn open_element(start: &BytesStart<'_>) -> Result<StateTree, XmlError> {
    let name = start.name();
    let mut element = StateTree::new(str::from_utf8(name.as_ref())?);
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = str::from_utf8(attribute.key.as_ref())?.to_string();
        let value: Cow<'_, str> = attribute.unescape_value()?;
        element.set_attribute(key, value.into_owned());
    }
    Ok(element)
}

fn attach(
    element: StateTree,
    stack: &mut [OpenElement],
    root: &mut Option<StateTree>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.blank.clear();
            parent.element.add_child(element);
            Ok(())
        }
        None if root.is_some() => Err(XmlError::MultipleRoots),
        None => {
            *root = Some(element);
            Ok(())
        }
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, tree: &StateTree) -> Result<(), XmlError> {
    if !is_valid_name(tree.name()) {
        return Err(XmlError::InvalidElement(tree.name().to_string()));
    }
    let mut start = BytesStart::new(tree.name());
    for (key, value) in tree.attributes() {
        if !is_valid_name(key) {
            return Err(XmlError::InvalidAttribute {
                element: tree.name().to_string(),
                name: key.to_string(),
            });
        }
        start.push_attribute((key, value));
    }

    let text = tree.text().filter(|text| !text.is_empty());
    if tree.children().is_empty() && text.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if let Some(text) = text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in tree.children() {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(tree.name())))?;
    Ok(())
}
