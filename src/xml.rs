// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Job configuration document handling.
//!
//! Jenkins stores each job as an XML document. Autojobs clones a template
//! document, edits it as a tree, and compares the result against what
//! Jenkins already has.
//!
//! # Canonical Form
//!
//! Two documents that only differ in indentation or attribute order describe
//! the same job, so every comparison goes through [`canonicalize`]:
//!
//! - No XML declaration.
//! - Attributes sorted by name.
//! - Empty elements written as start/end tag pairs.
//! - Comments and processing instructions dropped.
//! - Whitespace-only text dropped from elements that also contain elements.
//! - C14N escaping rules for text and attribute values.
//!
//! - Namespace declarations written on the element that brings them into
//!   scope, ordered by prefix.
//!
//! The same serializer produces the document uploaded to Jenkins, so a job
//! written by one run compares equal on the next one.
//!
//! # Lossy Parts
//!
//! The parser keeps neither whitespace-only text nor attribute prefixes.
//! `<description>  </description>` comes back as an empty description, and
//! `xsi:type="x"` comes back as `type="x"`. Both losses happen the same way
//! on every run, so comparisons stay stable, but such templates are not
//! uploaded verbatim.

use std::borrow::Cow;
use xmltree::{Element, Namespace, XMLNode};

const RESERVED_PREFIXES: [&str; 2] = ["xml", "xmlns"];

/// Parse XML text into a document tree.
///
/// # Errors
///
/// - Return [`XmlError::Parse`] if text is not well-formed XML.
pub fn parse(text: &str) -> Result<Element> {
    Ok(Element::parse(text.as_bytes())?)
}

/// Serialize a document tree into canonical form.
pub fn canonicalize(element: &Element) -> String {
    let mut out = String::new();
    write_canonical(element, None, &mut out);
    out
}

fn write_canonical(element: &Element, scope: Option<&Namespace>, out: &mut String) {
    let name = qualified_name(element);
    out.push('<');
    out.push_str(&name);
    write_namespaces(element, scope, out);

    let mut attributes = element.attributes.iter().collect::<Vec<_>>();
    attributes.sort();
    for (key, value) in attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attribute(value, out);
        out.push('"');
    }
    out.push('>');

    // INVARIANT: Indentation between child elements is not content.
    let has_elements = element
        .children
        .iter()
        .any(|child| matches!(child, XMLNode::Element(_)));

    for child in &element.children {
        match child {
            XMLNode::Element(child) => {
                write_canonical(child, element.namespaces.as_ref().or(scope), out)
            }
            XMLNode::Text(text) | XMLNode::CData(text) => {
                if has_elements && text.trim().is_empty() {
                    continue;
                }
                escape_text(text, out);
            }
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

/// Declare every namespace binding that differs from the enclosing scope.
fn write_namespaces(element: &Element, scope: Option<&Namespace>, out: &mut String) {
    let Some(namespaces) = &element.namespaces else {
        return;
    };

    for (prefix, uri) in &namespaces.0 {
        if RESERVED_PREFIXES.contains(&prefix.as_str()) {
            continue;
        }

        let inherited = scope.and_then(|scope| scope.0.get(prefix));
        if inherited == Some(uri) {
            continue;
        }

        // INVARIANT: An empty default namespace only needs declaring to undo
        //   a non-empty one.
        if prefix.is_empty() && uri.is_empty() && inherited.is_none() {
            continue;
        }

        out.push_str(" xmlns");
        if !prefix.is_empty() {
            out.push(':');
            out.push_str(prefix);
        }
        out.push_str("=\"");
        escape_attribute(uri, out);
        out.push('"');
    }
}

fn qualified_name(element: &Element) -> Cow<'_, str> {
    match &element.prefix {
        Some(prefix) => Cow::Owned(format!("{prefix}:{}", element.name)),
        None => Cow::Borrowed(element.name.as_str()),
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            ch => out.push(ch),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            ch => out.push(ch),
        }
    }
}

/// Find first descendant element in document order that satisfies a
/// predicate.
pub fn find_descendant<'a, P>(element: &'a Element, predicate: &P) -> Option<&'a Element>
where
    P: Fn(&Element) -> bool,
{
    for child in &element.children {
        if let XMLNode::Element(child) = child {
            if predicate(child) {
                return Some(child);
            }
            if let Some(found) = find_descendant(child, predicate) {
                return Some(found);
            }
        }
    }

    None
}

/// Find first descendant element in document order that satisfies a
/// predicate for mutation.
pub fn find_descendant_mut<'a, P>(element: &'a mut Element, predicate: &P) -> Option<&'a mut Element>
where
    P: Fn(&Element) -> bool,
{
    for child in element.children.iter_mut() {
        if let XMLNode::Element(child) = child {
            if predicate(child) {
                return Some(child);
            }
            if let Some(found) = find_descendant_mut(child, predicate) {
                return Some(found);
            }
        }
    }

    None
}

/// Apply `visit` to every descendant element with a given name.
///
/// Returns number of elements visited.
pub fn for_each_named_mut<F>(element: &mut Element, name: &str, visit: &mut F) -> usize
where
    F: FnMut(&mut Element),
{
    let mut count = 0;
    for child in element.children.iter_mut() {
        if let XMLNode::Element(child) = child {
            if child.name == name {
                visit(child);
                count += 1;
            }
            count += for_each_named_mut(child, name, visit);
        }
    }

    count
}

/// Apply `visit` to every text node of a document in document order.
///
/// CDATA sections count as text.
///
/// # Errors
///
/// - Return first error `visit` produces, leaving remaining nodes untouched.
pub fn try_for_each_text_mut<F, E>(element: &mut Element, visit: &mut F) -> Result<(), E>
where
    F: FnMut(&mut String) -> Result<(), E>,
{
    for child in element.children.iter_mut() {
        match child {
            XMLNode::Element(child) => try_for_each_text_mut(child, visit)?,
            XMLNode::Text(text) | XMLNode::CData(text) => visit(text)?,
            _ => {}
        }
    }

    Ok(())
}

/// Get direct child element, inserting an empty one at the end when missing.
pub fn child_or_insert<'a>(element: &'a mut Element, name: &str) -> &'a mut Element {
    if element.get_child(name).is_none() {
        element.children.push(XMLNode::Element(Element::new(name)));
    }

    // INVARIANT: Child exists at this point.
    element
        .get_mut_child(name)
        .unwrap_or_else(|| unreachable!("child {name} was just inserted"))
}

/// Concatenated text content of an element.
pub fn text(element: &Element) -> String {
    element
        .get_text()
        .map(Cow::into_owned)
        .unwrap_or_default()
}

/// Replace text content of an element, keeping any child elements.
pub fn set_text(element: &mut Element, text: impl Into<String>) {
    element
        .children
        .retain(|child| !matches!(child, XMLNode::Text(_) | XMLNode::CData(_)));
    element.children.insert(0, XMLNode::Text(text.into()));
}

/// XML handling error types.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// Document is not well-formed.
    #[error(transparent)]
    Parse(#[from] xmltree::ParseError),
}

/// Friendly result alias :3
pub type Result<T, E = XmlError> = std::result::Result<T, E>;
