// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed-job marker.
//!
//! Autojobs only ever deletes jobs it created. Ownership is recorded inside
//! the job document itself, in one of two ways:
//!
//! - [`TagMethod::Element`]: a `createdByJenkinsAutojobs` element under the
//!   document root, holding the source branch and the optional tag label.
//! - [`TagMethod::Description`]: sentinel lines appended to the job
//!   description, for setups whose tooling rejects unknown elements.

use crate::{config::TagMethod, job::JobError, xml};

use xmltree::{Element, XMLNode};

/// Name of marker element.
pub const MARKER_ELEMENT: &str = "createdByJenkinsAutojobs";

/// Description line marking a job as managed.
pub const DESCRIPTION_SENTINEL: &str = "(created by jenkins-autojobs)";

const DESCRIPTION_TAG_PREFIX: &str = "(jenkins-autojobs-tag: ";
const DESCRIPTION_TAG_SUFFIX: &str = ")";

/// Document roots of job types whose description is a direct child.
const PROJECT_ROOTS: [&str; 6] = [
    "project",
    "matrix-project",
    "maven2-moduleset",
    "flow-definition",
    "com.tikal.jenkins.plugins.multijob.MultiJobProject",
    "hudson.ivy.IvyModuleSet",
];

/// Mark document as managed, recording branch and optional tag label.
///
/// Marking an already marked document does not duplicate anything.
///
/// # Errors
///
/// - Return [`JobError::NoDescriptionTarget`] if the description method is
///   used on a document with neither a known project root nor an existing
///   description element.
pub fn mark(
    document: &mut Element,
    method: TagMethod,
    branch: &str,
    tag: Option<&str>,
) -> Result<(), JobError> {
    match method {
        TagMethod::Element => {
            mark_element(document, branch, tag);
            Ok(())
        }
        TagMethod::Description => mark_description(document, tag),
    }
}

fn mark_element(document: &mut Element, branch: &str, tag: Option<&str>) {
    document.children.retain(|child| {
        !matches!(child, XMLNode::Element(element) if element.name == MARKER_ELEMENT)
    });

    let mut marker = Element::new(MARKER_ELEMENT);
    let mut reference = Element::new("ref");
    xml::set_text(&mut reference, branch);
    marker.children.push(XMLNode::Element(reference));

    if let Some(tag) = tag {
        let mut label = Element::new("tag");
        xml::set_text(&mut label, tag);
        marker.children.push(XMLNode::Element(label));
    }

    document.children.push(XMLNode::Element(marker));
}

fn mark_description(document: &mut Element, tag: Option<&str>) -> Result<(), JobError> {
    let root = document.name.clone();
    let description = if PROJECT_ROOTS.contains(&root.as_str()) {
        xml::child_or_insert(document, "description")
    } else {
        xml::find_descendant_mut(document, &|el: &Element| el.name == "description")
            .ok_or(JobError::NoDescriptionTarget { root })?
    };

    let current = xml::text(description);
    let mut lines = Vec::new();
    if !current.contains(DESCRIPTION_SENTINEL) {
        lines.push(DESCRIPTION_SENTINEL.to_string());
    }
    if let Some(tag) = tag {
        let line = format!("{DESCRIPTION_TAG_PREFIX}{tag}{DESCRIPTION_TAG_SUFFIX}");
        if !current.contains(&line) {
            lines.push(line);
        }
    }

    if !lines.is_empty() {
        let appended = lines.join("\n");
        let text = if current.is_empty() {
            appended
        } else {
            format!("{current}\n{appended}")
        };
        xml::set_text(description, text);
    }

    Ok(())
}

/// Tag labels of a managed job, `None` if the job is not managed.
///
/// # Errors
///
/// - Return [`JobError::Xml`] if the document is not well-formed.
pub fn managed_tags(config: &str, method: TagMethod) -> Result<Option<Vec<String>>, JobError> {
    let document = xml::parse(config)?;
    let tags = match method {
        TagMethod::Element => document.get_child(MARKER_ELEMENT).map(|marker| {
            marker
                .children
                .iter()
                .filter_map(XMLNode::as_element)
                .filter(|child| child.name == "tag")
                .map(xml::text)
                .collect()
        }),
        TagMethod::Description => {
            let description = if PROJECT_ROOTS.contains(&document.name.as_str()) {
                document.get_child("description")
            } else {
                xml::find_descendant(&document, &|el: &Element| el.name == "description")
            };
            description
                .map(xml::text)
                .filter(|text| text.contains(DESCRIPTION_SENTINEL))
                .map(|text| {
                    text.lines()
                        .filter_map(|line| {
                            line.trim()
                                .strip_prefix(DESCRIPTION_TAG_PREFIX)?
                                .strip_suffix(DESCRIPTION_TAG_SUFFIX)
                                .map(ToString::to_string)
                        })
                        .collect()
                })
        }
    };

    Ok(tags)
}
