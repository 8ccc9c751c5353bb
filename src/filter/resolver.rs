//! Turns a rule's field into the concrete strings to test for one entry.
use std::sync::OnceLock;

use tracing::info;

use super::engine::FilterError;
use super::entry::Entry;
use super::locator::Locator;
use super::xml::Element;
use crate::model::{ItemField, Rule};

/// Candidate locators per built-in field, tried in order.
struct FieldLocators {
    title: Vec<Locator>,
    author: Vec<Locator>,
    link: Vec<Locator>,
    category: Vec<Locator>,
    content: Vec<Locator>,
}

fn compile(sources: &[&str]) -> Vec<Locator> {
    sources
        .iter()
        .map(|source| source.parse().expect("built-in locator must parse"))
        .collect()
}

fn field_locators() -> &'static FieldLocators {
    static LOCATORS: OnceLock<FieldLocators> = OnceLock::new();
    LOCATORS.get_or_init(|| FieldLocators {
        title: compile(&["atom:title", "title"]),
        author: compile(&["atom:author/atom:name", "atom:author", "dc:creator", "author"]),
        link: compile(&["atom:link[@rel='alternate']", "link"]),
        category: compile(&["atom:category", "category"]),
        content: compile(&[
            "content:encoded",
            "atom:content[@type='xhtml']",
            "atom:content[@type='html']",
            "description",
        ]),
    })
}

fn candidates(rule: &Rule) -> Result<&[Locator], FilterError> {
    let builtin = field_locators();
    Ok(match rule.field() {
        ItemField::Title => &builtin.title,
        ItemField::Author => &builtin.author,
        ItemField::Link => &builtin.link,
        ItemField::Category => &builtin.category,
        ItemField::Content => &builtin.content,
        ItemField::Custom => match rule.custom_locator() {
            Some(locator) => std::slice::from_ref(locator),
            None => {
                return Err(FilterError::InvalidRule {
                    index: rule.index(),
                    reason: "custom field requires a non-empty customXPath".to_string(),
                })
            }
        },
    })
}

enum AttributeLookup<'a> {
    Found(&'a str),
    Missing,
    Ambiguous(usize),
}

/// Finds `name` on `element`.
///
/// An exact qualified match (`{namespace}local` or `prefix:local`) wins;
/// otherwise any attribute with that local name is considered, and more than
/// one such attribute is ambiguous.
fn lookup_attribute<'a>(element: &'a Element, name: &str) -> AttributeLookup<'a> {
    let exact: Vec<&str> = element
        .attributes()
        .filter(|attr| attr.expanded_name() == name || attr.name.lexical() == name)
        .map(|attr| attr.value.as_str())
        .collect();
    let matched = if exact.is_empty() {
        element
            .attributes()
            .filter(|attr| attr.name.local == name)
            .map(|attr| attr.value.as_str())
            .collect()
    } else {
        exact
    };

    match matched.as_slice() {
        [] => AttributeLookup::Missing,
        [value] => AttributeLookup::Found(*value),
        _ => AttributeLookup::Ambiguous(matched.len()),
    }
}

/// Values of `rule`'s field in `entry`, one per located element in document order.
///
/// An empty list means the rule does not apply to this entry: the field, or
/// the tested attribute, could not be found (or was ambiguous). Only a broken
/// rule definition is an error.
pub fn resolve_values(rule: &Rule, entry: &Entry<'_>) -> Result<Vec<String>, FilterError> {
    let candidates = candidates(rule)?;
    let doc = entry.document();

    let Some(elements) = candidates
        .iter()
        .map(|locator| entry.select(locator))
        .find(|elements| !elements.is_empty())
    else {
        let tried = candidates
            .iter()
            .map(Locator::as_str)
            .collect::<Vec<_>>()
            .join("', '");
        info!(
            rule = rule.index(),
            field = %rule.field(),
            entry = %entry,
            locators = %tried,
            "Field not found in entry, ignoring rule"
        );
        return Ok(Vec::new());
    };

    let mut values = Vec::with_capacity(elements.len());
    for id in elements {
        let Some(element) = doc.element(id) else {
            continue;
        };

        if rule.field() == ItemField::Link {
            if let Some(href) = element.attribute("href") {
                values.push(href.to_string());
                continue;
            }
        }

        let Some(attribute) = rule.tested_attribute_name() else {
            values.push(doc.text_content(id));
            continue;
        };
        match lookup_attribute(element, attribute) {
            AttributeLookup::Found(value) => values.push(value.to_string()),
            AttributeLookup::Missing => {
                info!(
                    rule = rule.index(),
                    attribute,
                    entry = %entry,
                    "Attribute not found in entry, ignoring rule"
                );
                return Ok(Vec::new());
            }
            AttributeLookup::Ambiguous(count) => {
                info!(
                    rule = rule.index(),
                    attribute,
                    count,
                    entry = %entry,
                    "Attribute name is ambiguous, include the namespace to narrow it down; ignoring rule"
                );
                return Ok(Vec::new());
            }
        }
    }
    Ok(values)
}
