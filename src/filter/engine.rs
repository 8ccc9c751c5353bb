use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;

use super::entry::Entry;
use super::locator::Locator;
use super::resolver::resolve_values;
use super::xml::{NodeId, XmlDocument, XmlError};
use crate::model::{Decision, EntryFilteringResult, FeedDefinition, FeedFilteringResult, Rule};

/// Prepended to the title of promoted entries.
pub const PROMOTE_MARKER: &str = "\u{25B2} ";
/// Prepended to the title of demoted entries.
pub const DEMOTE_MARKER: &str = "\u{25BC} ";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Error)]
pub enum FilterError {
    /// The upstream body is not well-formed XML.
    #[error("Failed to parse feed: {0}")]
    Parse(#[from] XmlError),
    /// A rule cannot be evaluated as configured.
    #[error("Rule {index} is invalid: {reason}")]
    InvalidRule { index: i32, reason: String },
}

struct EngineLocators {
    /// WebSub hub and self links let readers bypass the filtered feed.
    feed_links: Locator,
    rss_items: Locator,
    atom_entries: Locator,
}

fn engine_locators() -> &'static EngineLocators {
    static LOCATORS: OnceLock<EngineLocators> = OnceLock::new();
    LOCATORS.get_or_init(|| EngineLocators {
        feed_links: "//atom:link[@rel='hub' or @rel='self']"
            .parse()
            .expect("built-in locator must parse"),
        rss_items: "/rss/channel/item"
            .parse()
            .expect("built-in locator must parse"),
        atom_entries: "/atom:feed/atom:entry"
            .parse()
            .expect("built-in locator must parse"),
    })
}

/// Applies `definition`'s rules to every entry of `xml`.
///
/// For each entry the first rule with a matching value decides; entries no
/// rule matches get the feed's default decision. Rejected entries are removed,
/// promoted and demoted ones get a marker in front of their title.
pub fn filter_feed(
    definition: &FeedDefinition,
    xml: &str,
) -> Result<FeedFilteringResult, FilterError> {
    let mut doc = XmlDocument::parse(xml)?;
    let locators = engine_locators();

    for link in locators.feed_links.select(&doc, doc.document()) {
        doc.remove(link);
    }

    let mut entries = locators.rss_items.select(&doc, doc.document());
    entries.extend(locators.atom_entries.select(&doc, doc.document()));
    entries.sort_unstable();
    entries.dedup();

    let mut entry_results = Vec::with_capacity(entries.len());
    for id in entries {
        let entry = Entry::new(&doc, id);
        let deciding = deciding_rule(&definition.rules, &entry)?;
        let decision = deciding
            .as_ref()
            .map_or(definition.default_decision, |(rule, _)| rule.decision());
        let title_node = entry.title_node();

        debug!(
            entry = %entry,
            %decision,
            rule = deciding.as_ref().map(|(rule, _)| rule.index()),
            "Entry decided"
        );
        entry_results.push(EntryFilteringResult {
            entry_title: entry.title(),
            deciding_rule: deciding.as_ref().map(|(rule, _)| (*rule).clone()),
            tested_values: deciding.map(|(_, values)| values),
            decision,
        });

        apply(&mut doc, id, title_node, decision);
    }

    let filtered_xml = format!(
        "{XML_DECLARATION}{}",
        normalize_line_endings(&doc.to_xml_string())
    );
    Ok(FeedFilteringResult {
        feed: definition.clone(),
        original_xml: xml.to_string(),
        filtered_xml,
        entry_results,
    })
}

/// First rule with at least one matching value, and the values it was tested on.
fn deciding_rule<'r>(
    rules: &'r [Rule],
    entry: &Entry<'_>,
) -> Result<Option<(&'r Rule, Vec<String>)>, FilterError> {
    for rule in rules {
        let values = resolve_values(rule, entry)?;
        if values.iter().any(|value| rule.matches(value)) {
            return Ok(Some((rule, values)));
        }
    }
    Ok(None)
}

fn apply(doc: &mut XmlDocument, entry: NodeId, title: Option<NodeId>, decision: Decision) {
    match decision {
        Decision::Accept => {}
        Decision::Reject => doc.remove(entry),
        Decision::Promote => {
            if let Some(title) = title {
                doc.prepend_text(title, PROMOTE_MARKER);
            }
        }
        Decision::Demote => {
            if let Some(title) = title {
                doc.prepend_text(title, DEMOTE_MARKER);
            }
        }
    }
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
