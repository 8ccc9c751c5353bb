use std::fmt;

use super::locator::Locator;
use super::xml::{NodeId, XmlDocument};

/// Read-only view of one `<item>` / `<entry>` element during a filtering pass.
#[derive(Clone, Copy)]
pub struct Entry<'a> {
    doc: &'a XmlDocument,
    node: NodeId,
}

impl<'a> Entry<'a> {
    pub fn new(doc: &'a XmlDocument, node: NodeId) -> Self {
        Self { doc, node }
    }

    pub fn document(&self) -> &'a XmlDocument {
        self.doc
    }

    /// First child element named `title`, in any namespace.
    pub fn title_node(&self) -> Option<NodeId> {
        self.doc.child_elements(self.node).find(|&child| {
            self.doc
                .element(child)
                .is_some_and(|el| el.local_name() == "title")
        })
    }

    pub fn title(&self) -> Option<String> {
        self.title_node().map(|id| self.doc.text_content(id))
    }

    /// Runs `locator` with this entry as the context element.
    pub fn select(&self, locator: &Locator) -> Vec<NodeId> {
        locator.select(self.doc, self.node)
    }
}

impl fmt::Display for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.title() {
            Some(title) => f.write_str(&title),
            None => f.write_str(&self.doc.node_to_string(self.node)),
        }
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("node", &self.node)
            .field("title", &self.title())
            .finish()
    }
}
