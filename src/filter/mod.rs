//! The filtering engine: parse a feed, decide every entry, rewrite the XML.
//!
//! - [`xml`]: namespace-aware mutable tree with byte-preserving serialization
//! - [`locator`]: path language used by built-in fields and custom rules
//! - [`resolver`]: field values per rule and entry
//! - [`engine`]: [`filter_feed`], the single pass over a document

pub mod engine;
pub mod entry;
pub mod locator;
pub mod resolver;
pub mod xml;

#[cfg(test)]
mod samples;

pub use engine::{filter_feed, FilterError, DEMOTE_MARKER, PROMOTE_MARKER};
pub use entry::Entry;
pub use locator::{Locator, LocatorError};
pub use xml::{XmlDocument, XmlError};
