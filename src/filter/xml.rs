//! Mutable, namespace-aware XML tree used by the filtering engine.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Removing a node only
//! detaches it from its parent, so ids collected before a mutation stay valid
//! while the tree is being rewritten.
//!
//! The serializer writes start tags from their original attribute bytes and
//! text from its original (still escaped) form, so nodes the engine does not
//! touch come out byte-for-byte as they went in.
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Namespace bound to the `xml` prefix by definition.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
/// Namespace of `xmlns` / `xmlns:*` declarations.
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

/// Index of a node in an [`XmlDocument`].
pub type NodeId = usize;

#[derive(Debug, Error)]
pub enum XmlError {
    /// The reader rejected the input (bad syntax, mismatched end tag, bad escape).
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },
    #[error("Undeclared namespace prefix '{0}'")]
    UnboundPrefix(String),
    #[error("Unclosed element <{0}>")]
    Unclosed(String),
    #[error("Document has no root element")]
    NoRoot,
    #[error("Document has more than one root element")]
    MultipleRoots,
    #[error("Text content outside the root element")]
    TextOutsideRoot,
}

/// A possibly prefixed XML name as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => Self {
                prefix: None,
                local: raw.to_string(),
            },
        }
    }

    /// The name as written, `prefix:local` or `local`.
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QName,
    pub namespace: Option<String>,
    /// Unescaped value.
    pub value: String,
}

impl Attribute {
    /// `{namespace}local` for namespaced attributes, `local` otherwise.
    pub fn expanded_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{ns}}}{}", self.name.local),
            None => self.name.local.clone(),
        }
    }

    pub fn is_namespace_declaration(&self) -> bool {
        self.namespace.as_deref() == Some(XMLNS_NS)
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: QName,
    pub namespace: Option<String>,
    attributes: Vec<Attribute>,
    /// Everything between the tag name and the closing `>` / `/>`.
    raw_attributes: String,
    self_closing: bool,
}

impl Element {
    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    /// Attributes in source order, namespace declarations excluded.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .iter()
            .filter(|attr| !attr.is_namespace_declaration())
    }

    /// Value of the un-namespaced attribute `local`.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes()
            .find(|attr| attr.namespace.is_none() && attr.name.local == local)
            .map(|attr| attr.value.as_str())
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(Element),
    Text { raw: String, value: String },
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<Node>,
}

impl XmlDocument {
    const DOCUMENT: NodeId = 0;

    /// Parses `xml` into a tree.
    ///
    /// The XML declaration and whitespace outside the root element are not kept.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        // SEC-002: quick-xml only resolves the five predefined entities, so
        // DOCTYPE-declared entities (XXE) surface as escape errors here.
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut doc = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
        };
        let mut open: Vec<NodeId> = vec![Self::DOCUMENT];
        let mut scopes = NamespaceScopes::default();

        loop {
            let position = reader.buffer_position();
            let malformed = |message: String| XmlError::Malformed { position, message };
            let parent = *open.last().unwrap_or(&Self::DOCUMENT);

            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = read_element(&e, &reader, &mut scopes, false)?;
                    doc.check_root_slot(parent)?;
                    let id = doc.push(parent, NodeKind::Element(element));
                    open.push(id);
                }
                Ok(Event::Empty(e)) => {
                    let element = read_element(&e, &reader, &mut scopes, true)?;
                    scopes.pop();
                    doc.check_root_slot(parent)?;
                    doc.push(parent, NodeKind::Element(element));
                }
                Ok(Event::End(_)) => {
                    // quick-xml has already checked that the end tag matches.
                    open.pop();
                    scopes.pop();
                }
                Ok(Event::Text(e)) => {
                    let raw = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| malformed(err.to_string()))?
                        .into_owned();
                    if parent == Self::DOCUMENT {
                        if raw.trim().is_empty() {
                            continue;
                        }
                        return Err(XmlError::TextOutsideRoot);
                    }
                    let value = e
                        .unescape()
                        .map_err(|err| malformed(err.to_string()))?
                        .into_owned();
                    doc.push(parent, NodeKind::Text { raw, value });
                }
                Ok(Event::CData(e)) => {
                    if parent == Self::DOCUMENT {
                        return Err(XmlError::TextOutsideRoot);
                    }
                    let content = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| malformed(err.to_string()))?
                        .into_owned();
                    doc.push(parent, NodeKind::CData(content));
                }
                Ok(Event::Comment(e)) => {
                    let content = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| malformed(err.to_string()))?
                        .into_owned();
                    doc.push(parent, NodeKind::Comment(content));
                }
                Ok(Event::PI(e)) => {
                    let content = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| malformed(err.to_string()))?
                        .into_owned();
                    doc.push(parent, NodeKind::ProcessingInstruction(content));
                }
                Ok(Event::DocType(e)) => {
                    let content = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| malformed(err.to_string()))?
                        .trim()
                        .to_string();
                    doc.push(parent, NodeKind::DocType(content));
                }
                Ok(Event::Decl(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(malformed(e.to_string())),
            }
        }

        if let Some(&unclosed) = open.get(1) {
            let name = doc
                .element(unclosed)
                .map(|el| el.name.lexical())
                .unwrap_or_default();
            return Err(XmlError::Unclosed(name));
        }
        if doc.document_element().is_none() {
            return Err(XmlError::NoRoot);
        }
        Ok(doc)
    }

    fn check_root_slot(&self, parent: NodeId) -> Result<(), XmlError> {
        if parent == Self::DOCUMENT && self.document_element().is_some() {
            return Err(XmlError::MultipleRoots);
        }
        Ok(())
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// The document node; the root of every absolute locator.
    pub fn document(&self) -> NodeId {
        Self::DOCUMENT
    }

    /// The single top-level element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.child_elements(Self::DOCUMENT).next()
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.parent
    }

    /// Child elements of `id` in document order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|&child| self.element(child).is_some())
    }

    /// All elements below `id` (not including `id`) in document order.
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.child_elements(id).collect();
        stack.reverse();
        while let Some(current) = stack.pop() {
            found.push(current);
            let before = stack.len();
            stack.extend(self.child_elements(current));
            stack[before..].reverse();
        }
        found
    }

    /// Concatenated text and CDATA content of `id` and its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text { value, .. } => out.push_str(value),
            NodeKind::CData(content) => out.push_str(content),
            NodeKind::Document | NodeKind::Element(_) => {
                for &child in &node.children {
                    self.collect_text(child, out);
                }
            }
            NodeKind::Comment(_) | NodeKind::ProcessingInstruction(_) | NodeKind::DocType(_) => {}
        }
    }

    /// Detaches `id` (and its subtree) from the tree. Removing twice is a no-op.
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|node| node.parent.take()) else {
            return;
        };
        self.nodes[parent].children.retain(|&child| child != id);
    }

    /// Inserts `text` as the first child of element `id`.
    pub fn prepend_text(&mut self, id: NodeId, text: &str) {
        let Some(Node {
            kind: NodeKind::Element(element),
            ..
        }) = self.nodes.get_mut(id)
        else {
            return;
        };
        element.self_closing = false;

        let text_id = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(id),
            children: Vec::new(),
            kind: NodeKind::Text {
                raw: partial_escape(text).into_owned(),
                value: text.to_string(),
            },
        });
        self.nodes[id].children.insert(0, text_id);
    }

    /// Serializes the whole document (without an XML declaration).
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        let top_level = &self.nodes[Self::DOCUMENT].children;
        for (i, &child) in top_level.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serializes a single node and its subtree.
    pub fn node_to_string(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Document => {
                for &child in &node.children {
                    self.write_node(child, out);
                }
            }
            NodeKind::Element(element) => {
                let name = element.name.lexical();
                out.push('<');
                out.push_str(&name);
                out.push_str(&element.raw_attributes);
                if element.self_closing && node.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &child in &node.children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
            }
            NodeKind::Text { raw, .. } => out.push_str(raw),
            NodeKind::CData(content) => {
                out.push_str("<![CDATA[");
                out.push_str(content);
                out.push_str("]]>");
            }
            NodeKind::Comment(content) => {
                out.push_str("<!--");
                out.push_str(content);
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction(content) => {
                out.push_str("<?");
                out.push_str(content);
                out.push_str("?>");
            }
            NodeKind::DocType(content) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(content);
                out.push('>');
            }
        }
    }
}

/// Stack of namespace bindings, one frame per open element.
#[derive(Default)]
struct NamespaceScopes {
    frames: Vec<Vec<(Option<String>, Option<String>)>>,
}

impl NamespaceScopes {
    fn push(&mut self, bindings: Vec<(Option<String>, Option<String>)>) {
        self.frames.push(bindings);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    /// Resolves `prefix` (`None` = default namespace) against the open scopes.
    fn resolve(&self, prefix: Option<&str>) -> Result<Option<String>, XmlError> {
        match prefix {
            Some("xml") => return Ok(Some(XML_NS.to_string())),
            Some("xmlns") => return Ok(Some(XMLNS_NS.to_string())),
            _ => {}
        }
        for frame in self.frames.iter().rev() {
            if let Some((_, uri)) = frame.iter().find(|(p, _)| p.as_deref() == prefix) {
                return Ok(uri.clone());
            }
        }
        match prefix {
            None => Ok(None),
            Some(prefix) => Err(XmlError::UnboundPrefix(prefix.to_string())),
        }
    }
}

fn read_element(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    scopes: &mut NamespaceScopes,
    self_closing: bool,
) -> Result<Element, XmlError> {
    let position = reader.buffer_position();
    let malformed = |message: String| XmlError::Malformed { position, message };
    let decoder = reader.decoder();

    let name = QName::parse(
        &decoder
            .decode(e.name().as_ref())
            .map_err(|err| malformed(err.to_string()))?,
    );
    let raw_attributes = decoder
        .decode(e.attributes_raw())
        .map_err(|err| malformed(err.to_string()))?
        .into_owned();

    let mut parsed = Vec::new();
    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|err| malformed(err.to_string()))?;
        let key = decoder
            .decode(attr.key.as_ref())
            .map_err(|err| malformed(err.to_string()))?;
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|err| malformed(err.to_string()))?;
        parsed.push((QName::parse(&key), value.into_owned()));
    }

    // Declarations on this element are in scope for its own name and attributes.
    let bindings = parsed
        .iter()
        .filter_map(|(name, value)| match (&name.prefix, name.local.as_str()) {
            (None, "xmlns") => Some((None, non_empty(value))),
            (Some(p), local) if p == "xmlns" => Some((Some(local.to_string()), non_empty(value))),
            _ => None,
        })
        .collect();
    scopes.push(bindings);

    let namespace = scopes.resolve(name.prefix.as_deref())?;
    let mut attributes = Vec::with_capacity(parsed.len());
    for (attr_name, value) in parsed {
        let namespace = match (&attr_name.prefix, attr_name.local.as_str()) {
            (None, "xmlns") => Some(XMLNS_NS.to_string()),
            // Unprefixed attributes are never in the default namespace.
            (None, _) => None,
            (Some(prefix), _) => scopes.resolve(Some(prefix))?,
        };
        attributes.push(Attribute {
            name: attr_name,
            namespace,
            value,
        });
    }

    Ok(Element {
        name,
        namespace,
        attributes,
        raw_attributes,
        self_closing,
    })
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
