//! A `roxmltree` document exposed through the engine's [`TreeNode`] contract.
//!
//! roxmltree keeps attributes and namespaces as data on their element rather than as nodes, so
//! [`XmlNode`] pairs a tree node with a slot: the node itself, one of its namespace nodes, or
//! one of its attributes. Order keys put namespaces first, attributes next and children after.
use roxmltree::{Document, Node, ParsingOptions};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use treepath_xpath::datasource::XML_NAMESPACE;
use treepath_xpath::{NodeKey, NodeType, QName, TreeNode};

static NEXT_DOCUMENT: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(#[from] roxmltree::Error),
}

/// A parsed document with an identity distinct from every other document in the process.
pub struct XmlDocument<'input> {
    doc: Document<'input>,
    id: u64,
}

impl fmt::Debug for XmlDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDocument").field("id", &self.id).finish()
    }
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, XmlError> {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(text, options)?;
        let id = NEXT_DOCUMENT.fetch_add(1, Ordering::Relaxed);
        log::debug!("Parsed XML document {} ({} nodes)", id, doc.descendants().count());
        Ok(Self { doc, id })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn root(&self) -> XmlNode<'_, 'input> {
        XmlNode::new(self.id, self.doc.root())
    }

    /// The first element named `local` in document order.
    pub fn find_element(&self, local: &str) -> Option<XmlNode<'_, 'input>> {
        self.doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == local)
            .map(|n| XmlNode::new(self.id, n))
    }

    pub fn inner(&self) -> &Document<'input> {
        &self.doc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Node,
    Namespace(usize),
    Attribute(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct XmlNode<'a, 'input> {
    document: u64,
    node: Node<'a, 'input>,
    slot: Slot,
}

impl<'a, 'input> XmlNode<'a, 'input> {
    fn new(document: u64, node: Node<'a, 'input>) -> Self {
        Self {
            document,
            node,
            slot: Slot::Node,
        }
    }

    fn with_slot(self, slot: Slot) -> Self {
        Self { slot, ..self }
    }

    /// The underlying tree node; for an attribute or namespace node, its element.
    pub fn inner(&self) -> Node<'a, 'input> {
        self.node
    }
}

impl PartialEq for XmlNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for XmlNode<'_, '_> {}

impl Hash for XmlNode<'_, '_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_key().hash(state);
    }
}

impl TreeNode for XmlNode<'_, '_> {
    fn node_type(&self) -> NodeType {
        match self.slot {
            Slot::Namespace(_) => NodeType::Namespace,
            Slot::Attribute(_) => NodeType::Attribute,
            Slot::Node if self.node.is_root() => NodeType::Root,
            Slot::Node if self.node.is_element() => NodeType::Element,
            Slot::Node if self.node.is_text() => NodeType::Text,
            Slot::Node if self.node.is_comment() => NodeType::Comment,
            Slot::Node => NodeType::ProcessingInstruction,
        }
    }

    fn name(&self) -> Option<QName<'_>> {
        match self.slot {
            Slot::Namespace(index) => self.node.namespaces().nth(index).map(|ns| QName {
                prefix: None,
                namespace_uri: None,
                local_part: ns.name().unwrap_or(""),
            }),
            Slot::Attribute(index) => self.node.attributes().nth(index).map(|attr| {
                let prefix = match attr.namespace() {
                    Some(XML_NAMESPACE) => Some("xml"),
                    Some(uri) => self.node.lookup_prefix(uri),
                    None => None,
                };
                QName {
                    prefix,
                    namespace_uri: attr.namespace(),
                    local_part: attr.name(),
                }
            }),
            Slot::Node if self.node.is_element() => {
                let tag = self.node.tag_name();
                Some(QName {
                    prefix: tag.namespace().and_then(|uri| self.node.lookup_prefix(uri)),
                    namespace_uri: tag.namespace(),
                    local_part: tag.name(),
                })
            }
            Slot::Node => self.node.pi().map(|pi| QName {
                prefix: None,
                namespace_uri: None,
                local_part: pi.target,
            }),
        }
    }

    fn string_value(&self) -> String {
        match self.slot {
            Slot::Namespace(index) => self
                .node
                .namespaces()
                .nth(index)
                .map(|ns| ns.uri().to_string())
                .unwrap_or_default(),
            Slot::Attribute(index) => self
                .node
                .attributes()
                .nth(index)
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
            Slot::Node if self.node.is_root() || self.node.is_element() => self
                .node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect(),
            Slot::Node if self.node.is_pi() => self
                .node
                .pi()
                .and_then(|pi| pi.value)
                .unwrap_or("")
                .to_string(),
            Slot::Node => self.node.text().unwrap_or("").to_string(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + '_> {
        match self.slot {
            Slot::Node if self.node.is_element() => {
                let this = *self;
                Box::new(
                    (0..self.node.attributes().len())
                        .map(move |index| this.with_slot(Slot::Attribute(index))),
                )
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + '_> {
        match self.slot {
            Slot::Node => {
                let document = self.document;
                Box::new(self.node.children().map(move |n| XmlNode::new(document, n)))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn namespaces(&self) -> Box<dyn Iterator<Item = Self> + '_> {
        match self.slot {
            Slot::Node if self.node.is_element() => {
                let this = *self;
                Box::new(
                    (0..self.node.namespaces().count())
                        .map(move |index| this.with_slot(Slot::Namespace(index))),
                )
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self.slot {
            Slot::Node => self.node.parent().map(|n| XmlNode::new(self.document, n)),
            _ => Some(self.with_slot(Slot::Node)),
        }
    }

    fn order_key(&self) -> NodeKey {
        let offset = match self.slot {
            Slot::Node => 0,
            Slot::Namespace(index) => 1 + index,
            Slot::Attribute(index) => 1 + self.node.namespaces().count() + index,
        };
        NodeKey {
            document: self.document,
            sequence: ((self.node.id().get() as u64) << 32) | offset as u64,
        }
    }

    fn document_root(&self) -> Self {
        XmlNode::new(self.document, self.node.document().root())
    }

    fn element_by_id(&self, id: &str) -> Option<Self> {
        self.node
            .document()
            .descendants()
            .find(|n| n.is_element() && n.attribute("id") == Some(id))
            .map(|n| XmlNode::new(self.document, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r#"<?xml version="1.0"?>
<book xmlns:x="urn:x" id="b1">
  <title x:lang="en">Rust</title>
  <!-- draft -->
  <?render fast?>
  <chapter id="c1">One</chapter>
</book>"#;

    #[test]
    fn test_node_kinds_and_names() {
        let doc = XmlDocument::parse(BOOK).unwrap();
        let root = doc.root();
        assert_eq!(root.node_type(), NodeType::Root);
        let book = root.children().find(|n| n.node_type() == NodeType::Element).unwrap();
        assert_eq!(book.name().unwrap().local_part, "book");
        let title = doc.find_element("title").unwrap();
        let lang = title.attributes().next().unwrap();
        assert_eq!(lang.node_type(), NodeType::Attribute);
        let name = lang.name().unwrap();
        assert_eq!(name.display_name(), "x:lang");
        assert_eq!(name.uri(), "urn:x");
        assert_eq!(lang.string_value(), "en");
        assert_eq!(lang.parent(), Some(title));
        let pi = book
            .children()
            .find(|n| n.node_type() == NodeType::ProcessingInstruction)
            .unwrap();
        assert_eq!(pi.name().unwrap().local_part, "render");
        assert_eq!(pi.string_value(), "fast");
    }

    #[test]
    fn test_document_order() {
        let doc = XmlDocument::parse(BOOK).unwrap();
        let book = doc.find_element("book").unwrap();
        let attribute = book.attributes().next().unwrap();
        let namespace = book.namespaces().next().unwrap();
        let title = doc.find_element("title").unwrap();
        assert!(book.order_key() < namespace.order_key());
        assert!(namespace.order_key() < attribute.order_key());
        assert!(attribute.order_key() < title.order_key());
    }

    #[test]
    fn test_documents_are_distinct() {
        let first = XmlDocument::parse("<a/>").unwrap();
        let second = XmlDocument::parse("<a/>").unwrap();
        assert_ne!(first.id(), second.id());
        assert_ne!(first.root(), second.root());
        assert_eq!(first.root(), first.root());
    }

    #[test]
    fn test_id_lookup_and_string_values() {
        let doc = XmlDocument::parse(BOOK).unwrap();
        let root = doc.root();
        let chapter = root.element_by_id("c1").unwrap();
        assert_eq!(chapter.string_value(), "One");
        assert!(root.element_by_id("missing").is_none());
        assert_eq!(chapter.document_root(), root);
    }

    #[test]
    fn test_parse_error() {
        let err = XmlDocument::parse("<open>").unwrap_err();
        assert!(matches!(err, XmlError::Parse(_)));
    }
}
