//! Defines the node contract the engine navigates, plus an in-memory mock tree for tests.
use std::fmt;
use std::hash::Hash;

/// The namespace URI bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A qualified name as reported by a node: optional prefix, optional namespace URI and a local
/// part. For a processing instruction the local part is its target; for a namespace node it is
/// the declared prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub namespace_uri: Option<&'a str>,
    pub local_part: &'a str,
}

impl QName<'_> {
    /// The lexical form, `prefix:local` or just `local`.
    pub fn display_name(&self) -> String {
        match self.prefix {
            Some(p) if !p.is_empty() => format!("{}:{}", p, self.local_part),
            _ => self.local_part.to_string(),
        }
    }

    pub fn uri(&self) -> &str {
        self.namespace_uri.unwrap_or("")
    }
}

/// A namespace-resolved name: URI (empty for no namespace) and local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub uri: String,
    pub local: String,
}

impl ExpandedName {
    pub fn new(uri: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            local: local.into(),
        }
    }

    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new("", local)
    }

    pub fn matches(&self, name: &QName<'_>) -> bool {
        self.local == name.local_part && self.uri == name.uri()
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.uri, self.local)
        }
    }
}

/// The kind of a node, aligned with the XPath 1.0 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

/// The document-order key of a node. Two nodes are the same node exactly when their keys are
/// equal, whatever wrapper objects carry them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub document: u64,
    pub sequence: u64,
}

/// The contract for a node in a read-only tree.
///
/// The engine is written exclusively against this trait. Axis enumerations, name tests and
/// document-order comparisons are all derived from these primitives, so any tree that can
/// report its kind, name, navigation links and a stable order key can be queried.
pub trait TreeNode: fmt::Debug + Clone + Copy + PartialEq + Eq + Hash {
    fn node_type(&self) -> NodeType;

    /// The name of the node; `None` for root, text and comment nodes.
    fn name(&self) -> Option<QName<'_>>;

    /// The XPath string value. For elements and the root this is the concatenation of all
    /// descendant text.
    fn string_value(&self) -> String;

    /// Attribute nodes, in document order. Empty for anything but elements.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + '_>;

    /// Child nodes, in document order.
    fn children(&self) -> Box<dyn Iterator<Item = Self> + '_>;

    /// Namespace nodes in scope on an element.
    fn namespaces(&self) -> Box<dyn Iterator<Item = Self> + '_> {
        Box::new(std::iter::empty())
    }

    /// The parent. Attribute and namespace nodes report their owning element.
    fn parent(&self) -> Option<Self>;

    /// Document id plus a sequence number that increases in document order. Namespace nodes
    /// sort before attribute nodes, which sort before the element's children.
    fn order_key(&self) -> NodeKey;

    fn document_root(&self) -> Self {
        let mut node = *self;
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    fn attribute_value(&self, uri: &str, local: &str) -> Option<String> {
        self.attributes()
            .find(|a| a.name().is_some_and(|n| n.local_part == local && n.uri() == uri))
            .map(|a| a.string_value())
    }

    /// The element whose `id` attribute equals `id`, searching the whole document.
    fn element_by_id(&self, id: &str) -> Option<Self> {
        let mut stack = vec![self.document_root()];
        while let Some(node) = stack.pop() {
            if node.node_type() == NodeType::Element
                && node.attribute_value("", "id").as_deref() == Some(id)
            {
                return Some(node);
            }
            let mut kids: Vec<Self> = node.children().collect();
            kids.reverse();
            stack.extend(kids);
        }
        None
    }

    fn unparsed_entity_uri(&self, _name: &str) -> Option<String> {
        None
    }
}

// Test utilities - publicly available for integration testing in downstream crates
pub mod tests {
    use super::*;
    use std::hash::Hasher;

    #[derive(Debug, Clone)]
    struct MockNodeData {
        node_type: NodeType,
        prefix: Option<String>,
        uri: Option<String>,
        local: String,
        value: String,
        parent: Option<usize>,
        children: Vec<usize>,
        attributes: Vec<usize>,
        namespaces: Vec<usize>,
    }

    impl MockNodeData {
        fn new(node_type: NodeType, parent: Option<usize>) -> Self {
            Self {
                node_type,
                prefix: None,
                uri: None,
                local: String::new(),
                value: String::new(),
                parent,
                children: Vec::new(),
                attributes: Vec::new(),
                namespaces: Vec::new(),
            }
        }
    }

    /// An arena tree. Node ids are assigned in build order, which is document order as long
    /// as namespaces and attributes are added before an element's children.
    #[derive(Debug)]
    pub struct MockTree {
        nodes: Vec<MockNodeData>,
        document: u64,
    }

    impl MockTree {
        pub fn builder() -> MockTreeBuilder {
            MockTreeBuilder::new()
        }

        pub fn root(&self) -> MockNode<'_> {
            self.node(0)
        }

        pub fn node(&self, id: usize) -> MockNode<'_> {
            MockNode { id, tree: self }
        }

        pub fn len(&self) -> usize {
            self.nodes.len()
        }

        pub fn is_empty(&self) -> bool {
            self.nodes.is_empty()
        }

        /// Every node in document order, attributes and namespaces included.
        pub fn all_nodes(&self) -> Vec<MockNode<'_>> {
            (0..self.nodes.len()).map(|id| self.node(id)).collect()
        }
    }

    pub struct MockTreeBuilder {
        nodes: Vec<MockNodeData>,
        open: Vec<usize>,
        document: u64,
    }

    impl Default for MockTreeBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTreeBuilder {
        pub fn new() -> Self {
            Self {
                nodes: vec![MockNodeData::new(NodeType::Root, None)],
                open: vec![0],
                document: 1,
            }
        }

        pub fn document_id(mut self, document: u64) -> Self {
            self.document = document;
            self
        }

        fn current(&self) -> usize {
            *self.open.last().unwrap_or(&0)
        }

        fn push(&mut self, data: MockNodeData) -> usize {
            let id = self.nodes.len();
            self.nodes.push(data);
            id
        }

        fn split(qname: &str) -> (Option<String>, String) {
            match qname.split_once(':') {
                Some((p, l)) => (Some(p.to_string()), l.to_string()),
                None => (None, qname.to_string()),
            }
        }

        pub fn element(self, qname: &str) -> Self {
            self.element_ns("", qname)
        }

        pub fn element_ns(mut self, uri: &str, qname: &str) -> Self {
            let parent = self.current();
            let (prefix, local) = Self::split(qname);
            let mut data = MockNodeData::new(NodeType::Element, Some(parent));
            data.prefix = prefix;
            data.local = local;
            data.uri = (!uri.is_empty()).then(|| uri.to_string());
            let id = self.push(data);
            self.nodes[parent].children.push(id);
            self.open.push(id);
            self
        }

        /// Adds an attribute to the open element. The `xml:` prefix maps to the XML namespace.
        pub fn attribute(self, qname: &str, value: &str) -> Self {
            let uri = if qname.starts_with("xml:") {
                XML_NAMESPACE
            } else {
                ""
            };
            self.attribute_ns(uri, qname, value)
        }

        pub fn attribute_ns(mut self, uri: &str, qname: &str, value: &str) -> Self {
            let owner = self.current();
            let (prefix, local) = Self::split(qname);
            let mut data = MockNodeData::new(NodeType::Attribute, Some(owner));
            data.prefix = prefix;
            data.local = local;
            data.uri = (!uri.is_empty()).then(|| uri.to_string());
            data.value = value.to_string();
            let id = self.push(data);
            self.nodes[owner].attributes.push(id);
            self
        }

        pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
            let owner = self.current();
            let mut data = MockNodeData::new(NodeType::Namespace, Some(owner));
            data.local = prefix.to_string();
            data.value = uri.to_string();
            let id = self.push(data);
            self.nodes[owner].namespaces.push(id);
            self
        }

        fn leaf(mut self, node_type: NodeType, local: &str, value: &str) -> Self {
            let parent = self.current();
            let mut data = MockNodeData::new(node_type, Some(parent));
            data.local = local.to_string();
            data.value = value.to_string();
            let id = self.push(data);
            self.nodes[parent].children.push(id);
            self
        }

        pub fn text(self, value: &str) -> Self {
            self.leaf(NodeType::Text, "", value)
        }

        pub fn comment(self, value: &str) -> Self {
            self.leaf(NodeType::Comment, "", value)
        }

        pub fn pi(self, target: &str, value: &str) -> Self {
            self.leaf(NodeType::ProcessingInstruction, target, value)
        }

        /// Closes the most recently opened element.
        pub fn end(mut self) -> Self {
            if self.open.len() > 1 {
                self.open.pop();
            }
            self
        }

        pub fn build(self) -> MockTree {
            MockTree {
                nodes: self.nodes,
                document: self.document,
            }
        }
    }

    /// A node handle: an arena index plus the tree it belongs to.
    #[derive(Debug, Clone, Copy)]
    pub struct MockNode<'a> {
        pub id: usize,
        pub tree: &'a MockTree,
    }

    impl MockNode<'_> {
        fn data(&self) -> &MockNodeData {
            &self.tree.nodes[self.id]
        }

        fn collect_text(&self, out: &mut String) {
            for &child in &self.data().children {
                let node = self.tree.node(child);
                match node.node_type() {
                    NodeType::Text => out.push_str(&node.data().value),
                    NodeType::Element => node.collect_text(out),
                    _ => {}
                }
            }
        }
    }

    impl PartialEq for MockNode<'_> {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id && std::ptr::eq(self.tree, other.tree)
        }
    }
    impl Eq for MockNode<'_> {}

    impl Hash for MockNode<'_> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.tree.document.hash(state);
            self.id.hash(state);
        }
    }

    impl TreeNode for MockNode<'_> {
        fn node_type(&self) -> NodeType {
            self.data().node_type
        }

        fn name(&self) -> Option<QName<'_>> {
            let data = self.data();
            match data.node_type {
                NodeType::Root | NodeType::Text | NodeType::Comment => None,
                _ => Some(QName {
                    prefix: data.prefix.as_deref(),
                    namespace_uri: data.uri.as_deref(),
                    local_part: &data.local,
                }),
            }
        }

        fn string_value(&self) -> String {
            match self.node_type() {
                NodeType::Root | NodeType::Element => {
                    let mut out = String::new();
                    self.collect_text(&mut out);
                    out
                }
                _ => self.data().value.clone(),
            }
        }

        fn attributes(&self) -> Box<dyn Iterator<Item = Self> + '_> {
            let tree = self.tree;
            Box::new(self.data().attributes.iter().map(move |&id| tree.node(id)))
        }

        fn children(&self) -> Box<dyn Iterator<Item = Self> + '_> {
            let tree = self.tree;
            Box::new(self.data().children.iter().map(move |&id| tree.node(id)))
        }

        fn namespaces(&self) -> Box<dyn Iterator<Item = Self> + '_> {
            let tree = self.tree;
            Box::new(self.data().namespaces.iter().map(move |&id| tree.node(id)))
        }

        fn parent(&self) -> Option<Self> {
            self.data().parent.map(|id| self.tree.node(id))
        }

        fn order_key(&self) -> NodeKey {
            NodeKey {
                document: self.tree.document,
                sequence: self.id as u64,
            }
        }
    }

    /// Creates a simple mock tree for testing:
    /// ```text
    /// <root>                                    <!-- id 0 -->
    ///   <para id="p1" xml:lang="en">Hello</para> <!-- id 1, attrs 2 and 3, text 4 -->
    ///   <!-- comment node -->                   <!-- id 5 -->
    ///   <div/>                                  <!-- id 6 -->
    ///   <?pi-target pi-value?>                  <!-- id 7 -->
    ///   <para>World</para>                      <!-- id 8, text 9 -->
    /// </root>
    /// ```
    pub fn create_test_tree() -> MockTree {
        MockTree::builder()
            .element("para")
            .attribute("id", "p1")
            .attribute("xml:lang", "en")
            .text("Hello")
            .end()
            .comment(" comment node ")
            .element("div")
            .end()
            .pi("pi-target", "pi-value")
            .element("para")
            .text("World")
            .end()
            .build()
    }
}

#[cfg(test)]
mod node_tests {
    use super::tests::*;
    use super::*;

    #[test]
    fn test_mock_tree_shape() {
        let tree = create_test_tree();
        let root = tree.root();
        let kids: Vec<_> = root.children().map(|n| n.id).collect();
        assert_eq!(kids, vec![1, 5, 6, 7, 8]);
        assert_eq!(root.string_value(), "HelloWorld");
        let para = tree.node(1);
        assert_eq!(para.name().map(|n| n.local_part), Some("para"));
        assert_eq!(para.attribute_value(XML_NAMESPACE, "lang").as_deref(), Some("en"));
        assert_eq!(tree.node(7).name().map(|n| n.local_part), Some("pi-target"));
    }

    #[test]
    fn test_navigation_helpers() {
        let tree = create_test_tree();
        assert_eq!(tree.node(9).document_root(), tree.root());
        assert_eq!(tree.node(4).element_by_id("p1"), Some(tree.node(1)));
        assert_eq!(tree.root().element_by_id("missing"), None);
        assert!(tree.node(2).order_key() < tree.node(4).order_key());
    }
}
