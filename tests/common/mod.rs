pub mod fixtures;

use std::collections::HashMap;
use treepath::xpath::functions::format_number::DecimalFormat;
use treepath::xpath::{ExpandedName, XPathError};
use treepath::{Controller, TreeNode, XmlDocument, XmlNode};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub type Node = XmlNode<'static, 'static>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parses a fixture and keeps it alive for the rest of the test run, so nodes can be handed
/// to a controller.
pub fn leak_document(text: &str) -> &'static XmlDocument<'static> {
    let text: &'static str = Box::leak(text.to_string().into_boxed_str());
    let document = XmlDocument::parse(text).expect("fixture should be well-formed");
    Box::leak(Box::new(document))
}

/// A key definition: elements named `element`, keyed by their attribute `attribute`.
pub struct KeyDefinition {
    pub element: String,
    pub attribute: String,
}

/// A controller serving keys, extra documents, decimal formats and system properties from
/// in-memory tables.
#[derive(Default)]
pub struct CatalogController {
    pub keys: HashMap<ExpandedName, KeyDefinition>,
    pub documents: HashMap<String, &'static XmlDocument<'static>>,
    pub formats: HashMap<ExpandedName, DecimalFormat>,
    pub properties: HashMap<ExpandedName, String>,
}

impl CatalogController {
    pub fn with_key(mut self, name: &str, element: &str, attribute: &str) -> Self {
        self.keys.insert(
            ExpandedName::local(name),
            KeyDefinition {
                element: element.to_string(),
                attribute: attribute.to_string(),
            },
        );
        self
    }

    pub fn with_document(mut self, href: &str, text: &str) -> Self {
        self.documents.insert(href.to_string(), leak_document(text));
        self
    }

    pub fn with_format(mut self, name: &str, format: DecimalFormat) -> Self {
        self.formats.insert(ExpandedName::local(name), format);
        self
    }

    pub fn with_property(mut self, uri: &str, local: &str, value: &str) -> Self {
        self.properties
            .insert(ExpandedName::new(uri, local), value.to_string());
        self
    }
}

fn descendants(node: Node) -> Vec<Node> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        out.push(n);
        let mut children: Vec<Node> = n.children().collect();
        children.reverse();
        stack.extend(children);
    }
    out
}

impl Controller<Node> for CatalogController {
    fn select_by_key(&self, name: &ExpandedName, value: &str, document: Node) -> treepath::xpath::Result<Vec<Node>> {
        let definition = self
            .keys
            .get(name)
            .ok_or_else(|| XPathError::evaluation(format!("Key {} has not been defined", name)))?;
        Ok(descendants(document)
            .into_iter()
            .filter(|n| n.name().is_some_and(|q| q.local_part == definition.element))
            .filter(|n| n.attribute_value("", &definition.attribute).as_deref() == Some(value))
            .collect())
    }

    fn load_document(&self, href: &str, _base: Option<Node>) -> treepath::xpath::Result<Node> {
        self.documents
            .get(href)
            .map(|doc| doc.root())
            .ok_or_else(|| XPathError::evaluation(format!("Failed to load document {}", href)))
    }

    fn system_property(&self, name: &ExpandedName) -> Option<String> {
        self.properties.get(name).cloned()
    }

    fn decimal_format(&self, name: Option<&ExpandedName>) -> Option<DecimalFormat> {
        match name {
            Some(name) => self.formats.get(name).cloned(),
            None => Some(DecimalFormat::default()),
        }
    }
}
