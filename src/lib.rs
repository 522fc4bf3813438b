//! Compile XPath-style expressions once and evaluate them lazily over XML documents.
//!
//! The engine lives in [`xpath`] and is generic over any tree implementing
//! [`TreeNode`]; [`xml`] supplies one backed by `roxmltree`. The helpers here cover the
//! common case of a one-off query against a parsed document.
pub use treepath_xml as xml;
pub use treepath_xpath as xpath;

pub use treepath_xml::{XmlDocument, XmlError, XmlNode};
pub use treepath_xpath::{
    Bindery, Context, Controller, Expression, NodeSetValue, ParseOptions, Pattern, StaticEnv,
    TreeNode, Value, XPathError, parse, parse_pattern, parse_template,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreepathError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    XPath(#[from] XPathError),
}

/// Compiles `expression` with a default environment and evaluates it with the document root
/// as the context node.
pub fn evaluate<'a, 'input>(
    document: &'a XmlDocument<'input>,
    expression: &str,
) -> Result<Value<XmlNode<'a, 'input>>, XPathError> {
    let env = StaticEnv::new();
    let compiled = parse(expression, &env)?;
    compiled.evaluate(&Context::new(document.root()))
}

/// The nodes `expression` selects from the document root, in document order.
pub fn select<'a, 'input>(
    document: &'a XmlDocument<'input>,
    expression: &str,
) -> Result<Vec<XmlNode<'a, 'input>>, XPathError> {
    match evaluate(document, expression)? {
        Value::NodeSet(nodes) => nodes.to_vec(),
        other => Err(XPathError::type_error(format!(
            "'{}' returned {:?}, not a node-set",
            expression,
            other.data_type()
        ))),
    }
}

/// Parses `text` and evaluates `expression` against it as a string.
pub fn evaluate_str(text: &str, expression: &str) -> Result<String, TreepathError> {
    let document = XmlDocument::parse(text)?;
    let value = evaluate(&document, expression)?;
    Ok(value.as_string()?)
}
