//! Match patterns: the restricted path language that decides whether a node is selected by a
//! template rule.
//!
//! A pattern is tested against one node at a time, walking upwards through its ancestors
//! instead of selecting downwards from a context. `simplify` turns common shapes into cheaper
//! variants; `x[1]` on elements is checked against preceding siblings, and any predicate that
//! reads the position is answered by evaluating the equivalent path from the parent.
use crate::ast::{Axis, DataType, Expression, NameTest, NodeKind, NodeTest, Step};
use crate::context::{Context, LastPosition};
use crate::datasource::{ExpandedName, NodeType, TreeNode};
use crate::error::Result;
use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern<N> {
    /// `/`
    Document,
    /// A bare node-kind test such as `text()` or `*`.
    NodeKind(NodeKind),
    /// `node()`: any node that can be a child.
    AnyChildNode,
    /// A name test with no context, such as `para` or `@id`.
    NamedNode(NodeTest),
    /// `id('value')`
    Id(String),
    /// `key('name', 'value')`
    Key {
        name: ExpandedName,
        display_name: String,
        value: String,
    },
    Location(Box<LocationPathPattern<N>>),
    Union(Box<Pattern<N>>, Box<Pattern<N>>),
}

/// One step of a pattern with the constraints on its parent and ancestors.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPathPattern<N> {
    pub test: NodeTest,
    pub parent: Option<Pattern<N>>,
    pub ancestor: Option<Pattern<N>>,
    pub predicates: Vec<Expression<N>>,
    first_element: bool,
    extent: Option<Expression<N>>,
}

impl<N> LocationPathPattern<N> {
    pub fn new(test: NodeTest) -> Self {
        Self {
            test,
            parent: None,
            ancestor: None,
            predicates: Vec::new(),
            first_element: false,
            extent: None,
        }
    }

    pub fn with_parent(mut self, parent: Pattern<N>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_ancestor(mut self, ancestor: Pattern<N>) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    pub fn with_predicate(mut self, predicate: Expression<N>) -> Self {
        self.predicates.push(predicate);
        self
    }
}

impl<N: TreeNode> Pattern<N> {
    pub fn matches(&self, node: N, context: &Context<'_, N>) -> Result<bool> {
        match self {
            Pattern::Document => Ok(node.node_type() == NodeType::Root),
            Pattern::NodeKind(kind) => Ok(kind.matches(node.node_type())),
            Pattern::AnyChildNode => Ok(is_child_kind(node.node_type())),
            Pattern::NamedNode(test) => Ok(test.matches(&node)),
            Pattern::Id(id) => Ok(node.node_type() == NodeType::Element
                && node.element_by_id(id) == Some(node)),
            Pattern::Key { name, value, .. } => {
                let selected = context.require_controller()?.select_by_key(
                    name,
                    value,
                    node.document_root(),
                )?;
                Ok(selected.contains(&node))
            }
            Pattern::Location(location) => location.matches(node, context),
            Pattern::Union(lhs, rhs) => {
                Ok(lhs.matches(node, context)? || rhs.matches(node, context)?)
            }
        }
    }

    /// The priority a template rule gets when it declares none.
    pub fn default_priority(&self) -> f64 {
        match self {
            Pattern::NodeKind(_) | Pattern::AnyChildNode => -0.5,
            Pattern::NamedNode(test) => test.name.default_priority(),
            _ => 0.5,
        }
    }

    /// The node kind every match has, or `Node` when matches can be of several kinds.
    pub fn node_kind(&self) -> NodeKind {
        match self {
            Pattern::Document => NodeKind::Document,
            Pattern::NodeKind(kind) => *kind,
            Pattern::AnyChildNode => NodeKind::Node,
            Pattern::NamedNode(test) => test.kind,
            Pattern::Id(_) | Pattern::Key { .. } => NodeKind::Element,
            Pattern::Location(location) => location.test.kind,
            Pattern::Union(lhs, rhs) if lhs.node_kind() == rhs.node_kind() => lhs.node_kind(),
            Pattern::Union(..) => NodeKind::Node,
        }
    }

    pub fn simplify(self) -> Result<Pattern<N>> {
        match self {
            Pattern::Location(location) => location.simplify(),
            Pattern::Union(lhs, rhs) => Ok(Pattern::Union(
                Box::new(lhs.simplify()?),
                Box::new(rhs.simplify()?),
            )),
            other => Ok(other),
        }
    }
}

fn is_child_kind(node_type: NodeType) -> bool {
    matches!(
        node_type,
        NodeType::Element | NodeType::Text | NodeType::Comment | NodeType::ProcessingInstruction
    )
}

impl<N: TreeNode> LocationPathPattern<N> {
    fn simplify(self) -> Result<Pattern<N>> {
        let parent = self.parent.map(Pattern::simplify).transpose()?;
        let ancestor = self.ancestor.map(Pattern::simplify).transpose()?;
        let mut predicates = Vec::with_capacity(self.predicates.len());
        for predicate in self.predicates {
            match predicate.simplify()? {
                Expression::Literal(Value::Number(n)) => predicates.push(Expression::number(n)),
                Expression::Literal(value) => {
                    if !value.as_boolean()? {
                        return Ok(Pattern::NodeKind(NodeKind::Never));
                    }
                }
                other => predicates.push(other),
            }
        }
        let test = self.test;
        if test.kind == NodeKind::Never {
            return Ok(Pattern::NodeKind(NodeKind::Never));
        }
        if parent.is_none() && ancestor.is_none() && predicates.is_empty() {
            return Ok(match (&test.name, test.kind) {
                (NameTest::Any, NodeKind::Node) => Pattern::AnyChildNode,
                (NameTest::Any, kind) => Pattern::NodeKind(kind),
                _ => Pattern::NamedNode(test),
            });
        }
        let first_element = test.kind == NodeKind::Element
            && matches!(predicates.as_slice(), [Expression::Literal(Value::Number(n))] if *n == 1.0);
        let positional = predicates
            .iter()
            .any(|p| p.is_numeric() || p.data_type() == DataType::Any || p.is_relative());
        let extent = if positional && !first_element {
            let axis = match test.kind {
                NodeKind::Attribute => Axis::Attribute,
                _ => Axis::Child,
            };
            let step = Step {
                axis,
                test: test.clone(),
                predicates: predicates.clone(),
            };
            Some(Expression::path(Expression::ParentNode, step))
        } else {
            None
        };
        Ok(Pattern::Location(Box::new(LocationPathPattern {
            test,
            parent,
            ancestor,
            predicates,
            first_element,
            extent,
        })))
    }

    fn matches(&self, node: N, context: &Context<'_, N>) -> Result<bool> {
        if !self.test.matches(&node) {
            return Ok(false);
        }
        if self.test.kind == NodeKind::Node && !is_child_kind(node.node_type()) {
            return Ok(false);
        }
        if let Some(pattern) = &self.parent {
            match node.parent() {
                Some(parent) if pattern.matches(parent, context)? => {}
                _ => return Ok(false),
            }
        }
        if let Some(pattern) = &self.ancestor {
            let mut cursor = node.parent();
            loop {
                match cursor {
                    Some(ancestor) if pattern.matches(ancestor, context)? => break,
                    Some(ancestor) => cursor = ancestor.parent(),
                    None => return Ok(false),
                }
            }
        }
        if self.first_element {
            return Ok(!self.has_preceding_match(node));
        }
        let local = context.for_item(node, 1, LastPosition::Known(1));
        if let Some(extent) = &self.extent {
            return match extent.evaluate(&local)? {
                Value::NodeSet(selected) => selected.contains(&node),
                _ => Ok(false),
            };
        }
        for predicate in &self.predicates {
            if !predicate.evaluate_as_boolean(&local)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn has_preceding_match(&self, node: N) -> bool {
        let Some(parent) = node.parent() else {
            return false;
        };
        parent
            .children()
            .take_while(|sibling| *sibling != node)
            .any(|sibling| self.test.matches(&sibling))
    }
}

fn write_test(f: &mut fmt::Formatter<'_>, test: &NodeTest) -> fmt::Result {
    match test.kind {
        NodeKind::Attribute => write!(f, "@{}", test),
        _ => write!(f, "{}", test),
    }
}

impl<N: TreeNode> fmt::Display for Pattern<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Document => write!(f, "/"),
            Pattern::NodeKind(kind) => write_test(f, &NodeTest::kind(*kind)),
            Pattern::AnyChildNode => write!(f, "node()"),
            Pattern::NamedNode(test) => write_test(f, test),
            Pattern::Id(id) => write!(f, "id('{}')", id),
            Pattern::Key {
                display_name,
                value,
                ..
            } => write!(f, "key('{}', '{}')", display_name, value),
            Pattern::Location(location) => write!(f, "{}", location),
            Pattern::Union(lhs, rhs) => write!(f, "{} | {}", lhs, rhs),
        }
    }
}

impl<N: TreeNode> fmt::Display for LocationPathPattern<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.parent, &self.ancestor) {
            (Some(Pattern::Document), _) => write!(f, "/")?,
            (Some(parent), _) => write!(f, "{}/", parent)?,
            (None, Some(Pattern::Document)) => write!(f, "//")?,
            (None, Some(ancestor)) => write!(f, "{}//", ancestor)?,
            (None, None) => {}
        }
        write_test(f, &self.test)?;
        for predicate in &self.predicates {
            write!(f, "[{}]", predicate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, MockTree, create_test_tree};

    fn para() -> NodeTest {
        NodeTest::new(NodeKind::Element, NameTest::Name(ExpandedName::local("para")))
    }

    fn node(tree: &MockTree, id: usize) -> MockNode<'_> {
        tree.node(id)
    }

    #[test]
    fn test_simplify_to_named_node() {
        let pattern: Pattern<MockNode<'_>> =
            Pattern::Location(Box::new(LocationPathPattern::new(para())));
        let simplified = pattern.simplify().unwrap();
        assert_eq!(simplified, Pattern::NamedNode(para()));
        assert_eq!(simplified.default_priority(), 0.0);
    }

    #[test]
    fn test_simplify_node_kinds() {
        let any: Pattern<MockNode<'_>> =
            Pattern::Location(Box::new(LocationPathPattern::new(NodeTest::any_node())));
        assert_eq!(any.simplify().unwrap(), Pattern::AnyChildNode);
        let text: Pattern<MockNode<'_>> =
            Pattern::Location(Box::new(LocationPathPattern::new(NodeTest::kind(NodeKind::Text))));
        let text = text.simplify().unwrap();
        assert_eq!(text, Pattern::NodeKind(NodeKind::Text));
        assert_eq!(text.default_priority(), -0.5);
    }

    #[test]
    fn test_parent_constraint() {
        let tree = create_test_tree();
        let pattern: Pattern<MockNode<'_>> = Pattern::Location(Box::new(
            LocationPathPattern::new(NodeTest::kind(NodeKind::Text))
                .with_parent(Pattern::NamedNode(para())),
        ))
        .simplify()
        .unwrap();
        let context = Context::new(node(&tree, 0));
        assert!(pattern.matches(node(&tree, 4), &context).unwrap());
        assert!(!pattern.matches(node(&tree, 1), &context).unwrap());
        assert_eq!(pattern.default_priority(), 0.5);
        assert_eq!(pattern.to_string(), "para/text()");
    }

    #[test]
    fn test_first_element_uses_siblings() {
        let tree = create_test_tree();
        let pattern: Pattern<MockNode<'_>> = Pattern::Location(Box::new(
            LocationPathPattern::new(para()).with_predicate(Expression::number(1.0)),
        ))
        .simplify()
        .unwrap();
        let Pattern::Location(location) = &pattern else {
            panic!("expected a location pattern");
        };
        assert!(location.first_element);
        let context = Context::new(node(&tree, 0));
        assert!(pattern.matches(node(&tree, 1), &context).unwrap());
        assert!(!pattern.matches(node(&tree, 8), &context).unwrap());
    }

    #[test]
    fn test_positional_predicate_uses_extent() {
        let tree = create_test_tree();
        let pattern: Pattern<MockNode<'_>> = Pattern::Location(Box::new(
            LocationPathPattern::new(para()).with_predicate(Expression::number(2.0)),
        ))
        .simplify()
        .unwrap();
        let context = Context::new(node(&tree, 0));
        assert!(!pattern.matches(node(&tree, 1), &context).unwrap());
        assert!(pattern.matches(node(&tree, 8), &context).unwrap());
        assert_eq!(pattern.to_string(), "para[2]");
    }

    #[test]
    fn test_false_predicate_never_matches() {
        let tree = create_test_tree();
        let pattern: Pattern<MockNode<'_>> = Pattern::Location(Box::new(
            LocationPathPattern::new(para()).with_predicate(Expression::boolean(false)),
        ))
        .simplify()
        .unwrap();
        assert!(!pattern.matches(node(&tree, 1), &Context::new(node(&tree, 0))).unwrap());
    }

    #[test]
    fn test_id_pattern() {
        let tree = create_test_tree();
        let context = Context::new(node(&tree, 0));
        let pattern: Pattern<MockNode<'_>> = Pattern::Id("p1".to_string());
        assert!(pattern.matches(node(&tree, 1), &context).unwrap());
        assert!(!pattern.matches(node(&tree, 8), &context).unwrap());
    }

    #[test]
    fn test_union_kind() {
        let pattern: Pattern<MockNode<'_>> = Pattern::Union(
            Box::new(Pattern::NamedNode(para())),
            Box::new(Pattern::NodeKind(NodeKind::Element)),
        );
        assert_eq!(pattern.node_kind(), NodeKind::Element);
        assert_eq!(pattern.to_string(), "para | *");
    }
}
