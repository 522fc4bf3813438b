//! The compiled expression tree.
//!
//! Trees are built by the parser, simplified once, and then shared read-only between
//! evaluations. The node type `N` appears only where a reduced expression captures a node
//! from its context (bound attribute parents, literal node-sets, bound function arguments).
use crate::datasource::{ExpandedName, NodeType, QName, TreeNode};
use crate::error::XPathError;
use crate::extensions::ExtensionCall;
use crate::functions::FunctionCall;
use crate::sort::SortedSelection;
use crate::value::{NodeSetValue, Value, number_to_string};
use std::fmt;

/// The static type of an expression's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Number,
    String,
    NodeSet,
    Object,
    Any,
}

/// A navigation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

/// A binary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Equals => "=",
            BinaryOperator::NotEquals => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "div",
            BinaryOperator::Modulo => "mod",
        }
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, BinaryOperator::Or | BinaryOperator::And)
    }

    /// `=`, `!=`, `<`, `<=`, `>`, `>=`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equals
                | BinaryOperator::NotEquals
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }

    /// The operator with its operands swapped: `a < b` is `b > a`.
    pub fn inverse(self) -> Self {
        match self {
            BinaryOperator::LessThan => BinaryOperator::GreaterThan,
            BinaryOperator::LessThanOrEqual => BinaryOperator::GreaterThanOrEqual,
            BinaryOperator::GreaterThan => BinaryOperator::LessThan,
            BinaryOperator::GreaterThanOrEqual => BinaryOperator::LessThanOrEqual,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            SetOperator::Union => "|",
            SetOperator::Intersect => "intersect",
            SetOperator::Except => "except",
        }
    }
}

/// The node kind a step or pattern requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Node,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Document,
    Namespace,
    /// Matches nothing; produced when a test can never succeed on its axis.
    Never,
}

impl NodeKind {
    pub fn matches(self, node_type: NodeType) -> bool {
        match self {
            NodeKind::Node => true,
            NodeKind::Element => node_type == NodeType::Element,
            NodeKind::Attribute => node_type == NodeType::Attribute,
            NodeKind::Text => node_type == NodeType::Text,
            NodeKind::Comment => node_type == NodeType::Comment,
            NodeKind::ProcessingInstruction => node_type == NodeType::ProcessingInstruction,
            NodeKind::Document => node_type == NodeType::Root,
            NodeKind::Namespace => node_type == NodeType::Namespace,
            NodeKind::Never => false,
        }
    }

    pub fn of(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Root => NodeKind::Document,
            NodeType::Element => NodeKind::Element,
            NodeType::Attribute => NodeKind::Attribute,
            NodeType::Text => NodeKind::Text,
            NodeType::Comment => NodeKind::Comment,
            NodeType::ProcessingInstruction => NodeKind::ProcessingInstruction,
            NodeType::Namespace => NodeKind::Namespace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameTest {
    /// `*`, or no name constraint at all.
    Any,
    /// `prefix:*`, holding the resolved URI.
    Namespace(String),
    Name(ExpandedName),
}

impl NameTest {
    pub fn matches(&self, name: Option<QName<'_>>) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(uri) => name.is_some_and(|n| n.uri() == uri),
            NameTest::Name(expected) => name.is_some_and(|n| expected.matches(&n)),
        }
    }

    pub fn default_priority(&self) -> f64 {
        match self {
            NameTest::Name(_) => 0.0,
            NameTest::Namespace(_) => -0.25,
            NameTest::Any => -0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeTest {
    pub kind: NodeKind,
    pub name: NameTest,
}

impl NodeTest {
    pub fn new(kind: NodeKind, name: NameTest) -> Self {
        Self { kind, name }
    }

    /// `node()`: matches every node.
    pub fn any_node() -> Self {
        Self::new(NodeKind::Node, NameTest::Any)
    }

    pub fn kind(kind: NodeKind) -> Self {
        Self::new(kind, NameTest::Any)
    }

    pub fn matches<N: TreeNode>(&self, node: &N) -> bool {
        self.kind.matches(node.node_type())
            && match self.name {
                NameTest::Any => true,
                _ => self.name.matches(node.name()),
            }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.name) {
            (NodeKind::ProcessingInstruction, NameTest::Name(target)) => {
                write!(f, "processing-instruction('{}')", target.local)
            }
            (NodeKind::Element | NodeKind::Attribute | NodeKind::Namespace, name) => match name {
                NameTest::Any => write!(f, "*"),
                NameTest::Namespace(uri) => write!(f, "{{{}}}*", uri),
                NameTest::Name(n) => write!(f, "{}", n),
            },
            (NodeKind::Node, _) => write!(f, "node()"),
            (NodeKind::Text, _) => write!(f, "text()"),
            (NodeKind::Comment, _) => write!(f, "comment()"),
            (NodeKind::ProcessingInstruction, _) => write!(f, "processing-instruction()"),
            (NodeKind::Document, _) => write!(f, "/"),
            (NodeKind::Never, _) => write!(f, "empty()"),
        }
    }
}

/// One location step: `axis::test[p1][p2]...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<N> {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expression<N>>,
}

impl<N> Step<N> {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: Expression<N>) -> Self {
        self.predicates.push(predicate);
        self
    }
}

/// A reference to a variable, resolved against the static context at parse time. A global
/// variable with a constant value carries that value and simplifies to it.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableReference<N> {
    pub name: ExpandedName,
    pub display_name: String,
    pub constant: Option<Value<N>>,
}

/// `@name` on the context node, or on a parent bound during reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeReference<N> {
    pub name: ExpandedName,
    pub display_name: String,
    pub bound_parent: Option<N>,
}

/// A piece of an attribute value template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart<N> {
    Text(String),
    Expression(Expression<N>),
}

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression<N> {
    Literal(Value<N>),
    Variable(VariableReference<N>),
    Binary {
        op: BinaryOperator,
        lhs: Box<Expression<N>>,
        rhs: Box<Expression<N>>,
    },
    Negate(Box<Expression<N>>),
    /// A comparison between a single-node expression and a constant string or number.
    SingletonComparison {
        node: Box<Expression<N>>,
        op: BinaryOperator,
        value: Value<N>,
    },
    ContextNode,
    ParentNode,
    Root,
    Attribute(AttributeReference<N>),
    Path {
        start: Box<Expression<N>>,
        step: Step<N>,
    },
    Filter {
        base: Box<Expression<N>>,
        predicate: Box<Expression<N>>,
    },
    SetOperation {
        op: SetOperator,
        lhs: Box<Expression<N>>,
        rhs: Box<Expression<N>>,
    },
    Function(FunctionCall<N>),
    Extension(ExtensionCall<N>),
    Sorted(SortedSelection<N>),
    /// An attribute value template with at least one expression part.
    Template(Vec<TemplatePart<N>>),
    /// A parse failure deferred to evaluation time.
    Error(XPathError),
}

impl<N> Expression<N> {
    pub fn binary(op: BinaryOperator, lhs: Expression<N>, rhs: Expression<N>) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn path(start: Expression<N>, step: Step<N>) -> Self {
        Expression::Path {
            start: Box::new(start),
            step,
        }
    }

    pub fn filter(base: Expression<N>, predicate: Expression<N>) -> Self {
        Expression::Filter {
            base: Box::new(base),
            predicate: Box::new(predicate),
        }
    }

    pub fn set_operation(op: SetOperator, lhs: Expression<N>, rhs: Expression<N>) -> Self {
        Expression::SetOperation {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expression::Literal(Value::String(s.into()))
    }

    pub fn number(n: f64) -> Self {
        Expression::Literal(Value::Number(n))
    }

    pub fn boolean(b: bool) -> Self {
        Expression::Literal(Value::Boolean(b))
    }

    pub fn empty_node_set() -> Self {
        Expression::Literal(Value::NodeSet(NodeSetValue::Empty))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Value<N>> {
        match self {
            Expression::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// True for a literal node-set known to be empty.
    pub fn is_empty_node_set(&self) -> bool {
        matches!(self, Expression::Literal(Value::NodeSet(NodeSetValue::Empty)))
    }

    /// True for expressions that always select at most one node.
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            Expression::ContextNode
                | Expression::ParentNode
                | Expression::Root
                | Expression::Attribute(_)
                | Expression::Literal(Value::NodeSet(
                    NodeSetValue::Empty | NodeSetValue::Singleton(_)
                ))
        )
    }
}

fn quote(s: &str) -> String {
    if s.contains('"') {
        format!("'{}'", s)
    } else {
        format!("\"{}\"", s)
    }
}

fn write_args<N: TreeNode>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    args: &[Expression<N>],
) -> fmt::Result {
    write!(f, "{}(", name)?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    write!(f, ")")
}

impl<N: TreeNode> fmt::Display for Step<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.axis.name(), self.test)?;
        for predicate in &self.predicates {
            write!(f, "[{}]", predicate)?;
        }
        Ok(())
    }
}

impl<N: TreeNode> fmt::Display for Expression<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => match value {
                Value::String(s) => write!(f, "{}", quote(s)),
                Value::Number(n) => write!(f, "{}", number_to_string(*n)),
                Value::Boolean(b) => write!(f, "{}()", b),
                Value::NodeSet(NodeSetValue::Empty) => write!(f, "empty()"),
                Value::NodeSet(_) => write!(f, "{{node-set}}"),
                Value::Fragment(_) => write!(f, "{{fragment}}"),
                Value::Object(o) => write!(f, "{{object {}}}", o.as_string()),
            },
            Expression::Variable(v) => write!(f, "${}", v.display_name),
            Expression::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expression::Negate(operand) => write!(f, "-({})", operand),
            Expression::SingletonComparison { node, op, value } => {
                let rhs: Expression<N> = Expression::Literal(value.clone());
                write!(f, "({} {} {})", node, op.symbol(), rhs)
            }
            Expression::ContextNode => write!(f, "."),
            Expression::ParentNode => write!(f, ".."),
            Expression::Root => write!(f, "/"),
            Expression::Attribute(a) => write!(f, "@{}", a.display_name),
            Expression::Path { start, step } => match start.as_ref() {
                Expression::Root => write!(f, "/{}", step),
                _ => write!(f, "{}/{}", start, step),
            },
            Expression::Filter { base, predicate } => write!(f, "{}[{}]", base, predicate),
            Expression::SetOperation { op, lhs, rhs } => {
                write!(f, "({} {} {})", lhs, op.symbol(), rhs)
            }
            Expression::Function(call) => write_args(f, call.function.name(), &call.args),
            Expression::Extension(call) => write_args(f, &call.display_name, &call.args),
            Expression::Sorted(sorted) => write!(f, "sort({})", sorted.selection),
            Expression::Template(parts) => {
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => {
                            write!(f, "{}", text.replace('{', "{{").replace('}', "}}"))?
                        }
                        TemplatePart::Expression(e) => write!(f, "{{{}}}", e)?,
                    }
                }
                Ok(())
            }
            Expression::Error(err) => write!(f, "error({})", quote(&err.to_string())),
        }
    }
}
