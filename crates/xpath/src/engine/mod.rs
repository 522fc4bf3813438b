//! Evaluation of expression trees.
//!
//! Scalar expressions evaluate directly. Node-set expressions never enumerate eagerly from
//! `evaluate`: they are reduced against the whole context and come back either as a literal
//! node-set or as an intensional node-set that enumerates on first use.
mod reduce;
mod simplify;

use crate::ast::{BinaryOperator, DataType, Expression, TemplatePart};
use crate::context::{Context, Dependencies};
use crate::datasource::TreeNode;
use crate::enumeration::{
    Enumeration, FilterEnumeration, MergeEnumeration, NodeEnumeration, PathEnumeration,
    SingletonEnumeration, empty,
};
use crate::error::Result;
use crate::value::nodeset::NodeSetExtent;
use crate::value::{NodeSetIntent, NodeSetValue, Value, numeric_compare, string_to_number};

impl<N: TreeNode> Expression<N> {
    /// True for the variants whose value is always a node-set.
    pub fn is_node_set_expression(&self) -> bool {
        matches!(
            self,
            Expression::ContextNode
                | Expression::ParentNode
                | Expression::Root
                | Expression::Attribute(_)
                | Expression::Path { .. }
                | Expression::Filter { .. }
                | Expression::SetOperation { .. }
                | Expression::Sorted(_)
        )
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal(value) => value.data_type(),
            Expression::Variable(v) => v
                .constant
                .as_ref()
                .map(Value::data_type)
                .unwrap_or(DataType::Any),
            Expression::Binary { op, .. } if op.is_arithmetic() => DataType::Number,
            Expression::Binary { .. } => DataType::Boolean,
            Expression::Negate(_) => DataType::Number,
            Expression::SingletonComparison { .. } => DataType::Boolean,
            Expression::Function(call) => call.data_type(),
            Expression::Extension(call) => call.function.data_type(),
            Expression::Template(_) => DataType::String,
            Expression::Error(_) => DataType::Any,
            _ => DataType::NodeSet,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.data_type() == DataType::Number
    }

    /// True when the value depends on the position or size of the node list.
    pub fn is_relative(&self) -> bool {
        self.dependencies()
            .intersects(Dependencies::POSITION | Dependencies::LAST)
    }

    pub fn uses_current(&self) -> bool {
        self.dependencies().contains(Dependencies::CURRENT_NODE)
    }

    /// The parts of the dynamic context this expression reads. Predicates only contribute
    /// the facets that stay fixed across the nodes they filter.
    pub fn dependencies(&self) -> Dependencies {
        match self {
            Expression::Literal(_) | Expression::Error(_) => Dependencies::NONE,
            Expression::Variable(v) if v.constant.is_some() => Dependencies::NONE,
            Expression::Variable(_) => Dependencies::VARIABLES,
            Expression::Binary { lhs, rhs, .. } => lhs.dependencies() | rhs.dependencies(),
            Expression::Negate(operand) => operand.dependencies(),
            Expression::SingletonComparison { node, .. } => node.dependencies(),
            Expression::ContextNode | Expression::ParentNode | Expression::Root => {
                Dependencies::CONTEXT_NODE
            }
            Expression::Attribute(a) if a.bound_parent.is_some() => Dependencies::NONE,
            Expression::Attribute(_) => Dependencies::CONTEXT_NODE,
            Expression::Path { start, step } => step
                .predicates
                .iter()
                .fold(start.dependencies(), |deps, p| {
                    deps | (p.dependencies() & Dependencies::XSLT_CONTEXT)
                }),
            Expression::Filter { base, predicate } => {
                base.dependencies() | (predicate.dependencies() & Dependencies::XSLT_CONTEXT)
            }
            Expression::SetOperation { lhs, rhs, .. } => lhs.dependencies() | rhs.dependencies(),
            Expression::Function(call) => call.dependencies(),
            Expression::Extension(call) => call.dependencies(),
            Expression::Sorted(sorted) => sorted.dependencies(),
            Expression::Template(parts) => parts.iter().fold(Dependencies::NONE, |deps, part| {
                match part {
                    TemplatePart::Text(_) => deps,
                    TemplatePart::Expression(e) => deps | e.dependencies(),
                }
            }),
        }
    }

    pub fn evaluate(&self, context: &Context<'_, N>) -> Result<Value<N>> {
        match self {
            Expression::Literal(Value::NodeSet(set)) => Ok(Value::NodeSet(set.sorted()?)),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Variable(v) => match &v.constant {
                Some(value) => Ok(value.clone()),
                None => context.variable(&v.name),
            },
            Expression::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, context),
            Expression::Negate(operand) => Ok(Value::Number(-operand.evaluate_as_number(context)?)),
            Expression::SingletonComparison { .. } => {
                Ok(Value::Boolean(self.evaluate_as_boolean(context)?))
            }
            Expression::ContextNode
            | Expression::ParentNode
            | Expression::Root
            | Expression::Attribute(_) => Ok(Value::NodeSet(match self.select_first(context)? {
                Some(node) => NodeSetValue::Singleton(node),
                None => NodeSetValue::Empty,
            })),
            Expression::Path { .. }
            | Expression::Filter { .. }
            | Expression::SetOperation { .. }
            | Expression::Sorted(_) => self.evaluate_node_set(context).map(Value::NodeSet),
            Expression::Function(call) => call.evaluate(context),
            Expression::Extension(call) => call.evaluate(context),
            Expression::Template(_) => Ok(Value::String(self.evaluate_as_string(context)?)),
            Expression::Error(err) => Err(err.clone()),
        }
    }

    /// Reduces every context dependency and wraps what is left, without enumerating.
    fn evaluate_node_set(&self, context: &Context<'_, N>) -> Result<NodeSetValue<N>> {
        match self.reduce(Dependencies::ALL, context)? {
            Expression::Literal(Value::NodeSet(set)) => set.sorted(),
            Expression::Literal(other) => other.as_node_set(context),
            reduced => Ok(NodeSetValue::Intent(NodeSetIntent::new(reduced)?)),
        }
    }

    pub fn evaluate_as_boolean(&self, context: &Context<'_, N>) -> Result<bool> {
        match self {
            Expression::Binary { op, lhs, rhs } if *op == BinaryOperator::Or => {
                Ok(lhs.evaluate_as_boolean(context)? || rhs.evaluate_as_boolean(context)?)
            }
            Expression::Binary { op, lhs, rhs } if *op == BinaryOperator::And => {
                Ok(lhs.evaluate_as_boolean(context)? && rhs.evaluate_as_boolean(context)?)
            }
            Expression::SingletonComparison { node, op, value } => {
                singleton_compare(node, *op, value, context)
            }
            e if e.is_node_set_expression() => Ok(self.enumerate(context)?.next().transpose()?.is_some()),
            _ => self.evaluate(context)?.as_boolean(),
        }
    }

    pub fn evaluate_as_number(&self, context: &Context<'_, N>) -> Result<f64> {
        if self.is_node_set_expression() {
            return Ok(self
                .select_first(context)?
                .map(|n| string_to_number(&n.string_value()))
                .unwrap_or(f64::NAN));
        }
        self.evaluate(context)?.as_number()
    }

    pub fn evaluate_as_string(&self, context: &Context<'_, N>) -> Result<String> {
        match self {
            Expression::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expression(e) => out.push_str(&e.evaluate_as_string(context)?),
                    }
                }
                Ok(out)
            }
            e if e.is_node_set_expression() => Ok(self
                .select_first(context)?
                .map(|n| n.string_value())
                .unwrap_or_default()),
            _ => self.evaluate(context)?.as_string(),
        }
    }

    /// The first selected node in document order.
    pub fn select_first(&self, context: &Context<'_, N>) -> Result<Option<N>> {
        let mut enumeration = self.enumerate(context)?;
        if enumeration.is_document_sorted() {
            return enumeration.next().transpose();
        }
        let mut first: Option<N> = None;
        for node in enumeration {
            let node = node?;
            if first.is_none_or(|f| node.order_key() < f.order_key()) {
                first = Some(node);
            }
        }
        Ok(first)
    }

    /// Enumerates the nodes the expression selects. The order is whatever the underlying
    /// enumeration produces; its flags say whether it is document order.
    pub fn enumerate<'e>(&'e self, context: &Context<'e, N>) -> Result<Enumeration<'e, N>> {
        match self {
            Expression::Literal(Value::NodeSet(set)) => set.enumerate(),
            Expression::ContextNode => Ok(singleton(Some(context.context_node()?))),
            Expression::ParentNode => Ok(singleton(context.context_node()?.parent())),
            Expression::Root => Ok(singleton(Some(context.context_node()?.document_root()))),
            Expression::Attribute(a) => {
                let parent = match a.bound_parent {
                    Some(parent) => parent,
                    None => context.context_node()?,
                };
                let found = parent
                    .attributes()
                    .find(|attr| attr.name().is_some_and(|n| a.name.matches(&n)));
                Ok(singleton(found))
            }
            Expression::Path { start, step } => {
                let base = start.enumerate(context)?;
                Ok(Box::new(PathEnumeration::new(
                    base,
                    step,
                    context.clone(),
                    start.is_singleton(),
                )))
            }
            Expression::Filter { base, predicate } => {
                if base.is_empty_node_set() {
                    return Ok(empty());
                }
                let mut nodes = base.enumerate(context)?;
                let positional = predicate.is_numeric()
                    || predicate.data_type() == DataType::Any
                    || predicate.is_relative();
                if positional && !nodes.is_document_sorted() {
                    nodes = Box::new(NodeSetExtent::from_enumeration(nodes)?.sort().enumerate());
                }
                Ok(Box::new(FilterEnumeration::new(
                    nodes,
                    predicate,
                    context.clone(),
                )))
            }
            Expression::SetOperation { op, lhs, rhs } => Ok(Box::new(MergeEnumeration::new(
                *op,
                lhs.enumerate(context)?,
                rhs.enumerate(context)?,
            )?)),
            Expression::Sorted(sorted) => sorted.enumerate(context),
            other => other
                .evaluate(context)?
                .as_node_set(context)?
                .into_enumeration(),
        }
    }
}

fn singleton<'e, N: TreeNode + 'e>(node: Option<N>) -> Enumeration<'e, N> {
    Box::new(SingletonEnumeration::new(node))
}

fn evaluate_binary<N: TreeNode>(
    op: BinaryOperator,
    lhs: &Expression<N>,
    rhs: &Expression<N>,
    context: &Context<'_, N>,
) -> Result<Value<N>> {
    if op.is_boolean() {
        let result = match op {
            BinaryOperator::Or => lhs.evaluate_as_boolean(context)? || rhs.evaluate_as_boolean(context)?,
            _ => lhs.evaluate_as_boolean(context)? && rhs.evaluate_as_boolean(context)?,
        };
        return Ok(Value::Boolean(result));
    }
    if op.is_comparison() {
        let left = lhs.evaluate(context)?;
        let right = rhs.evaluate(context)?;
        return Ok(Value::Boolean(left.compare(op, &right)?));
    }
    let x = lhs.evaluate_as_number(context)?;
    let y = rhs.evaluate_as_number(context)?;
    Ok(Value::Number(match op {
        BinaryOperator::Plus => x + y,
        BinaryOperator::Minus => x - y,
        BinaryOperator::Multiply => x * y,
        BinaryOperator::Divide => x / y,
        _ => x % y,
    }))
}

fn singleton_compare<N: TreeNode>(
    node: &Expression<N>,
    op: BinaryOperator,
    value: &Value<N>,
    context: &Context<'_, N>,
) -> Result<bool> {
    let Some(found) = node.select_first(context)? else {
        return Ok(false);
    };
    let text = found.string_value();
    Ok(match (value, op) {
        (Value::String(s), BinaryOperator::Equals) => text == *s,
        (Value::String(s), BinaryOperator::NotEquals) => text != *s,
        (Value::String(s), _) => numeric_compare(op, string_to_number(&text), string_to_number(s)),
        (Value::Number(n), _) => numeric_compare(op, string_to_number(&text), *n),
        (other, _) => Value::NodeSet(NodeSetValue::Singleton(found)).compare(op, other)?,
    })
}
