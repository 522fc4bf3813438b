//! Runtime values and the XPath conversion and comparison rules.
use crate::ast::{BinaryOperator, DataType};
use crate::context::Context;
use crate::datasource::TreeNode;
use crate::error::{Result, XPathError};
use std::collections::HashSet;

pub mod fragment;
pub mod nodeset;
pub mod number;
pub mod object;

pub use fragment::{FragmentAttribute, FragmentBuilder, FragmentEvent, FragmentHandler, FragmentValue};
pub use nodeset::{NodeSetExtent, NodeSetIntent, NodeSetValue};
pub use number::{number_to_string, string_to_number};
pub use object::ObjectValue;

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<N> {
    Boolean(bool),
    Number(f64),
    String(String),
    NodeSet(NodeSetValue<N>),
    Fragment(FragmentValue),
    Object(ObjectValue),
}

impl<N> From<bool> for Value<N> {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<N> From<f64> for Value<N> {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl<N> From<String> for Value<N> {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<N> From<&str> for Value<N> {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl<N> From<NodeSetValue<N>> for Value<N> {
    fn from(value: NodeSetValue<N>) -> Self {
        Value::NodeSet(value)
    }
}

pub(crate) fn numeric_compare(op: BinaryOperator, x: f64, y: f64) -> bool {
    match op {
        BinaryOperator::Equals => x == y,
        BinaryOperator::NotEquals => x != y,
        BinaryOperator::LessThan => x < y,
        BinaryOperator::LessThanOrEqual => x <= y,
        BinaryOperator::GreaterThan => x > y,
        BinaryOperator::GreaterThanOrEqual => x >= y,
        _ => false,
    }
}

impl<N: TreeNode> Value<N> {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Number(_) => DataType::Number,
            Value::String(_) => DataType::String,
            Value::NodeSet(_) | Value::Fragment(_) => DataType::NodeSet,
            Value::Object(_) => DataType::Object,
        }
    }

    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(number::number_to_boolean(*n)),
            Value::String(s) => Ok(!s.is_empty()),
            Value::NodeSet(set) => set.as_boolean(),
            Value::Fragment(_) => Ok(true),
            Value::Object(o) => Ok(o.as_boolean()),
        }
    }

    pub fn as_number(&self) -> Result<f64> {
        match self {
            Value::Boolean(b) => Ok(number::boolean_to_number(*b)),
            Value::Number(n) => Ok(*n),
            Value::String(s) => Ok(string_to_number(s)),
            Value::NodeSet(set) => set.as_number(),
            Value::Fragment(f) => Ok(string_to_number(f.string_value())),
            Value::Object(o) if o.is_null() => Ok(f64::NAN),
            Value::Object(o) => Ok(string_to_number(o.as_string())),
        }
    }

    pub fn as_string(&self) -> Result<String> {
        match self {
            Value::Boolean(b) => Ok(b.to_string()),
            Value::Number(n) => Ok(number_to_string(*n)),
            Value::String(s) => Ok(s.clone()),
            Value::NodeSet(set) => set.as_string(),
            Value::Fragment(f) => Ok(f.string_value().to_string()),
            Value::Object(o) => Ok(o.as_string().to_string()),
        }
    }

    /// Converts to a node-set. A fragment becomes the root of a tree built by the controller.
    pub fn as_node_set(&self, context: &Context<'_, N>) -> Result<NodeSetValue<N>> {
        match self {
            Value::NodeSet(set) => Ok(set.clone()),
            Value::Fragment(fragment) => {
                let root = context.require_controller()?.materialize_fragment(fragment)?;
                Ok(NodeSetValue::Singleton(root))
            }
            other => Err(XPathError::type_error(format!(
                "The value is not a node-set: {:?}",
                other.data_type()
            ))),
        }
    }

    /// General comparison, with the node-set rules of XPath 1.0.
    pub fn compare(&self, op: BinaryOperator, other: &Value<N>) -> Result<bool> {
        match op {
            BinaryOperator::Equals => self.equals(other),
            BinaryOperator::NotEquals => self.not_equals(other),
            _ => match (self, other) {
                (Value::NodeSet(set), _) => compare_node_set(set, op, other),
                (_, Value::NodeSet(set)) => compare_node_set(set, op.inverse(), self),
                _ => Ok(numeric_compare(op, self.as_number()?, other.as_number()?)),
            },
        }
    }

    fn equals(&self, other: &Value<N>) -> Result<bool> {
        match (self, other) {
            (Value::NodeSet(set), _) => node_set_equals(set, other, true),
            (_, Value::NodeSet(set)) => node_set_equals(set, self, true),
            (Value::Fragment(f), _) => fragment_equals(f, other, true),
            (_, Value::Fragment(f)) => fragment_equals(f, self, true),
            (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                Ok(self.as_boolean()? == other.as_boolean()?)
            }
            (Value::Number(_), _) | (_, Value::Number(_)) => {
                Ok(self.as_number()? == other.as_number()?)
            }
            _ => Ok(self.as_string()? == other.as_string()?),
        }
    }

    fn not_equals(&self, other: &Value<N>) -> Result<bool> {
        match (self, other) {
            (Value::NodeSet(set), _) => node_set_equals(set, other, false),
            (_, Value::NodeSet(set)) => node_set_equals(set, self, false),
            (Value::Fragment(f), _) => fragment_equals(f, other, false),
            (_, Value::Fragment(f)) => fragment_equals(f, self, false),
            _ => Ok(!self.equals(other)?),
        }
    }
}

/// `=` (when `equal`) or `!=` between a fragment and a non-node-set value.
fn fragment_equals<N: TreeNode>(
    fragment: &FragmentValue,
    other: &Value<N>,
    equal: bool,
) -> Result<bool> {
    let result = match other {
        Value::Number(n) => {
            let x = string_to_number(fragment.string_value());
            if equal { x == *n } else { x != *n }
        }
        Value::Boolean(b) => {
            if equal { *b } else { !*b }
        }
        _ => (fragment.string_value() == other.as_string()?) == equal,
    };
    Ok(result)
}

/// `=` (when `equal`) or `!=` with a node-set on the left.
fn node_set_equals<N: TreeNode>(
    set: &NodeSetValue<N>,
    other: &Value<N>,
    equal: bool,
) -> Result<bool> {
    match other {
        Value::NodeSet(other_set) => {
            if equal {
                let mut values = HashSet::new();
                for node in set.enumerate()? {
                    values.insert(node?.string_value());
                }
                for node in other_set.enumerate()? {
                    if values.contains(&node?.string_value()) {
                        return Ok(true);
                    }
                }
                Ok(false)
            } else {
                let right: Vec<String> = other_set
                    .enumerate()?
                    .map(|n| n.map(|n| n.string_value()))
                    .collect::<Result<_>>()?;
                for node in set.enumerate()? {
                    let s = node?.string_value();
                    if right.iter().any(|r| *r != s) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
        Value::Number(n) => {
            for node in set.enumerate()? {
                let x = string_to_number(&node?.string_value());
                if (x == *n) == equal {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Boolean(b) => Ok((set.as_boolean()? == *b) == equal),
        _ => {
            let s = other.as_string()?;
            for node in set.enumerate()? {
                if (node?.string_value() == s) == equal {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// A relational comparison with a node-set on the left.
fn compare_node_set<N: TreeNode>(
    set: &NodeSetValue<N>,
    op: BinaryOperator,
    other: &Value<N>,
) -> Result<bool> {
    match other {
        Value::NodeSet(other_set) => {
            let Some((min, max)) = numeric_range(set)? else {
                return Ok(false);
            };
            let Some((other_min, other_max)) = numeric_range(other_set)? else {
                return Ok(false);
            };
            Ok(match op {
                BinaryOperator::LessThan => min < other_max,
                BinaryOperator::LessThanOrEqual => min <= other_max,
                BinaryOperator::GreaterThan => max > other_min,
                BinaryOperator::GreaterThanOrEqual => max >= other_min,
                _ => false,
            })
        }
        Value::Boolean(b) => Ok(numeric_compare(
            op,
            number::boolean_to_number(set.as_boolean()?),
            number::boolean_to_number(*b),
        )),
        _ => {
            let y = other.as_number()?;
            for node in set.enumerate()? {
                if numeric_compare(op, string_to_number(&node?.string_value()), y) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// The smallest and largest numeric values of a node-set, or `None` when it is empty. NaN
/// values take part in neither bound.
fn numeric_range<N: TreeNode>(set: &NodeSetValue<N>) -> Result<Option<(f64, f64)>> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut empty = true;
    for node in set.enumerate()? {
        let value = string_to_number(&node?.string_value());
        if value < min {
            min = value;
        }
        if value > max {
            max = value;
        }
        empty = false;
    }
    Ok((!empty).then_some((min, max)))
}
