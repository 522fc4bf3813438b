use crate::ast::{
    Axis, AttributeReference, BinaryOperator, Expression, NameTest, NodeKind, SetOperator, Step,
    TemplatePart,
};
use crate::context::Context;
use crate::datasource::TreeNode;
use crate::error::Result;
use crate::functions::{FunctionCall, SystemFunction};
use crate::value::{NodeSetValue, Value};

impl<N: TreeNode> Expression<N> {
    /// Folds constant subtrees, drops predicates that are always true and collapses paths
    /// that can never select anything. Simplifying twice gives the same tree.
    pub fn simplify(self) -> Result<Expression<N>> {
        match self {
            Expression::Variable(v) => match v.constant {
                Some(value) => Ok(Expression::Literal(value)),
                None => Ok(Expression::Variable(v)),
            },
            Expression::Binary { op, lhs, rhs } => simplify_binary(op, lhs.simplify()?, rhs.simplify()?),
            Expression::Negate(operand) => match operand.simplify()? {
                Expression::Literal(value) => Ok(Expression::number(-value.as_number()?)),
                other => Ok(Expression::Negate(Box::new(other))),
            },
            Expression::SingletonComparison { node, op, value } => {
                let node = node.simplify()?;
                let folded = Expression::SingletonComparison {
                    node: Box::new(node),
                    op,
                    value,
                };
                match &folded {
                    Expression::SingletonComparison { node, .. } if node.is_literal() => Ok(
                        Expression::boolean(folded.evaluate_as_boolean(&Context::standalone())?),
                    ),
                    _ => Ok(folded),
                }
            }
            Expression::Path { start, step } => simplify_path(start.simplify()?, step),
            Expression::Filter { base, predicate } => {
                let base = base.simplify()?;
                if base.is_empty_node_set() {
                    return Ok(Expression::empty_node_set());
                }
                match predicate.simplify()? {
                    Expression::Literal(Value::Number(n)) => {
                        Ok(Expression::filter(base, Expression::number(n)))
                    }
                    Expression::Literal(value) => {
                        if value.as_boolean()? {
                            Ok(base)
                        } else {
                            Ok(Expression::empty_node_set())
                        }
                    }
                    predicate => Ok(Expression::filter(base, predicate)),
                }
            }
            Expression::SetOperation { op, lhs, rhs } => {
                simplify_set_operation(op, lhs.simplify()?, rhs.simplify()?)
            }
            Expression::Function(call) => call.simplify(),
            Expression::Extension(call) => call.simplify(),
            Expression::Sorted(sorted) => sorted.simplify(),
            Expression::Template(parts) => simplify_template(parts),
            other => Ok(other),
        }
    }
}

fn simplify_binary<N: TreeNode>(
    op: BinaryOperator,
    lhs: Expression<N>,
    rhs: Expression<N>,
) -> Result<Expression<N>> {
    if lhs.is_literal() && rhs.is_literal() {
        let folded = Expression::binary(op, lhs, rhs);
        return Ok(Expression::Literal(folded.evaluate(&Context::standalone())?));
    }
    if op.is_boolean() {
        if let Some(value) = lhs.as_literal() {
            let constant = value.as_boolean()?;
            return Ok(match (op, constant) {
                (BinaryOperator::And, false) => Expression::boolean(false),
                (BinaryOperator::Or, true) => Expression::boolean(true),
                _ => Expression::Function(FunctionCall::new(SystemFunction::Boolean, vec![rhs])),
            });
        }
        return Ok(Expression::binary(op, lhs, rhs));
    }
    if op.is_comparison() {
        let comparable = |e: &Expression<N>| {
            matches!(e, Expression::Literal(Value::String(_) | Value::Number(_)))
        };
        if lhs.is_singleton() && comparable(&rhs) {
            if let Expression::Literal(value) = rhs {
                return Ok(Expression::SingletonComparison {
                    node: Box::new(lhs),
                    op,
                    value,
                });
            }
        } else if rhs.is_singleton() && comparable(&lhs) {
            if let Expression::Literal(value) = lhs {
                return Ok(Expression::SingletonComparison {
                    node: Box::new(rhs),
                    op: op.inverse(),
                    value,
                });
            }
        }
    }
    Ok(Expression::binary(op, lhs, rhs))
}

/// Simplifies a step's predicates. `None` means the step can never select a node.
fn simplify_step<N: TreeNode>(step: Step<N>) -> Result<Option<Step<N>>> {
    let kind = step.test.kind;
    if kind == NodeKind::Never {
        return Ok(None);
    }
    if kind != NodeKind::Node
        && ((step.axis == Axis::Attribute) != (kind == NodeKind::Attribute)
            || (step.axis == Axis::Namespace) != (kind == NodeKind::Namespace))
    {
        return Ok(None);
    }
    let mut predicates = Vec::with_capacity(step.predicates.len());
    for predicate in step.predicates {
        match predicate.simplify()? {
            Expression::Literal(Value::Number(n)) => predicates.push(Expression::number(n)),
            Expression::Literal(value) => {
                if !value.as_boolean()? {
                    return Ok(None);
                }
            }
            other => predicates.push(other),
        }
    }
    Ok(Some(Step {
        axis: step.axis,
        test: step.test,
        predicates,
    }))
}

fn simplify_path<N: TreeNode>(start: Expression<N>, step: Step<N>) -> Result<Expression<N>> {
    if start.is_empty_node_set() {
        return Ok(Expression::empty_node_set());
    }
    let Some(step) = simplify_step(step)? else {
        return Ok(Expression::empty_node_set());
    };
    if step.axis == Axis::SelfAxis
        && step.test.kind == NodeKind::Node
        && step.predicates.is_empty()
        && start.is_node_set_expression()
    {
        return Ok(start);
    }
    if matches!(start, Expression::ContextNode)
        && step.axis == Axis::Parent
        && step.test.kind == NodeKind::Node
        && step.predicates.is_empty()
    {
        return Ok(Expression::ParentNode);
    }
    if let (Expression::ContextNode, Axis::Attribute, NodeKind::Attribute, NameTest::Name(name)) =
        (&start, step.axis, step.test.kind, &step.test.name)
    {
        if step.predicates.is_empty() {
            return Ok(Expression::Attribute(AttributeReference {
                display_name: name.to_string(),
                name: name.clone(),
                bound_parent: None,
            }));
        }
    }
    Ok(Expression::path(start, step))
}

fn simplify_set_operation<N: TreeNode>(
    op: SetOperator,
    lhs: Expression<N>,
    rhs: Expression<N>,
) -> Result<Expression<N>> {
    match op {
        SetOperator::Union if lhs.is_empty_node_set() => return Ok(rhs),
        SetOperator::Union if rhs.is_empty_node_set() => return Ok(lhs),
        SetOperator::Intersect if lhs.is_empty_node_set() || rhs.is_empty_node_set() => {
            return Ok(Expression::empty_node_set());
        }
        SetOperator::Except if lhs.is_empty_node_set() => return Ok(Expression::empty_node_set()),
        SetOperator::Except if rhs.is_empty_node_set() => return Ok(lhs),
        _ => {}
    }
    if let (Expression::Literal(Value::NodeSet(a)), Expression::Literal(Value::NodeSet(b))) =
        (&lhs, &rhs)
    {
        let combined: NodeSetValue<N> = match op {
            SetOperator::Union => a.union(b)?,
            SetOperator::Intersect => a.intersection(b)?,
            SetOperator::Except => a.difference(b)?,
        };
        return Ok(Expression::Literal(Value::NodeSet(combined)));
    }
    Ok(Expression::set_operation(op, lhs, rhs))
}

fn simplify_template<N: TreeNode>(parts: Vec<TemplatePart<N>>) -> Result<Expression<N>> {
    let mut simplified: Vec<TemplatePart<N>> = Vec::with_capacity(parts.len());
    for part in parts {
        let part = match part {
            TemplatePart::Expression(e) => match e.simplify()? {
                Expression::Literal(value) => TemplatePart::Text(value.as_string()?),
                other => TemplatePart::Expression(other),
            },
            text => text,
        };
        if let (Some(TemplatePart::Text(prev)), TemplatePart::Text(next)) =
            (simplified.last_mut(), &part)
        {
            prev.push_str(next);
            continue;
        }
        simplified.push(part);
    }
    match simplified.as_slice() {
        [] => Ok(Expression::string("")),
        [TemplatePart::Text(text)] => Ok(Expression::string(text.clone())),
        _ => Ok(Expression::Template(simplified)),
    }
}
