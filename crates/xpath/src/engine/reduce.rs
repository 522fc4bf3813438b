use crate::ast::{AttributeReference, Expression, Step, TemplatePart, VariableReference};
use crate::context::{Context, Dependencies};
use crate::datasource::TreeNode;
use crate::error::Result;
use crate::value::{NodeSetValue, Value};

impl<N: TreeNode> Expression<N> {
    /// Partially evaluates the expression: every facet named in `mask` that the expression
    /// reads is replaced by its value from `context`, and the result is simplified. The
    /// result no longer depends on those facets.
    pub fn reduce(&self, mask: Dependencies, context: &Context<'_, N>) -> Result<Expression<N>> {
        if !self.dependencies().intersects(mask) {
            return Ok(self.clone());
        }
        let reduced = match self {
            Expression::Variable(VariableReference { name, .. }) => {
                return Ok(Expression::Literal(context.variable(name)?));
            }
            Expression::Binary { op, lhs, rhs } => {
                Expression::binary(*op, lhs.reduce(mask, context)?, rhs.reduce(mask, context)?)
            }
            Expression::Negate(operand) => Expression::Negate(Box::new(operand.reduce(mask, context)?)),
            Expression::SingletonComparison { node, op, value } => Expression::SingletonComparison {
                node: Box::new(node.reduce(mask, context)?),
                op: *op,
                value: value.clone(),
            },
            Expression::ContextNode if mask.contains(Dependencies::CONTEXT_NODE) => {
                return Ok(node_literal(Some(context.context_node()?)));
            }
            Expression::ParentNode if mask.contains(Dependencies::CONTEXT_NODE) => {
                return Ok(node_literal(context.context_node()?.parent()));
            }
            Expression::Root if mask.contains(Dependencies::CONTEXT_NODE) => {
                return Ok(node_literal(Some(context.context_node()?.document_root())));
            }
            Expression::Attribute(a) if mask.contains(Dependencies::CONTEXT_NODE) => {
                return Ok(Expression::Attribute(AttributeReference {
                    bound_parent: Some(context.context_node()?),
                    ..a.clone()
                }));
            }
            Expression::Path { start, step } => {
                let start = as_node_source(start.reduce(mask, context)?, context)?;
                let predicates = reduce_predicates(&step.predicates, mask, context)?;
                Expression::path(
                    start,
                    Step {
                        axis: step.axis,
                        test: step.test.clone(),
                        predicates,
                    },
                )
            }
            Expression::Filter { base, predicate } => Expression::filter(
                as_node_source(base.reduce(mask, context)?, context)?,
                predicate.reduce(mask & Dependencies::XSLT_CONTEXT, context)?,
            ),
            Expression::SetOperation { op, lhs, rhs } => Expression::set_operation(
                *op,
                as_node_source(lhs.reduce(mask, context)?, context)?,
                as_node_source(rhs.reduce(mask, context)?, context)?,
            ),
            Expression::Function(call) => return call.reduce(mask, context),
            Expression::Extension(call) => return call.reduce(mask, context),
            Expression::Sorted(sorted) => return sorted.reduce(mask, context),
            Expression::Template(parts) => Expression::Template(
                parts
                    .iter()
                    .map(|part| match part {
                        TemplatePart::Text(text) => Ok(TemplatePart::Text(text.clone())),
                        TemplatePart::Expression(e) => {
                            Ok(TemplatePart::Expression(e.reduce(mask, context)?))
                        }
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => return Ok(other.clone()),
        };
        reduced.simplify()
    }
}

fn node_literal<N>(node: Option<N>) -> Expression<N> {
    Expression::Literal(Value::NodeSet(match node {
        Some(node) => NodeSetValue::Singleton(node),
        None => NodeSetValue::Empty,
    }))
}

fn reduce_predicates<N: TreeNode>(
    predicates: &[Expression<N>],
    mask: Dependencies,
    context: &Context<'_, N>,
) -> Result<Vec<Expression<N>>> {
    predicates
        .iter()
        .map(|p| p.reduce(mask & Dependencies::XSLT_CONTEXT, context))
        .collect()
}

/// A fragment that reaches a path, filter or set operation is turned into nodes now, while
/// the controller that can build them is still at hand.
fn as_node_source<N: TreeNode>(expression: Expression<N>, context: &Context<'_, N>) -> Result<Expression<N>> {
    match expression {
        Expression::Literal(value @ Value::Fragment(_)) => {
            Ok(Expression::Literal(Value::NodeSet(value.as_node_set(context)?)))
        }
        other => Ok(other),
    }
}
