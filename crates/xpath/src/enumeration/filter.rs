use super::{Enumeration, LookaheadEnumeration, NodeEnumeration};
use crate::ast::{DataType, Expression};
use crate::context::{Context, Dependencies, LastPosition};
use crate::datasource::TreeNode;
use crate::error::Result;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
enum PredicateKind {
    /// A literal number: match one position, then stop.
    Constant(f64),
    Positional,
    Boolean,
    /// Decided per item: a numeric result is positional.
    Any,
}

enum FilterBase<'e, N> {
    Direct(Enumeration<'e, N>),
    Lookahead(LookaheadEnumeration<'e, N>),
}

impl<N> FilterBase<'_, N> {
    fn next(&mut self) -> Option<Result<N>> {
        match self {
            FilterBase::Direct(e) => e.next(),
            FilterBase::Lookahead(e) => e.next(),
        }
    }

    fn last_position(&self) -> LastPosition<'_> {
        match self {
            FilterBase::Direct(e) => e
                .last_position_finder()
                .map(LastPosition::Deferred)
                .unwrap_or(LastPosition::Unknown),
            FilterBase::Lookahead(e) => LastPosition::Deferred(e),
        }
    }
}

/// Applies one predicate to a base sequence. Each node is tested with its own position;
/// `last()` is answered by the base when it knows its length, otherwise by a lookahead
/// buffer created only when the predicate reads `last()`.
pub struct FilterEnumeration<'e, N> {
    base: FilterBase<'e, N>,
    predicate: &'e Expression<N>,
    kind: PredicateKind,
    context: Context<'e, N>,
    position: usize,
    finished: bool,
    sorted: bool,
    reverse_sorted: bool,
    peer: bool,
}

impl<'e, N: TreeNode + 'e> FilterEnumeration<'e, N> {
    pub fn new(
        base: Enumeration<'e, N>,
        predicate: &'e Expression<N>,
        context: Context<'e, N>,
    ) -> Self {
        let kind = match predicate {
            Expression::Literal(Value::Number(n)) => PredicateKind::Constant(*n),
            _ => match predicate.data_type() {
                DataType::Number => PredicateKind::Positional,
                DataType::Any | DataType::Object => PredicateKind::Any,
                _ => PredicateKind::Boolean,
            },
        };
        let sorted = base.is_document_sorted();
        let reverse_sorted = base.is_reverse_sorted();
        let peer = base.is_peer();
        let needs_lookahead = predicate.dependencies().contains(Dependencies::LAST)
            && base.last_position_finder().is_none();
        let base = if needs_lookahead {
            FilterBase::Lookahead(LookaheadEnumeration::new(base))
        } else {
            FilterBase::Direct(base)
        };
        Self {
            base,
            predicate,
            kind,
            context,
            position: 0,
            finished: false,
            sorted,
            reverse_sorted,
            peer,
        }
    }

    fn matches(&mut self, node: N) -> Result<bool> {
        let position = self.position as f64;
        if let PredicateKind::Constant(wanted) = self.kind {
            if position >= wanted {
                self.finished = true;
                log::trace!("positional filter [{}] stopped at position {}", wanted, position);
            }
            return Ok(position == wanted);
        }
        let ctx = Context::for_item(
            &self.context,
            node,
            self.position,
            self.base.last_position(),
        );
        match self.kind {
            PredicateKind::Positional => Ok(self.predicate.evaluate_as_number(&ctx)? == position),
            PredicateKind::Any => match self.predicate.evaluate(&ctx)? {
                Value::Number(n) => Ok(n == position),
                other => other.as_boolean(),
            },
            _ => self.predicate.evaluate_as_boolean(&ctx),
        }
    }
}

impl<'e, N: TreeNode + 'e> Iterator for FilterEnumeration<'e, N> {
    type Item = Result<N>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let node = match self.base.next()? {
                Ok(node) => node,
                Err(e) => return Some(Err(e)),
            };
            self.position += 1;
            match self.matches(node) {
                Ok(true) => return Some(Ok(node)),
                Ok(false) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

impl<'e, N: TreeNode + 'e> NodeEnumeration<N> for FilterEnumeration<'e, N> {
    fn is_document_sorted(&self) -> bool {
        self.sorted
    }

    fn is_reverse_sorted(&self) -> bool {
        self.reverse_sorted
    }

    fn is_peer(&self) -> bool {
        self.peer
    }
}
