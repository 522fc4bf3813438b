use super::{Enumeration, FilterEnumeration, NodeEnumeration};
use crate::ast::Step;
use crate::axes::AxisEnumeration;
use crate::context::Context;
use crate::datasource::TreeNode;
use crate::error::Result;

/// The nodes one step selects from a single origin: the axis, then each predicate in turn.
pub fn step_enumeration<'e, N: TreeNode + 'e>(
    step: &'e Step<N>,
    origin: N,
    context: &Context<'e, N>,
) -> Enumeration<'e, N> {
    let mut enumeration: Enumeration<'e, N> =
        Box::new(AxisEnumeration::new(step.axis, origin, Some(&step.test)));
    for predicate in &step.predicates {
        enumeration = Box::new(FilterEnumeration::new(enumeration, predicate, context.clone()));
    }
    enumeration
}

/// Applies a step to every node of an upstream sequence and concatenates the results.
pub struct PathEnumeration<'e, N> {
    base: Enumeration<'e, N>,
    step: &'e Step<N>,
    context: Context<'e, N>,
    current: Option<Enumeration<'e, N>>,
    sorted: bool,
    reverse_sorted: bool,
    peer: bool,
}

impl<'e, N: TreeNode + 'e> PathEnumeration<'e, N> {
    /// `singleton_start` is set when the upstream expression selects at most one node.
    pub fn new(
        base: Enumeration<'e, N>,
        step: &'e Step<N>,
        context: Context<'e, N>,
        singleton_start: bool,
    ) -> Self {
        let axis = step.axis;
        let sorted = (base.is_document_sorted() && base.is_peer() && axis.is_within_subtree())
            || (singleton_start && axis.is_sorted());
        let reverse_sorted = singleton_start && axis.is_reverse_sorted();
        let peer = base.is_peer() && axis.is_peer();
        Self {
            base,
            step,
            context,
            current: None,
            sorted,
            reverse_sorted,
            peer,
        }
    }
}

impl<'e, N: TreeNode + 'e> Iterator for PathEnumeration<'e, N> {
    type Item = Result<N>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let origin = match self.base.next()? {
                Ok(node) => node,
                Err(e) => return Some(Err(e)),
            };
            self.current = Some(step_enumeration(self.step, origin, &self.context));
        }
    }
}

impl<'e, N: TreeNode + 'e> NodeEnumeration<N> for PathEnumeration<'e, N> {
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
