//! Union, intersection and difference of two node sequences by a single sorted merge.
use super::{Enumeration, NodeEnumeration};
use crate::ast::SetOperator;
use crate::datasource::TreeNode;
use crate::error::Result;
use crate::value::NodeSetExtent;
use std::cmp::Ordering;

/// Merges two document-ordered sequences. Unsorted inputs are sorted once up front; after
/// that each side holds at most one buffered node.
pub struct MergeEnumeration<'e, N> {
    op: SetOperator,
    left: Enumeration<'e, N>,
    right: Enumeration<'e, N>,
    pending_left: Option<N>,
    pending_right: Option<N>,
}

fn in_document_order<'e, N: TreeNode + 'e>(
    enumeration: Enumeration<'e, N>,
) -> Result<Enumeration<'e, N>> {
    if enumeration.is_document_sorted() {
        return Ok(enumeration);
    }
    let extent = NodeSetExtent::from_enumeration(enumeration)?.sort();
    Ok(Box::new(extent.enumerate()))
}

fn pull<N>(
    pending: &mut Option<N>,
    source: &mut Enumeration<'_, N>,
) -> Result<Option<N>> {
    if let Some(node) = pending.take() {
        return Ok(Some(node));
    }
    source.next().transpose()
}

impl<'e, N: TreeNode + 'e> MergeEnumeration<'e, N> {
    pub fn new(
        op: SetOperator,
        left: Enumeration<'e, N>,
        right: Enumeration<'e, N>,
    ) -> Result<Self> {
        Ok(Self {
            op,
            left: in_document_order(left)?,
            right: in_document_order(right)?,
            pending_left: None,
            pending_right: None,
        })
    }

    pub fn union(left: Enumeration<'e, N>, right: Enumeration<'e, N>) -> Result<Self> {
        Self::new(SetOperator::Union, left, right)
    }

    pub fn intersection(left: Enumeration<'e, N>, right: Enumeration<'e, N>) -> Result<Self> {
        Self::new(SetOperator::Intersect, left, right)
    }

    pub fn difference(left: Enumeration<'e, N>, right: Enumeration<'e, N>) -> Result<Self> {
        Self::new(SetOperator::Except, left, right)
    }

    fn advance(&mut self) -> Result<Option<N>> {
        loop {
            let left = pull(&mut self.pending_left, &mut self.left)?;
            if left.is_none() && self.op != SetOperator::Union {
                return Ok(None);
            }
            let right = pull(&mut self.pending_right, &mut self.right)?;
            match (left, right) {
                (None, None) => return Ok(None),
                (None, Some(r)) => return Ok(Some(r)),
                (Some(l), None) => {
                    return Ok(match self.op {
                        SetOperator::Intersect => None,
                        _ => Some(l),
                    });
                }
                (Some(l), Some(r)) => match l.order_key().cmp(&r.order_key()) {
                    Ordering::Less => {
                        self.pending_right = Some(r);
                        if self.op != SetOperator::Intersect {
                            return Ok(Some(l));
                        }
                    }
                    Ordering::Greater => {
                        self.pending_left = Some(l);
                        if self.op == SetOperator::Union {
                            return Ok(Some(r));
                        }
                    }
                    Ordering::Equal => {
                        if self.op != SetOperator::Except {
                            return Ok(Some(l));
                        }
                    }
                },
            }
        }
    }
}

impl<'e, N: TreeNode + 'e> Iterator for MergeEnumeration<'e, N> {
    type Item = Result<N>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

impl<'e, N: TreeNode + 'e> NodeEnumeration<N> for MergeEnumeration<'e, N> {
    fn is_document_sorted(&self) -> bool {
        true
    }

    fn is_peer(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};
    use crate::enumeration::ExtentEnumeration;
    use std::sync::Arc;

    fn enumerate<'t>(nodes: Vec<MockNode<'t>>, sorted: bool) -> Enumeration<'t, MockNode<'t>> {
        let nodes: Arc<[_]> = nodes.into();
        Box::new(ExtentEnumeration::new(nodes, sorted, false))
    }

    fn ids(e: MergeEnumeration<'_, MockNode<'_>>) -> Vec<usize> {
        e.map(|n| n.unwrap().id).collect()
    }

    #[test]
    fn test_union_of_overlapping_sets() {
        let tree = create_test_tree();
        let a = enumerate(vec![tree.node(1), tree.node(5), tree.node(8)], true);
        let b = enumerate(vec![tree.node(5), tree.node(6), tree.node(9)], true);
        assert_eq!(ids(MergeEnumeration::union(a, b).unwrap()), vec![1, 5, 6, 8, 9]);
    }

    #[test]
    fn test_intersection_and_difference() {
        let tree = create_test_tree();
        let make = || {
            (
                enumerate(vec![tree.node(1), tree.node(5), tree.node(8)], true),
                enumerate(vec![tree.node(5), tree.node(8), tree.node(9)], true),
            )
        };
        let (a, b) = make();
        assert_eq!(ids(MergeEnumeration::intersection(a, b).unwrap()), vec![5, 8]);
        let (a, b) = make();
        assert_eq!(ids(MergeEnumeration::difference(a, b).unwrap()), vec![1]);
    }

    #[test]
    fn test_unsorted_inputs_are_normalised() {
        let tree = create_test_tree();
        let a = enumerate(vec![tree.node(8), tree.node(1), tree.node(8)], false);
        let b = enumerate(vec![tree.node(6)], true);
        let merged = MergeEnumeration::union(a, b).unwrap();
        assert!(merged.is_document_sorted());
        assert_eq!(ids(merged), vec![1, 6, 8]);
    }

    #[test]
    fn test_union_with_empty_side() {
        let tree = create_test_tree();
        let a = enumerate(vec![], true);
        let b = enumerate(vec![tree.node(4), tree.node(9)], true);
        assert_eq!(ids(MergeEnumeration::union(a, b).unwrap()), vec![4, 9]);
    }
}
