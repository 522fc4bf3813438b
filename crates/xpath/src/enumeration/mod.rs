//! Lazy node enumerations and the flags that let consumers skip sorting work.
use crate::context::LastPositionFinder;
use crate::datasource::TreeNode;
use crate::error::Result;
use std::sync::Arc;

pub mod filter;
pub mod lookahead;
pub mod merge;
pub mod path;

pub use filter::FilterEnumeration;
pub use lookahead::LookaheadEnumeration;
pub use merge::MergeEnumeration;
pub use path::PathEnumeration;

/// A lazy sequence of nodes.
///
/// `is_document_sorted` promises strictly increasing document order with no duplicates;
/// `is_reverse_sorted` promises the exact reverse. `is_peer` promises that no node in the
/// sequence is an ancestor of another, which lets a following child or descendant step keep
/// the order.
pub trait NodeEnumeration<N>: Iterator<Item = Result<N>> {
    fn is_document_sorted(&self) -> bool;

    fn is_reverse_sorted(&self) -> bool {
        false
    }

    fn is_peer(&self) -> bool;

    /// Set when the enumeration can report its total length without consuming itself.
    fn last_position_finder(&self) -> Option<&dyn LastPositionFinder> {
        None
    }
}

pub type Enumeration<'e, N> = Box<dyn NodeEnumeration<N> + 'e>;

/// Drains an enumeration into a vector, stopping at the first error.
pub fn collect_nodes<N>(enumeration: Enumeration<'_, N>) -> Result<Vec<N>> {
    enumeration.collect()
}

/// An enumeration with no nodes.
pub fn empty<'e, N: TreeNode + 'e>() -> Enumeration<'e, N> {
    Box::new(SingletonEnumeration::<N>::new(None))
}

/// Yields zero or one node.
pub struct SingletonEnumeration<N> {
    node: Option<N>,
    size: usize,
}

impl<N> SingletonEnumeration<N> {
    pub fn new(node: Option<N>) -> Self {
        let size = usize::from(node.is_some());
        Self { node, size }
    }
}

impl<N> Iterator for SingletonEnumeration<N> {
    type Item = Result<N>;
    fn next(&mut self) -> Option<Self::Item> {
        self.node.take().map(Ok)
    }
}

impl<N> NodeEnumeration<N> for SingletonEnumeration<N> {
    fn is_document_sorted(&self) -> bool {
        true
    }
    fn is_reverse_sorted(&self) -> bool {
        true
    }
    fn is_peer(&self) -> bool {
        true
    }
    fn last_position_finder(&self) -> Option<&dyn LastPositionFinder> {
        Some(self)
    }
}

impl<N> LastPositionFinder for SingletonEnumeration<N> {
    fn last_position(&self) -> Result<usize> {
        Ok(self.size)
    }
}

/// Walks a shared node array.
pub struct ExtentEnumeration<N> {
    nodes: Arc<[N]>,
    index: usize,
    sorted: bool,
    reverse_sorted: bool,
}

impl<N> ExtentEnumeration<N> {
    pub fn new(nodes: Arc<[N]>, sorted: bool, reverse_sorted: bool) -> Self {
        Self {
            nodes,
            index: 0,
            sorted,
            reverse_sorted,
        }
    }
}

impl<N: Copy> Iterator for ExtentEnumeration<N> {
    type Item = Result<N>;
    fn next(&mut self) -> Option<Self::Item> {
        let node = self.nodes.get(self.index).copied()?;
        self.index += 1;
        Some(Ok(node))
    }
}

impl<N: Copy> NodeEnumeration<N> for ExtentEnumeration<N> {
    fn is_document_sorted(&self) -> bool {
        self.sorted
    }
    fn is_reverse_sorted(&self) -> bool {
        self.reverse_sorted
    }
    fn is_peer(&self) -> bool {
        false
    }
    fn last_position_finder(&self) -> Option<&dyn LastPositionFinder> {
        Some(self)
    }
}

impl<N> LastPositionFinder for ExtentEnumeration<N> {
    fn last_position(&self) -> Result<usize> {
        Ok(self.nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::create_test_tree;

    #[test]
    fn test_singleton_enumeration() {
        let tree = create_test_tree();
        let mut e = SingletonEnumeration::new(Some(tree.node(1)));
        assert_eq!(e.last_position_finder().map(|f| f.last_position().unwrap()), Some(1));
        assert_eq!(e.next().unwrap().unwrap(), tree.node(1));
        assert!(e.next().is_none());
        assert_eq!(e.last_position().unwrap(), 1);
    }

    #[test]
    fn test_extent_enumeration_reports_length() {
        let tree = create_test_tree();
        let nodes: Arc<[_]> = vec![tree.node(1), tree.node(6), tree.node(8)].into();
        let mut e = ExtentEnumeration::new(nodes, true, false);
        e.next();
        assert_eq!(e.last_position().unwrap(), 3);
        let rest: Vec<_> = e.map(|n| n.unwrap().id).collect();
        assert_eq!(rest, vec![6, 8]);
    }

    #[test]
    fn test_empty_helper() {
        let e = empty::<crate::datasource::tests::MockNode<'_>>();
        assert!(e.is_document_sorted());
        assert_eq!(collect_nodes(e).unwrap().len(), 0);
    }
}
