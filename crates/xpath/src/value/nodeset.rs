//! Node-set values: empty, singleton, extensional (array backed) and intensional (an
//! expression enumerated on demand).
use crate::ast::{Expression, SetOperator};
use crate::context::Context;
use crate::datasource::TreeNode;
use crate::enumeration::{Enumeration, ExtentEnumeration, SingletonEnumeration};
use crate::error::{Result, XPathError};
use crate::value::{Value, number::string_to_number};
use std::fmt;
use std::sync::{Arc, OnceLock};

#[cfg(test)]
thread_local! {
    static SORT_COMPARISONS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[cfg(test)]
pub(crate) fn take_sort_comparisons() -> usize {
    SORT_COMPARISONS.with(|c| c.replace(0))
}

/// An array of nodes plus what is known about its order.
#[derive(Clone)]
pub struct NodeSetExtent<N> {
    nodes: Arc<[N]>,
    sorted: bool,
    reverse_sorted: bool,
    /// Document-ordered copy of an unsorted extent, shared by clones.
    ordered: Arc<OnceLock<Arc<[N]>>>,
}

impl<N: fmt::Debug> fmt::Debug for NodeSetExtent<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSetExtent")
            .field("nodes", &self.nodes)
            .field("sorted", &self.sorted)
            .finish()
    }
}

impl<N: PartialEq> PartialEq for NodeSetExtent<N> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl<N: TreeNode> NodeSetExtent<N> {
    /// Wraps `nodes`. `sorted` asserts document order without duplicates; fewer than two
    /// nodes are always sorted.
    pub fn new(nodes: Vec<N>, sorted: bool) -> Self {
        let trivial = nodes.len() < 2;
        Self {
            nodes: nodes.into(),
            sorted: sorted || trivial,
            reverse_sorted: trivial,
            ordered: Arc::default(),
        }
    }

    pub fn from_enumeration(enumeration: Enumeration<'_, N>) -> Result<Self> {
        let sorted = enumeration.is_document_sorted();
        let reverse_sorted = enumeration.is_reverse_sorted();
        let nodes: Vec<N> = enumeration.collect::<Result<_>>()?;
        let trivial = nodes.len() < 2;
        Ok(Self {
            nodes: nodes.into(),
            sorted: sorted || trivial,
            reverse_sorted: reverse_sorted || trivial,
            ordered: Arc::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Returns the set in document order without duplicates. Already sorted sets are
    /// shared, reverse sorted sets are reversed, anything else is sorted by order key and
    /// compacted. The result is computed once per extent.
    pub fn sort(&self) -> Self {
        if self.sorted {
            return self.clone();
        }
        let nodes = self.ordered.get_or_init(|| self.document_order()).clone();
        let trivial = nodes.len() < 2;
        Self {
            nodes,
            sorted: true,
            reverse_sorted: trivial,
            ordered: Arc::default(),
        }
    }

    fn document_order(&self) -> Arc<[N]> {
        let mut nodes = self.nodes.to_vec();
        if self.reverse_sorted {
            nodes.reverse();
            return nodes.into();
        }
        nodes.sort_unstable_by(|a, b| {
            #[cfg(test)]
            SORT_COMPARISONS.with(|c| c.set(c.get() + 1));
            a.order_key().cmp(&b.order_key())
        });
        nodes.dedup_by_key(|n| n.order_key());
        log::trace!("sorted node-set of {} nodes into {}", self.nodes.len(), nodes.len());
        nodes.into()
    }

    pub fn enumerate(&self) -> ExtentEnumeration<N> {
        ExtentEnumeration::new(self.nodes.clone(), self.sorted, self.reverse_sorted)
    }

    /// The first node in document order.
    pub fn first(&self) -> Option<N> {
        if self.sorted {
            self.nodes.first().copied()
        } else if self.reverse_sorted {
            self.nodes.last().copied()
        } else {
            self.nodes.iter().copied().min_by_key(|n| n.order_key())
        }
    }

    pub fn contains(&self, node: &N) -> bool {
        let key = node.order_key();
        if self.sorted {
            self.nodes.binary_search_by(|n| n.order_key().cmp(&key)).is_ok()
        } else {
            self.nodes.iter().any(|n| n.order_key() == key)
        }
    }

    /// Collapses to the cheapest node-set form.
    pub fn simplify(self) -> NodeSetValue<N> {
        match self.nodes.len() {
            0 => NodeSetValue::Empty,
            1 => NodeSetValue::Singleton(self.nodes[0]),
            _ => NodeSetValue::Extent(self),
        }
    }
}

struct IntentInner<N> {
    expression: Expression<N>,
    extent: OnceLock<NodeSetExtent<N>>,
}

/// A node-set defined by a context-free expression. Enumeration is deferred until the value
/// is consumed; anything that needs random access materialises a sorted extent once.
pub struct NodeSetIntent<N> {
    inner: Arc<IntentInner<N>>,
}

impl<N> Clone for NodeSetIntent<N> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<N> PartialEq for NodeSetIntent<N> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<N: fmt::Debug> fmt::Debug for NodeSetIntent<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSetIntent")
            .field("expression", &self.inner.expression)
            .field("fixed", &self.inner.extent.get().is_some())
            .finish()
    }
}

impl<N: TreeNode> NodeSetIntent<N> {
    pub fn new(expression: Expression<N>) -> Result<Self> {
        let deps = expression.dependencies();
        if !deps.is_empty() {
            return Err(XPathError::internal(format!(
                "node-set intent over a context-dependent expression {} ({:?})",
                expression, deps
            )));
        }
        Ok(Self {
            inner: Arc::new(IntentInner {
                expression,
                extent: OnceLock::new(),
            }),
        })
    }

    pub fn expression(&self) -> &Expression<N> {
        &self.inner.expression
    }

    pub fn is_fixed(&self) -> bool {
        self.inner.extent.get().is_some()
    }

    fn raw_enumeration(&self) -> Result<Enumeration<'_, N>> {
        self.inner.expression.enumerate(&Context::standalone())
    }

    /// Materialises the sorted extent, once.
    pub fn fix(&self) -> Result<&NodeSetExtent<N>> {
        if let Some(extent) = self.inner.extent.get() {
            return Ok(extent);
        }
        let extent = NodeSetExtent::from_enumeration(self.raw_enumeration()?)?.sort();
        let _ = self.inner.extent.set(extent);
        self.inner
            .extent
            .get()
            .ok_or_else(|| XPathError::internal("node-set extent was not retained"))
    }

    /// True when enumerating yields document order without materialising an extent.
    pub fn is_in_document_order(&self) -> Result<bool> {
        if self.is_fixed() {
            return Ok(true);
        }
        Ok(self.raw_enumeration()?.is_document_sorted())
    }

    /// Nodes in document order.
    pub fn enumerate(&self) -> Result<Enumeration<'_, N>> {
        if let Some(extent) = self.inner.extent.get() {
            return Ok(Box::new(extent.enumerate()));
        }
        let enumeration = self.raw_enumeration()?;
        if enumeration.is_document_sorted() {
            Ok(enumeration)
        } else {
            drop(enumeration);
            Ok(Box::new(self.fix()?.enumerate()))
        }
    }

    pub fn count(&self) -> Result<usize> {
        if let Some(extent) = self.inner.extent.get() {
            return Ok(extent.len());
        }
        let enumeration = self.raw_enumeration()?;
        if enumeration.is_document_sorted() {
            let mut count = 0;
            for node in enumeration {
                node?;
                count += 1;
            }
            Ok(count)
        } else {
            drop(enumeration);
            Ok(self.fix()?.len())
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        if let Some(extent) = self.inner.extent.get() {
            return Ok(extent.is_empty());
        }
        Ok(self.raw_enumeration()?.next().transpose()?.is_none())
    }

    pub fn first(&self) -> Result<Option<N>> {
        if let Some(extent) = self.inner.extent.get() {
            return Ok(extent.first());
        }
        let mut enumeration = self.raw_enumeration()?;
        if enumeration.is_document_sorted() {
            enumeration.next().transpose()
        } else {
            drop(enumeration);
            Ok(self.fix()?.first())
        }
    }

    pub fn contains(&self, node: &N) -> Result<bool> {
        Ok(self.fix()?.contains(node))
    }
}

/// A node-set value.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSetValue<N> {
    Empty,
    Singleton(N),
    Extent(NodeSetExtent<N>),
    Intent(NodeSetIntent<N>),
}

impl<N: TreeNode> NodeSetValue<N> {
    pub fn from_nodes(nodes: Vec<N>, sorted: bool) -> Self {
        NodeSetExtent::new(nodes, sorted).simplify()
    }

    /// Nodes in document order.
    pub fn enumerate(&self) -> Result<Enumeration<'_, N>> {
        match self {
            NodeSetValue::Empty => Ok(Box::new(SingletonEnumeration::new(None))),
            NodeSetValue::Singleton(node) => Ok(Box::new(SingletonEnumeration::new(Some(*node)))),
            NodeSetValue::Extent(extent) => Ok(Box::new(extent.sort().enumerate())),
            NodeSetValue::Intent(intent) => intent.enumerate(),
        }
    }

    /// An enumeration that owns its nodes. Intensional sets are materialised first.
    pub fn into_enumeration<'e>(self) -> Result<Enumeration<'e, N>>
    where
        N: 'e,
    {
        match self {
            NodeSetValue::Empty => Ok(Box::new(SingletonEnumeration::new(None))),
            NodeSetValue::Singleton(node) => Ok(Box::new(SingletonEnumeration::new(Some(node)))),
            NodeSetValue::Extent(extent) => Ok(Box::new(extent.sort().enumerate())),
            NodeSetValue::Intent(intent) => Ok(Box::new(intent.fix()?.enumerate())),
        }
    }

    /// The same set in document order. An intent that already enumerates in order stays
    /// lazy; other intents and unsorted extents are sorted into an extent.
    pub fn sorted(&self) -> Result<Self> {
        Ok(match self {
            NodeSetValue::Extent(extent) => extent.sort().simplify(),
            NodeSetValue::Intent(intent) => {
                if intent.is_in_document_order()? {
                    self.clone()
                } else {
                    intent.fix()?.clone().simplify()
                }
            }
            other => other.clone(),
        })
    }

    pub fn count(&self) -> Result<usize> {
        match self {
            NodeSetValue::Empty => Ok(0),
            NodeSetValue::Singleton(_) => Ok(1),
            NodeSetValue::Extent(extent) if extent.is_sorted() => Ok(extent.len()),
            NodeSetValue::Extent(extent) => Ok(extent.sort().len()),
            NodeSetValue::Intent(intent) => intent.count(),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        match self {
            NodeSetValue::Empty => Ok(true),
            NodeSetValue::Singleton(_) => Ok(false),
            NodeSetValue::Extent(extent) => Ok(extent.is_empty()),
            NodeSetValue::Intent(intent) => intent.is_empty(),
        }
    }

    /// The first node in document order.
    pub fn first(&self) -> Result<Option<N>> {
        match self {
            NodeSetValue::Empty => Ok(None),
            NodeSetValue::Singleton(node) => Ok(Some(*node)),
            NodeSetValue::Extent(extent) => Ok(extent.first()),
            NodeSetValue::Intent(intent) => intent.first(),
        }
    }

    pub fn contains(&self, node: &N) -> Result<bool> {
        match self {
            NodeSetValue::Empty => Ok(false),
            NodeSetValue::Singleton(n) => Ok(n == node),
            NodeSetValue::Extent(extent) => Ok(extent.contains(node)),
            NodeSetValue::Intent(intent) => intent.contains(node),
        }
    }

    /// All nodes in document order.
    pub fn to_vec(&self) -> Result<Vec<N>> {
        self.enumerate()?.collect()
    }

    pub fn as_string(&self) -> Result<String> {
        Ok(self.first()?.map(|n| n.string_value()).unwrap_or_default())
    }

    pub fn as_number(&self) -> Result<f64> {
        Ok(string_to_number(&self.as_string()?))
    }

    pub fn as_boolean(&self) -> Result<bool> {
        Ok(!self.is_empty()?)
    }

    fn combine(&self, op: SetOperator, other: &Self) -> Result<Self> {
        let expression = Expression::set_operation(
            op,
            Expression::Literal(Value::NodeSet(self.clone())),
            Expression::Literal(Value::NodeSet(other.clone())),
        );
        Ok(NodeSetValue::Intent(NodeSetIntent::new(expression)?))
    }

    /// Nodes in either set, merged lazily.
    pub fn union(&self, other: &Self) -> Result<Self> {
        self.combine(SetOperator::Union, other)
    }

    /// Nodes in both sets, merged lazily.
    pub fn intersection(&self, other: &Self) -> Result<Self> {
        self.combine(SetOperator::Intersect, other)
    }

    /// Nodes in this set but not in `other`, merged lazily.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        self.combine(SetOperator::Except, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    fn ids(value: &NodeSetValue<MockNode<'_>>) -> Vec<usize> {
        value.to_vec().unwrap().iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_sort_of_sorted_extent_does_no_work() {
        let tree = create_test_tree();
        let extent = NodeSetExtent::new(vec![tree.node(1), tree.node(5), tree.node(8)], true);
        take_sort_comparisons();
        let sorted = extent.sort();
        assert_eq!(take_sort_comparisons(), 0);
        assert_eq!(sorted, extent);
    }

    #[test]
    fn test_sort_of_reverse_sorted_extent_reverses() {
        let tree = create_test_tree();
        let nodes: Vec<_> = [8, 6, 1].iter().map(|&i| tree.node(i)).collect();
        let extent = NodeSetExtent {
            nodes: nodes.into(),
            sorted: false,
            reverse_sorted: true,
            ordered: Arc::default(),
        };
        take_sort_comparisons();
        let sorted = extent.sort();
        assert_eq!(take_sort_comparisons(), 0);
        let got: Vec<_> = sorted.nodes().iter().map(|n| n.id).collect();
        assert_eq!(got, vec![1, 6, 8]);
    }

    #[test]
    fn test_sort_removes_duplicates() {
        let tree = create_test_tree();
        let nodes: Vec<_> = [8, 1, 6, 1, 8].iter().map(|&i| tree.node(i)).collect();
        let sorted = NodeSetExtent::new(nodes, false).sort();
        let got: Vec<_> = sorted.nodes().iter().map(|n| n.id).collect();
        assert_eq!(got, vec![1, 6, 8]);
        assert!(sorted.contains(&tree.node(6)));
        assert!(!sorted.contains(&tree.node(5)));
    }

    #[test]
    fn test_first_of_unsorted_extent() {
        let tree = create_test_tree();
        let extent = NodeSetExtent::new(vec![tree.node(8), tree.node(4), tree.node(6)], false);
        assert_eq!(extent.first(), Some(tree.node(4)));
    }

    #[test]
    fn test_value_set_operations() {
        let tree = create_test_tree();
        let a = NodeSetValue::from_nodes(vec![tree.node(1), tree.node(5), tree.node(8)], true);
        let b = NodeSetValue::from_nodes(vec![tree.node(8), tree.node(5), tree.node(6)], false);
        assert_eq!(ids(&a.union(&b).unwrap()), vec![1, 5, 6, 8]);
        assert_eq!(ids(&a.intersection(&b).unwrap()), vec![5, 8]);
        assert_eq!(ids(&a.difference(&b).unwrap()), vec![1]);
        assert_eq!(ids(&b.difference(&a).unwrap()), vec![6]);
    }

    #[test]
    fn test_union_with_self_is_identity() {
        let tree = create_test_tree();
        let a = NodeSetValue::from_nodes(vec![tree.node(4), tree.node(9)], true);
        let u = a.union(&a).unwrap();
        assert_eq!(ids(&u), vec![4, 9]);
        assert_eq!(u.count().unwrap(), 2);
    }

    #[test]
    fn test_intent_materialises_once() {
        let tree = create_test_tree();
        let a = NodeSetValue::from_nodes(vec![tree.node(6), tree.node(1)], false);
        let b = NodeSetValue::Singleton(tree.node(8));
        let NodeSetValue::Intent(intent) = a.union(&b).unwrap() else {
            panic!("expected an intent");
        };
        assert!(!intent.is_fixed());
        assert_eq!(intent.first().unwrap(), Some(tree.node(1)));
        assert!(!intent.is_fixed());
        assert!(intent.contains(&tree.node(8)).unwrap());
        assert!(intent.is_fixed());
        assert_eq!(intent.count().unwrap(), 3);
    }

    #[test]
    fn test_intersection_and_difference_partition_the_left_set() {
        let tree = create_test_tree();
        let pairs: [(&[usize], &[usize]); 6] = [
            (&[1, 5, 8], &[8, 5, 6]),
            (&[9, 4, 1, 4], &[1, 2, 3]),
            (&[], &[1, 6]),
            (&[6], &[]),
            (&[2, 3, 4, 9], &[9, 4, 3, 2]),
            (&[8, 7, 6, 5], &[0, 1]),
        ];
        for (left, right) in pairs {
            let set = |ids: &[usize]| {
                NodeSetValue::from_nodes(ids.iter().map(|&i| tree.node(i)).collect(), false)
            };
            let (a, b) = (set(left), set(right));
            let mut expected_a: Vec<usize> = left.to_vec();
            expected_a.sort_unstable();
            expected_a.dedup();

            let common = a.intersection(&b).unwrap();
            let only_a = a.difference(&b).unwrap();
            let rebuilt = common.union(&only_a).unwrap();
            assert_eq!(ids(&rebuilt), expected_a, "{:?} / {:?}", left, right);

            for id in ids(&only_a) {
                assert!(!right.contains(&id), "{} leaked from {:?}", id, right);
            }
            let mut expected_union: Vec<usize> = left.iter().chain(right).copied().collect();
            expected_union.sort_unstable();
            expected_union.dedup();
            assert_eq!(ids(&a.union(&b).unwrap()), expected_union);
        }
    }

    #[test]
    fn test_unsorted_extent_sorts_once() {
        let tree = create_test_tree();
        let extent = NodeSetExtent::new(vec![tree.node(8), tree.node(1), tree.node(6)], false);
        take_sort_comparisons();
        let first = extent.sort();
        assert!(take_sort_comparisons() > 0);
        let again = extent.clone().sort();
        assert_eq!(take_sort_comparisons(), 0);
        assert_eq!(first, again);
        assert!(extent.contains(&tree.node(6)));
        assert!(!extent.contains(&tree.node(5)));
    }

    #[test]
    fn test_sorted_keeps_ordered_intent_lazy() {
        let tree = create_test_tree();
        let a = NodeSetValue::from_nodes(vec![tree.node(1), tree.node(6)], true);
        let b = NodeSetValue::from_nodes(vec![tree.node(6), tree.node(8)], true);
        let union = a.union(&b).unwrap();
        let sorted = union.sorted().unwrap();
        let NodeSetValue::Intent(intent) = &sorted else {
            panic!("expected an intent, got {:?}", sorted);
        };
        assert!(!intent.is_fixed());
        assert_eq!(ids(&sorted), vec![1, 6, 8]);
    }

    #[test]
    fn test_conversions_use_first_node() {
        let tree = create_test_tree();
        let set = NodeSetValue::from_nodes(vec![tree.node(8), tree.node(1)], false);
        assert_eq!(set.as_string().unwrap(), "Hello");
        assert!(set.as_boolean().unwrap());
        assert!(set.as_number().unwrap().is_nan());
        assert!(!NodeSetValue::<MockNode<'_>>::Empty.as_boolean().unwrap());
    }
}
