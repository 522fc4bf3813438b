//! Axis properties and the traversals behind each axis.
use crate::ast::{Axis, NodeKind, NodeTest};
use crate::context::LastPositionFinder;
use crate::datasource::{NodeType, TreeNode};
use crate::enumeration::NodeEnumeration;
use crate::error::Result;

impl Axis {
    pub fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "following" => Axis::Following,
            "following-sibling" => Axis::FollowingSibling,
            "namespace" => Axis::Namespace,
            "parent" => Axis::Parent,
            "preceding" => Axis::Preceding,
            "preceding-sibling" => Axis::PrecedingSibling,
            "self" => Axis::SelfAxis,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Attribute => "attribute",
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Following => "following",
            Axis::FollowingSibling => "following-sibling",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Preceding => "preceding",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::SelfAxis => "self",
        }
    }

    /// The node kind a bare name test selects on this axis.
    pub fn principal_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            Axis::Namespace => NodeKind::Namespace,
            _ => NodeKind::Element,
        }
    }

    /// Nodes come back in document order.
    pub fn is_sorted(self) -> bool {
        !self.is_reverse_sorted()
    }

    /// Nodes come back in reverse document order.
    pub fn is_reverse_sorted(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }

    /// No selected node is an ancestor of another.
    pub fn is_peer(self) -> bool {
        matches!(
            self,
            Axis::Attribute
                | Axis::Child
                | Axis::FollowingSibling
                | Axis::Namespace
                | Axis::Parent
                | Axis::PrecedingSibling
                | Axis::SelfAxis
        )
    }

    /// Every selected node is the origin or one of its descendants (attributes and
    /// namespaces included).
    pub fn is_within_subtree(self) -> bool {
        matches!(
            self,
            Axis::Attribute
                | Axis::Child
                | Axis::Descendant
                | Axis::DescendantOrSelf
                | Axis::Namespace
                | Axis::SelfAxis
        )
    }
}

fn is_tree_child<N: TreeNode>(node: &N) -> bool {
    !matches!(node.node_type(), NodeType::Attribute | NodeType::Namespace)
}

fn children<N: TreeNode>(node: &N) -> std::vec::IntoIter<N> {
    node.children().collect::<Vec<_>>().into_iter()
}

/// Siblings after (`after == true`) or before the node, in document order.
fn siblings<N: TreeNode>(node: &N, after: bool) -> Vec<N> {
    if !is_tree_child(node) {
        return Vec::new();
    }
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    let all: Vec<N> = parent.children().collect();
    match all.iter().position(|n| n == node) {
        Some(i) if after => all[i + 1..].to_vec(),
        Some(i) => all[..i].to_vec(),
        None => Vec::new(),
    }
}

fn push_reverse_preorder<N: TreeNode>(node: N, out: &mut Vec<N>) {
    let kids: Vec<N> = node.children().collect();
    for child in kids.into_iter().rev() {
        push_reverse_preorder(child, out);
    }
    out.push(node);
}

/// All nodes before `node` in document order that are not its ancestors, nearest first.
fn preceding<N: TreeNode>(node: &N) -> Vec<N> {
    let mut origin = *node;
    if !is_tree_child(node) {
        match node.parent() {
            Some(parent) => origin = parent,
            None => return Vec::new(),
        }
    }
    let mut out = Vec::new();
    let mut current = Some(origin);
    while let Some(c) = current {
        for sibling in siblings(&c, false).into_iter().rev() {
            push_reverse_preorder(sibling, &mut out);
        }
        current = c.parent();
    }
    out
}

/// Seeds a preorder walk with the following siblings of each ancestor-or-self, outermost at
/// the bottom of the stack.
fn following_stack<N: TreeNode>(node: &N) -> Vec<std::vec::IntoIter<N>> {
    let mut levels = Vec::new();
    let mut current = *node;
    if !is_tree_child(node) {
        match node.parent() {
            Some(parent) => {
                levels.push(children(&parent));
                current = parent;
            }
            None => return levels,
        }
    }
    let mut chain = vec![current];
    while let Some(parent) = chain.last().and_then(|n| n.parent()) {
        chain.push(parent);
    }
    let mut stack: Vec<std::vec::IntoIter<N>> = chain
        .iter()
        .rev()
        .map(|n| siblings(n, true).into_iter())
        .collect();
    stack.extend(levels);
    stack
}

enum Traversal<N> {
    List(std::vec::IntoIter<N>),
    Preorder {
        stack: Vec<std::vec::IntoIter<N>>,
        pending_self: Option<N>,
    },
    Ancestors {
        next: Option<N>,
    },
}

/// The nodes on one axis from one origin that pass a node test.
pub struct AxisEnumeration<'e, N> {
    axis: Axis,
    traversal: Traversal<N>,
    test: Option<&'e NodeTest>,
}

impl<'e, N: TreeNode> AxisEnumeration<'e, N> {
    pub fn new(axis: Axis, origin: N, test: Option<&'e NodeTest>) -> Self {
        let traversal = match axis {
            Axis::Child => Traversal::List(children(&origin)),
            Axis::Attribute => Traversal::List(origin.attributes().collect::<Vec<_>>().into_iter()),
            Axis::Namespace => Traversal::List(origin.namespaces().collect::<Vec<_>>().into_iter()),
            Axis::SelfAxis => Traversal::List(vec![origin].into_iter()),
            Axis::Parent => Traversal::List(origin.parent().into_iter().collect::<Vec<_>>().into_iter()),
            Axis::FollowingSibling => Traversal::List(siblings(&origin, true).into_iter()),
            Axis::PrecedingSibling => {
                let mut before = siblings(&origin, false);
                before.reverse();
                Traversal::List(before.into_iter())
            }
            Axis::Preceding => Traversal::List(preceding(&origin).into_iter()),
            Axis::Descendant => Traversal::Preorder {
                stack: vec![children(&origin)],
                pending_self: None,
            },
            Axis::DescendantOrSelf => Traversal::Preorder {
                stack: vec![children(&origin)],
                pending_self: Some(origin),
            },
            Axis::Following => Traversal::Preorder {
                stack: following_stack(&origin),
                pending_self: None,
            },
            Axis::Ancestor => Traversal::Ancestors {
                next: origin.parent(),
            },
            Axis::AncestorOrSelf => Traversal::Ancestors { next: Some(origin) },
        };
        Self {
            axis,
            traversal,
            test,
        }
    }

    fn advance(&mut self) -> Option<N> {
        match &mut self.traversal {
            Traversal::List(nodes) => nodes.next(),
            Traversal::Preorder {
                stack,
                pending_self,
            } => {
                if let Some(node) = pending_self.take() {
                    return Some(node);
                }
                while let Some(top) = stack.last_mut() {
                    match top.next() {
                        Some(node) => {
                            stack.push(children(&node));
                            return Some(node);
                        }
                        None => {
                            stack.pop();
                        }
                    }
                }
                None
            }
            Traversal::Ancestors { next } => {
                let node = next.take()?;
                *next = node.parent();
                Some(node)
            }
        }
    }
}

impl<N: TreeNode> Iterator for AxisEnumeration<'_, N> {
    type Item = Result<N>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.advance()?;
            if self.test.is_none_or(|t| t.matches(&node)) {
                return Some(Ok(node));
            }
        }
    }
}

impl<N: TreeNode> NodeEnumeration<N> for AxisEnumeration<'_, N> {
    fn is_document_sorted(&self) -> bool {
        self.axis.is_sorted()
    }

    fn is_reverse_sorted(&self) -> bool {
        self.axis.is_reverse_sorted()
    }

    fn is_peer(&self) -> bool {
        self.axis.is_peer()
    }

    fn last_position_finder(&self) -> Option<&dyn LastPositionFinder> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NameTest;
    use crate::datasource::ExpandedName;
    use crate::datasource::tests::{MockNode, MockTree, create_test_tree};

    fn ids(axis: Axis, origin: MockNode<'_>, test: Option<&NodeTest>) -> Vec<usize> {
        AxisEnumeration::new(axis, origin, test)
            .map(|n| n.unwrap().id)
            .collect()
    }

    /// ```text
    /// <a>             0 root, 1 a
    ///   <b x="1">     2 b, 3 @x
    ///     <c/>        4
    ///     <d/>        5
    ///   </b>
    ///   <e>           6
    ///     <f/>        7
    ///   </e>
    /// </a>
    /// ```
    fn nested_tree() -> MockTree {
        MockTree::builder()
            .element("a")
            .element("b")
            .attribute("x", "1")
            .element("c")
            .end()
            .element("d")
            .end()
            .end()
            .element("e")
            .element("f")
            .end()
            .end()
            .end()
            .build()
    }

    #[test]
    fn test_forward_axes() {
        let tree = nested_tree();
        assert_eq!(ids(Axis::Child, tree.node(1), None), vec![2, 6]);
        assert_eq!(ids(Axis::Descendant, tree.node(1), None), vec![2, 4, 5, 6, 7]);
        assert_eq!(ids(Axis::DescendantOrSelf, tree.node(2), None), vec![2, 4, 5]);
        assert_eq!(ids(Axis::Following, tree.node(4), None), vec![5, 6, 7]);
        assert_eq!(ids(Axis::FollowingSibling, tree.node(2), None), vec![6]);
        assert_eq!(ids(Axis::Attribute, tree.node(2), None), vec![3]);
        assert_eq!(ids(Axis::Parent, tree.node(3), None), vec![2]);
    }

    #[test]
    fn test_following_from_attribute_includes_owner_content() {
        let tree = nested_tree();
        assert_eq!(ids(Axis::Following, tree.node(3), None), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_reverse_axes_are_nearest_first() {
        let tree = nested_tree();
        assert_eq!(ids(Axis::Ancestor, tree.node(4), None), vec![2, 1, 0]);
        assert_eq!(ids(Axis::AncestorOrSelf, tree.node(4), None), vec![4, 2, 1, 0]);
        assert_eq!(ids(Axis::Preceding, tree.node(7), None), vec![5, 4, 2]);
        assert_eq!(ids(Axis::PrecedingSibling, tree.node(5), None), vec![4]);
        assert!(ids(Axis::PrecedingSibling, tree.node(3), None).is_empty());
    }

    #[test]
    fn test_node_test_filters_axis() {
        let tree = create_test_tree();
        let para = NodeTest::new(NodeKind::Element, NameTest::Name(ExpandedName::local("para")));
        assert_eq!(ids(Axis::Child, tree.root(), Some(&para)), vec![1, 8]);
        let text = NodeTest::kind(NodeKind::Text);
        assert_eq!(ids(Axis::Descendant, tree.root(), Some(&text)), vec![4, 9]);
        let comment = NodeTest::kind(NodeKind::Comment);
        assert_eq!(ids(Axis::Child, tree.root(), Some(&comment)), vec![5]);
    }

    #[test]
    fn test_axis_flags() {
        assert!(Axis::Child.is_peer() && Axis::Child.is_within_subtree());
        assert!(!Axis::Descendant.is_peer());
        assert!(Axis::Preceding.is_reverse_sorted() && !Axis::Preceding.is_sorted());
        assert!(!Axis::Following.is_within_subtree());
        assert_eq!(Axis::from_name("preceding-sibling"), Some(Axis::PrecedingSibling));
        assert_eq!(Axis::from_name("sideways"), None);
        assert_eq!(Axis::Attribute.principal_kind(), NodeKind::Attribute);
    }
}
