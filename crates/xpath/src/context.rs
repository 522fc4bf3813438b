//! The dynamic evaluation context: focus, variables and the controller handle.
use crate::datasource::{ExpandedName, TreeNode};
use crate::error::{Result, XPathError};
use crate::functions::format_number::DecimalFormat;
use crate::value::{FragmentValue, Value};
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

/// A bitmask naming the parts of the dynamic context an expression reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dependencies(u8);

impl Dependencies {
    pub const NONE: Dependencies = Dependencies(0);
    pub const VARIABLES: Dependencies = Dependencies(1);
    pub const CURRENT_NODE: Dependencies = Dependencies(4);
    pub const CONTEXT_NODE: Dependencies = Dependencies(8);
    pub const POSITION: Dependencies = Dependencies(16);
    pub const LAST: Dependencies = Dependencies(32);
    pub const CONTROLLER: Dependencies = Dependencies(64);
    pub const ALL: Dependencies = Dependencies(255);
    /// The facets that stay fixed across the items of a node list: variables, the current
    /// node and the controller.
    pub const XSLT_CONTEXT: Dependencies = Dependencies(1 | 4 | 64);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Dependencies) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Dependencies) -> bool {
        self.0 & other.0 != 0
    }

    pub fn without(self, other: Dependencies) -> Dependencies {
        Dependencies(self.0 & !other.0)
    }
}

impl BitOr for Dependencies {
    type Output = Dependencies;
    fn bitor(self, rhs: Self) -> Self {
        Dependencies(self.0 | rhs.0)
    }
}

impl BitAnd for Dependencies {
    type Output = Dependencies;
    fn bitand(self, rhs: Self) -> Self {
        Dependencies(self.0 & rhs.0)
    }
}

impl Not for Dependencies {
    type Output = Dependencies;
    fn not(self) -> Self {
        Dependencies(!self.0)
    }
}

/// Something that can compute the size of the node list being iterated, usually by reading
/// ahead.
pub trait LastPositionFinder {
    fn last_position(&self) -> Result<usize>;
}

/// How `last()` is answered in a context.
#[derive(Clone, Copy)]
pub enum LastPosition<'c> {
    Known(usize),
    Deferred(&'c dyn LastPositionFinder),
    Unknown,
}

impl fmt::Debug for LastPosition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastPosition::Known(n) => write!(f, "Known({})", n),
            LastPosition::Deferred(_) => write!(f, "Deferred"),
            LastPosition::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Runtime variable values.
pub trait VariableBindings<N> {
    fn value(&self, name: &ExpandedName) -> Option<Value<N>>;
}

/// A simple map of variable values keyed by expanded name.
#[derive(Debug, Clone)]
pub struct Bindery<N> {
    values: HashMap<ExpandedName, Value<N>>,
}

impl<N> Default for Bindery<N> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<N> Bindery<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: ExpandedName, value: Value<N>) {
        self.values.insert(name, value);
    }

    pub fn with(mut self, name: ExpandedName, value: Value<N>) -> Self {
        self.bind(name, value);
        self
    }
}

impl<N: Clone> VariableBindings<N> for Bindery<N> {
    fn value(&self, name: &ExpandedName) -> Option<Value<N>> {
        self.values.get(name).cloned()
    }
}

/// Host services reached through the context: keys, documents, properties, decimal formats
/// and fragment materialisation. Every method has a default that reports the service as
/// unavailable.
pub trait Controller<N>: Send + Sync {
    /// Nodes in `document` whose key `name` has the value `value`, in any order.
    fn select_by_key(&self, name: &ExpandedName, value: &str, document: N) -> Result<Vec<N>> {
        let _ = (value, document);
        Err(XPathError::evaluation(format!("Key {} has not been defined", name)))
    }

    /// The root of the document at `href`, resolved against `base` when given.
    fn load_document(&self, href: &str, base: Option<N>) -> Result<N> {
        let _ = base;
        Err(XPathError::evaluation(format!("Failed to load document {}", href)))
    }

    fn system_property(&self, name: &ExpandedName) -> Option<String> {
        let _ = name;
        None
    }

    /// The decimal format called `name`, or the default format for `None`.
    fn decimal_format(&self, name: Option<&ExpandedName>) -> Option<DecimalFormat> {
        let _ = name;
        None
    }

    /// Builds a tree from a fragment and returns its root.
    fn materialize_fragment(&self, fragment: &FragmentValue) -> Result<N> {
        let _ = fragment;
        Err(XPathError::evaluation(
            "Result tree fragments cannot be converted to node-sets here",
        ))
    }
}

/// The dynamic context of an evaluation. Cheap to clone; nested scopes derive new contexts
/// with the `with_*` methods.
pub struct Context<'c, N> {
    context_node: Option<N>,
    current_node: Option<N>,
    position: usize,
    last: LastPosition<'c>,
    bindings: Option<&'c dyn VariableBindings<N>>,
    controller: Option<Arc<dyn Controller<N>>>,
}

impl<N: Copy> Clone for Context<'_, N> {
    fn clone(&self) -> Self {
        Self {
            context_node: self.context_node,
            current_node: self.current_node,
            position: self.position,
            last: self.last,
            bindings: self.bindings,
            controller: self.controller.clone(),
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for Context<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("context_node", &self.context_node)
            .field("current_node", &self.current_node)
            .field("position", &self.position)
            .field("last", &self.last)
            .field("bindings", &self.bindings.is_some())
            .field("controller", &self.controller.is_some())
            .finish()
    }
}

impl<'c, N: TreeNode> Context<'c, N> {
    /// A context focused on a single node, which is also the current node.
    pub fn new(node: N) -> Self {
        Self {
            context_node: Some(node),
            current_node: Some(node),
            position: 1,
            last: LastPosition::Known(1),
            bindings: None,
            controller: None,
        }
    }

    /// A context with no focus, used for context-free evaluation.
    pub fn standalone() -> Self {
        Self {
            context_node: None,
            current_node: None,
            position: 1,
            last: LastPosition::Known(1),
            bindings: None,
            controller: None,
        }
    }

    pub fn with_context_node(mut self, node: N) -> Self {
        self.context_node = Some(node);
        self
    }

    pub fn with_current_node(mut self, node: N) -> Self {
        self.current_node = Some(node);
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    pub fn with_last(mut self, last: LastPosition<'c>) -> Self {
        self.last = last;
        self
    }

    pub fn with_bindings(mut self, bindings: &'c dyn VariableBindings<N>) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn with_controller(mut self, controller: Arc<dyn Controller<N>>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Derives the context for one item of a node list, keeping everything else.
    pub fn for_item(&self, node: N, position: usize, last: LastPosition<'c>) -> Self {
        let mut ctx = self.clone();
        ctx.context_node = Some(node);
        ctx.position = position;
        ctx.last = last;
        ctx
    }

    pub fn context_node(&self) -> Result<N> {
        self.context_node
            .ok_or_else(|| XPathError::evaluation("The context node is not set"))
    }

    pub fn context_node_opt(&self) -> Option<N> {
        self.context_node
    }

    pub fn current_node(&self) -> Result<N> {
        self.current_node
            .ok_or_else(|| XPathError::evaluation("The current node is not set"))
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn last(&self) -> Result<usize> {
        match self.last {
            LastPosition::Known(n) => Ok(n),
            LastPosition::Deferred(finder) => finder.last_position(),
            LastPosition::Unknown => Err(XPathError::evaluation(
                "The context size is not known",
            )),
        }
    }

    pub fn last_position(&self) -> LastPosition<'c> {
        self.last
    }

    pub fn variable(&self, name: &ExpandedName) -> Result<Value<N>> {
        self.bindings
            .and_then(|b| b.value(name))
            .ok_or_else(|| XPathError::evaluation(format!("Variable {} has no value", name)))
    }

    pub fn controller(&self) -> Option<&Arc<dyn Controller<N>>> {
        self.controller.as_ref()
    }

    pub fn require_controller(&self) -> Result<&Arc<dyn Controller<N>>> {
        self.controller
            .as_ref()
            .ok_or_else(|| XPathError::evaluation("No controller is available"))
    }
}
