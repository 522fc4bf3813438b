//! Host-supplied functions: the extension registry and calls to registered functions.
use crate::ast::{DataType, Expression};
use crate::context::{Context, Dependencies};
use crate::datasource::{ExpandedName, TreeNode};
use crate::error::Result;
use crate::value::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// A function implemented by the host and called from expressions.
pub trait ExtensionFunction<N>: Send + Sync {
    fn name(&self) -> &str;

    fn accepts_arity(&self, arity: usize) -> bool;

    /// Parts of the dynamic context the function reads besides its arguments.
    fn dependencies(&self) -> Dependencies {
        Dependencies::NONE
    }

    fn data_type(&self) -> DataType {
        DataType::Any
    }

    fn call(&self, args: &[Value<N>], context: &Context<'_, N>) -> Result<Value<N>>;
}

type Callback<N> = dyn Fn(&[Value<N>], &Context<'_, N>) -> Result<Value<N>> + Send + Sync;

/// An extension function backed by a closure.
pub struct FnExtension<N> {
    name: String,
    arity: RangeInclusive<usize>,
    dependencies: Dependencies,
    callback: Box<Callback<N>>,
}

impl<N> FnExtension<N> {
    pub fn new<F>(name: &str, arity: RangeInclusive<usize>, callback: F) -> Self
    where
        F: Fn(&[Value<N>], &Context<'_, N>) -> Result<Value<N>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            arity,
            dependencies: Dependencies::NONE,
            callback: Box::new(callback),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl<N> ExtensionFunction<N> for FnExtension<N> {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_arity(&self, arity: usize) -> bool {
        self.arity.contains(&arity)
    }

    fn dependencies(&self) -> Dependencies {
        self.dependencies
    }

    fn call(&self, args: &[Value<N>], context: &Context<'_, N>) -> Result<Value<N>> {
        (self.callback)(args, context)
    }
}

/// Extension functions keyed by namespace URI and local name; overloads are told apart by
/// the arities they accept.
pub struct ExtensionRegistry<N> {
    functions: HashMap<ExpandedName, Vec<Arc<dyn ExtensionFunction<N>>>>,
}

impl<N> Default for ExtensionRegistry<N> {
    fn default() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }
}

impl<N> ExtensionRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, uri: &str, function: Arc<dyn ExtensionFunction<N>>) {
        let name = ExpandedName::new(uri, function.name());
        self.functions.entry(name).or_default().push(function);
    }

    pub fn register_fn<F>(&mut self, uri: &str, name: &str, arity: RangeInclusive<usize>, f: F)
    where
        N: 'static,
        F: Fn(&[Value<N>], &Context<'_, N>) -> Result<Value<N>> + Send + Sync + 'static,
    {
        self.register(uri, Arc::new(FnExtension::new(name, arity, f)));
    }

    pub fn lookup(&self, name: &ExpandedName, arity: usize) -> Option<Arc<dyn ExtensionFunction<N>>> {
        self.functions
            .get(name)?
            .iter()
            .find(|f| f.accepts_arity(arity))
            .cloned()
    }

    pub fn names(&self) -> BTreeSet<ExpandedName> {
        self.functions.keys().cloned().collect()
    }
}

/// A call to a stylesheet or extension function.
pub struct ExtensionCall<N> {
    pub name: ExpandedName,
    pub display_name: String,
    pub function: Arc<dyn ExtensionFunction<N>>,
    pub args: Vec<Expression<N>>,
}

impl<N: Clone> Clone for ExtensionCall<N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            function: self.function.clone(),
            args: self.args.clone(),
        }
    }
}

impl<N: PartialEq> PartialEq for ExtensionCall<N> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && Arc::ptr_eq(&self.function, &other.function)
            && self.args == other.args
    }
}

impl<N: fmt::Debug> fmt::Debug for ExtensionCall<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionCall")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

impl<N: TreeNode> ExtensionCall<N> {
    pub fn dependencies(&self) -> Dependencies {
        self.args
            .iter()
            .fold(self.function.dependencies(), |deps, arg| deps | arg.dependencies())
    }

    pub fn evaluate(&self, context: &Context<'_, N>) -> Result<Value<N>> {
        let args = self
            .args
            .iter()
            .map(|arg| arg.evaluate(context))
            .collect::<Result<Vec<_>>>()?;
        self.function.call(&args, context)
    }

    pub fn simplify(self) -> Result<Expression<N>> {
        let args = self
            .args
            .into_iter()
            .map(Expression::simplify)
            .collect::<Result<Vec<_>>>()?;
        Ok(Expression::Extension(ExtensionCall { args, ..self }))
    }

    /// Reduces the arguments; when the function itself reads a facet named in `mask`, the
    /// call is evaluated on the spot.
    pub fn reduce(&self, mask: Dependencies, context: &Context<'_, N>) -> Result<Expression<N>> {
        if self.function.dependencies().intersects(mask) {
            return Ok(Expression::Literal(self.evaluate(context)?));
        }
        let args = self
            .args
            .iter()
            .map(|arg| arg.reduce(mask, context))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expression::Extension(ExtensionCall {
            args,
            ..self.clone()
        }))
    }
}
