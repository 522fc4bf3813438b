//! The built-in function library.
//!
//! Every call to a built-in compiles to a [`FunctionCall`]. Functions that read the dynamic
//! context without an argument saying so (`position()`, `name()`, `key()`, ...) report it as an
//! intrinsic dependency. Reduction then either replaces the call with a constant or binds the
//! context facet into the call, so the reduced call no longer needs the context.
pub mod format_number;

use crate::ast::{DataType, Expression};
use crate::context::{Context, Controller, Dependencies};
use crate::datasource::{ExpandedName, TreeNode, XML_NAMESPACE};
use crate::error::{Result, XPathError};
use crate::static_context::{NameScope, XSLT_NAMESPACE};
use crate::value::number::round;
use crate::value::{NodeSetExtent, NodeSetValue, Value, string_to_number};
use std::fmt;
use std::sync::Arc;

pub const VENDOR: &str = "treepath";
pub const VENDOR_URL: &str = "https://crates.io/crates/treepath";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemFunction {
    Last,
    Position,
    Count,
    Current,
    Id,
    Key,
    Document,
    LocalName,
    NamespaceUri,
    Name,
    GenerateId,
    Not,
    True,
    False,
    Boolean,
    Lang,
    Number,
    Floor,
    Ceiling,
    Round,
    Sum,
    String,
    StartsWith,
    StringLength,
    Substring,
    Contains,
    SubstringBefore,
    SubstringAfter,
    NormalizeSpace,
    Translate,
    Concat,
    FormatNumber,
    SystemProperty,
    FunctionAvailable,
    ElementAvailable,
    UnparsedEntityUri,
}

impl SystemFunction {
    pub const ALL: [SystemFunction; 36] = [
        SystemFunction::Last,
        SystemFunction::Position,
        SystemFunction::Count,
        SystemFunction::Current,
        SystemFunction::Id,
        SystemFunction::Key,
        SystemFunction::Document,
        SystemFunction::LocalName,
        SystemFunction::NamespaceUri,
        SystemFunction::Name,
        SystemFunction::GenerateId,
        SystemFunction::Not,
        SystemFunction::True,
        SystemFunction::False,
        SystemFunction::Boolean,
        SystemFunction::Lang,
        SystemFunction::Number,
        SystemFunction::Floor,
        SystemFunction::Ceiling,
        SystemFunction::Round,
        SystemFunction::Sum,
        SystemFunction::String,
        SystemFunction::StartsWith,
        SystemFunction::StringLength,
        SystemFunction::Substring,
        SystemFunction::Contains,
        SystemFunction::SubstringBefore,
        SystemFunction::SubstringAfter,
        SystemFunction::NormalizeSpace,
        SystemFunction::Translate,
        SystemFunction::Concat,
        SystemFunction::FormatNumber,
        SystemFunction::SystemProperty,
        SystemFunction::FunctionAvailable,
        SystemFunction::ElementAvailable,
        SystemFunction::UnparsedEntityUri,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SystemFunction::Last => "last",
            SystemFunction::Position => "position",
            SystemFunction::Count => "count",
            SystemFunction::Current => "current",
            SystemFunction::Id => "id",
            SystemFunction::Key => "key",
            SystemFunction::Document => "document",
            SystemFunction::LocalName => "local-name",
            SystemFunction::NamespaceUri => "namespace-uri",
            SystemFunction::Name => "name",
            SystemFunction::GenerateId => "generate-id",
            SystemFunction::Not => "not",
            SystemFunction::True => "true",
            SystemFunction::False => "false",
            SystemFunction::Boolean => "boolean",
            SystemFunction::Lang => "lang",
            SystemFunction::Number => "number",
            SystemFunction::Floor => "floor",
            SystemFunction::Ceiling => "ceiling",
            SystemFunction::Round => "round",
            SystemFunction::Sum => "sum",
            SystemFunction::String => "string",
            SystemFunction::StartsWith => "starts-with",
            SystemFunction::StringLength => "string-length",
            SystemFunction::Substring => "substring",
            SystemFunction::Contains => "contains",
            SystemFunction::SubstringBefore => "substring-before",
            SystemFunction::SubstringAfter => "substring-after",
            SystemFunction::NormalizeSpace => "normalize-space",
            SystemFunction::Translate => "translate",
            SystemFunction::Concat => "concat",
            SystemFunction::FormatNumber => "format-number",
            SystemFunction::SystemProperty => "system-property",
            SystemFunction::FunctionAvailable => "function-available",
            SystemFunction::ElementAvailable => "element-available",
            SystemFunction::UnparsedEntityUri => "unparsed-entity-uri",
        }
    }

    pub fn from_name(name: &str) -> Option<SystemFunction> {
        SystemFunction::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Minimum and maximum argument counts; `None` means unbounded.
    pub fn arity(self) -> (usize, Option<usize>) {
        use SystemFunction::*;
        match self {
            Last | Position | Current | True | False => (0, Some(0)),
            Count | Id | Not | Boolean | Lang | Floor | Ceiling | Round | Sum
            | SystemProperty | FunctionAvailable | ElementAvailable | UnparsedEntityUri => {
                (1, Some(1))
            }
            Key | StartsWith | Contains | SubstringBefore | SubstringAfter => (2, Some(2)),
            Document => (1, Some(2)),
            LocalName | NamespaceUri | Name | GenerateId | Number | String | StringLength
            | NormalizeSpace => (0, Some(1)),
            Substring | FormatNumber => (2, Some(3)),
            Translate => (3, Some(3)),
            Concat => (2, None),
        }
    }

    pub fn check_arity(self, count: usize) -> Result<()> {
        let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
        let message = match self.arity() {
            (min, Some(max)) if min == max && count != min => Some(format!(
                "Function {} must have {} {}",
                self.name(),
                min,
                plural(min)
            )),
            (min, _) if count < min => Some(format!(
                "Function {} must have at least {} {}",
                self.name(),
                min,
                plural(min)
            )),
            (_, Some(max)) if count > max => Some(format!(
                "Function {} must have no more than {} {}",
                self.name(),
                max,
                plural(max)
            )),
            _ => None,
        };
        match message {
            Some(message) => Err(XPathError::arity(self.name(), message)),
            None => Ok(()),
        }
    }

    pub fn data_type(self) -> DataType {
        use SystemFunction::*;
        match self {
            Last | Position | Count | Number | Floor | Ceiling | Round | Sum | StringLength => {
                DataType::Number
            }
            Current | Id | Key | Document => DataType::NodeSet,
            Not | True | False | Boolean | Lang | StartsWith | Contains | FunctionAvailable
            | ElementAvailable => DataType::Boolean,
            SystemProperty => DataType::Any,
            _ => DataType::String,
        }
    }

    /// Functions that resolve lexical QNames given as arguments and need the namespaces in
    /// scope at the call site.
    pub fn needs_name_scope(self) -> bool {
        matches!(
            self,
            SystemFunction::Key
                | SystemFunction::FormatNumber
                | SystemFunction::SystemProperty
                | SystemFunction::FunctionAvailable
                | SystemFunction::ElementAvailable
        )
    }

    /// Functions that default to the context node when called without arguments.
    fn defaults_to_context_node(self) -> bool {
        use SystemFunction::*;
        matches!(
            self,
            LocalName | NamespaceUri | Name | GenerateId | Number | String | StringLength
                | NormalizeSpace
        )
    }
}

impl fmt::Display for SystemFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a call has captured its controller during reduction. A captured `None` means the
/// evaluation had no controller and the call falls back to its defaults.
enum ControllerBinding<N> {
    Unbound,
    Bound(Option<Arc<dyn Controller<N>>>),
}

impl<N> Clone for ControllerBinding<N> {
    fn clone(&self) -> Self {
        match self {
            ControllerBinding::Unbound => ControllerBinding::Unbound,
            ControllerBinding::Bound(c) => ControllerBinding::Bound(c.clone()),
        }
    }
}

impl<N> PartialEq for ControllerBinding<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ControllerBinding::Unbound, ControllerBinding::Unbound) => true,
            (ControllerBinding::Bound(None), ControllerBinding::Bound(None)) => true,
            (ControllerBinding::Bound(Some(a)), ControllerBinding::Bound(Some(b))) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

/// A call to a built-in function.
pub struct FunctionCall<N> {
    pub function: SystemFunction,
    pub args: Vec<Expression<N>>,
    bound_node: Option<N>,
    controller: ControllerBinding<N>,
    scope: Option<Arc<NameScope>>,
}

impl<N: Clone> Clone for FunctionCall<N> {
    fn clone(&self) -> Self {
        Self {
            function: self.function,
            args: self.args.clone(),
            bound_node: self.bound_node.clone(),
            controller: self.controller.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<N: PartialEq> PartialEq for FunctionCall<N> {
    fn eq(&self, other: &Self) -> bool {
        self.function == other.function
            && self.args == other.args
            && self.bound_node == other.bound_node
            && self.controller == other.controller
            && self.scope == other.scope
    }
}

impl<N: fmt::Debug> fmt::Debug for FunctionCall<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCall")
            .field("function", &self.function)
            .field("args", &self.args)
            .field("bound_node", &self.bound_node)
            .field(
                "controller_bound",
                &matches!(self.controller, ControllerBinding::Bound(_)),
            )
            .finish()
    }
}

fn node_set_result<N: TreeNode>(nodes: Vec<N>) -> Value<N> {
    Value::NodeSet(NodeSetExtent::new(nodes, false).sort().simplify())
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// `substring()` counting characters from 1, with the start and length rounded.
pub fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let rstart = round(start);
    let rend = length.map(|len| rstart + round(len));
    // NaN bounds fail both comparisons, so they select nothing.
    s.chars()
        .enumerate()
        .filter(|&(i, _)| {
            let pos = (i + 1) as f64;
            pos >= rstart && rend.is_none_or(|end| pos < end)
        })
        .map(|(_, c)| c)
        .collect()
}

pub fn normalize_space(s: &str) -> String {
    s.split(is_xml_whitespace)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn translate(s: &str, from: &str, to: &str) -> String {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect()
}

/// `lang()`: true when the nearest `xml:lang` equals `wanted`, or when its primary subtag (the
/// part before the first hyphen) equals `wanted`, ignoring case. `lang('en-GB')` therefore does
/// not match `en-GB-oed`.
pub fn lang<N: TreeNode>(wanted: &str, node: N) -> bool {
    let mut cursor = Some(node);
    while let Some(n) = cursor {
        if let Some(declared) = n.attribute_value(XML_NAMESPACE, "lang") {
            if declared.eq_ignore_ascii_case(wanted) {
                return true;
            }
            return declared
                .split_once('-')
                .is_some_and(|(primary, _)| primary.eq_ignore_ascii_case(wanted));
        }
        cursor = n.parent();
    }
    false
}

impl<N: TreeNode> FunctionCall<N> {
    pub fn new(function: SystemFunction, args: Vec<Expression<N>>) -> Self {
        Self {
            function,
            args,
            bound_node: None,
            controller: ControllerBinding::Unbound,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: Arc<NameScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn bound_node(&self) -> Option<N> {
        self.bound_node
    }

    pub fn data_type(&self) -> DataType {
        self.function.data_type()
    }

    /// What the function itself reads from the context, excluding its arguments.
    pub fn intrinsic_dependencies(&self) -> Dependencies {
        use SystemFunction::*;
        let node = if self.bound_node.is_none() {
            Dependencies::CONTEXT_NODE
        } else {
            Dependencies::NONE
        };
        let controller = match self.controller {
            ControllerBinding::Unbound => Dependencies::CONTROLLER,
            ControllerBinding::Bound(_) => Dependencies::NONE,
        };
        match self.function {
            Position => Dependencies::POSITION,
            Last => Dependencies::LAST,
            Current => Dependencies::CURRENT_NODE,
            f if f.defaults_to_context_node() && self.args.is_empty() => node,
            Lang | Id | UnparsedEntityUri => node,
            Key => node | controller,
            Document | FormatNumber | SystemProperty => controller,
            _ => Dependencies::NONE,
        }
    }

    pub fn dependencies(&self) -> Dependencies {
        self.args
            .iter()
            .fold(self.intrinsic_dependencies(), |deps, arg| {
                deps | arg.dependencies()
            })
    }

    pub fn simplify(self) -> Result<Expression<N>> {
        let args = self
            .args
            .into_iter()
            .map(Expression::simplify)
            .collect::<Result<Vec<_>>>()?;
        let call = FunctionCall { args, ..self };
        match call.function {
            SystemFunction::True => return Ok(Expression::boolean(true)),
            SystemFunction::False => return Ok(Expression::boolean(false)),
            _ => {}
        }
        if call.intrinsic_dependencies().is_empty() && call.args.iter().all(Expression::is_literal)
        {
            let value = call.evaluate(&Context::standalone())?;
            return Ok(Expression::Literal(value));
        }
        Ok(Expression::Function(call))
    }

    pub fn reduce(&self, mask: Dependencies, context: &Context<'_, N>) -> Result<Expression<N>> {
        if !self.dependencies().intersects(mask) {
            return Ok(Expression::Function(self.clone()));
        }
        let args = self
            .args
            .iter()
            .map(|arg| arg.reduce(mask, context))
            .collect::<Result<Vec<_>>>()?;
        let mut call = FunctionCall {
            args,
            ..self.clone()
        };
        let intrinsic = call.intrinsic_dependencies() & mask;
        match call.function {
            SystemFunction::Position if intrinsic.contains(Dependencies::POSITION) => {
                return Ok(Expression::number(context.position() as f64));
            }
            SystemFunction::Last if intrinsic.contains(Dependencies::LAST) => {
                return Ok(Expression::number(context.last()? as f64));
            }
            SystemFunction::Current if intrinsic.contains(Dependencies::CURRENT_NODE) => {
                return Ok(Expression::Literal(Value::NodeSet(NodeSetValue::Singleton(
                    context.current_node()?,
                ))));
            }
            _ => {}
        }
        if intrinsic.contains(Dependencies::CONTEXT_NODE) {
            call.bound_node = Some(context.context_node()?);
        }
        if intrinsic.contains(Dependencies::CONTROLLER) {
            call.controller = ControllerBinding::Bound(context.controller().cloned());
        }
        call.simplify()
    }

    fn focus(&self, context: &Context<'_, N>) -> Result<N> {
        match self.bound_node {
            Some(node) => Ok(node),
            None => context.context_node(),
        }
    }

    fn controller(&self, context: &Context<'_, N>) -> Option<Arc<dyn Controller<N>>> {
        match &self.controller {
            ControllerBinding::Bound(c) => c.clone(),
            ControllerBinding::Unbound => context.controller().cloned(),
        }
    }

    fn require_controller(&self, context: &Context<'_, N>) -> Result<Arc<dyn Controller<N>>> {
        self.controller(context).ok_or_else(|| {
            XPathError::evaluation(format!(
                "{}() needs a controller, but none is available",
                self.function
            ))
        })
    }

    fn resolve_name(&self, lexical: &str) -> Result<ExpandedName> {
        match &self.scope {
            Some(scope) => scope.resolve(lexical),
            None => NameScope::default().resolve(lexical),
        }
    }

    fn string_arg(&self, index: usize, context: &Context<'_, N>) -> Result<String> {
        self.args[index].evaluate_as_string(context)
    }

    fn number_arg(&self, index: usize, context: &Context<'_, N>) -> Result<f64> {
        self.args[index].evaluate_as_number(context)
    }

    fn node_set_arg(&self, index: usize, context: &Context<'_, N>) -> Result<NodeSetValue<N>> {
        let value = self.args[index].evaluate(context)?;
        match value {
            Value::NodeSet(_) | Value::Fragment(_) => value.as_node_set(context),
            other => Err(XPathError::type_error(format!(
                "The argument of {}() must be a node-set, not {:?}",
                self.function,
                other.data_type()
            ))),
        }
    }

    /// The node a context-defaulting function works on: its argument's first node, or the
    /// context node. `None` for an empty argument.
    fn target_node(&self, context: &Context<'_, N>) -> Result<Option<N>> {
        if self.args.is_empty() {
            self.focus(context).map(Some)
        } else {
            self.node_set_arg(0, context)?.first()
        }
    }

    pub fn evaluate(&self, context: &Context<'_, N>) -> Result<Value<N>> {
        use SystemFunction::*;
        Ok(match self.function {
            Last => Value::Number(context.last()? as f64),
            Position => Value::Number(context.position() as f64),
            Count => Value::Number(self.node_set_arg(0, context)?.count()? as f64),
            Current => Value::NodeSet(NodeSetValue::Singleton(context.current_node()?)),
            Id => self.id(context)?,
            Key => self.key(context)?,
            Document => self.document(context)?,
            LocalName => Value::String(
                self.target_node(context)?
                    .and_then(|n| n.name().map(|q| q.local_part.to_string()))
                    .unwrap_or_default(),
            ),
            NamespaceUri => Value::String(
                self.target_node(context)?
                    .and_then(|n| n.name().map(|q| q.uri().to_string()))
                    .unwrap_or_default(),
            ),
            Name => Value::String(
                self.target_node(context)?
                    .and_then(|n| n.name().map(|q| q.display_name()))
                    .unwrap_or_default(),
            ),
            GenerateId => Value::String(
                self.target_node(context)?
                    .map(|n| {
                        let key = n.order_key();
                        format!("d{}n{}", key.document, key.sequence)
                    })
                    .unwrap_or_default(),
            ),
            Not => Value::Boolean(!self.args[0].evaluate_as_boolean(context)?),
            True => Value::Boolean(true),
            False => Value::Boolean(false),
            Boolean => Value::Boolean(self.args[0].evaluate_as_boolean(context)?),
            Lang => Value::Boolean(lang(&self.string_arg(0, context)?, self.focus(context)?)),
            Number => Value::Number(if self.args.is_empty() {
                string_to_number(&self.focus(context)?.string_value())
            } else {
                self.number_arg(0, context)?
            }),
            Floor => Value::Number(self.number_arg(0, context)?.floor()),
            Ceiling => Value::Number(self.number_arg(0, context)?.ceil()),
            Round => Value::Number(round(self.number_arg(0, context)?)),
            Sum => {
                let set = self.node_set_arg(0, context)?;
                let mut total = 0.0;
                for node in set.enumerate()? {
                    total += string_to_number(&node?.string_value());
                }
                Value::Number(total)
            }
            String => Value::String(self.string_value_or_arg(context)?),
            StartsWith => Value::Boolean(
                self.string_arg(0, context)?
                    .starts_with(self.string_arg(1, context)?.as_str()),
            ),
            StringLength => {
                Value::Number(self.string_value_or_arg(context)?.chars().count() as f64)
            }
            Substring => {
                let s = self.string_arg(0, context)?;
                let start = self.number_arg(1, context)?;
                let length = match self.args.len() {
                    3 => Some(self.number_arg(2, context)?),
                    _ => None,
                };
                Value::String(substring(&s, start, length))
            }
            Contains => Value::Boolean(
                self.string_arg(0, context)?
                    .contains(self.string_arg(1, context)?.as_str()),
            ),
            SubstringBefore => {
                let s = self.string_arg(0, context)?;
                let sep = self.string_arg(1, context)?;
                Value::String(s.split_once(sep.as_str()).map(|(b, _)| b).unwrap_or("").to_string())
            }
            SubstringAfter => {
                let s = self.string_arg(0, context)?;
                let sep = self.string_arg(1, context)?;
                Value::String(s.split_once(sep.as_str()).map(|(_, a)| a).unwrap_or("").to_string())
            }
            NormalizeSpace => Value::String(normalize_space(&self.string_value_or_arg(context)?)),
            Translate => Value::String(translate(
                &self.string_arg(0, context)?,
                &self.string_arg(1, context)?,
                &self.string_arg(2, context)?,
            )),
            Concat => {
                let mut out = std::string::String::new();
                for arg in &self.args {
                    out.push_str(&arg.evaluate_as_string(context)?);
                }
                Value::String(out)
            }
            FormatNumber => self.format_number(context)?,
            SystemProperty => self.system_property(context)?,
            FunctionAvailable => {
                let name = self.resolve_name(&self.string_arg(0, context)?)?;
                Value::Boolean(self.scope().function_available(&name))
            }
            ElementAvailable => {
                let name = self.resolve_name(&self.string_arg(0, context)?)?;
                Value::Boolean(self.scope().element_available(&name))
            }
            UnparsedEntityUri => {
                let name = self.string_arg(0, context)?;
                Value::String(
                    self.focus(context)?
                        .document_root()
                        .unparsed_entity_uri(&name)
                        .unwrap_or_default(),
                )
            }
        })
    }

    fn scope(&self) -> Arc<NameScope> {
        self.scope.clone().unwrap_or_default()
    }

    fn string_value_or_arg(&self, context: &Context<'_, N>) -> Result<String> {
        if self.args.is_empty() {
            Ok(self.focus(context)?.string_value())
        } else {
            self.string_arg(0, context)
        }
    }

    /// Whitespace-separated tokens of the first argument: each node's string value for a
    /// node-set, the string itself otherwise.
    fn tokens_or_values(&self, index: usize, context: &Context<'_, N>) -> Result<Vec<String>> {
        let value = self.args[index].evaluate(context)?;
        match value {
            Value::NodeSet(set) => set
                .enumerate()?
                .map(|node| node.map(|n| n.string_value()))
                .collect(),
            other => Ok(vec![other.as_string()?]),
        }
    }

    fn id(&self, context: &Context<'_, N>) -> Result<Value<N>> {
        let document = self.focus(context)?.document_root();
        let mut found = Vec::new();
        for value in self.tokens_or_values(0, context)? {
            for token in value.split(is_xml_whitespace).filter(|t| !t.is_empty()) {
                if let Some(element) = document.element_by_id(token) {
                    found.push(element);
                }
            }
        }
        Ok(node_set_result(found))
    }

    fn key(&self, context: &Context<'_, N>) -> Result<Value<N>> {
        let name = self.resolve_name(&self.string_arg(0, context)?)?;
        let document = self.focus(context)?.document_root();
        let controller = self.require_controller(context)?;
        let mut found = Vec::new();
        for value in self.tokens_or_values(1, context)? {
            found.extend(controller.select_by_key(&name, &value, document)?);
        }
        Ok(node_set_result(found))
    }

    fn document(&self, context: &Context<'_, N>) -> Result<Value<N>> {
        let controller = self.require_controller(context)?;
        let base = match self.args.len() {
            2 => self.node_set_arg(1, context)?.first()?,
            _ => None,
        };
        let mut found = Vec::new();
        match self.args[0].evaluate(context)? {
            Value::NodeSet(set) => {
                for node in set.enumerate()? {
                    let node = node?;
                    let href = node.string_value();
                    found.push(controller.load_document(&href, base.or(Some(node)))?);
                }
            }
            other => found.push(controller.load_document(&other.as_string()?, base)?),
        }
        Ok(node_set_result(found))
    }

    fn format_number(&self, context: &Context<'_, N>) -> Result<Value<N>> {
        let value = self.number_arg(0, context)?;
        let pattern = self.string_arg(1, context)?;
        let controller = self.controller(context);
        let format = if self.args.len() == 3 {
            let name = self.resolve_name(&self.string_arg(2, context)?)?;
            controller
                .and_then(|c| c.decimal_format(Some(&name)))
                .ok_or_else(|| {
                    XPathError::evaluation(format!("decimal-format {} not registered", name))
                })?
        } else {
            controller
                .and_then(|c| c.decimal_format(None))
                .unwrap_or_default()
        };
        Ok(Value::String(format.format(value, &pattern)?))
    }

    fn system_property(&self, context: &Context<'_, N>) -> Result<Value<N>> {
        let name = self.resolve_name(&self.string_arg(0, context)?)?;
        if name.uri == XSLT_NAMESPACE {
            return Ok(match name.local.as_str() {
                "version" => Value::Number(1.0),
                "vendor" => Value::String(VENDOR.to_string()),
                "vendor-url" => Value::String(VENDOR_URL.to_string()),
                _ => Value::String(std::string::String::new()),
            });
        }
        let property = self
            .controller(context)
            .and_then(|c| c.system_property(&name))
            .unwrap_or_default();
        Ok(Value::String(property))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, MockTree, create_test_tree};
    use crate::functions::format_number::DecimalFormat;

    type Expr<'a> = Expression<MockNode<'a>>;

    fn call<'a>(function: SystemFunction, args: Vec<Expr<'a>>) -> FunctionCall<MockNode<'a>> {
        FunctionCall::new(function, args)
    }

    fn eval<'a>(function: SystemFunction, args: Vec<Expr<'a>>, node: MockNode<'a>) -> Value<MockNode<'a>> {
        call(function, args).evaluate(&Context::new(node)).unwrap()
    }

    fn node_arg(node: MockNode<'_>) -> Expr<'_> {
        Expression::Literal(Value::NodeSet(NodeSetValue::Singleton(node)))
    }

    #[test]
    fn test_lookup_and_arity() {
        assert_eq!(SystemFunction::from_name("substring-after"), Some(SystemFunction::SubstringAfter));
        assert_eq!(SystemFunction::from_name("frob"), None);
        assert!(SystemFunction::Concat.check_arity(5).is_ok());
        let err = SystemFunction::Concat.check_arity(1).unwrap_err();
        assert_eq!(
            err,
            XPathError::arity("concat", "Function concat must have at least 2 arguments")
        );
        let err = SystemFunction::Not.check_arity(2).unwrap_err();
        assert_eq!(err, XPathError::arity("not", "Function not must have 1 argument"));
        let err = SystemFunction::Substring.check_arity(4).unwrap_err();
        assert_eq!(
            err,
            XPathError::arity("substring", "Function substring must have no more than 3 arguments")
        );
        assert!(SystemFunction::ALL.iter().all(|f| SystemFunction::from_name(f.name()) == Some(*f)));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(substring("12345", 1.5, Some(2.6)), "234");
        assert_eq!(substring("12345", 0.0, Some(3.0)), "12");
        assert_eq!(substring("12345", f64::NAN, Some(3.0)), "");
        assert_eq!(substring("12345", 1.0, Some(f64::NAN)), "");
        assert_eq!(substring("12345", -42.0, Some(f64::INFINITY)), "12345");
        assert_eq!(substring("12345", f64::NEG_INFINITY, Some(f64::INFINITY)), "");
        assert_eq!(substring("12345", 2.0, Some(f64::NEG_INFINITY)), "");
        assert_eq!(substring("12345", 2.0, None), "2345");
        assert_eq!(substring("héllo", 2.0, Some(2.0)), "él");
        assert_eq!(normalize_space("  a \t b\n\nc  "), "a b c");
        assert_eq!(translate("--aaa--", "abc-", "ABC"), "AAA");
    }

    #[test]
    fn test_lang() {
        let tree = MockTree::builder()
            .element("doc")
            .attribute("xml:lang", "en-GB")
            .element("p")
            .text("x")
            .end()
            .element("q")
            .attribute("xml:lang", "fr")
            .end()
            .end()
            .build();
        let p = tree.node(3);
        assert!(lang("en", p));
        assert!(lang("EN-gb", p));
        assert!(!lang("fr", p));
        assert!(lang("fr", tree.node(5)));
        assert!(!lang("en", tree.root()));

        let oed = MockTree::builder()
            .element("doc")
            .attribute("xml:lang", "en-GB-oed")
            .end()
            .build();
        let doc = oed.node(1);
        assert!(lang("en", doc));
        assert!(!lang("en-GB", doc));
    }

    #[test]
    fn test_context_functions() {
        let tree = create_test_tree();
        let para = tree.node(1);
        assert_eq!(eval(SystemFunction::LocalName, vec![], para), Value::String("para".into()));
        assert_eq!(eval(SystemFunction::Name, vec![], para), Value::String("para".into()));
        assert_eq!(eval(SystemFunction::String, vec![], para), Value::String("Hello".into()));
        assert_eq!(eval(SystemFunction::StringLength, vec![], para), Value::Number(5.0));
        assert_eq!(
            eval(SystemFunction::LocalName, vec![Expression::empty_node_set()], para),
            Value::String(String::new())
        );
        assert_eq!(
            eval(SystemFunction::Count, vec![node_arg(para)], tree.root()),
            Value::Number(1.0)
        );
        assert_eq!(
            eval(SystemFunction::GenerateId, vec![], para),
            Value::String(format!("d{}n1", para.order_key().document))
        );
        assert_eq!(
            eval(SystemFunction::Lang, vec![Expression::string("en")], tree.node(4)),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_count_rejects_non_node_sets() {
        let tree = create_test_tree();
        let err = call(SystemFunction::Count, vec![Expression::number(1.0)])
            .evaluate(&Context::new(tree.root()))
            .unwrap_err();
        assert!(matches!(err, XPathError::Type(_)));
    }

    #[test]
    fn test_id_splits_tokens() {
        let tree = create_test_tree();
        let found = eval(SystemFunction::Id, vec![Expression::string(" p1  nope ")], tree.node(8));
        assert_eq!(found, Value::NodeSet(NodeSetValue::Singleton(tree.node(1))));
    }

    #[test]
    fn test_constant_calls_fold() {
        let folded: Expr<'_> = call(
            SystemFunction::Concat,
            vec![Expression::string("a"), Expression::number(1.0)],
        )
        .simplify()
        .unwrap();
        assert_eq!(folded, Expression::string("a1"));

        let kept: Expr<'_> = call(SystemFunction::StringLength, vec![]).simplify().unwrap();
        assert!(matches!(kept, Expression::Function(_)));
    }

    #[test]
    fn test_reduce_binds_context() {
        let tree = create_test_tree();
        let ctx = Context::new(tree.node(1)).with_position(3);

        let position = call(SystemFunction::Position, vec![]);
        assert_eq!(position.intrinsic_dependencies(), Dependencies::POSITION);
        assert_eq!(
            position.reduce(Dependencies::ALL, &ctx).unwrap(),
            Expression::number(3.0)
        );

        let name = call(SystemFunction::Name, vec![]);
        assert_eq!(name.intrinsic_dependencies(), Dependencies::CONTEXT_NODE);
        assert_eq!(
            name.reduce(Dependencies::CONTEXT_NODE, &ctx).unwrap(),
            Expression::string("para")
        );
        assert_eq!(
            name.reduce(Dependencies::POSITION, &ctx).unwrap(),
            Expression::Function(name.clone())
        );
    }

    #[test]
    fn test_format_number_without_controller() {
        let tree = create_test_tree();
        let value = eval(
            SystemFunction::FormatNumber,
            vec![Expression::number(1234.5), Expression::string("#,##0.00")],
            tree.root(),
        );
        assert_eq!(value, Value::String("1,234.50".into()));

        let err = call(
            SystemFunction::FormatNumber,
            vec![
                Expression::number(1.0),
                Expression::string("0"),
                Expression::string("euro"),
            ],
        )
        .evaluate(&Context::new(tree.root()))
        .unwrap_err();
        assert_eq!(err, XPathError::evaluation("decimal-format euro not registered"));
    }

    struct Formats;

    impl<'a> Controller<MockNode<'a>> for Formats {
        fn decimal_format(&self, name: Option<&ExpandedName>) -> Option<DecimalFormat> {
            match name {
                Some(n) if n.local == "euro" => Some(DecimalFormat {
                    decimal_separator: ',',
                    grouping_separator: '.',
                    ..DecimalFormat::default()
                }),
                _ => None,
            }
        }

        fn system_property(&self, name: &ExpandedName) -> Option<String> {
            (name.local == "colour").then(|| "blue".to_string())
        }
    }

    #[test]
    fn test_controller_services() {
        let tree: &'static MockTree = Box::leak(Box::new(create_test_tree()));
        let ctx = Context::new(tree.root()).with_controller(Arc::new(Formats));
        let euro = call(
            SystemFunction::FormatNumber,
            vec![
                Expression::number(1234.5),
                Expression::string("#.##0,00"),
                Expression::string("euro"),
            ],
        );
        assert_eq!(euro.evaluate(&ctx).unwrap(), Value::String("1.234,50".into()));

        let colour = call(SystemFunction::SystemProperty, vec![Expression::string("colour")]);
        assert_eq!(colour.evaluate(&ctx).unwrap(), Value::String("blue".into()));

        let scope = Arc::new(NameScope {
            namespaces: [("xsl".to_string(), XSLT_NAMESPACE.to_string())].into(),
            ..NameScope::default()
        });
        let version = call(SystemFunction::SystemProperty, vec![Expression::string("xsl:version")])
            .with_scope(scope);
        assert_eq!(version.evaluate(&ctx).unwrap(), Value::Number(1.0));
    }
}
