//! Parse-time context: namespaces, declared variables, stylesheet and extension functions,
//! and parser options.
use crate::datasource::{ExpandedName, XML_NAMESPACE};
use crate::error::{Result, XPathError};
use crate::extensions::{ExtensionFunction, ExtensionRegistry};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// XSLT 1.0 instruction names, all of which `element-available()` reports as present.
const XSLT_INSTRUCTIONS: &[&str] = &[
    "apply-imports",
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "fallback",
    "for-each",
    "if",
    "message",
    "number",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

/// Options that change how expressions are compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Defer parse errors to evaluation time instead of failing.
    pub forwards_compatible: bool,
    /// Resolve prefixed function names against the extension registry.
    pub allow_extension_functions: bool,
    /// Namespace applied to unprefixed element name tests.
    pub default_element_namespace: Option<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            forwards_compatible: false,
            allow_extension_functions: true,
            default_element_namespace: None,
        }
    }
}

/// What the static context knows about a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableBinding<N> {
    pub name: ExpandedName,
    pub display_name: String,
    /// Set for global variables whose value is fixed at compile time.
    pub constant: Option<Value<N>>,
}

/// A snapshot of the names in scope where an expression was written. Functions that take
/// lexical names as string arguments (`key()`, `format-number()`, `system-property()`,
/// `function-available()`, `element-available()`) carry one so they can resolve those names
/// at evaluation time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameScope {
    pub namespaces: BTreeMap<String, String>,
    pub functions: BTreeSet<ExpandedName>,
    pub elements: BTreeSet<ExpandedName>,
}

impl NameScope {
    /// Resolves `prefix:local` or `local`. Unprefixed names are in no namespace.
    pub fn resolve(&self, qname: &str) -> Result<ExpandedName> {
        match qname.split_once(':') {
            None => Ok(ExpandedName::local(qname)),
            Some(("xml", local)) => Ok(ExpandedName::new(XML_NAMESPACE, local)),
            Some((prefix, local)) => self
                .namespaces
                .get(prefix)
                .map(|uri| ExpandedName::new(uri.clone(), local))
                .ok_or_else(|| {
                    XPathError::UnresolvedName(format!("Prefix {} has not been declared", prefix))
                }),
        }
    }

    pub fn function_available(&self, name: &ExpandedName) -> bool {
        if name.uri.is_empty() {
            crate::functions::SystemFunction::from_name(&name.local).is_some()
        } else {
            self.functions.contains(name)
        }
    }

    pub fn element_available(&self, name: &ExpandedName) -> bool {
        if name.uri == XSLT_NAMESPACE {
            XSLT_INSTRUCTIONS.contains(&name.local.as_str())
        } else {
            self.elements.contains(name)
        }
    }
}

/// The static context an expression is compiled in.
pub trait StaticContext<N> {
    /// The URI bound to `prefix`. Fails when the prefix is undeclared.
    fn namespace_uri(&self, prefix: &str) -> Result<String>;

    /// Looks up a variable. Fails when it is not declared.
    fn bind_variable(&self, name: &ExpandedName, display_name: &str)
    -> Result<VariableBinding<N>>;

    /// A function defined in the host stylesheet.
    fn stylesheet_function(&self, name: &ExpandedName) -> Option<Arc<dyn ExtensionFunction<N>>>;

    /// An extension function accepting `arity` arguments.
    fn extension_function(
        &self,
        name: &ExpandedName,
        arity: usize,
    ) -> Option<Arc<dyn ExtensionFunction<N>>>;

    fn options(&self) -> &ParseOptions;

    fn name_scope(&self) -> Arc<NameScope>;

    fn is_forwards_compatible(&self) -> bool {
        self.options().forwards_compatible
    }

    /// Resolves a lexical QName. With `use_default`, an unprefixed name takes the default
    /// element namespace.
    fn resolve_qname(&self, qname: &str, use_default: bool) -> Result<ExpandedName> {
        match qname.split_once(':') {
            Some((prefix, local)) => Ok(ExpandedName::new(self.namespace_uri(prefix)?, local)),
            None => {
                let uri = match (&self.options().default_element_namespace, use_default) {
                    (Some(uri), true) => uri.clone(),
                    _ => String::new(),
                };
                Ok(ExpandedName::new(uri, qname))
            }
        }
    }
}

/// The default static context, built up with `with_*` calls.
pub struct StaticEnv<N> {
    namespaces: BTreeMap<String, String>,
    variables: HashMap<ExpandedName, Option<Value<N>>>,
    functions: HashMap<ExpandedName, Arc<dyn ExtensionFunction<N>>>,
    extensions: ExtensionRegistry<N>,
    elements: BTreeSet<ExpandedName>,
    options: ParseOptions,
}

impl<N> Default for StaticEnv<N> {
    fn default() -> Self {
        Self {
            namespaces: BTreeMap::new(),
            variables: HashMap::new(),
            functions: HashMap::new(),
            extensions: ExtensionRegistry::new(),
            elements: BTreeSet::new(),
            options: ParseOptions::default(),
        }
    }
}

impl<N> StaticEnv<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: ParseOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
        self
    }

    /// Declares a variable whose value is supplied at evaluation time.
    pub fn with_variable(mut self, name: ExpandedName) -> Self {
        self.variables.insert(name, None);
        self
    }

    /// Declares a global variable with a value known now.
    pub fn with_constant(mut self, name: ExpandedName, value: Value<N>) -> Self {
        self.variables.insert(name, Some(value));
        self
    }

    pub fn with_stylesheet_function(
        mut self,
        name: ExpandedName,
        function: Arc<dyn ExtensionFunction<N>>,
    ) -> Self {
        self.functions.insert(name, function);
        self
    }

    pub fn with_extensions(mut self, registry: ExtensionRegistry<N>) -> Self {
        self.extensions = registry;
        self
    }

    /// Declares an extension element for `element-available()`.
    pub fn with_extension_element(mut self, name: ExpandedName) -> Self {
        self.elements.insert(name);
        self
    }

    pub fn forwards_compatible(mut self, enabled: bool) -> Self {
        self.options.forwards_compatible = enabled;
        self
    }
}

impl<N: Clone> StaticContext<N> for StaticEnv<N> {
    fn namespace_uri(&self, prefix: &str) -> Result<String> {
        if prefix == "xml" {
            return Ok(XML_NAMESPACE.to_string());
        }
        self.namespaces.get(prefix).cloned().ok_or_else(|| {
            XPathError::UnresolvedName(format!("Prefix {} has not been declared", prefix))
        })
    }

    fn bind_variable(
        &self,
        name: &ExpandedName,
        display_name: &str,
    ) -> Result<VariableBinding<N>> {
        match self.variables.get(name) {
            Some(constant) => Ok(VariableBinding {
                name: name.clone(),
                display_name: display_name.to_string(),
                constant: constant.clone(),
            }),
            None => Err(XPathError::UnresolvedName(format!(
                "Variable {} has not been declared",
                display_name
            ))),
        }
    }

    fn stylesheet_function(&self, name: &ExpandedName) -> Option<Arc<dyn ExtensionFunction<N>>> {
        self.functions.get(name).cloned()
    }

    fn extension_function(
        &self,
        name: &ExpandedName,
        arity: usize,
    ) -> Option<Arc<dyn ExtensionFunction<N>>> {
        if !self.options.allow_extension_functions {
            return None;
        }
        self.extensions.lookup(name, arity)
    }

    fn options(&self) -> &ParseOptions {
        &self.options
    }

    fn name_scope(&self) -> Arc<NameScope> {
        let mut functions: BTreeSet<ExpandedName> = self.functions.keys().cloned().collect();
        if self.options.allow_extension_functions {
            functions.extend(self.extensions.names());
        }
        Arc::new(NameScope {
            namespaces: self.namespaces.clone(),
            functions,
            elements: self.elements.clone(),
        })
    }
}
