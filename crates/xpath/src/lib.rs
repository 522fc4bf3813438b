pub mod ast;
pub mod axes;
pub mod context;
pub mod datasource;
pub mod engine;
pub mod enumeration;
pub mod error;
pub mod extensions;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod pattern;
pub mod sort;
pub mod static_context;
pub mod value;

pub use ast::{Axis, BinaryOperator, DataType, Expression, NameTest, NodeKind, NodeTest, Step};
pub use context::{
    Bindery, Context, Controller, Dependencies, LastPosition, LastPositionFinder,
    VariableBindings,
};
pub use datasource::{ExpandedName, NodeKey, NodeType, QName, TreeNode};
pub use enumeration::{Enumeration, NodeEnumeration};
pub use extensions::{ExtensionFunction, ExtensionRegistry, FnExtension};
pub use functions::format_number::DecimalFormat;
pub use pattern::Pattern;
pub use sort::{SortKeyDefinition, SortedSelection};
pub use static_context::{ParseOptions, StaticContext, StaticEnv};
pub use value::{NodeSetValue, Value};

// Re-export test utilities for integration testing in downstream crates
pub use datasource::tests;
pub use error::{Result, XPathError};
pub use parser::{parse, parse_pattern, parse_template};
