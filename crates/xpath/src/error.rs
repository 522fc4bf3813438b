use thiserror::Error;

/// Errors raised while compiling or evaluating an expression.
///
/// Parse-time failures carry the offending expression text so that callers can report them
/// without keeping the source around.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("XPath syntax error in '{expression}': {message}")]
    Syntax { expression: String, message: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function '{function}': {message}")]
    Arity { function: String, message: String },

    #[error("Unresolved name: {0}")]
    UnresolvedName(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl XPathError {
    pub fn syntax(expression: impl Into<String>, message: impl Into<String>) -> Self {
        XPathError::Syntax {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn arity(function: impl Into<String>, message: impl Into<String>) -> Self {
        XPathError::Arity {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        XPathError::Evaluation(message.into())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        XPathError::Type(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        XPathError::Internal(message.into())
    }

    /// True for the error kinds raised by the parser.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            XPathError::Syntax { .. }
                | XPathError::UnknownFunction(_)
                | XPathError::Arity { .. }
                | XPathError::UnresolvedName(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, XPathError>;
