//! Recursive-descent parser from expression text to an [`Expression`] tree.
//!
//! Names are resolved while parsing: prefixes through the static context, variables through
//! its bindings, and function names against the built-in table or the extension functions the
//! context offers. The returned tree is already simplified.
mod pattern;

pub use pattern::parse_pattern;

use crate::ast::{
    Axis, BinaryOperator, DataType, Expression, NameTest, NodeKind, NodeTest, SetOperator, Step,
    TemplatePart, VariableReference,
};
use crate::datasource::{ExpandedName, TreeNode};
use crate::error::{Result, XPathError};
use crate::extensions::ExtensionCall;
use crate::functions::{FunctionCall, SystemFunction};
use crate::lexer::{Token, TokenKind, Tokenizer};
use crate::static_context::StaticContext;

/// Parses an expression and simplifies it.
///
/// In forwards-compatible mode a static error does not fail the parse; the returned expression
/// raises it when evaluated.
pub fn parse<N: TreeNode>(source: &str, env: &dyn StaticContext<N>) -> Result<Expression<N>> {
    log::debug!("Parsing expression: {}", source);
    let parsed = Parser::new(source, env).and_then(|mut parser| {
        let expression = parser.parse_expression()?;
        parser.expect_end()?;
        Ok(expression)
    });
    defer_if_compatible(parsed.and_then(Expression::simplify), source, env)
}

/// Parses an attribute value template such as `{$base}/img/{@src}`.
///
/// `{{` and `}}` stand for literal braces. Braces inside string literals within an expression
/// do not end it.
pub fn parse_template<N: TreeNode>(
    source: &str,
    env: &dyn StaticContext<N>,
) -> Result<Expression<N>> {
    log::debug!("Parsing attribute value template: {}", source);
    let parsed = template_parts(source, env)
        .and_then(|parts| Expression::Template(parts).simplify());
    defer_if_compatible(parsed, source, env)
}

fn defer_if_compatible<N>(
    result: Result<Expression<N>>,
    source: &str,
    env: &dyn StaticContext<N>,
) -> Result<Expression<N>> {
    match result {
        Err(err) if err.is_static() && env.is_forwards_compatible() => {
            log::warn!("Deferring error in '{}' until evaluation: {}", source, err);
            Ok(Expression::Error(err))
        }
        other => other,
    }
}

fn template_parts<N: TreeNode>(
    source: &str,
    env: &dyn StaticContext<N>,
) -> Result<Vec<TemplatePart<N>>> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = source.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '{' if chars.peek().is_some_and(|&(_, next)| next == '{') => {
                chars.next();
                text.push('{');
            }
            '{' => {
                let end = closing_brace(source, i + 1).ok_or_else(|| {
                    XPathError::syntax(source, "Missing '}' in attribute value template")
                })?;
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                let inner = &source[i + 1..end];
                let mut parser = Parser::new(inner, env)?;
                let expression = parser.parse_expression()?;
                parser.expect_end()?;
                parts.push(TemplatePart::Expression(expression));
                while chars.peek().is_some_and(|&(j, _)| j <= end) {
                    chars.next();
                }
            }
            '}' if chars.peek().is_some_and(|&(_, next)| next == '}') => {
                chars.next();
                text.push('}');
            }
            '}' => {
                return Err(XPathError::syntax(
                    source,
                    "Closing curly brace in attribute value template must be doubled",
                ));
            }
            c => text.push(c),
        }
    }
    if !text.is_empty() {
        parts.push(TemplatePart::Text(text));
    }
    Ok(parts)
}

/// Byte offset of the `}` closing an expression that starts at `from`.
fn closing_brace(source: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, c) in source[from..].char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if q == c => quote = None,
            (None, '}') => return Some(from + offset),
            _ => {}
        }
    }
    None
}

pub(crate) struct Parser<'s, 'env, N> {
    tokenizer: Tokenizer<'s>,
    current: Token,
    env: &'env dyn StaticContext<N>,
}

impl<'s, 'env, N: TreeNode> Parser<'s, 'env, N> {
    pub(crate) fn new(source: &'s str, env: &'env dyn StaticContext<N>) -> Result<Self> {
        let mut tokenizer = Tokenizer::new(source);
        let current = tokenizer.next()?;
        Ok(Self {
            tokenizer,
            current,
            env,
        })
    }

    pub(crate) fn env(&self) -> &'env dyn StaticContext<N> {
        self.env
    }

    pub(crate) fn current(&self) -> &Token {
        &self.current
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Moves to the next token and returns the one just passed.
    pub(crate) fn advance(&mut self) -> Result<Token> {
        let next = self.tokenizer.next()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind != kind {
            return Err(self.error(format!("expected \"{}\", found {}", kind, self.current)));
        }
        self.advance()
    }

    pub(crate) fn expect_end(&self) -> Result<()> {
        if !self.at(TokenKind::Eof) {
            return Err(self.error(format!("Unexpected {} beyond end of expression", self.current)));
        }
        Ok(())
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> XPathError {
        XPathError::syntax(self.tokenizer.source(), message)
    }

    pub(crate) fn parse_expression(&mut self) -> Result<Expression<N>> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression<N>> {
        let mut lhs = self.parse_and()?;
        while self.at(TokenKind::Or) {
            self.advance()?;
            lhs = Expression::binary(BinaryOperator::Or, lhs, self.parse_and()?);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expression<N>> {
        let mut lhs = self.parse_equality()?;
        while self.at(TokenKind::And) {
            self.advance()?;
            lhs = Expression::binary(BinaryOperator::And, lhs, self.parse_equality()?);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expression<N>> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Equals => BinaryOperator::Equals,
                TokenKind::NotEquals => BinaryOperator::NotEquals,
                _ => return Ok(lhs),
            };
            self.advance()?;
            lhs = Expression::binary(op, lhs, self.parse_relational()?);
        }
    }

    fn parse_relational(&mut self) -> Result<Expression<N>> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::LessThan => BinaryOperator::LessThan,
                TokenKind::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
                TokenKind::GreaterThan => BinaryOperator::GreaterThan,
                TokenKind::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
                _ => return Ok(lhs),
            };
            self.advance()?;
            lhs = Expression::binary(op, lhs, self.parse_additive()?);
        }
    }

    fn parse_additive(&mut self) -> Result<Expression<N>> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOperator::Plus,
                TokenKind::Minus => BinaryOperator::Minus,
                _ => return Ok(lhs),
            };
            self.advance()?;
            lhs = Expression::binary(op, lhs, self.parse_multiplicative()?);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression<N>> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Multiply => BinaryOperator::Multiply,
                TokenKind::Div => BinaryOperator::Divide,
                TokenKind::Mod => BinaryOperator::Modulo,
                _ => return Ok(lhs),
            };
            self.advance()?;
            lhs = Expression::binary(op, lhs, self.parse_unary()?);
        }
    }

    fn parse_unary(&mut self) -> Result<Expression<N>> {
        if self.at(TokenKind::Negate) {
            self.advance()?;
            return Ok(Expression::Negate(Box::new(self.parse_unary()?)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expression<N>> {
        let mut lhs = self.parse_path()?;
        while self.at(TokenKind::Union) {
            self.advance()?;
            let rhs = self.parse_path()?;
            for operand in [&lhs, &rhs] {
                if !matches!(operand.data_type(), DataType::NodeSet | DataType::Any) {
                    return Err(self.error(format!("Operand of '|' must be a node-set: {}", operand)));
                }
            }
            lhs = Expression::set_operation(SetOperator::Union, lhs, rhs);
        }
        Ok(lhs)
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Name
                | TokenKind::Star
                | TokenKind::Prefix
                | TokenKind::Axis
                | TokenKind::At
                | TokenKind::Dot
                | TokenKind::DotDot
                | TokenKind::NodeType
        )
    }

    fn parse_path(&mut self) -> Result<Expression<N>> {
        match self.current.kind {
            TokenKind::Slash => {
                self.advance()?;
                if self.at_step_start() {
                    self.parse_relative_path(Expression::Root)
                } else {
                    Ok(Expression::Root)
                }
            }
            TokenKind::SlashSlash => {
                self.advance()?;
                let start = Expression::path(Expression::Root, descendant_or_self());
                self.parse_relative_path(start)
            }
            _ if self.at_step_start() => self.parse_relative_path(Expression::ContextNode),
            _ => {
                let filtered = self.parse_filter()?;
                if self.at(TokenKind::Slash) || self.at(TokenKind::SlashSlash) {
                    self.continue_path(filtered)
                } else {
                    Ok(filtered)
                }
            }
        }
    }

    fn parse_relative_path(&mut self, start: Expression<N>) -> Result<Expression<N>> {
        let step = self.parse_step()?;
        self.continue_path(Expression::path(start, step))
    }

    fn continue_path(&mut self, mut path: Expression<N>) -> Result<Expression<N>> {
        loop {
            match self.current.kind {
                TokenKind::Slash => {
                    self.advance()?;
                }
                TokenKind::SlashSlash => {
                    self.advance()?;
                    path = Expression::path(path, descendant_or_self());
                }
                _ => return Ok(path),
            }
            let step = self.parse_step()?;
            path = Expression::path(path, step);
        }
    }

    fn parse_step(&mut self) -> Result<Step<N>> {
        let axis = match self.current.kind {
            TokenKind::Dot => {
                self.advance()?;
                return Ok(Step::new(Axis::SelfAxis, NodeTest::any_node()));
            }
            TokenKind::DotDot => {
                self.advance()?;
                return Ok(Step::new(Axis::Parent, NodeTest::any_node()));
            }
            TokenKind::At => {
                self.advance()?;
                Axis::Attribute
            }
            TokenKind::Axis => {
                let token = self.advance()?;
                Axis::from_name(&token.value)
                    .ok_or_else(|| self.error(format!("Unknown axis name '{}'", token.value)))?
            }
            _ => Axis::Child,
        };
        let test = self.parse_node_test(axis.principal_kind())?;
        let mut step = Step::new(axis, test);
        step.predicates = self.parse_predicates()?;
        Ok(step)
    }

    /// A name test or node-type test. `principal` is the kind a name test selects on the
    /// current axis.
    pub(crate) fn parse_node_test(&mut self, principal: NodeKind) -> Result<NodeTest> {
        match self.current.kind {
            TokenKind::Name => {
                let token = self.advance()?;
                let name = self
                    .env
                    .resolve_qname(&token.value, principal == NodeKind::Element)?;
                Ok(NodeTest::new(principal, NameTest::Name(name)))
            }
            TokenKind::Prefix => {
                let token = self.advance()?;
                let uri = self.env.namespace_uri(&token.value)?;
                Ok(NodeTest::new(principal, NameTest::Namespace(uri)))
            }
            TokenKind::Star => {
                self.advance()?;
                Ok(NodeTest::kind(principal))
            }
            TokenKind::NodeType => {
                let token = self.advance()?;
                let test = match token.value.as_str() {
                    "node" => NodeTest::any_node(),
                    "text" => NodeTest::kind(NodeKind::Text),
                    "comment" => NodeTest::kind(NodeKind::Comment),
                    _ if self.at(TokenKind::Literal) => {
                        let target = self.advance()?;
                        NodeTest::new(
                            NodeKind::ProcessingInstruction,
                            NameTest::Name(ExpandedName::local(target.value)),
                        )
                    }
                    _ => NodeTest::kind(NodeKind::ProcessingInstruction),
                };
                self.expect(TokenKind::RightParen)?;
                Ok(test)
            }
            _ => Err(self.error(format!(
                "Unexpected {} in path expression",
                self.current
            ))),
        }
    }

    pub(crate) fn parse_predicates(&mut self) -> Result<Vec<Expression<N>>> {
        let mut predicates = Vec::new();
        while self.at(TokenKind::LeftSquare) {
            self.advance()?;
            predicates.push(self.parse_expression()?);
            self.expect(TokenKind::RightSquare)?;
        }
        Ok(predicates)
    }

    fn parse_filter(&mut self) -> Result<Expression<N>> {
        let mut base = self.parse_primary()?;
        for predicate in self.parse_predicates()? {
            base = Expression::filter(base, predicate);
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expression<N>> {
        match self.current.kind {
            TokenKind::Dollar => {
                self.advance()?;
                let token = self.expect(TokenKind::Name)?;
                let name = self.env.resolve_qname(&token.value, false)?;
                let binding = self.env.bind_variable(&name, &token.value)?;
                Ok(Expression::Variable(VariableReference {
                    name: binding.name,
                    display_name: binding.display_name,
                    constant: binding.constant,
                }))
            }
            TokenKind::LeftParen => {
                self.advance()?;
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::Literal => Ok(Expression::string(self.advance()?.value)),
            TokenKind::Number => {
                let token = self.advance()?;
                let value = token
                    .value
                    .parse::<f64>()
                    .map_err(|_| self.error(format!("Invalid number '{}'", token.value)))?;
                Ok(Expression::number(value))
            }
            TokenKind::FunctionName => {
                let name = self.advance()?.value;
                let args = self.parse_arguments()?;
                self.resolve_function(&name, args)
            }
            _ => Err(self.error(format!(
                "Unexpected {} at start of expression",
                self.current
            ))),
        }
    }

    /// Arguments up to and including the closing parenthesis.
    pub(crate) fn parse_arguments(&mut self) -> Result<Vec<Expression<N>>> {
        let mut args = Vec::new();
        if self.at(TokenKind::RightParen) {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.current.kind {
                TokenKind::Comma => {
                    self.advance()?;
                }
                TokenKind::RightParen => {
                    self.advance()?;
                    return Ok(args);
                }
                _ => {
                    return Err(self.error(format!(
                        "expected \")\" or \",\" in function call, found {}",
                        self.current
                    )));
                }
            }
        }
    }

    fn resolve_function(&self, name: &str, args: Vec<Expression<N>>) -> Result<Expression<N>> {
        if !name.contains(':') {
            let function = SystemFunction::from_name(name)
                .ok_or_else(|| XPathError::UnknownFunction(name.to_string()))?;
            function.check_arity(args.len())?;
            return Ok(match function {
                SystemFunction::True => Expression::boolean(true),
                SystemFunction::False => Expression::boolean(false),
                _ if function.needs_name_scope() => Expression::Function(
                    FunctionCall::new(function, args).with_scope(self.env.name_scope()),
                ),
                _ => Expression::Function(FunctionCall::new(function, args)),
            });
        }
        let expanded = self.env.resolve_qname(name, false)?;
        let resolved = self
            .env
            .stylesheet_function(&expanded)
            .filter(|f| f.accepts_arity(args.len()))
            .or_else(|| self.env.extension_function(&expanded, args.len()));
        match resolved {
            Some(function) => Ok(Expression::Extension(ExtensionCall {
                name: expanded,
                display_name: name.to_string(),
                function,
                args,
            })),
            None => Err(XPathError::UnknownFunction(name.to_string())),
        }
    }
}

fn descendant_or_self<N>() -> Step<N> {
    Step::new(Axis::DescendantOrSelf, NodeTest::any_node())
}
