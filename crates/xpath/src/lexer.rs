//! Splits expression text into tokens.
//!
//! The XPath grammar is ambiguous at the character level: `*` may be a wildcard or a
//! multiplication, `div` may be an operator or an element name, and `name(` may be a function
//! call or a node-type test. The tokenizer settles these using the previous token, so the
//! parser only ever sees unambiguous tokens.
use crate::error::{Result, XPathError};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, satisfy},
    combinator::{opt, recognize},
    sequence::{delimited, pair},
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Name,
    /// A name followed by `(`; the parenthesis is part of the token.
    FunctionName,
    /// `node(`, `text(`, `comment(` or `processing-instruction(`.
    NodeType,
    /// A name followed by `::`.
    Axis,
    /// `prefix:*`; the value is the prefix.
    Prefix,
    Literal,
    Number,
    /// `*` as a name test.
    Star,
    Slash,
    SlashSlash,
    Union,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Negate,
    Multiply,
    Div,
    Mod,
    And,
    Or,
    LeftParen,
    RightParen,
    LeftSquare,
    RightSquare,
    Comma,
    At,
    Dot,
    DotDot,
    Dollar,
}

impl TokenKind {
    pub fn is_binary_operator(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Slash
                | SlashSlash
                | Union
                | Equals
                | NotEquals
                | LessThan
                | LessThanOrEqual
                | GreaterThan
                | GreaterThanOrEqual
                | Plus
                | Minus
                | Multiply
                | Div
                | Mod
                | And
                | Or
        )
    }

    /// Tokens after which an operand, not an operator, must follow.
    fn expects_operand(self) -> bool {
        use TokenKind::*;
        self.is_binary_operator()
            || matches!(
                self,
                Negate | At | LeftParen | LeftSquare | FunctionName | NodeType | Axis | Comma
                    | Dollar
            )
    }

    fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            Eof => "end of expression",
            Name => "name",
            FunctionName => "function name",
            NodeType => "node type",
            Axis => "axis name",
            Prefix => "namespace wildcard",
            Literal => "literal",
            Number => "number",
            Star => "*",
            Slash => "/",
            SlashSlash => "//",
            Union => "|",
            Equals => "=",
            NotEquals => "!=",
            LessThan => "<",
            LessThanOrEqual => "<=",
            GreaterThan => ">",
            GreaterThanOrEqual => ">=",
            Plus => "+",
            Minus | Negate => "-",
            Multiply => "*",
            Div => "div",
            Mod => "mod",
            And => "and",
            Or => "or",
            LeftParen => "(",
            RightParen => ")",
            LeftSquare => "[",
            RightSquare => "]",
            Comma => ",",
            At => "@",
            Dot => ".",
            DotDot => "..",
            Dollar => "$",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// Byte offset of the token in the source.
    pub offset: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Name | TokenKind::Number => write!(f, "{} '{}'", self.kind, self.value),
            TokenKind::FunctionName | TokenKind::NodeType => write!(f, "'{}('", self.value),
            TokenKind::Axis => write!(f, "'{}::'", self.value),
            TokenKind::Prefix => write!(f, "'{}:*'", self.value),
            TokenKind::Literal => write!(f, "literal \"{}\"", self.value),
            TokenKind::Eof => write!(f, "{}", self.kind),
            kind => write!(f, "'{}'", kind),
        }
    }
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

fn ncname(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_char))).parse(input)
}

fn qname(input: &str) -> IResult<&str, &str> {
    recognize(pair(ncname, opt(pair(char(':'), ncname)))).parse(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
        recognize(pair(char('.'), digit1)),
    ))
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
    ))
    .parse(input)
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while1(is_xml_whitespace).parse(input)
}

pub struct Tokenizer<'s> {
    source: &'s str,
    rest: &'s str,
    previous: Option<TokenKind>,
}

impl<'s> Tokenizer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            rest: source,
            previous: None,
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    fn error(&self, message: impl Into<String>) -> XPathError {
        XPathError::syntax(self.source, message)
    }

    fn operand_expected(&self) -> bool {
        self.previous.is_none_or(TokenKind::expects_operand)
    }

    /// Consumes `len` bytes and produces a token of `kind`.
    fn take(&mut self, kind: TokenKind, len: usize, value: &str) -> Token {
        let offset = self.offset();
        self.rest = &self.rest[len..];
        self.previous = Some(kind);
        Token {
            kind,
            value: value.to_string(),
            offset,
        }
    }

    pub fn next(&mut self) -> Result<Token> {
        if let Ok((rest, _)) = whitespace(self.rest) {
            self.rest = rest;
        }
        let Some(c) = self.rest.chars().next() else {
            return Ok(self.take(TokenKind::Eof, 0, ""));
        };
        let second = self.rest[c.len_utf8()..].chars().next();
        let token = match (c, second) {
            ('(', _) => self.take(TokenKind::LeftParen, 1, "("),
            (')', _) => self.take(TokenKind::RightParen, 1, ")"),
            ('[', _) => self.take(TokenKind::LeftSquare, 1, "["),
            (']', _) => self.take(TokenKind::RightSquare, 1, "]"),
            (',', _) => self.take(TokenKind::Comma, 1, ","),
            ('@', _) => self.take(TokenKind::At, 1, "@"),
            ('$', _) => self.take(TokenKind::Dollar, 1, "$"),
            ('|', _) => self.take(TokenKind::Union, 1, "|"),
            ('+', _) => self.take(TokenKind::Plus, 1, "+"),
            ('=', _) => self.take(TokenKind::Equals, 1, "="),
            ('!', Some('=')) => self.take(TokenKind::NotEquals, 2, "!="),
            ('!', _) => return Err(self.error("'!' must be followed by '='")),
            ('<', Some('=')) => self.take(TokenKind::LessThanOrEqual, 2, "<="),
            ('<', _) => self.take(TokenKind::LessThan, 1, "<"),
            ('>', Some('=')) => self.take(TokenKind::GreaterThanOrEqual, 2, ">="),
            ('>', _) => self.take(TokenKind::GreaterThan, 1, ">"),
            ('/', Some('/')) => self.take(TokenKind::SlashSlash, 2, "//"),
            ('/', _) => self.take(TokenKind::Slash, 1, "/"),
            ('-', _) if self.operand_expected() => self.take(TokenKind::Negate, 1, "-"),
            ('-', _) => self.take(TokenKind::Minus, 1, "-"),
            ('*', _) if self.operand_expected() => self.take(TokenKind::Star, 1, "*"),
            ('*', _) => self.take(TokenKind::Multiply, 1, "*"),
            ('.', Some('.')) => self.take(TokenKind::DotDot, 2, ".."),
            ('.', Some(d)) if d.is_ascii_digit() => self.number()?,
            ('.', _) => self.take(TokenKind::Dot, 1, "."),
            ('"' | '\'', _) => self.literal()?,
            (d, _) if d.is_ascii_digit() => self.number()?,
            (n, _) if is_name_start(n) => self.name()?,
            (other, _) => {
                return Err(self.error(format!("Invalid character '{}' in expression", other)));
            }
        };
        Ok(token)
    }

    fn number(&mut self) -> Result<Token> {
        let (rest, text) = number(self.rest).map_err(|_| self.error("Invalid number"))?;
        let mut following = rest.chars();
        if following.next() == Some('.') && following.next().is_none_or(|c| c.is_ascii_digit()) {
            return Err(self.error(format!("Invalid number '{}.'", text)));
        }
        Ok(self.take(TokenKind::Number, text.len(), text))
    }

    fn literal(&mut self) -> Result<Token> {
        let (rest, text) = literal(self.rest)
            .map_err(|_| self.error("Unmatched quote in expression"))?;
        let len = self.rest.len() - rest.len();
        Ok(self.take(TokenKind::Literal, len, text))
    }

    fn name(&mut self) -> Result<Token> {
        let (after, name) = qname(self.rest).map_err(|_| self.error("Invalid name"))?;
        let len = name.len();
        if !self.operand_expected() {
            let operator = match name {
                "and" => Some(TokenKind::And),
                "or" => Some(TokenKind::Or),
                "div" => Some(TokenKind::Div),
                "mod" => Some(TokenKind::Mod),
                _ => None,
            };
            if let Some(kind) = operator {
                return Ok(self.take(kind, len, name));
            }
        }
        if !name.contains(':') && after.starts_with(":*") {
            return Ok(self.take(TokenKind::Prefix, len + 2, name));
        }
        let trimmed = after.trim_start_matches(is_xml_whitespace);
        let gap = after.len() - trimmed.len();
        if trimmed.starts_with("::") {
            return Ok(self.take(TokenKind::Axis, len + gap + 2, name));
        }
        if trimmed.starts_with('(') {
            let kind = match name {
                "node" | "text" | "comment" | "processing-instruction" => TokenKind::NodeType,
                _ => TokenKind::FunctionName,
            };
            return Ok(self.take(kind, len + gap + 1, name));
        }
        Ok(self.take(TokenKind::Name, len, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut tokenizer = Tokenizer::new(source);
        let mut out = Vec::new();
        loop {
            let token = tokenizer.next().unwrap();
            if token.kind == TokenKind::Eof {
                return out;
            }
            out.push(token.kind);
        }
    }

    fn values(source: &str) -> Vec<String> {
        let mut tokenizer = Tokenizer::new(source);
        let mut out = Vec::new();
        loop {
            let token = tokenizer.next().unwrap();
            if token.kind == TokenKind::Eof {
                return out;
            }
            out.push(token.value);
        }
    }

    #[test]
    fn test_star_disambiguation() {
        use TokenKind::*;
        assert_eq!(kinds("*"), vec![Star]);
        assert_eq!(kinds("a * b"), vec![Name, Multiply, Name]);
        assert_eq!(kinds("* * *"), vec![Star, Multiply, Star]);
        assert_eq!(kinds("@*"), vec![At, Star]);
        assert_eq!(kinds("count(*)"), vec![FunctionName, Star, RightParen]);
        assert_eq!(kinds("a/*"), vec![Name, Slash, Star]);
        assert_eq!(kinds("2*3"), vec![Number, Multiply, Number]);
        assert_eq!(kinds("f(1, *)"), vec![FunctionName, Number, Comma, Star, RightParen]);
    }

    #[test]
    fn test_operator_names() {
        use TokenKind::*;
        assert_eq!(kinds("div div div"), vec![Name, Div, Name]);
        assert_eq!(kinds("a and or"), vec![Name, And, Name]);
        assert_eq!(kinds("mod mod mod mod mod"), vec![Name, Mod, Name, Mod, Name]);
        assert_eq!(kinds("x or(y)"), vec![Name, Or, LeftParen, Name, RightParen]);
    }

    #[test]
    fn test_names_with_lookahead() {
        use TokenKind::*;
        assert_eq!(kinds("child::para"), vec![Axis, Name]);
        assert_eq!(kinds("ancestor ::x"), vec![Axis, Name]);
        assert_eq!(kinds("text()"), vec![NodeType, RightParen]);
        assert_eq!(kinds("concat ('a')"), vec![FunctionName, Literal, RightParen]);
        assert_eq!(kinds("svg:*"), vec![Prefix]);
        assert_eq!(kinds("svg:rect"), vec![Name]);
        assert_eq!(values("svg:* | a:b"), vec!["svg", "|", "a:b"]);
    }

    #[test]
    fn test_minus_and_negate() {
        use TokenKind::*;
        assert_eq!(kinds("-1"), vec![Negate, Number]);
        assert_eq!(kinds("1 - -1"), vec![Number, Minus, Negate, Number]);
        assert_eq!(kinds("a-b"), vec![Name]);
        assert_eq!(kinds("a -b"), vec![Name, Minus, Name]);
    }

    #[test]
    fn test_numbers_and_dots() {
        use TokenKind::*;
        assert_eq!(kinds(".5 + 1."), vec![Number, Plus, Number]);
        assert_eq!(kinds("../."), vec![DotDot, Slash, Dot]);
        assert_eq!(values("12.50"), vec!["12.50"]);
        assert_eq!(values("price > 12.50"), vec!["price", ">", "12.50"]);
        assert_eq!(values("0.25"), vec!["0.25"]);
        assert_eq!(values("7."), vec!["7."]);
        assert!(Tokenizer::new("1.2.3").next().is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(values(r#"'it"s' "it's""#), vec!["it\"s", "it's"]);
        let err = Tokenizer::new("'open").next().unwrap_err();
        assert!(err.to_string().contains("Unmatched quote"));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(Tokenizer::new("!").next().is_err());
        assert!(Tokenizer::new("#").next().is_err());
        let mut t = Tokenizer::new("a != b");
        t.next().unwrap();
        assert_eq!(t.next().unwrap().kind, TokenKind::NotEquals);
    }
}
