use super::Parser;
use crate::ast::{Axis, NodeKind, NodeTest};
use crate::datasource::TreeNode;
use crate::error::Result;
use crate::lexer::TokenKind;
use crate::pattern::{LocationPathPattern, Pattern};
use crate::static_context::StaticContext;

/// Parses a match pattern such as `chapter/title | appendix//para[1]` and simplifies it.
pub fn parse_pattern<N: TreeNode>(source: &str, env: &dyn StaticContext<N>) -> Result<Pattern<N>> {
    log::debug!("Parsing pattern: {}", source);
    let mut parser = Parser::new(source, env)?;
    let pattern = parser.parse_union_pattern()?;
    parser.expect_end()?;
    pattern.simplify()
}

/// How a step is tied to the pattern written before it.
enum Connector {
    Parent,
    Ancestor,
}

impl<N: TreeNode> Parser<'_, '_, N> {
    fn parse_union_pattern(&mut self) -> Result<Pattern<N>> {
        let mut pattern = self.parse_path_pattern()?;
        while self.at(TokenKind::Union) {
            self.advance()?;
            let rhs = self.parse_path_pattern()?;
            pattern = Pattern::Union(Box::new(pattern), Box::new(rhs));
        }
        Ok(pattern)
    }

    fn at_pattern_step(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Name
                | TokenKind::Star
                | TokenKind::Prefix
                | TokenKind::Axis
                | TokenKind::At
                | TokenKind::NodeType
        )
    }

    fn parse_path_pattern(&mut self) -> Result<Pattern<N>> {
        let mut previous = match self.current().kind {
            TokenKind::Slash => {
                self.advance()?;
                if !self.at_pattern_step() {
                    return Ok(Pattern::Document);
                }
                Some((Pattern::Document, Connector::Parent))
            }
            TokenKind::SlashSlash => {
                self.advance()?;
                Some((Pattern::Document, Connector::Ancestor))
            }
            TokenKind::FunctionName => {
                let anchor = self.parse_anchor()?;
                match self.connector()? {
                    Some(connector) => Some((anchor, connector)),
                    None => return Ok(anchor),
                }
            }
            _ => None,
        };
        loop {
            if self.at(TokenKind::FunctionName) {
                return Err(self.error("Function may appear only at the start of a pattern"));
            }
            let mut step = self.parse_pattern_step()?;
            step = match previous.take() {
                Some((pattern, Connector::Parent)) => step.with_parent(pattern),
                Some((pattern, Connector::Ancestor)) => step.with_ancestor(pattern),
                None => step,
            };
            let pattern = Pattern::Location(Box::new(step));
            match self.connector()? {
                Some(connector) => previous = Some((pattern, connector)),
                None => return Ok(pattern),
            }
        }
    }

    fn connector(&mut self) -> Result<Option<Connector>> {
        let connector = match self.current().kind {
            TokenKind::Slash => Connector::Parent,
            TokenKind::SlashSlash => Connector::Ancestor,
            _ => return Ok(None),
        };
        self.advance()?;
        Ok(Some(connector))
    }

    /// `id('value')` or `key('name', 'value')` at the start of a pattern.
    fn parse_anchor(&mut self) -> Result<Pattern<N>> {
        let function = self.advance()?.value;
        match function.as_str() {
            "id" => {
                let value = self.expect(TokenKind::Literal)?.value;
                self.expect(TokenKind::RightParen)?;
                Ok(Pattern::Id(value))
            }
            "key" => {
                let display_name = self.expect(TokenKind::Literal)?.value;
                self.expect(TokenKind::Comma)?;
                let value = self.expect(TokenKind::Literal)?.value;
                self.expect(TokenKind::RightParen)?;
                let name = self.env().resolve_qname(&display_name, false)?;
                Ok(Pattern::Key {
                    name,
                    display_name,
                    value,
                })
            }
            _ => Err(self.error("The only functions allowed in a pattern are id() and key()")),
        }
    }

    fn parse_pattern_step(&mut self) -> Result<LocationPathPattern<N>> {
        let axis = match self.current().kind {
            TokenKind::At => {
                self.advance()?;
                Axis::Attribute
            }
            TokenKind::Axis => match self.advance()?.value.as_str() {
                "child" => Axis::Child,
                "attribute" => Axis::Attribute,
                _ => return Err(self.error("Axis in pattern must be child or attribute")),
            },
            _ => Axis::Child,
        };
        let mut test = self.parse_node_test(axis.principal_kind())?;
        if axis == Axis::Attribute {
            test = match test.kind {
                NodeKind::Node => NodeTest::kind(NodeKind::Attribute),
                NodeKind::Attribute => test,
                _ => NodeTest::kind(NodeKind::Never),
            };
        }
        let mut step = LocationPathPattern::new(test);
        for predicate in self.parse_predicates()? {
            if predicate.uses_current() {
                return Err(self.error("The current() function may not be used in a pattern"));
            }
            step = step.with_predicate(predicate);
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::datasource::tests::{MockNode, create_test_tree};
    use crate::static_context::StaticEnv;

    fn compile<'a>(source: &str) -> Result<Pattern<MockNode<'a>>> {
        parse_pattern(source, &StaticEnv::new())
    }

    #[test]
    fn test_priorities() {
        assert_eq!(compile("para").unwrap().default_priority(), 0.0);
        assert_eq!(compile("*").unwrap().default_priority(), -0.5);
        assert_eq!(compile("node()").unwrap().default_priority(), -0.5);
        assert_eq!(compile("@*").unwrap().default_priority(), -0.5);
        assert_eq!(compile("/").unwrap().default_priority(), 0.5);
        assert_eq!(compile("div/para").unwrap().default_priority(), 0.5);
        assert_eq!(compile("para[1]").unwrap().default_priority(), 0.5);
        let env = StaticEnv::new().with_namespace("h", "urn:h");
        let wildcard: Pattern<MockNode<'_>> = parse_pattern("h:*", &env).unwrap();
        assert_eq!(wildcard.default_priority(), -0.25);
    }

    #[test]
    fn test_matching() {
        let tree = create_test_tree();
        let context = Context::new(tree.node(0));
        let matches = |source: &str, id: usize| {
            compile(source)
                .unwrap()
                .matches(tree.node(id), &context)
                .unwrap()
        };
        assert!(matches("/", 0));
        assert!(matches("/para", 1));
        assert!(matches("//text()", 9));
        assert!(matches("para/text()", 4));
        assert!(!matches("div/text()", 4));
        assert!(matches("@id", 2));
        assert!(!matches("node()", 2));
        assert!(matches("para[2]", 8));
        assert!(!matches("para[2]", 1));
        assert!(matches("para[text() = 'World']", 8));
        assert!(matches("comment() | processing-instruction('pi-target')", 7));
        assert!(matches("id('p1')", 1));
        assert!(matches("id('p1')/text()", 4));
    }

    #[test]
    fn test_never_matching_attribute_kinds() {
        let pattern = compile("@comment()").unwrap();
        assert_eq!(pattern, Pattern::NodeKind(NodeKind::Never));
    }

    #[test]
    fn test_rejected_patterns() {
        let err = compile("ancestor::para").unwrap_err();
        assert!(err.to_string().contains("must be child or attribute"));
        let err = compile("count(para)").unwrap_err();
        assert!(err.to_string().contains("id() and key()"));
        let err = compile("para/id('x')").unwrap_err();
        assert!(err.to_string().contains("only at the start"));
        let err = compile("para[. = current()]").unwrap_err();
        assert!(err.to_string().contains("current()"));
        assert!(compile("para[").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(compile("/para").unwrap().to_string(), "/para");
        assert_eq!(compile("div//para").unwrap().to_string(), "div//para");
        assert_eq!(compile("key('k', 'v')").unwrap().to_string(), "key('k', 'v')");
    }
}
