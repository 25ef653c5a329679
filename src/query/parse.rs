//! Table-driven predictive parser for boolean queries.

use crate::error::{Result, SorrelError};
use crate::query::grammar::{NonTerminal, ParseTable, Symbol, BOOLEAN_TABLE};
use crate::query::token::{SpannedToken, TokenKind};

/// A concrete parse tree: interior nodes are grammar rules, leaves are the
/// consumed tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseTree {
    Leaf(SpannedToken),
    Node {
        rule: NonTerminal,
        children: Vec<ParseTree>,
    },
}

/// Parse a token stream into a tree, rejecting anything the grammar does not
/// cover, including trailing tokens after a complete expression.
pub fn parse(tokens: &[SpannedToken]) -> Result<ParseTree> {
    let table = &*BOOLEAN_TABLE;
    let mut cursor = Cursor { tokens, at: 0 };
    let tree = parse_rule(table.start(), table, &mut cursor)?;
    if cursor.at < tokens.len() {
        return Err(cursor.unexpected());
    }
    Ok(tree)
}

struct Cursor<'a> {
    tokens: &'a [SpannedToken],
    at: usize,
}

impl Cursor<'_> {
    fn kind(&self) -> TokenKind {
        self.tokens
            .get(self.at)
            .map_or(TokenKind::End, |t| t.token.kind())
    }

    fn unexpected(&self) -> SorrelError {
        match self.tokens.get(self.at) {
            Some(spanned) => SorrelError::Syntax {
                token: spanned.token.to_string(),
                position: spanned.position,
            },
            None => SorrelError::Syntax {
                token: "end of query".to_string(),
                position: self
                    .tokens
                    .last()
                    .map_or(0, |t| t.position + t.token.to_string().len()),
            },
        }
    }

    fn take(&mut self, kind: TokenKind) -> Result<SpannedToken> {
        if self.kind() != kind {
            return Err(self.unexpected());
        }
        let token = self.tokens[self.at].clone();
        self.at += 1;
        Ok(token)
    }
}

fn parse_rule(rule: NonTerminal, table: &ParseTable, cursor: &mut Cursor) -> Result<ParseTree> {
    let production = table
        .production(rule, cursor.kind())
        .ok_or_else(|| cursor.unexpected())?;
    let mut children = Vec::with_capacity(production.rhs.len());
    for symbol in &production.rhs {
        match symbol {
            Symbol::Terminal(kind) => children.push(ParseTree::Leaf(cursor.take(*kind)?)),
            Symbol::Rule(inner) => children.push(parse_rule(*inner, table, cursor)?),
        }
    }
    Ok(ParseTree::Node { rule, children })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::token::tokenize;

    fn parse_str(query: &str) -> Result<ParseTree> {
        parse(&tokenize(query))
    }

    fn syntax_error(query: &str) -> (String, usize) {
        match parse_str(query) {
            Err(SorrelError::Syntax { token, position }) => (token, position),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_accepts_well_formed_queries() {
        for query in [
            "a",
            "a & b",
            "a | b",
            "a & b & c",
            "a | b | c",
            "a & b | c & d",
            "!a",
            "!(a | b) & c",
            "((a))",
            "a & !(b | !c)",
        ] {
            assert!(parse_str(query).is_ok(), "failed to parse {query:?}");
        }
    }

    #[test]
    fn test_parse_rejects_malformed_queries() {
        for query in ["", "&", "a &", "a & & b", "a | | b", "(a", "a)", "!!a", "! & a"] {
            assert!(parse_str(query).is_err(), "accepted {query:?}");
        }
    }

    #[test]
    fn test_error_carries_offending_token_and_position() {
        let (token, position) = syntax_error("a & & b");
        assert_eq!(token, "&");
        assert_eq!(position, 4);

        let (token, position) = syntax_error("a &");
        assert_eq!(token, "end of query");
        assert_eq!(position, 3);
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let (token, position) = syntax_error("a b");
        assert_eq!(token, "b");
        assert_eq!(position, 2);

        let (token, _) = syntax_error("(a) )");
        assert_eq!(token, ")");
    }

    #[test]
    fn test_bare_identifier_tree_shape() {
        let tree = parse_str("word").unwrap();
        let ParseTree::Node { rule, children } = &tree else {
            panic!("expected a node");
        };
        assert_eq!(*rule, NonTerminal::Expr);
        assert_eq!(children.len(), 2);
    }
}
