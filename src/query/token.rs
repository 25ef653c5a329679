//! Query tokenizer.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\w+|[&|!()]").expect("static regex");
}

/// One lexical token of the query language. Identifiers are case-folded to
/// match indexed terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Id(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

/// Token class, the terminal alphabet of the grammar. `End` marks query end
/// and never appears in the token stream itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Id,
    And,
    Or,
    Not,
    LParen,
    RParen,
    End,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Id(_) => TokenKind::Id,
            Token::And => TokenKind::And,
            Token::Or => TokenKind::Or,
            Token::Not => TokenKind::Not,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Id(id) => f.write_str(id),
            Token::And => f.write_str("&"),
            Token::Or => f.write_str("|"),
            Token::Not => f.write_str("!"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

/// A token with the byte offset it started at in the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub position: usize,
}

/// Split a query into tokens. Characters outside the token alphabet are
/// skipped, like whitespace.
pub fn tokenize(query: &str) -> Vec<SpannedToken> {
    TOKEN
        .find_iter(query)
        .map(|m| {
            let token = match m.as_str() {
                "&" => Token::And,
                "|" => Token::Or,
                "!" => Token::Not,
                "(" => Token::LParen,
                ")" => Token::RParen,
                id => Token::Id(id.to_lowercase()),
            };
            SpannedToken {
                token,
                position: m.start(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_folds_identifiers() {
        let tokens = tokenize("Foo & (BAR|!baz)");
        let kinds: Vec<_> = tokens.iter().map(|t| t.token.kind()).collect();
        assert_eq!(
            kinds,
            [
                TokenKind::Id,
                TokenKind::And,
                TokenKind::LParen,
                TokenKind::Id,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Id,
                TokenKind::RParen,
            ]
        );
        assert_eq!(tokens[0].token, Token::Id("foo".into()));
        assert_eq!(tokens[3].token, Token::Id("bar".into()));
    }

    #[test]
    fn test_tokenize_positions() {
        let tokens = tokenize("ab | cd");
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 3);
        assert_eq!(tokens[2].position, 5);
    }

    #[test]
    fn test_tokenize_skips_junk() {
        let tokens = tokenize("a @# b");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].token, Token::Id("b".into()));
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("   ").is_empty());
    }
}
