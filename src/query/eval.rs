//! Recursive evaluation of parse trees against a pluggable value algebra.
//!
//! The evaluator only knows the tree shape; what AND, OR and NOT mean is
//! supplied by an [`EvalContext`]. The index query path plugs in the lazy
//! key-set algebra, tests plug in simpler algebras.

use crate::error::{Result, SorrelError};
use crate::query::grammar::NonTerminal;
use crate::query::parse::ParseTree;
use crate::query::token::Token;

/// The operations a parse tree evaluates through. Only identifier lookup can
/// fail; the combinators are pure.
pub trait EvalContext {
    type Value;

    fn from_id(&self, id: &str) -> Result<Self::Value>;
    fn cross(&self, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    fn unite(&self, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    fn negate(&self, value: Self::Value) -> Self::Value;
}

/// Evaluate a parse tree. A structurally invalid tree (which a parser-built
/// tree never is) yields an interpretation error, not a panic.
pub fn eval<C: EvalContext>(tree: &ParseTree, context: &C) -> Result<C::Value> {
    match tree {
        ParseTree::Node { rule, children } => match rule {
            NonTerminal::Expr | NonTerminal::Term => eval_chain(*rule, children, context),
            NonTerminal::Operand | NonTerminal::Negated => eval_operand(children, context),
            NonTerminal::ExprRest | NonTerminal::TermRest => Err(malformed()),
        },
        ParseTree::Leaf(_) => Err(malformed()),
    }
}

fn malformed() -> SorrelError {
    SorrelError::interpretation("malformed parse tree")
}

/// Fold an OR or AND chain left to right: the head child, then every
/// continuation of the right-recursive rest node.
fn eval_chain<C: EvalContext>(
    rule: NonTerminal,
    children: &[ParseTree],
    context: &C,
) -> Result<C::Value> {
    let [head, rest] = children else {
        return Err(malformed());
    };
    let mut value = eval(head, context)?;
    let mut rest = rest;
    loop {
        let ParseTree::Node {
            rule: rest_rule,
            children,
        } = rest
        else {
            return Err(malformed());
        };
        match (rule, rest_rule) {
            (NonTerminal::Expr, NonTerminal::ExprRest)
            | (NonTerminal::Term, NonTerminal::TermRest) => {}
            _ => return Err(malformed()),
        }
        match children.as_slice() {
            [] => return Ok(value),
            [ParseTree::Leaf(_), operand, tail] => {
                let rhs = eval(operand, context)?;
                value = match rule {
                    NonTerminal::Expr => context.unite(value, rhs),
                    _ => context.cross(value, rhs),
                };
                rest = tail;
            }
            _ => return Err(malformed()),
        }
    }
}

fn eval_operand<C: EvalContext>(children: &[ParseTree], context: &C) -> Result<C::Value> {
    match children {
        [ParseTree::Leaf(spanned)] => match &spanned.token {
            Token::Id(id) => context.from_id(id),
            _ => Err(malformed()),
        },
        [ParseTree::Leaf(not), target] if not.token == Token::Not => {
            Ok(context.negate(eval(target, context)?))
        }
        [ParseTree::Leaf(open), inner, ParseTree::Leaf(close)]
            if open.token == Token::LParen && close.token == Token::RParen =>
        {
            eval(inner, context)
        }
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse::parse;
    use crate::query::token::tokenize;

    /// Renders the evaluation as a fully parenthesized formula, making
    /// precedence and associativity visible.
    struct Formula;

    impl EvalContext for Formula {
        type Value = String;

        fn from_id(&self, id: &str) -> Result<String> {
            Ok(id.to_string())
        }

        fn cross(&self, lhs: String, rhs: String) -> String {
            format!("({lhs}&{rhs})")
        }

        fn unite(&self, lhs: String, rhs: String) -> String {
            format!("({lhs}|{rhs})")
        }

        fn negate(&self, value: String) -> String {
            format!("!{value}")
        }
    }

    fn formula(query: &str) -> String {
        eval(&parse(&tokenize(query)).unwrap(), &Formula).unwrap()
    }

    #[test]
    fn test_bare_identifier() {
        assert_eq!(formula("word"), "word");
    }

    #[test]
    fn test_precedence_and_over_or() {
        assert_eq!(formula("a & b | c & d"), "((a&b)|(c&d))");
        assert_eq!(formula("a | b & c"), "(a|(b&c))");
    }

    #[test]
    fn test_chains_fold_left() {
        assert_eq!(formula("a & b & c"), "((a&b)&c)");
        assert_eq!(formula("a | b | c"), "((a|b)|c)");
    }

    #[test]
    fn test_negation_binds_tightest() {
        assert_eq!(formula("!a & b"), "(!a&b)");
        assert_eq!(formula("!(a | b) & c"), "(!(a|b)&c)");
        assert_eq!(formula("a & !(b | !c)"), "(a&!(b|!c))");
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        assert_eq!(formula("(a | b) & c"), "((a|b)&c)");
    }

    #[test]
    fn test_malformed_tree_is_an_error() {
        let leaf = ParseTree::Leaf(tokenize("a").remove(0));
        assert!(matches!(
            eval(&leaf, &Formula),
            Err(SorrelError::Interpretation(_))
        ));
    }

    /// Lookup failures surface instead of poisoning the walk.
    #[test]
    fn test_from_id_errors_propagate() {
        struct Failing;
        impl EvalContext for Failing {
            type Value = ();
            fn from_id(&self, id: &str) -> Result<()> {
                Err(SorrelError::interpretation(format!("no such term {id}")))
            }
            fn cross(&self, _: (), _: ()) {}
            fn unite(&self, _: (), _: ()) {}
            fn negate(&self, _: ()) {}
        }
        let tree = parse(&tokenize("a & b")).unwrap();
        assert!(eval(&tree, &Failing).is_err());
    }
}
