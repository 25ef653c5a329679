//! Generic LL(1) grammar machinery and the boolean query grammar.
//!
//! A [`Grammar`] is a plain list of productions over [`TokenKind`] terminals.
//! [`Grammar::into_table`] computes FIRST and FOLLOW sets and builds the
//! prediction table, rejecting grammars with table conflicts. The boolean
//! query grammar is defined at the bottom and its table is built once.

use ahash::{AHashMap, AHashSet};
use lazy_static::lazy_static;

use crate::error::{Result, SorrelError};
use crate::query::token::TokenKind;

/// Nonterminals of the boolean query grammar, lowest precedence first:
/// OR chains, AND chains, then single operands and negation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonTerminal {
    Expr,
    ExprRest,
    Term,
    TermRest,
    Operand,
    Negated,
}

/// One right-hand-side symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Terminal(TokenKind),
    Rule(NonTerminal),
}

/// A single production. An empty `rhs` is an epsilon production.
#[derive(Debug, Clone)]
pub struct Production {
    pub lhs: NonTerminal,
    pub rhs: Vec<Symbol>,
}

/// A context-free grammar with a designated start symbol.
pub struct Grammar {
    pub start: NonTerminal,
    pub productions: Vec<Production>,
}

type FirstSets = AHashMap<NonTerminal, AHashSet<TokenKind>>;

impl Grammar {
    fn nonterminals(&self) -> AHashSet<NonTerminal> {
        let mut rules = AHashSet::new();
        for production in &self.productions {
            rules.insert(production.lhs);
            for symbol in &production.rhs {
                if let Symbol::Rule(rule) = symbol {
                    rules.insert(*rule);
                }
            }
        }
        rules
    }

    /// FIRST sets plus the set of nullable nonterminals, by fixpoint.
    fn first_sets(&self) -> (FirstSets, AHashSet<NonTerminal>) {
        let mut first: FirstSets = self
            .nonterminals()
            .into_iter()
            .map(|rule| (rule, AHashSet::new()))
            .collect();
        let mut nullable: AHashSet<NonTerminal> = AHashSet::new();
        loop {
            let mut changed = false;
            for production in &self.productions {
                let (set, is_nullable) = sequence_first(&production.rhs, &first, &nullable);
                let target = first.get_mut(&production.lhs).expect("known nonterminal");
                for kind in set {
                    changed |= target.insert(kind);
                }
                if is_nullable {
                    changed |= nullable.insert(production.lhs);
                }
            }
            if !changed {
                return (first, nullable);
            }
        }
    }

    /// FOLLOW sets, by fixpoint. The start symbol is followed by `End`.
    fn follow_sets(&self, first: &FirstSets, nullable: &AHashSet<NonTerminal>) -> FirstSets {
        let mut follow: FirstSets = self
            .nonterminals()
            .into_iter()
            .map(|rule| (rule, AHashSet::new()))
            .collect();
        follow
            .get_mut(&self.start)
            .expect("start is a nonterminal")
            .insert(TokenKind::End);
        loop {
            let mut changed = false;
            for production in &self.productions {
                for (at, symbol) in production.rhs.iter().enumerate() {
                    let Symbol::Rule(rule) = symbol else { continue };
                    let (tail, tail_nullable) =
                        sequence_first(&production.rhs[at + 1..], first, nullable);
                    let lhs_follow: Vec<TokenKind> = if tail_nullable {
                        follow[&production.lhs].iter().copied().collect()
                    } else {
                        Vec::new()
                    };
                    let target = follow.get_mut(rule).expect("known nonterminal");
                    for kind in tail.into_iter().chain(lhs_follow) {
                        changed |= target.insert(kind);
                    }
                }
            }
            if !changed {
                return follow;
            }
        }
    }

    /// Build the LL(1) prediction table, or fail on a conflict.
    pub fn into_table(self) -> Result<ParseTable> {
        let (first, nullable) = self.first_sets();
        let follow = self.follow_sets(&first, &nullable);

        let mut map: AHashMap<(NonTerminal, TokenKind), usize> = AHashMap::new();
        for (index, production) in self.productions.iter().enumerate() {
            let (set, is_nullable) = sequence_first(&production.rhs, &first, &nullable);
            let predict = set.into_iter().chain(if is_nullable {
                follow[&production.lhs].iter().copied().collect::<Vec<_>>()
            } else {
                Vec::new()
            });
            for kind in predict {
                if map.insert((production.lhs, kind), index).is_some() {
                    return Err(SorrelError::config(format!(
                        "grammar is not LL(1): conflict at ({:?}, {:?})",
                        production.lhs, kind
                    )));
                }
            }
        }
        Ok(ParseTable {
            grammar: self,
            map,
        })
    }
}

/// FIRST of a symbol sequence, and whether the whole sequence is nullable.
fn sequence_first(
    symbols: &[Symbol],
    first: &FirstSets,
    nullable: &AHashSet<NonTerminal>,
) -> (AHashSet<TokenKind>, bool) {
    let mut set = AHashSet::new();
    for symbol in symbols {
        match symbol {
            Symbol::Terminal(kind) => {
                set.insert(*kind);
                return (set, false);
            }
            Symbol::Rule(rule) => {
                set.extend(first[rule].iter().copied());
                if !nullable.contains(rule) {
                    return (set, false);
                }
            }
        }
    }
    (set, true)
}

/// The prediction table driving the parser.
pub struct ParseTable {
    grammar: Grammar,
    map: AHashMap<(NonTerminal, TokenKind), usize>,
}

impl ParseTable {
    pub fn start(&self) -> NonTerminal {
        self.grammar.start
    }

    /// The production predicted for `rule` on lookahead `kind`, if any.
    pub fn production(&self, rule: NonTerminal, kind: TokenKind) -> Option<&Production> {
        self.map
            .get(&(rule, kind))
            .map(|&index| &self.grammar.productions[index])
    }
}

/// The boolean query grammar. Precedence, low to high: OR, AND, NOT,
/// grouping. OR and AND chains are right-recursive, which an LL(1) parser
/// requires; both operators are associative, so grouping does not matter.
pub fn boolean_grammar() -> Grammar {
    use NonTerminal::*;
    use Symbol::{Rule, Terminal};
    use TokenKind as K;
    Grammar {
        start: Expr,
        productions: vec![
            Production { lhs: Expr, rhs: vec![Rule(Term), Rule(ExprRest)] },
            Production { lhs: ExprRest, rhs: vec![] },
            Production {
                lhs: ExprRest,
                rhs: vec![Terminal(K::Or), Rule(Term), Rule(ExprRest)],
            },
            Production { lhs: Term, rhs: vec![Rule(Operand), Rule(TermRest)] },
            Production { lhs: TermRest, rhs: vec![] },
            Production {
                lhs: TermRest,
                rhs: vec![Terminal(K::And), Rule(Operand), Rule(TermRest)],
            },
            Production { lhs: Operand, rhs: vec![Terminal(K::Id)] },
            Production {
                lhs: Operand,
                rhs: vec![Terminal(K::Not), Rule(Negated)],
            },
            Production {
                lhs: Operand,
                rhs: vec![Terminal(K::LParen), Rule(Expr), Terminal(K::RParen)],
            },
            Production { lhs: Negated, rhs: vec![Terminal(K::Id)] },
            Production {
                lhs: Negated,
                rhs: vec![Terminal(K::LParen), Rule(Expr), Terminal(K::RParen)],
            },
        ],
    }
}

lazy_static! {
    /// The boolean grammar's prediction table, built once.
    pub static ref BOOLEAN_TABLE: ParseTable =
        boolean_grammar().into_table().expect("boolean grammar is LL(1)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_grammar_is_ll1() {
        assert!(boolean_grammar().into_table().is_ok());
    }

    #[test]
    fn test_table_predictions() {
        let table = &*BOOLEAN_TABLE;
        // An identifier can start a whole expression.
        assert!(table.production(NonTerminal::Expr, TokenKind::Id).is_some());
        // An OR chain continues on '|' and ends at ')' or end of query.
        assert!(table
            .production(NonTerminal::ExprRest, TokenKind::Or)
            .is_some());
        assert!(table
            .production(NonTerminal::ExprRest, TokenKind::End)
            .is_some());
        assert!(table
            .production(NonTerminal::ExprRest, TokenKind::RParen)
            .is_some());
        // '&' cannot start an operand.
        assert!(table
            .production(NonTerminal::Operand, TokenKind::And)
            .is_none());
        // '!!' is not part of the language.
        assert!(table
            .production(NonTerminal::Negated, TokenKind::Not)
            .is_none());
    }

    #[test]
    fn test_conflicting_grammar_rejected() {
        use NonTerminal::*;
        use Symbol::Terminal;
        let grammar = Grammar {
            start: Expr,
            productions: vec![
                Production { lhs: Expr, rhs: vec![Terminal(TokenKind::Id)] },
                Production { lhs: Expr, rhs: vec![Terminal(TokenKind::Id)] },
            ],
        };
        assert!(grammar.into_table().is_err());
    }
}
