//! Lazy sorted-set algebra over strictly ascending key sequences.
//!
//! A [`KeySet`] pairs a lazy, strictly ascending sequence of comparable keys
//! with a `negated` flag meaning "the true set is the complement of this
//! sequence over the universe of all keys". The three combinators exposed to
//! the boolean evaluator, [`cross`] (AND), [`unite`] (OR) and [`negate`]
//! (NOT), dispatch on the negation flags via De Morgan's laws, so a negated
//! operand's complement is never materialized.
//!
//! All combinators are built from three merge primitives (union,
//! intersection, difference) over plain sequences. Inputs must be strictly
//! ascending; outputs preserve that invariant, enabling chained composition
//! without re-sorting.

use std::cmp::Ordering;

/// A lazy set of sorted keys, possibly standing for its own complement.
pub struct KeySet<T> {
    iter: Box<dyn Iterator<Item = T>>,
    negated: bool,
}

impl<T: 'static> KeySet<T> {
    /// Wrap a strictly ascending iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = T> + 'static,
    {
        KeySet {
            iter: Box::new(iter),
            negated: false,
        }
    }

    /// Wrap an already sorted, deduplicated vector.
    pub fn from_sorted(keys: Vec<T>) -> Self {
        KeySet::new(keys.into_iter())
    }

    /// The empty set.
    pub fn empty() -> Self {
        KeySet::new(std::iter::empty())
    }

    /// Whether this set stands for the complement of its sequence.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    fn with_negated(iter: Box<dyn Iterator<Item = T>>, negated: bool) -> Self {
        KeySet { iter, negated }
    }
}

impl<T> Iterator for KeySet<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.iter.next()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for KeySet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("negated", &self.negated)
            .finish_non_exhaustive()
    }
}

/// Default duplicate-key policy: keep the right-hand value.
fn prefer_right<T>(_lhs: T, rhs: T) -> T {
    rhs
}

fn union<T, F>(
    a: Box<dyn Iterator<Item = T>>,
    b: Box<dyn Iterator<Item = T>>,
    merge: F,
) -> Box<dyn Iterator<Item = T>>
where
    T: Ord + 'static,
    F: Fn(T, T) -> T + 'static,
{
    let mut a = a.peekable();
    let mut b = b.peekable();
    Box::new(std::iter::from_fn(move || match (a.peek(), b.peek()) {
        (Some(x), Some(y)) => match x.cmp(y) {
            Ordering::Less => a.next(),
            Ordering::Greater => b.next(),
            Ordering::Equal => {
                let x = a.next().unwrap();
                let y = b.next().unwrap();
                Some(merge(x, y))
            }
        },
        (Some(_), None) => a.next(),
        (None, Some(_)) => b.next(),
        (None, None) => None,
    }))
}

fn intersection<T, F>(
    a: Box<dyn Iterator<Item = T>>,
    b: Box<dyn Iterator<Item = T>>,
    merge: F,
) -> Box<dyn Iterator<Item = T>>
where
    T: Ord + 'static,
    F: Fn(T, T) -> T + 'static,
{
    let mut a = a.peekable();
    let mut b = b.peekable();
    Box::new(std::iter::from_fn(move || {
        loop {
            match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => match x.cmp(y) {
                    Ordering::Less => {
                        a.next();
                    }
                    Ordering::Greater => {
                        b.next();
                    }
                    Ordering::Equal => {
                        let x = a.next().unwrap();
                        let y = b.next().unwrap();
                        return Some(merge(x, y));
                    }
                },
                _ => return None,
            }
        }
    }))
}

/// Keys of `a` not present in `b`.
fn difference<T>(
    a: Box<dyn Iterator<Item = T>>,
    b: Box<dyn Iterator<Item = T>>,
) -> Box<dyn Iterator<Item = T>>
where
    T: Ord + 'static,
{
    let mut a = a.peekable();
    let mut b = b.peekable();
    Box::new(std::iter::from_fn(move || {
        loop {
            match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => match x.cmp(y) {
                    Ordering::Less => return a.next(),
                    Ordering::Greater => {
                        b.next();
                    }
                    Ordering::Equal => {
                        a.next();
                        b.next();
                    }
                },
                (Some(_), None) => return a.next(),
                _ => return None,
            }
        }
    }))
}

/// Set intersection ("AND") with De Morgan handling of negated operands.
///
/// `¬A ∩ ¬B = ¬(A ∪ B)`; `A ∩ ¬B = A \ B`.
pub fn cross<T: Ord + 'static>(lhs: KeySet<T>, rhs: KeySet<T>) -> KeySet<T> {
    cross_with(lhs, rhs, prefer_right)
}

/// [`cross`] with a caller-supplied merge for keys present in both inputs.
pub fn cross_with<T, F>(lhs: KeySet<T>, rhs: KeySet<T>, merge: F) -> KeySet<T>
where
    T: Ord + 'static,
    F: Fn(T, T) -> T + 'static,
{
    match (lhs.negated, rhs.negated) {
        (true, true) => KeySet::with_negated(union(lhs.iter, rhs.iter, merge), true),
        (false, true) => KeySet::with_negated(difference(lhs.iter, rhs.iter), false),
        (true, false) => KeySet::with_negated(difference(rhs.iter, lhs.iter), false),
        (false, false) => KeySet::with_negated(intersection(lhs.iter, rhs.iter, merge), false),
    }
}

/// Set union ("OR") with De Morgan handling of negated operands.
///
/// `¬A ∪ ¬B = ¬(A ∩ B)`; `A ∪ ¬B = ¬(B \ A)`.
pub fn unite<T: Ord + 'static>(lhs: KeySet<T>, rhs: KeySet<T>) -> KeySet<T> {
    unite_with(lhs, rhs, prefer_right)
}

/// [`unite`] with a caller-supplied merge for keys present in both inputs.
pub fn unite_with<T, F>(lhs: KeySet<T>, rhs: KeySet<T>, merge: F) -> KeySet<T>
where
    T: Ord + 'static,
    F: Fn(T, T) -> T + 'static,
{
    match (lhs.negated, rhs.negated) {
        (true, true) => KeySet::with_negated(intersection(lhs.iter, rhs.iter, merge), true),
        (false, true) => KeySet::with_negated(difference(rhs.iter, lhs.iter), true),
        (true, false) => KeySet::with_negated(difference(lhs.iter, rhs.iter), true),
        (false, false) => KeySet::with_negated(union(lhs.iter, rhs.iter, merge), false),
    }
}

/// Complement. O(1): flips the flag, never touches the sequence.
pub fn negate<T>(set: KeySet<T>) -> KeySet<T> {
    KeySet {
        iter: set.iter,
        negated: !set.negated,
    }
}
