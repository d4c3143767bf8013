//! Composable payload predicates.
//!
//! A [`Filter`] decides whether a handler wants a payload and may record
//! [`Metadata`] while doing so, for example the groups captured by a regex.
//! Filters combine with the usual boolean operators:
//!
//! ```rust,ignore
//! use parley_framework::filters::message;
//!
//! let wanted = message::private() & (message::command("start") | message::text());
//! let not_bots = !Filter::new(|m: &Message| m.from.as_ref().is_some_and(|u| u.is_bot));
//! ```
//!
//! # Evaluation
//!
//! Composite filters evaluate **every** operand, even when the boolean
//! result is already decided, and merge the metadata of all operands in
//! operand order. The result itself follows the combinator: `&` needs all
//! operands, `|` needs one, `^` needs exactly one and `!` inverts.
//!
//! Evaluating against a missing payload (`None`) is always a non-match and
//! never calls the underlying predicates.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

// ============================================================================
// Metadata
// ============================================================================

/// String-keyed values captured while evaluating a filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value under `key` if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Deserializes the value under `key` into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether a value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies every entry of `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: Metadata) {
        self.0.extend(other.0);
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the underlying JSON map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// The result of evaluating a filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Whether the payload matched.
    pub matched: bool,
    /// Metadata captured by every evaluated predicate.
    pub metadata: Metadata,
}

impl Evaluation {
    /// A match carrying `metadata`.
    pub fn accepted(metadata: Metadata) -> Self {
        Self {
            matched: true,
            metadata,
        }
    }

    /// A non-match with no metadata.
    pub fn rejected() -> Self {
        Self::default()
    }
}

// ============================================================================
// Filter
// ============================================================================

type PredicateFn<P> = Arc<dyn Fn(&P, &mut Metadata) -> bool + Send + Sync>;

enum Node<P> {
    Predicate(PredicateFn<P>),
    All(Vec<Filter<P>>),
    Any(Vec<Filter<P>>),
    OneOf(Vec<Filter<P>>),
    Not(Filter<P>),
}

/// A composable predicate over payloads of type `P`.
///
/// Cloning is cheap; the predicate tree is shared behind an `Arc`.
pub struct Filter<P> {
    node: Arc<Node<P>>,
}

impl<P> Clone for Filter<P> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<P: 'static> Filter<P> {
    /// Creates a filter from a plain predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        Self::capture(move |payload, _| predicate(payload))
    }

    /// Creates a filter whose predicate may record metadata.
    ///
    /// Metadata written by a predicate that returns `false` is still merged
    /// into the enclosing composite's metadata.
    pub fn capture<F>(predicate: F) -> Self
    where
        F: Fn(&P, &mut Metadata) -> bool + Send + Sync + 'static,
    {
        Self::from_node(Node::Predicate(Arc::new(predicate)))
    }

    /// Matches when every filter matches. An empty list always matches.
    pub fn all(filters: impl IntoIterator<Item = Filter<P>>) -> Self {
        Self::from_node(Node::All(filters.into_iter().collect()))
    }

    /// Matches when at least one filter matches.
    pub fn any(filters: impl IntoIterator<Item = Filter<P>>) -> Self {
        Self::from_node(Node::Any(filters.into_iter().collect()))
    }

    /// Matches when exactly one filter matches.
    pub fn one_of(filters: impl IntoIterator<Item = Filter<P>>) -> Self {
        Self::from_node(Node::OneOf(filters.into_iter().collect()))
    }

    /// Inverts a filter.
    pub fn negate(filter: Filter<P>) -> Self {
        Self::from_node(Node::Not(filter))
    }

    fn from_node(node: Node<P>) -> Self {
        Self {
            node: Arc::new(node),
        }
    }
}

impl<P> Filter<P> {
    /// Evaluates the filter, collecting metadata.
    pub fn evaluate(&self, payload: Option<&P>) -> Evaluation {
        let Some(payload) = payload else {
            return Evaluation::rejected();
        };
        let mut metadata = Metadata::new();
        let matched = self.eval(payload, &mut metadata);
        Evaluation { matched, metadata }
    }

    /// Evaluates the filter, discarding metadata.
    pub fn check(&self, payload: Option<&P>) -> bool {
        self.evaluate(payload).matched
    }

    fn eval(&self, payload: &P, metadata: &mut Metadata) -> bool {
        match self.node.as_ref() {
            Node::Predicate(predicate) => predicate(payload, metadata),
            Node::All(filters) => Self::eval_each(filters, payload, metadata)
                .into_iter()
                .all(|m| m),
            Node::Any(filters) => Self::eval_each(filters, payload, metadata)
                .into_iter()
                .any(|m| m),
            Node::OneOf(filters) => {
                Self::eval_each(filters, payload, metadata)
                    .into_iter()
                    .filter(|m| *m)
                    .count()
                    == 1
            }
            Node::Not(filter) => !filter.eval(payload, metadata),
        }
    }

    fn eval_each(filters: &[Filter<P>], payload: &P, metadata: &mut Metadata) -> Vec<bool> {
        filters
            .iter()
            .map(|filter| filter.eval(payload, metadata))
            .collect()
    }
}

impl<P> fmt::Debug for Filter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node.as_ref() {
            Node::Predicate(_) => f.write_str("Predicate"),
            Node::All(filters) => f.debug_tuple("All").field(filters).finish(),
            Node::Any(filters) => f.debug_tuple("Any").field(filters).finish(),
            Node::OneOf(filters) => f.debug_tuple("OneOf").field(filters).finish(),
            Node::Not(filter) => f.debug_tuple("Not").field(filter).finish(),
        }
    }
}

impl<P: 'static> BitAnd for Filter<P> {
    type Output = Filter<P>;

    fn bitand(self, rhs: Self) -> Self::Output {
        Filter::all([self, rhs])
    }
}

impl<P: 'static> BitOr for Filter<P> {
    type Output = Filter<P>;

    fn bitor(self, rhs: Self) -> Self::Output {
        Filter::any([self, rhs])
    }
}

impl<P: 'static> BitXor for Filter<P> {
    type Output = Filter<P>;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Filter::one_of([self, rhs])
    }
}

impl<P: 'static> Not for Filter<P> {
    type Output = Filter<P>;

    fn not(self) -> Self::Output {
        Filter::negate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn is_even() -> Filter<i32> {
        Filter::new(|n: &i32| n % 2 == 0)
    }

    fn is_positive() -> Filter<i32> {
        Filter::new(|n: &i32| *n > 0)
    }

    fn tagging(key: &'static str, result: bool) -> Filter<i32> {
        Filter::capture(move |_: &i32, meta| {
            meta.insert(key, true);
            result
        })
    }

    #[test]
    fn test_boolean_algebra() {
        for n in [-3, -2, 0, 1, 4] {
            let a = is_even().check(Some(&n));
            let b = is_positive().check(Some(&n));

            assert_eq!((is_even() & is_positive()).check(Some(&n)), a && b);
            assert_eq!((is_even() | is_positive()).check(Some(&n)), a || b);
            assert_eq!((!is_even()).check(Some(&n)), !a);
            assert_eq!((is_even() ^ is_positive()).check(Some(&n)), a ^ b);
        }
    }

    #[test]
    fn test_missing_payload_skips_predicate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let filter = Filter::new(move |_: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        assert!(!filter.check(None));
        assert!(!(!filter.clone()).check(None));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_composites_collect_metadata_from_every_operand() {
        let and = tagging("a", false) & tagging("b", true);
        let eval = and.evaluate(Some(&1));
        assert!(!eval.matched);
        assert!(eval.metadata.contains_key("a"));
        assert!(eval.metadata.contains_key("b"));

        let or = tagging("a", true) | tagging("b", false);
        let eval = or.evaluate(Some(&1));
        assert!(eval.matched);
        assert_eq!(eval.metadata.len(), 2);
    }

    #[test]
    fn test_one_of_needs_exactly_one() {
        let t = || Filter::new(|_: &i32| true);
        let f = || Filter::new(|_: &i32| false);

        assert!(Filter::one_of([t(), f(), f()]).check(Some(&0)));
        assert!(!Filter::one_of([t(), t(), f()]).check(Some(&0)));
        assert!(!Filter::one_of([f(), f()]).check(Some(&0)));
    }

    #[test]
    fn test_later_operand_metadata_wins() {
        let first = Filter::capture(|_: &i32, meta| {
            meta.insert("k", 1);
            true
        });
        let second = Filter::capture(|_: &i32, meta| {
            meta.insert("k", 2);
            true
        });

        let eval = (first & second).evaluate(Some(&0));
        assert_eq!(eval.metadata.get_as::<i32>("k"), Some(2));
    }
}
