//! Logical combination of rules.
//!
//! An [`Expr`] is a tree whose leaves are textual rule strings and whose
//! internal nodes combine children with `AND` or `OR`. Evaluation folds the
//! children left to right in declared order and short-circuits, so a leaf
//! whose outcome cannot change the result is never consulted. That matters
//! because consulting a leaf costs a store round-trip.

use std::collections::BTreeSet;

use futures::future::BoxFuture;

/// Predicate applied to each leaf rule text during evaluation.
pub type LeafPredicate<'a, E> =
    dyn Fn(&'a str) -> BoxFuture<'a, Result<bool, E>> + Send + Sync + 'a;

/// A logical expression over rule strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A single bare rule.
    Rule(String),
    /// True iff every child is true. Stops at the first false child.
    And(Vec<Expr>),
    /// True iff any child is true. Stops at the first true child.
    Or(Vec<Expr>),
}

/// Combine children with logical AND.
pub fn and<E: Into<Expr>>(children: impl IntoIterator<Item = E>) -> Expr {
    Expr::And(children.into_iter().map(Into::into).collect())
}

/// Combine children with logical OR.
pub fn or<E: Into<Expr>>(children: impl IntoIterator<Item = E>) -> Expr {
    Expr::Or(children.into_iter().map(Into::into).collect())
}

impl From<&str> for Expr {
    fn from(rule: &str) -> Self {
        Expr::Rule(rule.to_string())
    }
}

impl From<String> for Expr {
    fn from(rule: String) -> Self {
        Expr::Rule(rule)
    }
}

impl Expr {
    /// Evaluate the tree with `predicate` deciding each leaf.
    ///
    /// Children are folded strictly left to right. `And` stops at the first
    /// false child and `Or` at the first true one; the fold returns early,
    /// so short-circuited leaves are never invoked. Predicate errors abort
    /// the whole evaluation.
    pub fn evaluate<'a, E: Send + 'a>(
        &'a self,
        predicate: &'a LeafPredicate<'a, E>,
    ) -> BoxFuture<'a, Result<bool, E>> {
        Box::pin(async move {
            match self {
                Expr::Rule(text) => predicate(text).await,
                Expr::And(children) => {
                    for child in children {
                        if !child.evaluate(predicate).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Expr::Or(children) => {
                    for child in children {
                        if child.evaluate(predicate).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        })
    }

    /// Every leaf rule text anywhere in the tree, deduplicated.
    ///
    /// Unlike evaluation this never short-circuits: recording has to cover
    /// every declared rule, not only the branch that happened to be visited.
    pub fn leaves(&self) -> BTreeSet<&str> {
        let mut acc = BTreeSet::new();
        self.collect_leaves(&mut acc);
        acc
    }

    fn collect_leaves<'a>(&'a self, acc: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Rule(text) => {
                acc.insert(text.as_str());
            }
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.collect_leaves(acc);
                }
            }
        }
    }
}
