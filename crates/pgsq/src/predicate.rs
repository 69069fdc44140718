//! Boolean expressions for WHERE, HAVING, ON and ON CONFLICT clauses.
//!
//! Parenthesization follows three rules:
//! - a clause's top-level list is AND-joined and never wrapped in parentheses;
//! - a nested [`VariadicPredicate`] with two or more members is wrapped;
//! - a single-member group renders its only child in the group's own position, so it is
//!   never wrapped itself.

use crate::builder::{AppendSql, SqlBuilder};
use crate::cte::Cte;
use crate::field::{Operand, append_format};
use crate::query::Query;

/// Members of an `IN` list.
#[derive(Debug, Clone)]
pub enum InList {
    Items(Vec<Operand>),
    Query(Box<Query>),
}

/// A boolean expression.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `left op right`
    Compare {
        left: Operand,
        op: &'static str,
        right: Operand,
    },
    /// `operand IS [NOT] NULL`
    Null { operand: Operand, negated: bool },
    /// `operand [NOT] IN (...)`
    In {
        operand: Operand,
        list: InList,
        negated: bool,
    },
    /// `operand [NOT] BETWEEN low AND high`
    Between {
        operand: Operand,
        low: Operand,
        high: Operand,
        negated: bool,
    },
    /// `[NOT] EXISTS (query)`
    Exists { query: Box<Query>, negated: bool },
    /// `NOT predicate`
    Not(Box<Predicate>),
    /// Custom SQL with `?` slots filled by operands.
    Custom {
        format: String,
        operands: Vec<Operand>,
    },
    /// AND/OR group.
    Group(VariadicPredicate),
}

/// Logical combinator of a [`VariadicPredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    And,
    Or,
}

impl Logical {
    fn keyword(self) -> &'static str {
        match self {
            Logical::And => " AND ",
            Logical::Or => " OR ",
        }
    }

    /// What an empty group evaluates to.
    fn identity(self) -> &'static str {
        match self {
            Logical::And => "1=1",
            Logical::Or => "1=0",
        }
    }
}

/// An AND/OR group of predicates.
#[derive(Debug, Clone)]
pub struct VariadicPredicate {
    pub logical: Logical,
    pub predicates: Vec<Predicate>,
}

impl VariadicPredicate {
    pub(crate) fn append_group(&self, buf: &mut SqlBuilder, excluded: &[&str], toplevel: bool) {
        append_group(buf, self.logical, &self.predicates, excluded, toplevel);
    }
}

/// Render `predicates` joined by `logical`.
///
/// The top-level form never emits parentheses and renders nothing for an empty list, so
/// callers check for emptiness before writing the clause keyword.
pub(crate) fn append_group(
    buf: &mut SqlBuilder,
    logical: Logical,
    predicates: &[Predicate],
    excluded: &[&str],
    toplevel: bool,
) {
    match predicates {
        [] => {
            if !toplevel {
                buf.push(logical.identity());
            }
        }
        [only] => only.append_inner(buf, excluded, toplevel),
        many => {
            if !toplevel {
                buf.push("(");
            }
            buf.push_iter(many, logical.keyword(), |buf, p| {
                p.append_inner(buf, excluded, false)
            });
            if !toplevel {
                buf.push(")");
            }
        }
    }
}

/// Render a clause body such as `WHERE`'s: the top-level AND list.
pub(crate) fn append_conjunction(buf: &mut SqlBuilder, predicates: &[Predicate], excluded: &[&str]) {
    append_group(buf, Logical::And, predicates, excluded, true);
}

impl Predicate {
    fn append_inner(&self, buf: &mut SqlBuilder, excluded: &[&str], toplevel: bool) {
        match self {
            Predicate::Group(group) => group.append_group(buf, excluded, toplevel),
            other => other.append_sql(buf, excluded),
        }
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        match self {
            Predicate::Compare { left, right, .. } => {
                left.collect_ctes(out);
                right.collect_ctes(out);
            }
            Predicate::Null { operand, .. } => operand.collect_ctes(out),
            Predicate::In { operand, list, .. } => {
                operand.collect_ctes(out);
                match list {
                    InList::Items(items) => items.iter().for_each(|o| o.collect_ctes(out)),
                    InList::Query(q) => q.collect_ctes(out),
                }
            }
            Predicate::Between {
                operand, low, high, ..
            } => {
                operand.collect_ctes(out);
                low.collect_ctes(out);
                high.collect_ctes(out);
            }
            Predicate::Exists { query, .. } => query.collect_ctes(out),
            Predicate::Not(inner) => inner.collect_ctes(out),
            Predicate::Custom { operands, .. } => operands.iter().for_each(|o| o.collect_ctes(out)),
            Predicate::Group(group) => group.predicates.iter().for_each(|p| p.collect_ctes(out)),
        }
    }

    /// Combine with another predicate under AND.
    pub fn and(self, other: Predicate) -> Predicate {
        and([self, other])
    }

    /// Combine with another predicate under OR.
    pub fn or(self, other: Predicate) -> Predicate {
        or([self, other])
    }
}

impl AppendSql for Predicate {
    fn append_sql(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        match self {
            Predicate::Compare { left, op, right } => {
                left.append_sql(buf, excluded);
                buf.push(" ").push(op).push(" ");
                right.append_sql(buf, excluded);
            }
            Predicate::Null { operand, negated } => {
                operand.append_sql(buf, excluded);
                buf.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::In {
                operand,
                list,
                negated,
            } => {
                operand.append_sql(buf, excluded);
                buf.push(if *negated { " NOT IN (" } else { " IN (" });
                match list {
                    InList::Items(items) if items.is_empty() => {
                        buf.push("NULL");
                    }
                    InList::Items(items) => {
                        buf.push_elems(items, ", ", excluded);
                    }
                    InList::Query(q) => q.append_nested(buf),
                }
                buf.push(")");
            }
            Predicate::Between {
                operand,
                low,
                high,
                negated,
            } => {
                operand.append_sql(buf, excluded);
                buf.push(if *negated {
                    " NOT BETWEEN "
                } else {
                    " BETWEEN "
                });
                low.append_sql(buf, excluded);
                buf.push(" AND ");
                high.append_sql(buf, excluded);
            }
            Predicate::Exists { query, negated } => {
                buf.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                query.append_nested(buf);
                buf.push(")");
            }
            Predicate::Not(inner) => {
                buf.push("NOT ");
                inner.append_inner(buf, excluded, false);
            }
            Predicate::Custom { format, operands } => {
                append_format(buf, format, operands, excluded);
            }
            Predicate::Group(group) => group.append_group(buf, excluded, false),
        }
    }
}

/// AND group. Members are parenthesized where the group is nested.
pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::Group(VariadicPredicate {
        logical: Logical::And,
        predicates: predicates.into_iter().collect(),
    })
}

/// OR group.
pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::Group(VariadicPredicate {
        logical: Logical::Or,
        predicates: predicates.into_iter().collect(),
    })
}

pub fn not(predicate: Predicate) -> Predicate {
    Predicate::Not(Box::new(predicate))
}

/// `EXISTS (query)`
pub fn exists(query: impl Into<Query>) -> Predicate {
    Predicate::Exists {
        query: Box::new(query.into().nested()),
        negated: false,
    }
}

/// `NOT EXISTS (query)`
pub fn not_exists(query: impl Into<Query>) -> Predicate {
    Predicate::Exists {
        query: Box::new(query.into().nested()),
        negated: true,
    }
}

/// Custom predicate: each `?` in `format` is replaced by the next operand.
pub fn predicatef(
    format: impl Into<String>,
    operands: impl IntoIterator<Item = Operand>,
) -> Predicate {
    Predicate::Custom {
        format: format.into(),
        operands: operands.into_iter().collect(),
    }
}
