//! SQL text accumulation.
//!
//! Every node of a statement appends itself to a [`SqlBuilder`]: SQL text with neutral `?`
//! markers plus the arguments those markers stand for, in left-to-right order. The
//! outermost statement rewrites the markers into the dialect's placeholder form once,
//! after the whole tree has been rendered.

use crate::error::{SqError, SqResult};
use crate::value::Value;
use std::fmt::Write;

/// Accumulates SQL text and positional arguments.
///
/// Rendering never aborts halfway through a tree. A node that cannot render (a failing
/// column mapper, for instance) records the error with [`SqlBuilder::fail`] and the first
/// recorded error is returned by [`SqlBuilder::into_parts`].
#[derive(Debug, Default)]
pub struct SqlBuilder {
    sql: String,
    args: Vec<Value>,
    error: Option<SqError>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a `?` marker bound to `value`.
    pub fn push_arg(&mut self, value: Value) -> &mut Self {
        self.sql.push('?');
        self.args.push(value);
        self
    }

    /// Append `items` separated by `sep`, rendering each with `f`.
    pub fn push_iter<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &str,
        mut f: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            f(self, item);
        }
        self
    }

    /// Append `items` separated by `sep`.
    pub fn push_elems<T: AppendSql>(
        &mut self,
        items: &[T],
        sep: &str,
        excluded: &[&str],
    ) -> &mut Self {
        self.push_iter(items, sep, |buf, item| item.append_sql(buf, excluded))
    }

    /// Record a rendering failure. Only the first failure is kept.
    pub fn fail(&mut self, err: SqError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Consume the builder, returning the SQL and its arguments or the first failure.
    pub fn into_parts(self) -> SqResult<(String, Vec<Value>)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.sql, self.args)),
        }
    }
}

/// A node that can render itself into a [`SqlBuilder`].
///
/// `excluded` lists table qualifiers that must be dropped from column references, so that
/// `UPDATE users SET name = ?` renders `name` rather than `users.name`.
pub trait AppendSql {
    fn append_sql(&self, buf: &mut SqlBuilder, excluded: &[&str]);
}

impl<T: AppendSql + ?Sized> AppendSql for &T {
    fn append_sql(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        (**self).append_sql(buf, excluded)
    }
}

impl<T: AppendSql + ?Sized> AppendSql for Box<T> {
    fn append_sql(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        (**self).append_sql(buf, excluded)
    }
}

/// Rewrite `?` markers into `$1, $2, ...`.
///
/// `??` becomes a literal `?` and markers inside single-quoted string literals are left alone.
pub fn question_to_dollar(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut n = 0usize;
    let mut in_quote = false;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '?' if !in_quote => {
                if chars.peek() == Some(&'?') {
                    chars.next();
                    out.push('?');
                } else {
                    n += 1;
                    let _ = write!(out, "${n}");
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Collapse `??` escapes into a literal `?`, keeping `?` markers as they are.
///
/// Single-quoted string literals are copied untouched.
pub fn collapse_question_escapes(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_quote = false;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => in_quote = !in_quote,
            '?' if !in_quote && chars.peek() == Some(&'?') => {
                chars.next();
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Replace `$n` placeholders with the literal form of the matching argument.
pub fn interpolate_dollar(sql: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len() + args.len() * 8);
    let mut in_quote = false;
    let mut chars = sql.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c == '\'' {
            in_quote = !in_quote;
            out.push(c);
            continue;
        }
        if c != '$' || in_quote {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(&(_, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }
        match digits.parse::<usize>().ok().and_then(|i| args.get(i.wrapping_sub(1))) {
            Some(arg) => out.push_str(&arg.to_sql_literal()),
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

/// Replace `?` markers, in order, with the literal form of each argument.
pub fn interpolate_question(sql: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len() + args.len() * 8);
    let mut in_quote = false;
    let mut args = args.iter();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '?' if !in_quote && chars.peek() == Some(&'?') => {
                chars.next();
                out.push(c);
            }
            '?' if !in_quote => match args.next() {
                Some(arg) => out.push_str(&arg.to_sql_literal()),
                None => out.push(c),
            },
            _ => out.push(c),
        }
    }
    out
}
