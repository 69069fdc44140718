//! Common table expressions.
//!
//! A CTE is rendered by name wherever it is used as a table, and its body is declared once
//! in the WITH prefix of the outermost statement. The prefix is collected from the
//! statement's explicit `with` list plus every CTE referenced anywhere inside it, nested
//! subqueries included, in first-seen order with dependencies ahead of their dependents.

use crate::builder::SqlBuilder;
use crate::field::Field;
use crate::query::Query;

/// A named subquery declared in a WITH clause.
#[derive(Debug, Clone)]
pub struct Cte {
    name: String,
    columns: Vec<String>,
    query: Option<Box<Query>>,
    recursive: bool,
    alias: Option<String>,
}

impl Cte {
    /// `name AS (query)`
    pub fn new(name: impl Into<String>, query: impl Into<Query>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            query: Some(Box::new(query.into().nested())),
            recursive: false,
            alias: None,
        }
    }

    /// A recursive CTE without a body yet.
    ///
    /// Reference it (`cte.get(..)`, or as a table) inside the query passed to
    /// [`Cte::query`]; references without a body render by name only.
    pub fn recursive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            query: None,
            recursive: true,
            alias: None,
        }
    }

    /// Set the body.
    pub fn query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(Box::new(query.into().nested()));
        self
    }

    /// Column names declared after the CTE name: `name(a, b) AS (...)`.
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Alias used where the CTE is referenced as a table.
    pub fn as_(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// A column of this CTE, qualified with its alias or name.
    pub fn get(&self, column: impl Into<String>) -> Field {
        Field::new(self.alias.as_deref().unwrap_or(&self.name), column)
    }

    /// `name [AS alias]`
    pub(crate) fn append_reference(&self, buf: &mut SqlBuilder) {
        buf.push(&self.name);
        if let Some(alias) = &self.alias {
            buf.push(" AS ").push(alias);
        }
    }

    /// `name[(columns)] AS (query)`
    fn append_definition(&self, buf: &mut SqlBuilder) {
        buf.push(&self.name);
        if !self.columns.is_empty() {
            buf.push("(").push(&self.columns.join(", ")).push(")");
        }
        buf.push(" AS (");
        if let Some(query) = &self.query {
            query.append_nested(buf);
        }
        buf.push(")");
    }
}

/// Add `cte` and the CTEs its body depends on to `out`, skipping names already present.
pub(crate) fn add_cte(out: &mut Vec<Cte>, cte: &Cte) {
    let Some(query) = &cte.query else {
        return;
    };
    if out.iter().any(|c| c.name == cte.name) {
        return;
    }
    query.collect_ctes(out);
    if !out.iter().any(|c| c.name == cte.name) {
        out.push(cte.clone());
    }
}

/// `WITH [RECURSIVE] a AS (...), b AS (...) `, or nothing.
pub(crate) fn append_with(buf: &mut SqlBuilder, ctes: &[Cte]) {
    if ctes.is_empty() {
        return;
    }
    buf.push("WITH ");
    if ctes.iter().any(|c| c.recursive) {
        buf.push("RECURSIVE ");
    }
    buf.push_iter(ctes, ", ", |buf, cte| cte.append_definition(buf));
    buf.push(" ");
}
