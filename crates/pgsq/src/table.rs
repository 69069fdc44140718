//! Tables and joins.
//!
//! [`Table`] is the closed set of things a FROM, JOIN or USING clause can name. Subqueries
//! are parenthesized and always aliased; a subquery without an explicit alias gets a
//! generated one that is stable for the same query value.

use crate::builder::{AppendSql, SqlBuilder};
use crate::cte::{Cte, add_cte};
use crate::field::{Field, Operand};
use crate::predicate::{Predicate, append_conjunction};
use crate::query::Query;

/// A physical table, optionally schema-qualified and aliased.
#[derive(Debug, Clone)]
pub struct BaseTable {
    schema: Option<String>,
    name: String,
    alias: Option<String>,
}

impl BaseTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            alias: None,
        }
    }

    /// `schema.name`
    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
            alias: None,
        }
    }

    pub fn as_(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// What columns of this table are qualified with: the alias, else the bare name.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// A column of this table.
    pub fn col(&self, name: impl Into<String>) -> Field {
        Field::new(self.qualifier(), name)
    }

    /// `schema.name [AS alias]`
    pub(crate) fn append_source(&self, buf: &mut SqlBuilder) {
        if let Some(schema) = &self.schema {
            buf.push(schema).push(".");
        }
        buf.push(&self.name);
        if let Some(alias) = &self.alias {
            buf.push(" AS ").push(alias);
        }
    }
}

/// A set-returning function used as a table, e.g. `generate_series(?, ?) AS s(n)`.
#[derive(Debug, Clone)]
pub struct FunctionTable {
    name: String,
    args: Vec<Operand>,
    alias: Option<String>,
    columns: Vec<String>,
}

impl FunctionTable {
    pub fn new<I, O>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Operand>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            alias: None,
            columns: Vec::new(),
        }
    }

    pub fn as_(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Column names declared after the alias: `AS s(n)`.
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn col(&self, name: impl Into<String>) -> Field {
        Field::new(self.alias.as_deref().unwrap_or(&self.name), name)
    }

    fn append_source(&self, buf: &mut SqlBuilder) {
        buf.push(&self.name).push("(");
        buf.push_elems(&self.args, ", ", &[]);
        buf.push(")");
        if let Some(alias) = &self.alias {
            buf.push(" AS ").push(alias);
            if !self.columns.is_empty() {
                buf.push("(").push(&self.columns.join(", ")).push(")");
            }
        }
    }
}

/// Anything a FROM, JOIN, USING or UPDATE ... FROM clause can name.
#[derive(Debug, Clone)]
pub enum Table {
    Base(BaseTable),
    /// Derived table. Rendered as `(query) AS alias`.
    Query(Box<Query>),
    /// Reference to a common table expression, rendered by name.
    Cte(Cte),
    Function(FunctionTable),
    /// A table with joins applied, usable where a single table is expected.
    Join {
        table: Box<Table>,
        joins: Vec<JoinTable>,
    },
}

impl Table {
    /// Render the table as a row source.
    pub(crate) fn append_source(&self, buf: &mut SqlBuilder) {
        match self {
            Table::Base(base) => base.append_source(buf),
            Table::Query(query) => {
                buf.push("(");
                query.append_nested(buf);
                buf.push(") AS ").push(&query.alias());
            }
            Table::Cte(cte) => cte.append_reference(buf),
            Table::Function(function) => function.append_source(buf),
            Table::Join { table, joins } => {
                table.append_source(buf);
                append_joins(buf, joins);
            }
        }
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        match self {
            Table::Base(_) => {}
            Table::Query(query) => query.collect_ctes(out),
            Table::Cte(cte) => add_cte(out, cte),
            Table::Function(function) => function.args.iter().for_each(|a| a.collect_ctes(out)),
            Table::Join { table, joins } => {
                table.collect_ctes(out);
                joins.iter().for_each(|j| j.collect_ctes(out));
            }
        }
    }

    /// Apply joins to this table.
    pub fn join_with(self, joins: impl IntoIterator<Item = JoinTable>) -> Table {
        Table::Join {
            table: Box::new(self),
            joins: joins.into_iter().collect(),
        }
    }
}

impl From<BaseTable> for Table {
    fn from(t: BaseTable) -> Self {
        Table::Base(t)
    }
}

impl From<&BaseTable> for Table {
    fn from(t: &BaseTable) -> Self {
        Table::Base(t.clone())
    }
}

impl From<Cte> for Table {
    fn from(c: Cte) -> Self {
        Table::Cte(c)
    }
}

impl From<&Cte> for Table {
    fn from(c: &Cte) -> Self {
        Table::Cte(c.clone())
    }
}

impl From<FunctionTable> for Table {
    fn from(f: FunctionTable) -> Self {
        Table::Function(f)
    }
}

impl From<Query> for Table {
    fn from(q: Query) -> Self {
        Table::Query(Box::new(q.nested()))
    }
}

/// Join keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Natural,
    /// Any other keyword, emitted verbatim. Empty means `JOIN`.
    Custom(String),
}

impl JoinType {
    pub fn keyword(&self) -> &str {
        match self {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
            JoinType::Natural => "NATURAL JOIN",
            JoinType::Custom(keyword) if keyword.is_empty() => "JOIN",
            JoinType::Custom(keyword) => keyword,
        }
    }
}

/// One join: keyword, target and ON predicates. No predicates means no `ON`.
#[derive(Debug, Clone)]
pub struct JoinTable {
    pub join_type: JoinType,
    pub lateral: bool,
    pub table: Table,
    pub on: Vec<Predicate>,
}

impl JoinTable {
    pub fn new(
        join_type: JoinType,
        table: impl Into<Table>,
        on: impl IntoIterator<Item = Predicate>,
    ) -> Self {
        Self {
            join_type,
            lateral: false,
            table: table.into(),
            on: on.into_iter().collect(),
        }
    }

    /// `JOIN LATERAL`
    pub fn lateral(mut self) -> Self {
        self.lateral = true;
        self
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        self.table.collect_ctes(out);
        self.on.iter().for_each(|p| p.collect_ctes(out));
    }
}

impl AppendSql for JoinTable {
    fn append_sql(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        buf.push(self.join_type.keyword()).push(" ");
        if self.lateral {
            buf.push("LATERAL ");
        }
        self.table.append_source(buf);
        if !self.on.is_empty() {
            buf.push(" ON ");
            append_conjunction(buf, &self.on, excluded);
        }
    }
}

/// Render joins, each preceded by a space.
pub(crate) fn append_joins(buf: &mut SqlBuilder, joins: &[JoinTable]) {
    for join in joins {
        buf.push(" ");
        join.append_sql(buf, &[]);
    }
}

pub fn join(table: impl Into<Table>, on: impl IntoIterator<Item = Predicate>) -> JoinTable {
    JoinTable::new(JoinType::Inner, table, on)
}

pub fn left_join(table: impl Into<Table>, on: impl IntoIterator<Item = Predicate>) -> JoinTable {
    JoinTable::new(JoinType::Left, table, on)
}

pub fn right_join(table: impl Into<Table>, on: impl IntoIterator<Item = Predicate>) -> JoinTable {
    JoinTable::new(JoinType::Right, table, on)
}

pub fn full_join(table: impl Into<Table>, on: impl IntoIterator<Item = Predicate>) -> JoinTable {
    JoinTable::new(JoinType::Full, table, on)
}

pub fn cross_join(table: impl Into<Table>) -> JoinTable {
    JoinTable::new(JoinType::Cross, table, [])
}

pub fn natural_join(table: impl Into<Table>) -> JoinTable {
    JoinTable::new(JoinType::Natural, table, [])
}

pub fn custom_join(
    keyword: impl Into<String>,
    table: impl Into<Table>,
    on: impl IntoIterator<Item = Predicate>,
) -> JoinTable {
    JoinTable::new(JoinType::Custom(keyword.into()), table, on)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::select;

    fn render_joins(joins: &[JoinTable]) -> String {
        let mut buf = SqlBuilder::new();
        buf.push_elems(joins, " ", &[]);
        buf.into_parts().unwrap().0
    }

    #[test]
    fn base_table_sources_and_columns() {
        let users = BaseTable::with_schema("public", "users");
        assert_eq!(users.col("user_id").key(), "users.user_id");
        let u = users.clone().as_("u");
        assert_eq!(u.col("user_id").key(), "u.user_id");

        let mut buf = SqlBuilder::new();
        u.append_source(&mut buf);
        assert_eq!(buf.sql(), "public.users AS u");
    }

    #[test]
    fn join_keywords_and_on_clauses() {
        let users = BaseTable::with_schema("public", "users");
        let u = users.clone().as_("u");
        let joins = [
            left_join(
                users.clone(),
                [users.col("user_id").eq(1), users.col("displayname").eq("x")],
            ),
            left_join(u.clone(), [u.col("user_id").eq(2)]).lateral(),
            full_join(u.clone(), []),
            custom_join("", users.clone(), []),
            natural_join(users.clone()),
        ];
        assert_eq!(
            render_joins(&joins),
            "LEFT JOIN public.users ON users.user_id = ? AND users.displayname = ? \
             LEFT JOIN LATERAL public.users AS u ON u.user_id = ? \
             FULL JOIN public.users AS u \
             JOIN public.users \
             NATURAL JOIN public.users"
        );
    }

    #[test]
    fn subquery_join_targets_are_parenthesized_and_aliased() {
        let u = BaseTable::with_schema("public", "users").as_("u");
        let sub = select([u.col("user_id"), u.col("email")]).from(&u).as_("subquery");
        let joined = join(sub.clone(), [sub.get("user_id").eq(5)]);
        assert_eq!(
            render_joins(&[joined]),
            "JOIN (SELECT u.user_id, u.email FROM public.users AS u) AS subquery \
             ON subquery.user_id = ?"
        );
    }

    #[test]
    fn generated_aliases_are_stable() {
        let u = BaseTable::new("users").as_("u");
        let sub = select([u.col("user_id")]).from(&u);
        let alias = sub.alias();
        assert!(!alias.is_empty());
        assert_eq!(alias, sub.alias());

        let rendered = render_joins(&[join(sub.clone(), [sub.get("user_id").eq(1)])]);
        assert_eq!(
            rendered,
            format!("JOIN (SELECT u.user_id FROM users AS u) AS {alias} ON {alias}.user_id = ?")
        );
    }

    #[test]
    fn function_tables() {
        let series = FunctionTable::new("generate_series", [1, 3]).as_("s").columns(["n"]);
        let mut buf = SqlBuilder::new();
        Table::from(series.clone()).append_source(&mut buf);
        let (sql, args) = buf.into_parts().unwrap();
        assert_eq!(sql, "generate_series(?, ?) AS s(n)");
        assert_eq!(args.len(), 2);
        assert_eq!(series.col("n").key(), "s.n");
    }
}
