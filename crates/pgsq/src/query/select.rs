use super::{AliasSeed, SqlQuery, append_statement, generated_alias};
use crate::builder::SqlBuilder;
use crate::config::QueryConfig;
use crate::cte::{Cte, add_cte};
use crate::field::Field;
use crate::predicate::{Predicate, append_conjunction};
use crate::table::{JoinTable, JoinType, Table, append_joins};
use crate::value::Value;
use crate::window::Window;

/// Set operation joining two selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl SetOperator {
    fn keyword(self) -> &'static str {
        match self {
            SetOperator::Union => " UNION ",
            SetOperator::UnionAll => " UNION ALL ",
            SetOperator::Intersect => " INTERSECT ",
            SetOperator::IntersectAll => " INTERSECT ALL ",
            SetOperator::Except => " EXCEPT ",
            SetOperator::ExceptAll => " EXCEPT ALL ",
        }
    }
}

/// A SELECT statement.
///
/// Clauses render in this order: WITH, SELECT [DISTINCT [ON (...)]], FROM, JOINs, WHERE,
/// GROUP BY, HAVING, WINDOW, set operations, ORDER BY, LIMIT, OFFSET.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    nested: bool,
    alias_seed: AliasSeed,
    alias: Option<String>,
    ctes: Vec<Cte>,
    distinct: bool,
    distinct_on: Vec<Field>,
    select_one: bool,
    fields: Vec<Field>,
    from: Option<Table>,
    joins: Vec<JoinTable>,
    where_: Vec<Predicate>,
    group_by: Vec<Field>,
    having: Vec<Predicate>,
    windows: Vec<Window>,
    compounds: Vec<(SetOperator, SelectQuery)>,
    order_by: Vec<Field>,
    limit: Option<i64>,
    offset: Option<i64>,
    config: QueryConfig,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare CTEs in this statement's WITH clause.
    pub fn with(mut self, ctes: impl IntoIterator<Item = Cte>) -> Self {
        self.ctes.extend(ctes);
        self
    }

    /// Append to the select list.
    pub fn select(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// `SELECT 1`, ignoring the select list.
    pub fn select_one(mut self) -> Self {
        self.select_one = true;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// `SELECT DISTINCT ON (fields)`
    pub fn distinct_on(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.distinct_on.extend(fields);
        self
    }

    pub fn from(mut self, table: impl Into<Table>) -> Self {
        self.from = Some(table.into());
        self
    }

    /// Append a join built with [`join`](crate::join) and friends.
    pub fn join_table(mut self, join: JoinTable) -> Self {
        self.joins.push(join);
        self
    }

    pub fn join(self, table: impl Into<Table>, on: impl IntoIterator<Item = Predicate>) -> Self {
        self.join_table(JoinTable::new(JoinType::Inner, table, on))
    }

    pub fn left_join(
        self,
        table: impl Into<Table>,
        on: impl IntoIterator<Item = Predicate>,
    ) -> Self {
        self.join_table(JoinTable::new(JoinType::Left, table, on))
    }

    pub fn right_join(
        self,
        table: impl Into<Table>,
        on: impl IntoIterator<Item = Predicate>,
    ) -> Self {
        self.join_table(JoinTable::new(JoinType::Right, table, on))
    }

    pub fn full_join(
        self,
        table: impl Into<Table>,
        on: impl IntoIterator<Item = Predicate>,
    ) -> Self {
        self.join_table(JoinTable::new(JoinType::Full, table, on))
    }

    pub fn cross_join(self, table: impl Into<Table>) -> Self {
        self.join_table(JoinTable::new(JoinType::Cross, table, []))
    }

    pub fn natural_join(self, table: impl Into<Table>) -> Self {
        self.join_table(JoinTable::new(JoinType::Natural, table, []))
    }

    /// Append WHERE predicates. Repeated calls AND together.
    pub fn where_(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.where_.extend(predicates);
        self
    }

    pub fn group_by(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.group_by.extend(fields);
        self
    }

    pub fn having(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.having.extend(predicates);
        self
    }

    /// Declare named windows in the WINDOW clause.
    pub fn window(mut self, windows: impl IntoIterator<Item = Window>) -> Self {
        self.windows.extend(windows);
        self
    }

    pub fn order_by(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.order_by.extend(fields);
        self
    }

    /// `LIMIT ?`. Negative values are replaced by their absolute value.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit.saturating_abs());
        self
    }

    /// `OFFSET ?`. Negative values are replaced by their absolute value.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset.saturating_abs());
        self
    }

    fn compound(mut self, op: SetOperator, other: SelectQuery) -> Self {
        self.compounds.push((op, other.nested()));
        self
    }

    pub fn union(self, other: SelectQuery) -> Self {
        self.compound(SetOperator::Union, other)
    }

    pub fn union_all(self, other: SelectQuery) -> Self {
        self.compound(SetOperator::UnionAll, other)
    }

    pub fn intersect(self, other: SelectQuery) -> Self {
        self.compound(SetOperator::Intersect, other)
    }

    pub fn intersect_all(self, other: SelectQuery) -> Self {
        self.compound(SetOperator::IntersectAll, other)
    }

    pub fn except(self, other: SelectQuery) -> Self {
        self.compound(SetOperator::Except, other)
    }

    pub fn except_all(self, other: SelectQuery) -> Self {
        self.compound(SetOperator::ExceptAll, other)
    }

    /// Alias used when this query is a derived table.
    pub fn as_(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The explicit alias, or a generated one that is stable for this query value.
    pub fn alias(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => generated_alias(self.alias_seed, |buf| self.append_body(buf)),
        }
    }

    /// A column of this query used as a derived table.
    pub fn get(&self, column: impl Into<String>) -> Field {
        Field::new(self.alias(), column)
    }

    /// Skip the WITH prefix when rendered; the enclosing statement declares the CTEs.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        self.ctes.iter().for_each(|c| add_cte(out, c));
        self.distinct_on.iter().for_each(|f| f.collect_ctes(out));
        self.fields.iter().for_each(|f| f.collect_ctes(out));
        if let Some(from) = &self.from {
            from.collect_ctes(out);
        }
        self.joins.iter().for_each(|j| j.collect_ctes(out));
        self.where_.iter().for_each(|p| p.collect_ctes(out));
        self.group_by.iter().for_each(|f| f.collect_ctes(out));
        self.having.iter().for_each(|p| p.collect_ctes(out));
        self.windows.iter().for_each(|w| w.collect_ctes(out));
        self.compounds.iter().for_each(|(_, q)| q.collect_ctes(out));
        self.order_by.iter().for_each(|f| f.collect_ctes(out));
    }

    pub(crate) fn append_body(&self, buf: &mut SqlBuilder) {
        buf.push("SELECT");
        if !self.distinct_on.is_empty() {
            buf.push(" DISTINCT ON (")
                .push_elems(&self.distinct_on, ", ", &[])
                .push(")");
        } else if self.distinct {
            buf.push(" DISTINCT");
        }
        if self.select_one {
            buf.push(" 1");
        } else if !self.fields.is_empty() {
            buf.push(" ");
            buf.push_iter(&self.fields, ", ", |buf, f| f.append_with_alias(buf, &[]));
        }
        if let Some(from) = &self.from {
            buf.push(" FROM ");
            from.append_source(buf);
        }
        append_joins(buf, &self.joins);
        if !self.where_.is_empty() {
            buf.push(" WHERE ");
            append_conjunction(buf, &self.where_, &[]);
        }
        if !self.group_by.is_empty() {
            buf.push(" GROUP BY ").push_elems(&self.group_by, ", ", &[]);
        }
        if !self.having.is_empty() {
            buf.push(" HAVING ");
            append_conjunction(buf, &self.having, &[]);
        }
        if !self.windows.is_empty() {
            buf.push(" WINDOW ");
            buf.push_iter(&self.windows, ", ", |buf, w| w.append_declaration(buf, &[]));
        }
        for (op, query) in &self.compounds {
            buf.push(op.keyword());
            query.append_body(buf);
        }
        if !self.order_by.is_empty() {
            buf.push(" ORDER BY ");
            buf.push_iter(&self.order_by, ", ", |buf, f| f.append_ordered(buf, &[]));
        }
        if let Some(limit) = self.limit {
            buf.push(" LIMIT ").push_arg(Value::Int(limit));
        }
        if let Some(offset) = self.offset {
            buf.push(" OFFSET ").push_arg(Value::Int(offset));
        }
    }
}

impl SqlQuery for SelectQuery {
    fn append_sql(&self, buf: &mut SqlBuilder) {
        append_statement(
            buf,
            self.nested,
            |out| self.collect_ctes(out),
            |buf| self.append_body(buf),
        );
    }

    fn config(&self) -> &QueryConfig {
        &self.config
    }

    fn with_result_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self.select_one = false;
        self
    }
}
