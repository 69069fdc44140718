use super::{AliasSeed, SqlQuery, append_statement, generated_alias};
use crate::builder::SqlBuilder;
use crate::config::QueryConfig;
use crate::cte::{Cte, add_cte};
use crate::field::Field;
use crate::predicate::{Predicate, append_conjunction};
use crate::table::{BaseTable, JoinTable, JoinType, Table, append_joins};

/// A DELETE statement.
#[derive(Debug, Clone, Default)]
pub struct DeleteQuery {
    nested: bool,
    alias_seed: AliasSeed,
    ctes: Vec<Cte>,
    table: Option<BaseTable>,
    using: Option<Table>,
    joins: Vec<JoinTable>,
    where_: Vec<Predicate>,
    returning: Vec<Field>,
    config: QueryConfig,
}

impl DeleteQuery {
    pub fn new(table: BaseTable) -> Self {
        Self {
            table: Some(table),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with(mut self, ctes: impl IntoIterator<Item = Cte>) -> Self {
        self.ctes.extend(ctes);
        self
    }

    /// `DELETE FROM ... USING table`
    pub fn using(mut self, table: impl Into<Table>) -> Self {
        self.using = Some(table.into());
        self
    }

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

    pub fn where_(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.where_.extend(predicates);
        self
    }

    pub fn returning(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.returning.extend(fields);
        self
    }

    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    /// Alias used when this statement is a derived table.
    pub fn alias(&self) -> String {
        generated_alias(self.alias_seed, |buf| self.append_body(buf))
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        self.ctes.iter().for_each(|c| add_cte(out, c));
        if let Some(using) = &self.using {
            using.collect_ctes(out);
        }
        self.joins.iter().for_each(|j| j.collect_ctes(out));
        self.where_.iter().for_each(|p| p.collect_ctes(out));
        self.returning.iter().for_each(|f| f.collect_ctes(out));
    }

    pub(crate) fn append_body(&self, buf: &mut SqlBuilder) {
        buf.push("DELETE FROM ");
        match &self.table {
            Some(table) => table.append_source(buf),
            None => {
                buf.push("NULL");
            }
        }
        if let Some(using) = &self.using {
            buf.push(" USING ");
            using.append_source(buf);
        }
        append_joins(buf, &self.joins);
        if !self.where_.is_empty() {
            buf.push(" WHERE ");
            append_conjunction(buf, &self.where_, &[]);
        }
        if !self.returning.is_empty() {
            buf.push(" RETURNING ");
            buf.push_iter(&self.returning, ", ", |buf, f| f.append_with_alias(buf, &[]));
        }
    }
}

impl SqlQuery for DeleteQuery {
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
        self.returning = fields;
        self
    }
}
