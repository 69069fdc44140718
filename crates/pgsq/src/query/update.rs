use super::{AliasSeed, SqlQuery, append_statement, generated_alias};
use crate::assignment::Assignment;
use crate::builder::SqlBuilder;
use crate::config::QueryConfig;
use crate::cte::{Cte, add_cte};
use crate::exec::Exit;
use crate::field::Field;
use crate::predicate::{Predicate, append_conjunction};
use crate::row::{Column, ColumnMapper};
use crate::table::{BaseTable, JoinTable, JoinType, Table, append_joins};

/// An UPDATE statement.
///
/// Columns of the target table are rendered unqualified in the SET list; everything else
/// keeps its qualifier.
#[derive(Debug, Clone, Default)]
pub struct UpdateQuery {
    nested: bool,
    alias_seed: AliasSeed,
    ctes: Vec<Cte>,
    table: Option<BaseTable>,
    assignments: Vec<Assignment>,
    mapper: Option<ColumnMapper>,
    from: Option<Table>,
    joins: Vec<JoinTable>,
    where_: Vec<Predicate>,
    returning: Vec<Field>,
    config: QueryConfig,
}

impl UpdateQuery {
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

    /// Append to the SET list.
    pub fn set(mut self, assignments: impl IntoIterator<Item = Assignment>) -> Self {
        self.assignments.extend(assignments);
        self
    }

    /// Produce SET assignments from a callback run on every render.
    ///
    /// The callback's assignments do not replace the SET list: they render after those
    /// given to [`UpdateQuery::set`], so fixed columns such as `updated_at = now()` can sit
    /// next to mapped ones. A later `setx` replaces an earlier callback.
    pub fn setx<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&mut Column) -> Result<(), Exit> + Send + Sync + 'static,
    {
        self.mapper = Some(ColumnMapper::new(mapper));
        self
    }

    /// `UPDATE ... FROM table`
    pub fn from(mut self, table: impl Into<Table>) -> Self {
        self.from = Some(table.into());
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
        self.assignments.iter().for_each(|a| a.collect_ctes(out));
        if let Some(mapper) = &self.mapper {
            // render errors surface from append_body
            if let Ok(assignments) = mapper.update_assignments() {
                assignments.iter().for_each(|a| a.collect_ctes(out));
            }
        }
        if let Some(from) = &self.from {
            from.collect_ctes(out);
        }
        self.joins.iter().for_each(|j| j.collect_ctes(out));
        self.where_.iter().for_each(|p| p.collect_ctes(out));
        self.returning.iter().for_each(|f| f.collect_ctes(out));
    }

    pub(crate) fn append_body(&self, buf: &mut SqlBuilder) {
        buf.push("UPDATE ");
        let qualifier = match &self.table {
            Some(table) => {
                table.append_source(buf);
                table.qualifier()
            }
            None => {
                buf.push("NULL");
                ""
            }
        };
        let excluded = [qualifier];

        let mapped = match &self.mapper {
            Some(mapper) => match mapper.update_assignments() {
                Ok(assignments) => assignments,
                Err(err) => {
                    buf.fail(err);
                    return;
                }
            },
            None => Vec::new(),
        };
        if !self.assignments.is_empty() || !mapped.is_empty() {
            buf.push(" SET ");
            buf.push_iter(
                self.assignments.iter().chain(mapped.iter()),
                ", ",
                |buf, a| {
                    crate::builder::AppendSql::append_sql(a, buf, &excluded);
                },
            );
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
        if !self.returning.is_empty() {
            buf.push(" RETURNING ");
            buf.push_iter(&self.returning, ", ", |buf, f| f.append_with_alias(buf, &[]));
        }
    }
}

impl SqlQuery for UpdateQuery {
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
