use super::{AliasSeed, SelectQuery, SqlQuery, append_statement, generated_alias};
use crate::assignment::Assignment;
use crate::builder::SqlBuilder;
use crate::config::QueryConfig;
use crate::cte::{Cte, add_cte};
use crate::error::SqError;
use crate::exec::Exit;
use crate::field::{Field, Operand};
use crate::predicate::{Predicate, append_conjunction};
use crate::row::{Column, ColumnMapper};
use crate::table::BaseTable;
use std::borrow::Cow;

#[derive(Debug, Clone)]
enum ConflictTarget {
    Any,
    Fields(Vec<Field>),
    Constraint(String),
}

#[derive(Debug, Clone)]
enum ConflictAction {
    Nothing,
    Update(Vec<Assignment>),
}

#[derive(Debug, Clone)]
struct OnConflict {
    target: ConflictTarget,
    target_where: Vec<Predicate>,
    action: ConflictAction,
}

/// An INSERT statement.
///
/// Rows come from one of three sources, checked in order: a `SELECT`, `VALUES` rows (set
/// with [`InsertQuery::values`] or produced by a [`InsertQuery::valuesx`] column mapper),
/// or `DEFAULT VALUES`.
#[derive(Debug, Clone, Default)]
pub struct InsertQuery {
    nested: bool,
    alias_seed: AliasSeed,
    ctes: Vec<Cte>,
    table: Option<BaseTable>,
    columns: Vec<Field>,
    rows: Vec<Vec<Operand>>,
    mapper: Option<ColumnMapper>,
    select: Option<Box<SelectQuery>>,
    default_values: bool,
    conflict: Option<OnConflict>,
    update_where: Vec<Predicate>,
    returning: Vec<Field>,
    returning_one: bool,
    config: QueryConfig,
}

impl InsertQuery {
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

    /// The column list.
    pub fn columns(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.columns.extend(fields);
        self
    }

    /// Append one row of values. Call repeatedly for multi-row inserts.
    pub fn values<I, O>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Operand>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Produce columns and rows from a callback run on every render.
    ///
    /// The callback sets fields on the [`Column`] in order; setting a field already set
    /// starts the next row, so looping over a slice yields one row per element. It must be
    /// idempotent: a render runs it once to gather CTEs referenced by the values and once
    /// more to write them.
    pub fn valuesx<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&mut Column) -> Result<(), Exit> + Send + Sync + 'static,
    {
        self.mapper = Some(ColumnMapper::new(mapper));
        self
    }

    /// `INSERT INTO ... SELECT ...`
    pub fn select(mut self, query: SelectQuery) -> Self {
        self.select = Some(Box::new(query.nested()));
        self
    }

    /// `INSERT INTO ... DEFAULT VALUES`
    pub fn default_values(mut self) -> Self {
        self.default_values = true;
        self
    }

    /// `ON CONFLICT (fields)`. No fields means a bare `ON CONFLICT`.
    pub fn on_conflict(self, fields: impl IntoIterator<Item = Field>) -> InsertConflict {
        let fields: Vec<Field> = fields.into_iter().collect();
        let target = if fields.is_empty() {
            ConflictTarget::Any
        } else {
            ConflictTarget::Fields(fields)
        };
        InsertConflict {
            query: self,
            target,
            target_where: Vec::new(),
        }
    }

    /// `ON CONFLICT ON CONSTRAINT name`
    pub fn on_conflict_on_constraint(self, name: impl Into<String>) -> InsertConflict {
        InsertConflict {
            query: self,
            target: ConflictTarget::Constraint(name.into()),
            target_where: Vec::new(),
        }
    }

    /// WHERE of `ON CONFLICT ... DO UPDATE SET ... WHERE`.
    ///
    /// May be called before or after the conflict clause. Rendering fails when the statement
    /// ends up without a `DO UPDATE` to attach the predicates to.
    pub fn where_(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.update_where.extend(predicates);
        self
    }

    pub fn returning(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.returning.extend(fields);
        self
    }

    /// `RETURNING 1`
    pub fn returning_one(mut self) -> Self {
        self.returning_one = true;
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
        self.rows
            .iter()
            .flatten()
            .for_each(|operand| operand.collect_ctes(out));
        if let Some(mapper) = &self.mapper {
            // render errors surface from append_body
            if let Ok((_, rows)) = mapper.insert_rows() {
                rows.iter().flatten().for_each(|operand| operand.collect_ctes(out));
            }
        }
        if let Some(select) = &self.select {
            select.collect_ctes(out);
        }
        if let Some(conflict) = &self.conflict {
            conflict.target_where.iter().for_each(|p| p.collect_ctes(out));
            if let ConflictAction::Update(set) = &conflict.action {
                set.iter().for_each(|a| a.collect_ctes(out));
            }
        }
        self.update_where.iter().for_each(|p| p.collect_ctes(out));
        self.returning.iter().for_each(|f| f.collect_ctes(out));
    }

    pub(crate) fn append_body(&self, buf: &mut SqlBuilder) {
        buf.push("INSERT INTO ");
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

        let (columns, rows): (Cow<'_, [Field]>, Cow<'_, [Vec<Operand>]>) = match &self.mapper {
            Some(mapper) => match mapper.insert_rows() {
                Ok((columns, rows)) => (Cow::Owned(columns), Cow::Owned(rows)),
                Err(err) => {
                    buf.fail(err);
                    return;
                }
            },
            None => (Cow::Borrowed(&self.columns), Cow::Borrowed(&self.rows)),
        };

        if !columns.is_empty() {
            buf.push(" (").push_elems(&columns, ", ", &excluded).push(")");
        }
        if let Some(select) = &self.select {
            buf.push(" ");
            select.append_body(buf);
        } else if !rows.is_empty() {
            buf.push(" VALUES ");
            buf.push_iter(rows.iter(), ", ", |buf, row| {
                buf.push("(").push_elems(row, ", ", &excluded).push(")");
            });
        } else if self.default_values {
            buf.push(" DEFAULT VALUES");
        }

        let updates_on_conflict = matches!(
            &self.conflict,
            Some(OnConflict {
                action: ConflictAction::Update(_),
                ..
            })
        );
        if !self.update_where.is_empty() && !updates_on_conflict {
            buf.fail(SqError::render(
                "INSERT WHERE requires ON CONFLICT ... DO UPDATE",
            ));
            return;
        }

        if let Some(conflict) = &self.conflict {
            buf.push(" ON CONFLICT");
            match &conflict.target {
                ConflictTarget::Any => {}
                ConflictTarget::Fields(fields) => {
                    buf.push(" (").push_elems(fields, ", ", &excluded).push(")");
                }
                ConflictTarget::Constraint(name) => {
                    buf.push(" ON CONSTRAINT ").push(name);
                }
            }
            if !conflict.target_where.is_empty() {
                buf.push(" WHERE ");
                append_conjunction(buf, &conflict.target_where, &excluded);
            }
            match &conflict.action {
                ConflictAction::Nothing => {
                    buf.push(" DO NOTHING");
                }
                ConflictAction::Update(set) => {
                    buf.push(" DO UPDATE SET ").push_elems(set, ", ", &excluded);
                    if !self.update_where.is_empty() {
                        buf.push(" WHERE ");
                        append_conjunction(buf, &self.update_where, &[]);
                    }
                }
            }
        }

        if self.returning_one {
            buf.push(" RETURNING 1");
        } else if !self.returning.is_empty() {
            buf.push(" RETURNING ");
            buf.push_iter(&self.returning, ", ", |buf, f| f.append_with_alias(buf, &[]));
        }
    }
}

impl SqlQuery for InsertQuery {
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
        self.returning_one = false;
        self
    }
}

/// An INSERT with a pending `ON CONFLICT` target, waiting for its action.
#[derive(Debug, Clone)]
pub struct InsertConflict {
    query: InsertQuery,
    target: ConflictTarget,
    target_where: Vec<Predicate>,
}

impl InsertConflict {
    /// Predicates of a partial-index conflict target: `ON CONFLICT (a) WHERE ...`.
    pub fn where_(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.target_where.extend(predicates);
        self
    }

    /// `DO NOTHING`
    pub fn do_nothing(self) -> InsertQuery {
        self.finish(ConflictAction::Nothing)
    }

    /// `DO UPDATE SET assignments`. Follow with [`InsertQuery::where_`] for a condition.
    pub fn do_update_set(self, assignments: impl IntoIterator<Item = Assignment>) -> InsertQuery {
        self.finish(ConflictAction::Update(assignments.into_iter().collect()))
    }

    fn finish(self, action: ConflictAction) -> InsertQuery {
        let mut query = self.query;
        query.conflict = Some(OnConflict {
            target: self.target,
            target_where: self.target_where,
            action,
        });
        query
    }
}
