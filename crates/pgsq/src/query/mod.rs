//! Statements: SELECT, INSERT, UPDATE and DELETE builders plus their shared execution API.
//!
//! Every combinator takes the statement by value and returns the modified statement, so a
//! `clone()` before a combinator forks an independent copy.
//!
//! ```ignore
//! use pgsq::{BaseTable, SqlQuery};
//!
//! let u = BaseTable::new("users").as_("u");
//! let names = pgsq::select_from(&u)
//!     .where_([u.col("user_id").gt(10)])
//!     .fetch_all(&client, |row| Ok(row.string(&u.col("displayname"))?))
//!     .await?;
//! ```

mod delete;
mod insert;
mod select;
mod update;

#[cfg(test)]
mod tests;

pub use delete::DeleteQuery;
pub use insert::{InsertConflict, InsertQuery};
pub use select::{SelectQuery, SetOperator};
pub use update::UpdateQuery;

use crate::builder::SqlBuilder;
use crate::config::QueryConfig;
use crate::cte::{Cte, append_with};
use crate::error::{SqError, SqResult};
use crate::exec::{Context, Db, Exit, exec_rows, fetch_rows};
use crate::field::{Field, Operand};
use crate::log::{LogFlags, QueryLogger};
use crate::row::Row;
use crate::table::{BaseTable, Table};
use crate::value::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Any statement.
#[derive(Debug, Clone)]
pub enum Query {
    Select(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl Query {
    /// Mark the statement as nested: it no longer renders its own WITH prefix.
    pub fn nested(self) -> Self {
        match self {
            Query::Select(q) => Query::Select(q.nested()),
            Query::Insert(q) => Query::Insert(q.nested()),
            Query::Update(q) => Query::Update(q.nested()),
            Query::Delete(q) => Query::Delete(q.nested()),
        }
    }

    /// Alias used when the statement appears as a derived table.
    pub fn alias(&self) -> String {
        match self {
            Query::Select(q) => q.alias(),
            Query::Insert(q) => q.alias(),
            Query::Update(q) => q.alias(),
            Query::Delete(q) => q.alias(),
        }
    }

    /// Render the statement body, without WITH prefix and without placeholder rewrite.
    pub(crate) fn append_nested(&self, buf: &mut SqlBuilder) {
        match self {
            Query::Select(q) => q.append_body(buf),
            Query::Insert(q) => q.append_body(buf),
            Query::Update(q) => q.append_body(buf),
            Query::Delete(q) => q.append_body(buf),
        }
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        match self {
            Query::Select(q) => q.collect_ctes(out),
            Query::Insert(q) => q.collect_ctes(out),
            Query::Update(q) => q.collect_ctes(out),
            Query::Delete(q) => q.collect_ctes(out),
        }
    }
}

/// Render `WITH ...` (unless `nested`) followed by the statement body.
pub(crate) fn append_statement(
    buf: &mut SqlBuilder,
    nested: bool,
    collect: impl FnOnce(&mut Vec<Cte>),
    body: impl FnOnce(&mut SqlBuilder),
) {
    if !nested {
        let mut ctes = Vec::new();
        collect(&mut ctes);
        append_with(buf, &ctes);
    }
    body(buf);
}

/// Identity of a statement value, taken from a process-wide counter when it is built.
///
/// Clones keep the seed, so a statement and its copies agree on their generated alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AliasSeed(u64);

impl Default for AliasSeed {
    fn default() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Alias for an unaliased derived table, derived from the statement's seed and its rendered
/// body.
///
/// The same query value always yields the same alias. Statements built separately never
/// share one, even when they render identically.
pub(crate) fn generated_alias(seed: AliasSeed, render: impl FnOnce(&mut SqlBuilder)) -> String {
    let mut buf = SqlBuilder::new();
    render(&mut buf);
    let args = format!("{:?}", buf.args());
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in seed.0.to_le_bytes().into_iter().chain(buf.sql().bytes()).chain(args.bytes()) {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("_sq_{:08x}", (hash ^ (hash >> 32)) as u32)
}

/// Rendering and execution shared by every statement.
///
/// Execution follows one protocol. The mapper is called once against a discovery row to
/// learn which fields it reads; those fields become the select (or RETURNING) list. The
/// statement is rendered, sent, and the mapper is called again for each result row. With
/// an accumulator every mapped value is handed to it; without one the fetch stops after
/// the first row. Mapper and accumulator can stop early by returning an [`Exit`].
pub trait SqlQuery: Clone + Send + Sync {
    /// Render the statement into `buf`, WITH prefix included unless nested.
    fn append_sql(&self, buf: &mut SqlBuilder);

    fn config(&self) -> &QueryConfig;

    /// Replace the select list, or the RETURNING list for writes.
    fn with_result_fields(self, fields: Vec<Field>) -> Self;

    /// Render to dialect SQL and its positional arguments.
    fn to_sql(&self) -> SqResult<(String, Vec<Value>)> {
        let mut buf = SqlBuilder::new();
        self.append_sql(&mut buf);
        let (sql, args) = buf.into_parts()?;
        Ok((self.config().dialect.rewrite_placeholders(&sql), args))
    }

    /// Map the first row.
    ///
    /// Semantics:
    /// - 0 rows: returns [`SqError::NotFound`]
    /// - 1 or more rows: maps the first row, the rest are never read
    fn fetch_one<D, T, M>(&self, db: &D, mapper: M) -> impl Future<Output = SqResult<T>> + Send
    where
        D: Db,
        T: Send,
        M: FnMut(&mut Row) -> Result<T, Exit> + Send,
    {
        self.fetch_one_context(Context::background(), db, mapper)
    }

    /// [`SqlQuery::fetch_one`] under a deadline.
    fn fetch_one_context<D, T, M>(
        &self,
        ctx: Context,
        db: &D,
        mapper: M,
    ) -> impl Future<Output = SqResult<T>> + Send
    where
        D: Db,
        T: Send,
        M: FnMut(&mut Row) -> Result<T, Exit> + Send,
    {
        async move {
            let no_accumulator: Option<fn(T) -> Result<(), Exit>> = None;
            let (first, _) = fetch_rows(self, ctx, db, mapper, no_accumulator).await?;
            first.ok_or_else(|| SqError::not_found("mapper stopped before producing a value"))
        }
    }

    /// Map every row into a `Vec`. Zero rows is an empty `Vec`, not an error.
    fn fetch_all<D, T, M>(
        &self,
        db: &D,
        mapper: M,
    ) -> impl Future<Output = SqResult<Vec<T>>> + Send
    where
        D: Db,
        T: Send,
        M: FnMut(&mut Row) -> Result<T, Exit> + Send,
    {
        async move {
            let mut out = Vec::new();
            let push = |item: T| -> Result<(), Exit> {
                out.push(item);
                Ok(())
            };
            fetch_rows(self, Context::background(), db, mapper, Some(push)).await?;
            Ok(out)
        }
    }

    /// Map every row and hand each value to `accumulator`. Returns the number of rows read.
    fn fetch<D, T, M, A>(
        &self,
        db: &D,
        mapper: M,
        accumulator: A,
    ) -> impl Future<Output = SqResult<u64>> + Send
    where
        D: Db,
        T: Send,
        M: FnMut(&mut Row) -> Result<T, Exit> + Send,
        A: FnMut(T) -> Result<(), Exit> + Send,
    {
        self.fetch_context(Context::background(), db, mapper, accumulator)
    }

    /// [`SqlQuery::fetch`] under a deadline.
    fn fetch_context<D, T, M, A>(
        &self,
        ctx: Context,
        db: &D,
        mapper: M,
        accumulator: A,
    ) -> impl Future<Output = SqResult<u64>> + Send
    where
        D: Db,
        T: Send,
        M: FnMut(&mut Row) -> Result<T, Exit> + Send,
        A: FnMut(T) -> Result<(), Exit> + Send,
    {
        async move {
            let (_, rows) = fetch_rows(self, ctx, db, mapper, Some(accumulator)).await?;
            Ok(rows)
        }
    }

    /// Execute without reading rows. Returns the number of rows affected.
    fn exec<D: Db>(&self, db: &D) -> impl Future<Output = SqResult<u64>> + Send {
        self.exec_context(Context::background(), db)
    }

    /// [`SqlQuery::exec`] under a deadline.
    fn exec_context<D: Db>(
        &self,
        ctx: Context,
        db: &D,
    ) -> impl Future<Output = SqResult<u64>> + Send {
        exec_rows(self, ctx, db)
    }
}

impl SqlQuery for Query {
    fn append_sql(&self, buf: &mut SqlBuilder) {
        match self {
            Query::Select(q) => q.append_sql(buf),
            Query::Insert(q) => q.append_sql(buf),
            Query::Update(q) => q.append_sql(buf),
            Query::Delete(q) => q.append_sql(buf),
        }
    }

    fn config(&self) -> &QueryConfig {
        match self {
            Query::Select(q) => q.config(),
            Query::Insert(q) => q.config(),
            Query::Update(q) => q.config(),
            Query::Delete(q) => q.config(),
        }
    }

    fn with_result_fields(self, fields: Vec<Field>) -> Self {
        match self {
            Query::Select(q) => Query::Select(q.with_result_fields(fields)),
            Query::Insert(q) => Query::Insert(q.with_result_fields(fields)),
            Query::Update(q) => Query::Update(q.with_result_fields(fields)),
            Query::Delete(q) => Query::Delete(q.with_result_fields(fields)),
        }
    }
}

macro_rules! impl_into_query {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Query {
                fn from(q: $ty) -> Self {
                    Query::$variant(q)
                }
            }

            impl From<$ty> for Operand {
                fn from(q: $ty) -> Self {
                    Operand::Query(Box::new(Query::$variant(q.nested())))
                }
            }
        )*
    };
}

impl_into_query! {
    SelectQuery => Select,
    InsertQuery => Insert,
    UpdateQuery => Update,
    DeleteQuery => Delete,
}

impl From<Query> for Operand {
    fn from(q: Query) -> Self {
        Operand::Query(Box::new(q.nested()))
    }
}

impl From<SelectQuery> for Table {
    fn from(q: SelectQuery) -> Self {
        Table::Query(Box::new(Query::Select(q.nested())))
    }
}

impl From<&SelectQuery> for Table {
    fn from(q: &SelectQuery) -> Self {
        Table::from(q.clone())
    }
}

/// Starts statements that share a config and a list of CTEs.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    config: QueryConfig,
    ctes: Vec<Cte>,
}

impl QueryBuilder {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            config,
            ctes: Vec::new(),
        }
    }

    /// Declare CTEs on every statement started from this builder.
    pub fn with(mut self, ctes: impl IntoIterator<Item = Cte>) -> Self {
        self.ctes.extend(ctes);
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// `SELECT fields`
    pub fn select(&self, fields: impl IntoIterator<Item = Field>) -> SelectQuery {
        SelectQuery::default()
            .with_config(self.config.clone())
            .with(self.ctes.clone())
            .select(fields)
    }

    /// `SELECT 1`
    pub fn select_one(&self) -> SelectQuery {
        self.select([]).select_one()
    }

    /// `SELECT DISTINCT fields`
    pub fn select_distinct(&self, fields: impl IntoIterator<Item = Field>) -> SelectQuery {
        self.select(fields).distinct()
    }

    /// `SELECT ... FROM table`, fields to be bound by the mapper.
    pub fn select_from(&self, table: impl Into<Table>) -> SelectQuery {
        self.select([]).from(table)
    }

    pub fn insert_into(&self, table: BaseTable) -> InsertQuery {
        InsertQuery::new(table)
            .with_config(self.config.clone())
            .with(self.ctes.clone())
    }

    pub fn update(&self, table: BaseTable) -> UpdateQuery {
        UpdateQuery::new(table)
            .with_config(self.config.clone())
            .with(self.ctes.clone())
    }

    pub fn delete_from(&self, table: BaseTable) -> DeleteQuery {
        DeleteQuery::new(table)
            .with_config(self.config.clone())
            .with(self.ctes.clone())
    }
}

/// A builder whose statements carry `config`.
pub fn with_config(config: QueryConfig) -> QueryBuilder {
    QueryBuilder::new(config)
}

/// A builder whose statements log through `logger` with `flags`.
pub fn with_log<L: QueryLogger + 'static>(logger: L, flags: LogFlags) -> QueryBuilder {
    QueryBuilder::new(QueryConfig::new().with_logger(logger).with_log_flags(flags))
}

/// A builder whose statements declare `ctes`.
pub fn with(ctes: impl IntoIterator<Item = Cte>) -> QueryBuilder {
    QueryBuilder::default().with(ctes)
}

pub fn select(fields: impl IntoIterator<Item = Field>) -> SelectQuery {
    QueryBuilder::default().select(fields)
}

pub fn select_one() -> SelectQuery {
    QueryBuilder::default().select_one()
}

pub fn select_distinct(fields: impl IntoIterator<Item = Field>) -> SelectQuery {
    QueryBuilder::default().select_distinct(fields)
}

pub fn select_from(table: impl Into<Table>) -> SelectQuery {
    QueryBuilder::default().select_from(table)
}

pub fn insert_into(table: BaseTable) -> InsertQuery {
    QueryBuilder::default().insert_into(table)
}

pub fn update(table: BaseTable) -> UpdateQuery {
    QueryBuilder::default().update(table)
}

pub fn delete_from(table: BaseTable) -> DeleteQuery {
    QueryBuilder::default().delete_from(table)
}
