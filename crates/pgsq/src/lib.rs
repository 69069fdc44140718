//! # pgsq
//!
//! A structured SQL query builder for Postgres.
//!
//! ## Features
//!
//! - **Expression trees**: statements are immutable values built from tables, fields and
//!   predicates; forking a statement with `clone()` never affects the original
//! - **Parameterized output**: every value becomes a placeholder, arguments are collected in
//!   left-to-right order and rewritten to the dialect's placeholder form once
//! - **Subqueries and CTEs**: nested statements are parenthesized and aliased automatically,
//!   CTEs referenced anywhere are declared once in the outer WITH clause
//! - **Row mappers**: a fetch takes a mapper that reads fields from a [`Row`]; the fields it
//!   reads become the select list
//! - **Early exit**: mappers and accumulators stop a fetch with [`Exit`]
//! - **Logging**: `tracing`-based query logging with interpolated SQL, timings and row previews
//!
//! ## Example
//!
//! ```ignore
//! use pgsq::{BaseTable, Field, SqlQuery};
//!
//! let u = BaseTable::new("users").as_("u");
//! let (user_id, name) = (u.col("user_id"), u.col("displayname"));
//!
//! // SELECT u.user_id, u.displayname FROM users AS u WHERE u.displayname ILIKE $1
//! let users = pgsq::select_from(&u)
//!     .where_([name.ilike("jo%")])
//!     .fetch_all(&client, |row| Ok((row.int64(&user_id)?, row.string(&name)?)))
//!     .await?;
//!
//! pgsq::insert_into(BaseTable::new("users"))
//!     .columns([Field::column("displayname")])
//!     .values(["alice"])
//!     .on_conflict([])
//!     .do_nothing()
//!     .exec(&client)
//!     .await?;
//! ```

pub mod assignment;
pub mod builder;
pub mod client;
pub mod config;
pub mod cte;
pub mod error;
pub mod exec;
pub mod field;
pub mod log;
pub mod predicate;
pub mod query;
pub mod row;
pub mod table;
pub mod value;
pub mod window;

pub use assignment::Assignment;
pub use builder::{AppendSql, SqlBuilder, question_to_dollar};
pub use client::PgRows;
pub use config::{Dialect, QueryConfig};
pub use cte::Cte;
pub use error::{BoxError, SqError, SqResult};
pub use exec::{Context, Db, Exit, ExitCode, RowCursor};
pub use field::{
    Field, Operand, avg, count, count_all, count_distinct, dense_rank, excluded, fieldf, max, min,
    rank, row_number, sum,
};
pub use log::{LogEntry, LogFlags, LogKind, QueryLogger, TracingLogger};
pub use predicate::{
    InList, Logical, Predicate, VariadicPredicate, and, exists, not, not_exists, or, predicatef,
};
pub use query::{
    DeleteQuery, InsertConflict, InsertQuery, Query, QueryBuilder, SelectQuery, SetOperator,
    SqlQuery, UpdateQuery, delete_from, insert_into, select, select_distinct, select_from,
    select_one, update, with, with_config, with_log,
};
pub use row::{Column, Row, ScanKind};
pub use table::{
    BaseTable, FunctionTable, JoinTable, JoinType, Table, cross_join, custom_join, full_join,
    join, left_join, natural_join, right_join,
};
pub use value::Value;
pub use window::{Window, order_by, partition_by};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
