//! Execution: the connection contract, deadlines, early exit and the fetch loop.

use crate::config::QueryConfig;
use crate::error::{BoxError, SqError, SqResult};
use crate::log::{LogEntry, LogFlags, LogKind, PREVIEW_ROWS};
use crate::query::SqlQuery;
use crate::row::Row;
use crate::value::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// A cursor over result rows.
///
/// Dropping the cursor releases it; the fetch loop drops it on every exit path.
pub trait RowCursor: Send {
    /// The next row's values in column order, or `None` when exhausted.
    fn next_row(&mut self) -> impl Future<Output = SqResult<Option<Vec<Value>>>> + Send;
}

/// A connection statements can run on.
///
/// Implemented for `tokio_postgres::Client`, `tokio_postgres::Transaction` and, with the
/// `pool` feature, `deadpool_postgres::Client`.
pub trait Db: Send + Sync {
    type Rows: RowCursor;

    /// Run a statement that returns rows.
    fn query(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqResult<Self::Rows>> + Send;

    /// Run a statement and return the number of rows affected.
    fn execute(&self, sql: &str, args: &[Value]) -> impl Future<Output = SqResult<u64>> + Send;

    /// Token used for a best-effort server-side cancel when a deadline expires.
    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        None
    }
}

impl<T: Db> Db for &T {
    type Rows = T::Rows;

    fn query(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqResult<Self::Rows>> + Send {
        (**self).query(sql, args)
    }

    fn execute(&self, sql: &str, args: &[Value]) -> impl Future<Output = SqResult<u64>> + Send {
        (**self).execute(sql, args)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        (**self).cancel_token()
    }
}

/// A caller-chosen sentinel reported as [`SqError::Exit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(pub i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Early termination signalled by a mapper, accumulator or column mapper.
///
/// Any error converts into `Exit::Error` with `?`.
#[derive(Debug)]
pub enum Exit {
    /// Stop without error. Values accumulated so far are kept.
    Peacefully,
    /// Stop and report [`SqError::Exit`] with this code.
    Code(ExitCode),
    /// Stop and report this error. An [`SqError`] is returned unchanged.
    Error(BoxError),
}

impl Exit {
    /// Stop with an arbitrary error.
    pub fn error(err: impl Into<BoxError>) -> Self {
        Exit::Error(err.into())
    }

    /// `Ok(())` for a peaceful stop, the reported error otherwise.
    pub fn into_result(self) -> SqResult<()> {
        match self {
            Exit::Peacefully => Ok(()),
            Exit::Code(code) => Err(SqError::Exit(code)),
            Exit::Error(err) => Err(SqError::from_user(err)),
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Exit {
    fn from(err: E) -> Self {
        Exit::Error(Box::new(err))
    }
}

impl From<ExitCode> for Exit {
    fn from(code: ExitCode) -> Self {
        Exit::Code(code)
    }
}

/// Deadline for one execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    deadline: Option<Instant>,
    budget: Duration,
}

impl Context {
    /// No deadline. The statement's default timeout applies, if configured.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            budget: timeout,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            budget: deadline.saturating_duration_since(Instant::now()),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn or_timeout(self, timeout: Option<Duration>) -> Self {
        match (self.deadline, timeout) {
            (None, Some(timeout)) => Self::with_timeout(timeout),
            _ => self,
        }
    }

    /// Drive `fut` to completion or until the deadline.
    ///
    /// An already expired deadline fails without polling `fut`. On expiry the server is asked
    /// to cancel the running statement in the background.
    pub(crate) async fn run<D, T, F>(&self, db: &D, fut: F) -> SqResult<T>
    where
        D: Db + ?Sized,
        F: Future<Output = SqResult<T>>,
    {
        let Some(deadline) = self.deadline else {
            return fut.await;
        };
        if Instant::now() >= deadline {
            return Err(SqError::Timeout(self.budget));
        }

        tokio::pin!(fut);
        tokio::select! {
            result = &mut fut => result,
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(target: "pgsq.sql", timeout = ?self.budget, "statement timed out");
                if let Some(cancel_token) = db.cancel_token() {
                    tokio::spawn(async move {
                        let _ = cancel_token.cancel_query(tokio_postgres::NoTls).await;
                    });
                }
                Err(SqError::Timeout(self.budget))
            }
        }
    }
}

/// Bind, render, issue and iterate.
///
/// Returns the first mapped value when there is no accumulator, and the number of rows
/// read.
pub(crate) async fn fetch_rows<Q, D, T, M, A>(
    query: &Q,
    ctx: Context,
    db: &D,
    mut mapper: M,
    mut accumulator: Option<A>,
) -> SqResult<(Option<T>, u64)>
where
    Q: SqlQuery,
    D: Db,
    T: Send,
    M: FnMut(&mut Row) -> Result<T, Exit> + Send,
    A: FnMut(T) -> Result<(), Exit> + Send,
{
    let mut row = Row::discovery();
    if let Err(Exit::Error(err)) = mapper(&mut row) {
        return Err(SqError::from_user(err));
    }
    let fields = row.result_fields();
    let bound;
    let query = if fields.is_empty() {
        query
    } else {
        bound = query.clone().with_result_fields(fields);
        &bound
    };

    let (sql, args) = query.to_sql()?;
    let config = query.config();
    let ctx = ctx.or_timeout(config.default_timeout());
    let has_accumulator = accumulator.is_some();
    let keep_preview = config.logger.is_some() && config.log_flags.contains(LogFlags::RESULTS);
    let mut preview = Vec::new();
    tracing::trace!(target: "pgsq.sql", sql = %sql, args = args.len(), "fetch");

    let started = std::time::Instant::now();
    let result = ctx
        .run(db, async {
            let mut cursor = db.query(&sql, &args).await?;
            let mut first = None;
            let mut count = 0u64;
            while let Some(values) = cursor.next_row().await? {
                count += 1;
                if keep_preview && preview.len() < PREVIEW_ROWS {
                    preview.push(values.clone());
                }
                row.load(values);
                let item = match mapper(&mut row) {
                    Ok(item) => item,
                    Err(exit) => {
                        exit.into_result()?;
                        break;
                    }
                };
                match accumulator.as_mut() {
                    Some(accumulator) => {
                        if let Err(exit) = accumulator(item) {
                            exit.into_result()?;
                            break;
                        }
                    }
                    None => {
                        first = Some(item);
                        break;
                    }
                }
            }
            Ok::<_, SqError>((first, count))
        })
        .await
        .and_then(|(first, count)| {
            if count == 0 && !has_accumulator {
                Err(SqError::not_found("query returned no rows"))
            } else {
                Ok((first, count))
            }
        });

    report(
        config,
        LogKind::Fetch,
        (&sql, &args),
        started.elapsed(),
        &preview,
        result.as_ref().map(|(_, count)| *count),
    );
    result
}

/// Render and execute without reading rows.
pub(crate) async fn exec_rows<Q, D>(query: &Q, ctx: Context, db: &D) -> SqResult<u64>
where
    Q: SqlQuery,
    D: Db,
{
    let (sql, args) = query.to_sql()?;
    let config = query.config();
    let ctx = ctx.or_timeout(config.default_timeout());
    tracing::trace!(target: "pgsq.sql", sql = %sql, args = args.len(), "exec");

    let started = std::time::Instant::now();
    let result = ctx.run(db, db.execute(&sql, &args)).await;

    report(
        config,
        LogKind::Exec,
        (&sql, &args),
        started.elapsed(),
        &[],
        result.as_ref().copied(),
    );
    result
}

fn report(
    config: &QueryConfig,
    kind: LogKind,
    (sql, args): (&str, &[Value]),
    elapsed: Duration,
    preview: &[Vec<Value>],
    outcome: Result<u64, &SqError>,
) {
    let Some(logger) = &config.logger else {
        return;
    };
    let (rows, error) = match outcome {
        Ok(rows) => (rows, None),
        Err(err) => (0, Some(err)),
    };
    logger.log(&LogEntry {
        kind,
        sql,
        args,
        dialect: config.dialect,
        flags: config.log_flags,
        elapsed,
        rows,
        preview,
        error,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exits_map_to_results() {
        assert!(Exit::Peacefully.into_result().is_ok());
        let err = Exit::Code(ExitCode(2)).into_result().unwrap_err();
        assert_eq!(err.exit_code(), Some(ExitCode(2)));
        let err = Exit::from(SqError::not_found("x")).into_result().unwrap_err();
        assert!(err.is_not_found());
        let err = Exit::error("plain message").into_result().unwrap_err();
        assert_eq!(err.to_string(), "plain message");
    }

    #[test]
    fn question_mark_converts_errors() {
        fn parse(s: &str) -> Result<i64, Exit> {
            Ok(s.parse::<i64>()?)
        }
        assert_eq!(parse("12").unwrap(), 12);
        assert!(matches!(parse("x"), Err(Exit::Error(_))));
    }

    #[test]
    fn default_timeout_only_fills_missing_deadlines() {
        let ctx = Context::background().or_timeout(Some(Duration::from_secs(5)));
        assert!(ctx.deadline().is_some());
        assert_eq!(ctx.budget, Duration::from_secs(5));

        let ctx = Context::with_timeout(Duration::from_secs(1))
            .or_timeout(Some(Duration::from_secs(5)));
        assert_eq!(ctx.budget, Duration::from_secs(1));

        assert!(Context::background().or_timeout(None).deadline().is_none());
    }
}
