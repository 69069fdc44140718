//! [`Db`] implementations for tokio-postgres connections.

use crate::error::{SqError, SqResult};
use crate::exec::{Db, RowCursor};
use crate::value::Value;
use futures_util::StreamExt;
use std::pin::Pin;
use tokio_postgres::RowStream;

/// Streaming cursor over a tokio-postgres result set.
///
/// Rows are pulled from the server as the fetch loop asks for them, so stopping early
/// never buffers the rest of the result.
pub struct PgRows {
    stream: Pin<Box<RowStream>>,
}

impl PgRows {
    fn new(stream: RowStream) -> Self {
        Self {
            stream: Box::pin(stream),
        }
    }
}

impl RowCursor for PgRows {
    async fn next_row(&mut self) -> SqResult<Option<Vec<Value>>> {
        let Some(row) = self.stream.next().await else {
            return Ok(None);
        };
        let row = row.map_err(SqError::from_db_error)?;
        (0..row.len())
            .map(|i| {
                row.try_get::<_, Value>(i)
                    .map_err(|e| SqError::decode(row.columns()[i].name(), e.to_string()))
            })
            .collect::<SqResult<Vec<_>>>()
            .map(Some)
    }
}

impl Db for tokio_postgres::Client {
    type Rows = PgRows;

    async fn query(&self, sql: &str, args: &[Value]) -> SqResult<PgRows> {
        let stream = tokio_postgres::Client::query_raw(self, sql, args.iter())
            .await
            .map_err(SqError::from_db_error)?;
        Ok(PgRows::new(stream))
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> SqResult<u64> {
        tokio_postgres::Client::execute_raw(self, sql, args.iter())
            .await
            .map_err(SqError::from_db_error)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        Some(tokio_postgres::Client::cancel_token(self))
    }
}

impl Db for tokio_postgres::Transaction<'_> {
    type Rows = PgRows;

    async fn query(&self, sql: &str, args: &[Value]) -> SqResult<PgRows> {
        let stream = tokio_postgres::Transaction::query_raw(self, sql, args.iter())
            .await
            .map_err(SqError::from_db_error)?;
        Ok(PgRows::new(stream))
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> SqResult<u64> {
        tokio_postgres::Transaction::execute_raw(self, sql, args.iter())
            .await
            .map_err(SqError::from_db_error)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        Some(tokio_postgres::Transaction::cancel_token(self))
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl Db for deadpool_postgres::Client {
    type Rows = PgRows;

    async fn query(&self, sql: &str, args: &[Value]) -> SqResult<PgRows> {
        // Delegate to the deref target (ClientWrapper -> tokio_postgres::Client).
        let client: &tokio_postgres::Client = self;
        Db::query(client, sql, args).await
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> SqResult<u64> {
        let client: &tokio_postgres::Client = self;
        Db::execute(client, sql, args).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        let client: &tokio_postgres::Client = self;
        Db::cancel_token(client)
    }
}
