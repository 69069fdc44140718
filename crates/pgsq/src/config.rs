//! Per-statement configuration: dialect, logger and default timeout.

use crate::builder::{
    collapse_question_escapes, interpolate_dollar, interpolate_question, question_to_dollar,
};
use crate::log::{LogFlags, QueryLogger};
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder flavor of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `$1, $2, ...`
    #[default]
    Postgres,
    /// `?` markers are sent as is, `??` escapes as a single `?`.
    MySql,
    /// `?` markers are sent as is, `??` escapes as a single `?`.
    Sqlite,
}

impl Dialect {
    /// Rewrite neutral `?` markers into this dialect's placeholders.
    pub fn rewrite_placeholders(&self, sql: &str) -> String {
        match self {
            Dialect::Postgres => question_to_dollar(sql),
            Dialect::MySql | Dialect::Sqlite => collapse_question_escapes(sql),
        }
    }

    /// Inline `args` into a query already rewritten for this dialect.
    pub fn interpolate(&self, sql: &str, args: &[Value]) -> String {
        match self {
            Dialect::Postgres => interpolate_dollar(sql, args),
            Dialect::MySql | Dialect::Sqlite => interpolate_question(sql, args),
        }
    }
}

/// Configuration carried by every statement.
///
/// Statements started from a [`QueryBuilder`](crate::QueryBuilder) inherit its config.
#[derive(Clone, Default)]
pub struct QueryConfig {
    pub(crate) dialect: Dialect,
    pub(crate) logger: Option<Arc<dyn QueryLogger>>,
    pub(crate) log_flags: LogFlags,
    pub(crate) default_timeout: Option<Duration>,
}

impl std::fmt::Debug for QueryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryConfig")
            .field("dialect", &self.dialect)
            .field("logger", &self.logger.as_ref().map(|_| "<dyn QueryLogger>"))
            .field("log_flags", &self.log_flags)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the placeholder dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Log executed statements through `logger`.
    pub fn with_logger<L: QueryLogger + 'static>(mut self, logger: L) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Log executed statements through a shared logger.
    pub fn with_logger_arc(mut self, logger: Arc<dyn QueryLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Choose what the logger is given.
    pub fn with_log_flags(mut self, flags: LogFlags) -> Self {
        self.log_flags = flags;
        self
    }

    /// Deadline applied when a statement is executed without an explicit context.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn log_flags(&self) -> LogFlags {
        self.log_flags
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::TracingLogger;

    #[test]
    fn builder_methods_set_fields() {
        let config = QueryConfig::new()
            .with_dialect(Dialect::MySql)
            .with_logger(TracingLogger::new())
            .with_log_flags(LogFlags::STATS)
            .with_default_timeout(Duration::from_secs(2));
        assert_eq!(config.dialect(), Dialect::MySql);
        assert!(config.logger.is_some());
        assert_eq!(config.log_flags(), LogFlags::STATS);
        assert_eq!(config.default_timeout(), Some(Duration::from_secs(2)));
        assert!(format!("{config:?}").contains("<dyn QueryLogger>"));
    }

    #[test]
    fn only_postgres_rewrites_markers() {
        assert_eq!(Dialect::Postgres.rewrite_placeholders("a = ?"), "a = $1");
        assert_eq!(Dialect::MySql.rewrite_placeholders("a = ?"), "a = ?");
        assert_eq!(
            Dialect::Sqlite.rewrite_placeholders("a ?? 'k' AND b = ?"),
            "a ? 'k' AND b = ?"
        );
        assert_eq!(
            Dialect::MySql.rewrite_placeholders("note = 'a??' AND b = ?"),
            "note = 'a??' AND b = ?"
        );
    }
}
