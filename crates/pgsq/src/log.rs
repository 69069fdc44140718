//! Query logging.
//!
//! Statements configured with a [`QueryLogger`] report every execution once it finishes.
//! [`LogFlags`] decide how much the logger is handed: the interpolated SQL, timing and row
//! counts, and a preview of the first fetched rows.

use crate::config::Dialect;
use crate::error::SqError;
use crate::value::Value;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;
use tracing::Level;

/// Number of rows kept for [`LogFlags::RESULTS`].
pub const PREVIEW_ROWS: usize = 5;

/// Verbosity switches for [`QueryLogger`].
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LogFlags(u8);

impl LogFlags {
    /// Log nothing beyond the SQL and its arguments.
    pub const NONE: LogFlags = LogFlags(0);
    /// Log the SQL with its arguments inlined.
    pub const INTERPOLATE: LogFlags = LogFlags(1);
    /// Log elapsed time and affected/fetched row counts.
    pub const STATS: LogFlags = LogFlags(1 << 1);
    /// Log the first few fetched rows.
    pub const RESULTS: LogFlags = LogFlags(1 << 2);
    /// Everything.
    pub const VERBOSE: LogFlags = LogFlags(0b111);

    pub fn contains(self, other: LogFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for LogFlags {
    type Output = LogFlags;

    fn bitor(self, rhs: LogFlags) -> LogFlags {
        LogFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for LogFlags {
    fn bitor_assign(&mut self, rhs: LogFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for LogFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (LogFlags::INTERPOLATE, "INTERPOLATE"),
            (LogFlags::STATS, "STATS"),
            (LogFlags::RESULTS, "RESULTS"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("LogFlags(NONE)")
        } else {
            write!(f, "LogFlags({})", set.join(" | "))
        }
    }
}

/// What kind of call produced a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Fetch,
    Exec,
}

/// One finished execution.
#[derive(Debug)]
pub struct LogEntry<'a> {
    pub kind: LogKind,
    /// The SQL as sent, placeholders already rewritten.
    pub sql: &'a str,
    pub args: &'a [Value],
    pub dialect: Dialect,
    pub flags: LogFlags,
    pub elapsed: Duration,
    /// Rows fetched, or rows affected for [`LogKind::Exec`].
    pub rows: u64,
    /// Up to [`PREVIEW_ROWS`] fetched rows, filled only with [`LogFlags::RESULTS`].
    pub preview: &'a [Vec<Value>],
    pub error: Option<&'a SqError>,
}

impl LogEntry<'_> {
    /// The SQL with its arguments inlined as literals.
    pub fn interpolated(&self) -> String {
        self.dialect.interpolate(self.sql, self.args)
    }

    /// `(Fetched 3 rows in 1.2ms)` style summary.
    pub fn stats(&self) -> String {
        let verb = match self.kind {
            LogKind::Fetch => "Fetched",
            LogKind::Exec => "Affected",
        };
        let noun = if self.rows == 1 { "row" } else { "rows" };
        format!("({verb} {} {noun} in {:?})", self.rows, self.elapsed)
    }

    /// One line per previewed row, columns separated by ` | `.
    pub fn results(&self) -> String {
        let mut out = String::new();
        for (i, row) in self.preview.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            out.push_str(&format!("----[ Row {} ]----\n{}", i + 1, cells.join(" | ")));
        }
        if self.rows > self.preview.len() as u64 {
            out.push_str("\n...");
        }
        out
    }
}

/// Sink for executed statements.
pub trait QueryLogger: Send + Sync {
    fn log(&self, entry: &LogEntry<'_>);
}

/// A `tracing`-based logger emitting one event per execution on the `pgsq.sql` target.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(2000),
        }
    }
}

impl TracingLogger {
    /// Create a new logger with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn truncate_sql(&self, sql: String) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(&sql, max)),
            _ => sql,
        }
    }
}

impl QueryLogger for TracingLogger {
    fn log(&self, entry: &LogEntry<'_>) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let interpolate = entry.flags.contains(LogFlags::INTERPOLATE);
        let sql = self.truncate_sql(if interpolate {
            entry.interpolated()
        } else {
            entry.sql.to_string()
        });
        let args = (!interpolate).then(|| format!("{:?}", entry.args));
        let stats = entry.flags.contains(LogFlags::STATS).then(|| entry.stats());
        let results = (entry.flags.contains(LogFlags::RESULTS) && !entry.preview.is_empty())
            .then(|| entry.results());
        let error = entry.error.map(ToString::to_string);

        emit_at_level!(
            self.level,
            target: "pgsq.sql",
            kind = ?entry.kind,
            sql = %sql,
            args = args.as_deref(),
            stats = stats.as_deref(),
            results = results.as_deref(),
            error = error.as_deref(),
        );
    }
}

/// Cut `sql` to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
