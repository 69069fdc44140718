//! Fetch and exec behavior against an in-memory connection.

use pgsq::{
    BaseTable, Column, Context, Db, Exit, ExitCode, LogEntry, LogFlags, QueryLogger, RowCursor,
    SqError, SqResult, SqlQuery, Value,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockDb {
    rows: Vec<Vec<Value>>,
    affected: u64,
    calls: AtomicUsize,
    last_sql: Mutex<Option<(String, Vec<Value>)>>,
    cursor_dropped: Arc<AtomicBool>,
    delay: Option<Duration>,
    row_delay: Option<Duration>,
}

impl MockDb {
    fn with_rows(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    fn last_sql(&self) -> String {
        self.last_sql
            .lock()
            .unwrap()
            .as_ref()
            .map(|(sql, _)| sql.clone())
            .unwrap_or_default()
    }

    fn record(&self, sql: &str, args: &[Value]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_sql.lock().unwrap() = Some((sql.to_string(), args.to_vec()));
    }
}

struct MockRows {
    rows: std::vec::IntoIter<Vec<Value>>,
    dropped: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl Drop for MockRows {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl RowCursor for MockRows {
    async fn next_row(&mut self) -> SqResult<Option<Vec<Value>>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.rows.next())
    }
}

impl Db for MockDb {
    type Rows = MockRows;

    async fn query(&self, sql: &str, args: &[Value]) -> SqResult<MockRows> {
        self.record(sql, args);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(MockRows {
            rows: self.rows.clone().into_iter(),
            dropped: self.cursor_dropped.clone(),
            delay: self.row_delay,
        })
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> SqResult<u64> {
        self.record(sql, args);
        Ok(self.affected)
    }
}

fn users() -> BaseTable {
    BaseTable::new("users").as_("u")
}

fn three_users() -> MockDb {
    MockDb::with_rows(vec![
        vec![Value::Int(1), Value::Text("ann".into())],
        vec![Value::Int(2), Value::Text("bob".into())],
        vec![Value::Int(3), Value::Text("cid".into())],
    ])
}

/// Rows shaped for a mapper that reads `user_id` only.
fn three_ids() -> MockDb {
    MockDb::with_rows((1..=3).map(|id| vec![Value::Int(id)]).collect())
}

/// Rows shaped for a mapper that reads `displayname` only.
fn three_names() -> MockDb {
    MockDb::with_rows(
        ["ann", "bob", "cid"]
            .into_iter()
            .map(|name| vec![Value::Text(name.into())])
            .collect(),
    )
}

#[tokio::test]
async fn fetch_one_binds_the_select_list_and_stops_after_one_row() {
    let db = three_users();
    let u = users();
    let (id, name) = (u.col("user_id"), u.col("displayname"));
    let mut calls = 0;

    let user = pgsq::select_from(&u)
        .where_([id.gt(0)])
        .fetch_one(&db, |row| {
            calls += 1;
            Ok((row.int64(&id)?, row.string(&name)?))
        })
        .await
        .unwrap();

    assert_eq!(user, (1, "ann".to_string()));
    // discovery plus one row
    assert_eq!(calls, 2);
    assert_eq!(
        db.last_sql(),
        "SELECT u.user_id, u.displayname FROM users AS u WHERE u.user_id > $1"
    );
    assert!(db.cursor_dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn accumulator_runs_once_per_row_in_order() {
    let db = three_names();
    let u = users();
    let name = u.col("displayname");
    let mut seen = Vec::new();

    let rows = pgsq::select_from(&u)
        .fetch(
            &db,
            |row| Ok(row.string(&name)?),
            |n| {
                seen.push(n);
                Ok(())
            },
        )
        .await
        .unwrap();

    assert_eq!(rows, 3);
    assert_eq!(seen, vec!["ann", "bob", "cid"]);
}

#[tokio::test]
async fn fetch_all_collects_every_row() {
    let db = three_ids();
    let u = users();
    let id = u.col("user_id");
    let ids = pgsq::select_from(&u)
        .fetch_all(&db, |row| Ok(row.int64(&id)?))
        .await
        .unwrap();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn zero_rows() {
    let db = MockDb::default();
    let u = users();
    let id = u.col("user_id");

    let err = pgsq::select_from(&u)
        .fetch_one(&db, |row| Ok(row.int64(&id)?))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let rows = pgsq::select_from(&u)
        .fetch(&db, |row| Ok(row.int64(&id)?), |_| Ok(()))
        .await
        .unwrap();
    assert_eq!(rows, 0);

    let all = pgsq::select_from(&u)
        .fetch_all(&db, |row| Ok(row.int64(&id)?))
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn peaceful_exit_keeps_partial_results() {
    let db = three_ids();
    let u = users();
    let id = u.col("user_id");
    let mut kept = Vec::new();

    let rows = pgsq::select_from(&u)
        .fetch(
            &db,
            |row| Ok(row.int64(&id)?),
            |n| {
                if kept.len() == 2 {
                    return Err(Exit::Peacefully);
                }
                kept.push(n);
                Ok(())
            },
        )
        .await
        .unwrap();

    assert_eq!(kept, vec![1, 2]);
    assert_eq!(rows, 3);
    assert!(db.cursor_dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn exit_codes_are_reported() {
    let db = three_ids();
    let u = users();
    let id = u.col("user_id");

    let err = pgsq::select_from(&u)
        .fetch(
            &db,
            |row| Ok(row.int64(&id)?),
            |n| if n == 2 { Err(ExitCode(7).into()) } else { Ok(()) },
        )
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(ExitCode(7)));
    assert!(db.cursor_dropped.load(Ordering::SeqCst));
}

#[derive(Debug, thiserror::Error)]
#[error("user {0} is banned")]
struct Banned(i64);

#[tokio::test]
async fn user_errors_come_back_unchanged() {
    let db = three_ids();
    let u = users();
    let id = u.col("user_id");

    let err = pgsq::select_from(&u)
        .fetch_all(&db, |row| {
            let id = row.int64(&id)?;
            if id == 2 {
                return Err(Banned(id).into());
            }
            Ok(id)
        })
        .await
        .unwrap_err();

    match err {
        SqError::User(inner) => {
            assert_eq!(inner.downcast_ref::<Banned>().map(|b| b.0), Some(2));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn decode_errors_pass_through_the_mapper() {
    let db = MockDb::with_rows(vec![vec![Value::Null]]);
    let u = users();
    let id = u.col("user_id");

    let err = pgsq::select_from(&u)
        .fetch_one(&db, |row| Ok(row.int64(&id)?))
        .await
        .unwrap_err();
    assert!(matches!(err, SqError::Decode { .. }));
}

#[tokio::test]
async fn discovery_errors_abort_before_the_round_trip() {
    let db = three_users();
    let u = users();

    let err = pgsq::select_from(&u)
        .fetch_one(&db, |_| -> Result<i64, Exit> { Err(Exit::error("not ready")) })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "not ready");
    assert_eq!(db.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_column_mapper_skips_the_round_trip() {
    let db = MockDb::default();
    let u = BaseTable::new("users");
    let name = u.col("displayname");

    let err = pgsq::insert_into(u.clone())
        .valuesx(move |col: &mut Column| {
            col.set_string(&name, "ann");
            col.set_string(&name, "bob");
            Err(Exit::Code(ExitCode(1)))
        })
        .exec(&db)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(ExitCode(1)));
    assert_eq!(db.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exec_returns_rows_affected() {
    let db = MockDb {
        affected: 4,
        ..MockDb::default()
    };
    let u = BaseTable::new("users");
    let n = pgsq::update(u.clone())
        .set([u.col("active").set(false)])
        .where_([u.col("user_id").eq(9)])
        .exec(&db)
        .await
        .unwrap();
    assert_eq!(n, 4);
    assert_eq!(
        db.last_sql(),
        "UPDATE users SET active = $1 WHERE users.user_id = $2"
    );
}

#[tokio::test]
async fn returning_list_comes_from_the_mapper() {
    let db = MockDb::with_rows(vec![vec![Value::Int(42)]]);
    let u = BaseTable::new("users");
    let id = u.col("user_id");

    let new_id = pgsq::insert_into(u.clone())
        .columns([u.col("displayname")])
        .values(["ann"])
        .fetch_one(&db, |row| Ok(row.int64(&id)?))
        .await
        .unwrap();

    assert_eq!(new_id, 42);
    assert_eq!(
        db.last_sql(),
        "INSERT INTO users (displayname) VALUES ($1) RETURNING users.user_id"
    );
}

#[tokio::test(start_paused = true)]
async fn expired_deadlines_time_out() {
    let db = three_ids();
    let u = users();
    let id = u.col("user_id");

    let err = pgsq::select_from(&u)
        .fetch_one_context(Context::with_timeout(Duration::ZERO), &db, |row| {
            Ok(row.int64(&id)?)
        })
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(db.calls.load(Ordering::SeqCst), 0);

    let slow = MockDb {
        delay: Some(Duration::from_secs(10)),
        ..three_ids()
    };
    let err = pgsq::select_from(&u)
        .fetch_context(
            Context::with_timeout(Duration::from_millis(50)),
            &slow,
            |row| Ok(row.int64(&id)?),
            |_| Ok(()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SqError::Timeout(d) if d == Duration::from_millis(50)));
}

#[tokio::test(start_paused = true)]
async fn deadline_during_row_scan_times_out_and_releases_the_cursor() {
    let db = MockDb {
        row_delay: Some(Duration::from_millis(30)),
        ..three_ids()
    };
    let u = users();
    let id = u.col("user_id");
    let mut seen = Vec::new();

    let err = pgsq::select_from(&u)
        .fetch_context(
            Context::with_timeout(Duration::from_millis(50)),
            &db,
            |row| Ok(row.int64(&id)?),
            |n| {
                seen.push(n);
                Ok(())
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(seen, vec![1]);
    assert_eq!(db.calls.load(Ordering::SeqCst), 1);
    assert!(db.cursor_dropped.load(Ordering::SeqCst));
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<(String, u64, usize)>>>);

impl QueryLogger for Capture {
    fn log(&self, entry: &LogEntry<'_>) {
        self.0
            .lock()
            .unwrap()
            .push((entry.interpolated(), entry.rows, entry.preview.len()));
    }
}

#[tokio::test]
async fn logger_sees_each_execution() {
    let db = three_names();
    let capture = Capture::default();
    let u = users();
    let name = u.col("displayname");

    let names = pgsq::with_log(capture.clone(), LogFlags::VERBOSE)
        .select_from(&u)
        .where_([name.ne("zed")])
        .fetch_all(&db, |row| Ok(row.string(&name)?))
        .await
        .unwrap();
    assert_eq!(names.len(), 3);

    let logged = capture.0.lock().unwrap();
    assert_eq!(
        logged.as_slice(),
        &[(
            "SELECT u.displayname FROM users AS u WHERE u.displayname <> 'zed'".to_string(),
            3,
            3
        )]
    );
}
