//! Rendering tests for the statement builders.

use super::*;
use crate::config::Dialect;
use crate::exec::ExitCode;
use crate::field::{avg, count_all, fieldf, row_number, sum};
use crate::predicate::{exists, or};
use crate::row::Column;
use crate::table::{FunctionTable, left_join};
use crate::window::Window;

fn users() -> BaseTable {
    BaseTable::new("users")
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

#[test]
fn test_select_where() {
    let u = users().as_("u");
    let q = select([u.col("user_id"), u.col("displayname")])
        .from(&u)
        .where_([u.col("user_id").eq(1), u.col("displayname").eq("John")]);

    let mut buf = SqlBuilder::new();
    q.append_sql(&mut buf);
    let (raw, _) = buf.into_parts().unwrap();
    assert_eq!(
        raw,
        "SELECT u.user_id, u.displayname FROM users AS u WHERE u.user_id = ? AND u.displayname = ?"
    );

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT u.user_id, u.displayname FROM users AS u WHERE u.user_id = $1 AND u.displayname = $2"
    );
    assert_eq!(args, vec![Value::Int(1), text("John")]);
}

#[test]
fn test_insert_values_on_conflict_do_nothing() {
    let users = users();
    let q = insert_into(users.clone())
        .columns([users.col("displayname"), users.col("email")])
        .values(["bob", "bob@email.com"])
        .values(["alice", "alice@email.com"])
        .on_conflict([])
        .do_nothing()
        .returning_one();

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "INSERT INTO users (displayname, email) VALUES ($1, $2), ($3, $4) ON CONFLICT DO NOTHING RETURNING 1"
    );
    assert_eq!(
        args,
        vec![
            text("bob"),
            text("bob@email.com"),
            text("alice"),
            text("alice@email.com")
        ]
    );
}

#[test]
fn test_insert_valuesx_matches_values() {
    let users = users();
    let (name, email) = (users.col("displayname"), users.col("email"));
    let people = vec![("bob", "bob@email.com"), ("alice", "alice@email.com")];
    let q = insert_into(users.clone())
        .valuesx(move |col: &mut Column| {
            for (n, e) in &people {
                col.set_string(&name, *n);
                col.set_string(&email, *e);
            }
            Ok(())
        })
        .on_conflict([])
        .do_nothing()
        .returning_one();

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "INSERT INTO users (displayname, email) VALUES ($1, $2), ($3, $4) ON CONFLICT DO NOTHING RETURNING 1"
    );
    assert_eq!(args.len(), 4);
    assert_eq!(args[2], text("alice"));
}

#[test]
fn test_insert_valuesx_failure_aborts_render() {
    let q = insert_into(users()).valuesx(|_: &mut Column| Err(Exit::Code(ExitCode(9))));
    let err = q.to_sql().unwrap_err();
    assert_eq!(err.exit_code(), Some(ExitCode(9)));
}

#[test]
fn test_insert_select_with_ctes_and_upsert() {
    let users = users();
    let u = users.clone().as_("u");
    let cte1 = Cte::new(
        "cte1",
        select([u.col("user_id"), u.col("email")])
            .from(&u)
            .where_([u.col("active").eq(true)]),
    );
    let cte2 = Cte::new(
        "cte2",
        select([u.col("user_id"), u.col("displayname")]).from(&u),
    );

    let q = with([cte1.clone(), cte2.clone()])
        .insert_into(users.clone())
        .columns([users.col("displayname"), users.col("email")])
        .select(
            select([cte2.get("displayname"), cte1.get("email")])
                .from(&cte1)
                .natural_join(&cte2),
        )
        .on_conflict([users.col("email")])
        .do_update_set([users.col("displayname").set_excluded()])
        .where_([users.col("displayname").ne("")])
        .returning([users.col("user_id")]);

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "WITH cte1 AS (SELECT u.user_id, u.email FROM users AS u WHERE u.active = $1), \
         cte2 AS (SELECT u.user_id, u.displayname FROM users AS u) \
         INSERT INTO users (displayname, email) \
         SELECT cte2.displayname, cte1.email FROM cte1 NATURAL JOIN cte2 \
         ON CONFLICT (email) DO UPDATE SET displayname = EXCLUDED.displayname \
         WHERE users.displayname <> $2 \
         RETURNING users.user_id"
    );
    assert_eq!(args, vec![Value::Bool(true), text("")]);
}

#[test]
fn test_insert_on_constraint_and_default_values() {
    let q = insert_into(users())
        .default_values()
        .on_conflict_on_constraint("users_email_key")
        .do_nothing();
    assert_eq!(
        q.to_sql().unwrap().0,
        "INSERT INTO users DEFAULT VALUES ON CONFLICT ON CONSTRAINT users_email_key DO NOTHING"
    );
}

#[test]
fn test_select_clauses() {
    let o = BaseTable::new("orders").as_("o");
    let w = Window::new()
        .as_("w")
        .partition_by([o.col("customer_id")])
        .order_by([o.col("placed_at").desc()]);
    let q = select([
        o.col("customer_id"),
        sum(&o.col("total")).as_("spent"),
        row_number().over(&w).as_("rn"),
    ])
    .from(&o)
    .where_([
        or([o.col("status").eq("paid"), o.col("status").eq("shipped")]),
        o.col("total").gt(0),
    ])
    .group_by([o.col("customer_id"), o.col("placed_at")])
    .having([count_all().gt(1)])
    .window([w.clone()])
    .order_by([Field::column("spent").desc().nulls_last()])
    .limit(-10)
    .offset(20);

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT o.customer_id, SUM(o.total) AS spent, ROW_NUMBER() OVER w AS rn \
         FROM orders AS o \
         WHERE (o.status = $1 OR o.status = $2) AND o.total > $3 \
         GROUP BY o.customer_id, o.placed_at \
         HAVING COUNT(*) > $4 \
         WINDOW w AS (PARTITION BY o.customer_id ORDER BY o.placed_at DESC) \
         ORDER BY spent DESC NULLS LAST LIMIT $5 OFFSET $6"
    );
    assert_eq!(
        args,
        vec![
            text("paid"),
            text("shipped"),
            Value::Int(0),
            Value::Int(1),
            Value::Int(10),
            Value::Int(20)
        ]
    );
}

#[test]
fn test_args_follow_text_order() {
    let u = users().as_("u");
    let nick = fieldf(
        "COALESCE(?, ?)",
        [Operand::from(u.col("nickname")), Operand::from("anon")],
    );
    let q = select([nick.as_("nick")])
        .from(&u)
        .where_([u.col("age").between(18, 65)])
        .limit(5);

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT COALESCE(u.nickname, $1) AS nick FROM users AS u WHERE u.age BETWEEN $2 AND $3 LIMIT $4"
    );
    assert_eq!(
        args,
        vec![text("anon"), Value::Int(18), Value::Int(65), Value::Int(5)]
    );
}

#[test]
fn test_subquery_operands() {
    let u = users().as_("u");
    let u2 = users().as_("u2");
    let o = BaseTable::new("orders").as_("o");
    let q = select([u.col("user_id")]).from(&u).where_([
        u.col("score").gt(select([avg(&u2.col("score"))]).from(&u2)),
        exists(
            select_one()
                .from(&o)
                .where_([o.col("user_id").eq(u.col("user_id"))]),
        ),
    ]);

    assert_eq!(
        q.to_sql().unwrap().0,
        "SELECT u.user_id FROM users AS u \
         WHERE u.score > (SELECT AVG(u2.score) FROM users AS u2) \
         AND EXISTS (SELECT 1 FROM orders AS o WHERE o.user_id = u.user_id)"
    );
}

#[test]
fn test_generated_alias_is_stable() {
    let u = users().as_("u");
    let sub = select([u.col("user_id")])
        .from(&u)
        .where_([u.col("active").eq(true)]);
    let alias = sub.alias();
    assert!(alias.starts_with("_sq_"));
    assert_eq!(alias, sub.alias());

    let q = select([sub.get("user_id")]).from(sub.clone());
    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        format!(
            "SELECT {alias}.user_id FROM (SELECT u.user_id FROM users AS u WHERE u.active = $1) AS {alias}"
        )
    );
    assert_eq!(args, vec![Value::Bool(true)]);

    let other = sub.clone().where_([u.col("user_id").gt(3)]);
    assert_ne!(other.alias(), alias);
}

#[test]
fn test_identical_subqueries_get_their_own_alias() {
    let u = users().as_("u");
    let left = select([u.col("user_id")]).from(&u);
    let right = select([u.col("user_id")]).from(&u);
    let (a, b) = (left.alias(), right.alias());
    assert_ne!(a, b);

    let q = select([left.get("user_id")])
        .from(left.clone())
        .join(right.clone(), [left.get("user_id").eq(right.get("user_id"))]);
    assert_eq!(
        q.to_sql().unwrap().0,
        format!(
            "SELECT {a}.user_id FROM (SELECT u.user_id FROM users AS u) AS {a} \
             JOIN (SELECT u.user_id FROM users AS u) AS {b} ON {a}.user_id = {b}.user_id"
        )
    );
}

#[test]
fn test_lateral_join_on_subquery() {
    let u = users().as_("u");
    let o = BaseTable::new("orders").as_("o");
    let latest = select([o.col("user_id"), o.col("placed_at")])
        .from(&o)
        .where_([o.col("user_id").eq(u.col("user_id"))])
        .order_by([o.col("placed_at").desc()])
        .limit(1)
        .as_("latest");
    let q = select([u.col("user_id"), latest.get("placed_at")])
        .from(&u)
        .join_table(
            left_join(latest.clone(), [latest.get("user_id").eq(u.col("user_id"))]).lateral(),
        );

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT u.user_id, latest.placed_at FROM users AS u \
         LEFT JOIN LATERAL (SELECT o.user_id, o.placed_at FROM orders AS o \
         WHERE o.user_id = u.user_id ORDER BY o.placed_at DESC LIMIT $1) AS latest \
         ON latest.user_id = u.user_id"
    );
    assert_eq!(args, vec![Value::Int(1)]);
}

#[test]
fn test_set_operations_and_function_tables() {
    let u = users().as_("u");
    let a = BaseTable::new("admins").as_("a");
    let q = select([u.col("email")])
        .from(&u)
        .union(select([a.col("email")]).from(&a))
        .order_by([Field::column("email")])
        .limit(3);
    assert_eq!(
        q.to_sql().unwrap().0,
        "SELECT u.email FROM users AS u UNION SELECT a.email FROM admins AS a ORDER BY email LIMIT $1"
    );

    let s = FunctionTable::new("generate_series", [1, 3])
        .as_("s")
        .columns(["n"]);
    let (sql, args) = select([s.col("n")]).from(s).to_sql().unwrap();
    assert_eq!(sql, "SELECT s.n FROM generate_series($1, $2) AS s(n)");
    assert_eq!(args, vec![Value::Int(1), Value::Int(3)]);
}

#[test]
fn test_distinct() {
    let u = users().as_("u");
    assert_eq!(
        select_distinct([u.col("email")]).from(&u).to_sql().unwrap().0,
        "SELECT DISTINCT u.email FROM users AS u"
    );
    assert_eq!(
        select([u.col("email"), u.col("created_at")])
            .distinct_on([u.col("email")])
            .from(&u)
            .order_by([u.col("email"), u.col("created_at").desc()])
            .to_sql()
            .unwrap()
            .0,
        "SELECT DISTINCT ON (u.email) u.email, u.created_at FROM users AS u \
         ORDER BY u.email, u.created_at DESC"
    );
}

#[test]
fn test_update_from_subquery() {
    let users = users();
    let o = BaseTable::new("orders").as_("o");
    let totals = select([o.col("user_id"), sum(&o.col("total")).as_("total")])
        .from(&o)
        .group_by([o.col("user_id")])
        .as_("t");
    let q = update(users.clone())
        .set([users.col("lifetime_value").set(totals.get("total"))])
        .from(totals.clone())
        .where_([users.col("user_id").eq(totals.get("user_id"))])
        .returning([users.col("user_id")]);

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "UPDATE users SET lifetime_value = t.total \
         FROM (SELECT o.user_id, SUM(o.total) AS total FROM orders AS o GROUP BY o.user_id) AS t \
         WHERE users.user_id = t.user_id RETURNING users.user_id"
    );
    assert!(args.is_empty());
}

#[test]
fn test_update_setx() {
    let users = users();
    let (name, email) = (users.col("displayname"), users.col("email"));
    let q = update(users.clone())
        .set([users.col("updated_at").set(Field::literal("now()"))])
        .setx(move |col: &mut Column| {
            col.set_string(&name, "bob");
            col.set_null(&email);
            Ok(())
        })
        .where_([users.col("user_id").eq(5)]);

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "UPDATE users SET updated_at = now(), displayname = $1, email = $2 WHERE users.user_id = $3"
    );
    assert_eq!(args, vec![text("bob"), Value::Null, Value::Int(5)]);
}

#[test]
fn test_delete_using() {
    let u = users().as_("u");
    let b = BaseTable::new("bans").as_("b");
    let q = delete_from(u.clone())
        .using(&b)
        .where_([u.col("user_id").eq(b.col("user_id")), b.col("expires_at").is_null()])
        .returning([u.col("email")]);
    assert_eq!(
        q.to_sql().unwrap().0,
        "DELETE FROM users AS u USING bans AS b \
         WHERE u.user_id = b.user_id AND b.expires_at IS NULL RETURNING u.email"
    );
}

#[test]
fn test_write_statements_as_ctes() {
    let users = users();
    let archived = Cte::new(
        "archived",
        delete_from(users.clone())
            .where_([users.col("active").eq(false)])
            .returning([users.col("user_id")]),
    );
    let q = select([count_all()]).from(&archived);
    assert_eq!(
        q.to_sql().unwrap().0,
        "WITH archived AS (DELETE FROM users WHERE users.active = $1 RETURNING users.user_id) \
         SELECT COUNT(*) FROM archived"
    );
}

#[test]
fn test_rendering_is_idempotent() {
    let users = users();
    let name = users.col("displayname");
    let q = insert_into(users.clone()).valuesx(move |col: &mut Column| {
        col.set_string(&name, "bob");
        Ok(())
    });
    assert_eq!(q.to_sql().unwrap(), q.to_sql().unwrap());

    let u = users.as_("u");
    let sub = select([u.col("user_id")]).from(&u);
    let q = select_one().from(sub).where_([u.col("user_id").in_([1, 2, 3])]);
    assert_eq!(q.to_sql().unwrap(), q.to_sql().unwrap());
}

#[test]
fn test_forks_are_independent() {
    let u = users().as_("u");
    let base = select([u.col("user_id")]).from(&u);
    let active = base.clone().where_([u.col("active").eq(true)]);
    assert_eq!(base.to_sql().unwrap().0, "SELECT u.user_id FROM users AS u");
    assert_eq!(
        active.to_sql().unwrap().0,
        "SELECT u.user_id FROM users AS u WHERE u.active = $1"
    );
}

#[test]
fn test_mysql_keeps_question_marks() {
    let u = users().as_("u");
    let q = with_config(QueryConfig::new().with_dialect(Dialect::MySql))
        .select([u.col("user_id")])
        .from(&u)
        .where_([u.col("user_id").eq(1)]);
    assert_eq!(
        q.to_sql().unwrap().0,
        "SELECT u.user_id FROM users AS u WHERE u.user_id = ?"
    );
}

#[test]
fn test_empty_statements_render_permissively() {
    assert_eq!(SelectQuery::new().to_sql().unwrap().0, "SELECT");
    assert_eq!(InsertQuery::default().to_sql().unwrap().0, "INSERT INTO NULL");
    assert_eq!(UpdateQuery::default().to_sql().unwrap().0, "UPDATE NULL");
    assert_eq!(DeleteQuery::default().to_sql().unwrap().0, "DELETE FROM NULL");
}

#[test]
fn test_with_result_fields_replaces_lists() {
    let users = users();
    let id = users.col("user_id");
    let q = select_one()
        .from(&users)
        .with_result_fields(vec![id.clone()]);
    assert_eq!(q.to_sql().unwrap().0, "SELECT users.user_id FROM users");

    let q = insert_into(users.clone())
        .default_values()
        .returning_one()
        .with_result_fields(vec![id]);
    assert_eq!(
        q.to_sql().unwrap().0,
        "INSERT INTO users DEFAULT VALUES RETURNING users.user_id"
    );
}

#[test]
fn test_ctes_referenced_from_conflict_clause() {
    let users = users();
    let email = users.col("email");
    let defaults = Cte::new(
        "defaults",
        select([Field::column("email")]).from(&BaseTable::new("fallback")),
    );
    let q = insert_into(users.clone())
        .columns([email.clone()])
        .values(["ann@example.com"])
        .on_conflict([email.clone()])
        .do_update_set([email.set(select([defaults.get("email")]).from(&defaults).limit(1))]);

    let (sql, args) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "WITH defaults AS (SELECT email FROM fallback) \
         INSERT INTO users (email) VALUES ($1) \
         ON CONFLICT (email) DO UPDATE SET email = (SELECT defaults.email FROM defaults LIMIT $2)"
    );
    assert_eq!(args, vec![text("ann@example.com"), Value::Int(1)]);
}

#[test]
fn test_ctes_referenced_from_order_by_and_returning() {
    let users = users();
    let email = users.col("email");
    let c = Cte::new(
        "c",
        select([Field::column("email")]).from(&BaseTable::new("contacts")),
    );
    let first_contact = || fieldf("?", [Operand::from(select([c.get("email")]).from(&c).limit(1))]);

    let q = select([email.clone()])
        .from(&users)
        .order_by([first_contact()]);
    assert_eq!(
        q.to_sql().unwrap().0,
        "WITH c AS (SELECT email FROM contacts) \
         SELECT users.email FROM users ORDER BY (SELECT c.email FROM c LIMIT $1)"
    );

    let q = update(users.clone())
        .set([email.set("x")])
        .returning([first_contact()]);
    assert_eq!(
        q.to_sql().unwrap().0,
        "WITH c AS (SELECT email FROM contacts) \
         UPDATE users SET email = $1 RETURNING (SELECT c.email FROM c LIMIT $2)"
    );

    let q = delete_from(users.clone()).returning([first_contact()]);
    assert_eq!(
        q.to_sql().unwrap().0,
        "WITH c AS (SELECT email FROM contacts) \
         DELETE FROM users RETURNING (SELECT c.email FROM c LIMIT $1)"
    );
}

#[test]
fn test_insert_where_before_conflict_clause() {
    let users = users();
    let email = users.col("email");
    let q = insert_into(users.clone())
        .columns([email.clone()])
        .values(["ann@example.com"])
        .where_([email.ne("")])
        .on_conflict([email.clone()])
        .do_update_set([email.set_excluded()]);
    assert_eq!(
        q.to_sql().unwrap().0,
        "INSERT INTO users (email) VALUES ($1) \
         ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email WHERE users.email <> $2"
    );
}

#[test]
fn test_insert_where_without_do_update_fails() {
    let users = users();
    let email = users.col("email");
    let base = insert_into(users.clone())
        .columns([email.clone()])
        .values(["ann@example.com"])
        .where_([email.ne("")]);

    let err = base.to_sql().unwrap_err();
    assert!(matches!(err, SqError::Render(_)));

    let err = base.on_conflict([]).do_nothing().to_sql().unwrap_err();
    assert!(matches!(err, SqError::Render(_)));
}
