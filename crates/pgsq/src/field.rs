//! Fields and operands.
//!
//! A [`Field`] is anything that can appear in a select list: a column reference, a raw
//! literal, a custom expression with `?` slots, or a function call. An [`Operand`] is
//! anything that can appear on either side of a comparison or assignment, and is where the
//! single value-dispatch rule lives: values become placeholders, fields become their
//! qualified names and queries become parenthesized subqueries.

use crate::assignment::Assignment;
use crate::builder::{AppendSql, SqlBuilder};
use crate::cte::Cte;
use crate::error::SqError;
use crate::predicate::{InList, Predicate};
use crate::query::Query;
use crate::value::Value;
use crate::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nulls {
    First,
    Last,
}

#[derive(Debug, Clone)]
enum FieldKind {
    Column {
        qualifier: Option<String>,
        name: String,
    },
    Literal(String),
    Custom {
        format: String,
        operands: Vec<Operand>,
    },
    Function {
        name: String,
        args: Vec<Operand>,
        distinct: bool,
        over: Option<Window>,
    },
}

/// A select-list expression.
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldKind,
    alias: Option<String>,
    order: Option<Order>,
    nulls: Option<Nulls>,
}

impl Field {
    fn from_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            alias: None,
            order: None,
            nulls: None,
        }
    }

    /// A column qualified by a table name or alias: `qualifier.name`.
    pub fn new(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::from_kind(FieldKind::Column {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        })
    }

    /// An unqualified column.
    pub fn column(name: impl Into<String>) -> Self {
        Self::from_kind(FieldKind::Column {
            qualifier: None,
            name: name.into(),
        })
    }

    /// Raw SQL, emitted verbatim.
    pub fn literal(sql: impl Into<String>) -> Self {
        Self::from_kind(FieldKind::Literal(sql.into()))
    }

    /// A function call: `name(arg, ...)`.
    pub fn function<I, O>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Operand>,
    {
        Self::from_kind(FieldKind::Function {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            distinct: false,
            over: None,
        })
    }

    /// Render as `expr AS alias` in select and returning lists.
    pub fn as_(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn asc(mut self) -> Self {
        self.order = Some(Order::Asc);
        self
    }

    pub fn desc(mut self) -> Self {
        self.order = Some(Order::Desc);
        self
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(Nulls::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(Nulls::Last);
        self
    }

    /// Turn a function call into a window function call.
    ///
    /// A named window renders as `OVER name`, an anonymous one inline as `OVER (...)`.
    /// Has no effect on fields that are not function calls.
    pub fn over(mut self, window: &Window) -> Self {
        if let FieldKind::Function { over, .. } = &mut self.kind {
            *over = Some(window.clone());
        }
        self
    }

    /// The output name: the alias if set, else the column name, else empty.
    pub fn name(&self) -> &str {
        match (&self.alias, &self.kind) {
            (Some(alias), _) => alias,
            (None, FieldKind::Column { name, .. }) => name,
            _ => "",
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The table name or alias a column is qualified with.
    pub fn qualifier(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Column { qualifier, .. } => qualifier.as_deref(),
            _ => None,
        }
    }

    /// Identity of the expression, independent of alias and ordering.
    pub fn key(&self) -> String {
        match &self.kind {
            FieldKind::Column {
                qualifier: Some(q),
                name,
            } => format!("{q}.{name}"),
            FieldKind::Column {
                qualifier: None,
                name,
            } => name.clone(),
            _ => {
                let mut buf = SqlBuilder::new();
                self.append_sql(&mut buf, &[]);
                buf.sql().to_string()
            }
        }
    }

    /// `expr AS alias`.
    pub(crate) fn append_with_alias(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        self.append_sql(buf, excluded);
        if let Some(alias) = &self.alias {
            buf.push(" AS ").push(alias);
        }
    }

    /// `expr [ASC | DESC] [NULLS FIRST | NULLS LAST]`.
    pub(crate) fn append_ordered(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        self.append_sql(buf, excluded);
        match self.order {
            Some(Order::Asc) => {
                buf.push(" ASC");
            }
            Some(Order::Desc) => {
                buf.push(" DESC");
            }
            None => {}
        }
        match self.nulls {
            Some(Nulls::First) => {
                buf.push(" NULLS FIRST");
            }
            Some(Nulls::Last) => {
                buf.push(" NULLS LAST");
            }
            None => {}
        }
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        match &self.kind {
            FieldKind::Custom { operands, .. } => operands.iter().for_each(|o| o.collect_ctes(out)),
            FieldKind::Function { args, over, .. } => {
                args.iter().for_each(|o| o.collect_ctes(out));
                if let Some(window) = over {
                    window.collect_ctes(out);
                }
            }
            _ => {}
        }
    }

    fn compare(&self, op: &'static str, value: impl Into<Operand>) -> Predicate {
        Predicate::Compare {
            left: Operand::Field(self.clone()),
            op,
            right: value.into(),
        }
    }

    /// `field = value`
    pub fn eq(&self, value: impl Into<Operand>) -> Predicate {
        self.compare("=", value)
    }

    /// `field <> value`
    pub fn ne(&self, value: impl Into<Operand>) -> Predicate {
        self.compare("<>", value)
    }

    /// `field > value`
    pub fn gt(&self, value: impl Into<Operand>) -> Predicate {
        self.compare(">", value)
    }

    /// `field >= value`
    pub fn ge(&self, value: impl Into<Operand>) -> Predicate {
        self.compare(">=", value)
    }

    /// `field < value`
    pub fn lt(&self, value: impl Into<Operand>) -> Predicate {
        self.compare("<", value)
    }

    /// `field <= value`
    pub fn le(&self, value: impl Into<Operand>) -> Predicate {
        self.compare("<=", value)
    }

    pub fn like(&self, pattern: impl Into<Operand>) -> Predicate {
        self.compare("LIKE", pattern)
    }

    pub fn not_like(&self, pattern: impl Into<Operand>) -> Predicate {
        self.compare("NOT LIKE", pattern)
    }

    pub fn ilike(&self, pattern: impl Into<Operand>) -> Predicate {
        self.compare("ILIKE", pattern)
    }

    pub fn not_ilike(&self, pattern: impl Into<Operand>) -> Predicate {
        self.compare("NOT ILIKE", pattern)
    }

    pub fn is_distinct_from(&self, value: impl Into<Operand>) -> Predicate {
        self.compare("IS DISTINCT FROM", value)
    }

    pub fn is_not_distinct_from(&self, value: impl Into<Operand>) -> Predicate {
        self.compare("IS NOT DISTINCT FROM", value)
    }

    pub fn is_null(&self) -> Predicate {
        Predicate::Null {
            operand: Operand::Field(self.clone()),
            negated: false,
        }
    }

    pub fn is_not_null(&self) -> Predicate {
        Predicate::Null {
            operand: Operand::Field(self.clone()),
            negated: true,
        }
    }

    /// `field IN (v1, v2, ...)`. An empty list renders as `IN (NULL)`.
    pub fn in_<I, O>(&self, values: I) -> Predicate
    where
        I: IntoIterator<Item = O>,
        O: Into<Operand>,
    {
        Predicate::In {
            operand: Operand::Field(self.clone()),
            list: InList::Items(values.into_iter().map(Into::into).collect()),
            negated: false,
        }
    }

    pub fn not_in<I, O>(&self, values: I) -> Predicate
    where
        I: IntoIterator<Item = O>,
        O: Into<Operand>,
    {
        Predicate::In {
            operand: Operand::Field(self.clone()),
            list: InList::Items(values.into_iter().map(Into::into).collect()),
            negated: true,
        }
    }

    /// `field IN (subquery)`.
    pub fn in_query(&self, query: impl Into<Query>) -> Predicate {
        Predicate::In {
            operand: Operand::Field(self.clone()),
            list: InList::Query(Box::new(query.into().nested())),
            negated: false,
        }
    }

    pub fn not_in_query(&self, query: impl Into<Query>) -> Predicate {
        Predicate::In {
            operand: Operand::Field(self.clone()),
            list: InList::Query(Box::new(query.into().nested())),
            negated: true,
        }
    }

    pub fn between(&self, low: impl Into<Operand>, high: impl Into<Operand>) -> Predicate {
        Predicate::Between {
            operand: Operand::Field(self.clone()),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn not_between(&self, low: impl Into<Operand>, high: impl Into<Operand>) -> Predicate {
        Predicate::Between {
            operand: Operand::Field(self.clone()),
            low: low.into(),
            high: high.into(),
            negated: true,
        }
    }

    /// `field = value` in a SET or DO UPDATE SET list.
    pub fn set(&self, value: impl Into<Operand>) -> Assignment {
        Assignment::new(self.clone(), value)
    }

    /// `field = EXCLUDED.field`, for `ON CONFLICT ... DO UPDATE SET`.
    pub fn set_excluded(&self) -> Assignment {
        Assignment::new(self.clone(), excluded(self))
    }
}

impl AppendSql for Field {
    fn append_sql(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        match &self.kind {
            FieldKind::Column { qualifier, name } => {
                if let Some(q) = qualifier {
                    if !excluded.contains(&q.as_str()) {
                        buf.push(q).push(".");
                    }
                }
                buf.push(name);
            }
            FieldKind::Literal(sql) => {
                buf.push(sql);
            }
            FieldKind::Custom { format, operands } => {
                append_format(buf, format, operands, excluded);
            }
            FieldKind::Function {
                name,
                args,
                distinct,
                over,
            } => {
                buf.push(name).push("(");
                if *distinct {
                    buf.push("DISTINCT ");
                }
                buf.push_elems(args, ", ", excluded);
                buf.push(")");
                if let Some(window) = over {
                    buf.push(" OVER ");
                    window.append_reference(buf, excluded);
                }
            }
        }
    }
}

/// A custom expression: each `?` in `format` is replaced by the next operand.
///
/// ```ignore
/// let f = fieldf("COALESCE(?, ?)", [u.col("nickname").into(), "anonymous".into()]);
/// ```
pub fn fieldf(format: impl Into<String>, operands: impl IntoIterator<Item = Operand>) -> Field {
    Field::from_kind(FieldKind::Custom {
        format: format.into(),
        operands: operands.into_iter().collect(),
    })
}

/// `EXCLUDED.name`, the row proposed for insertion inside `ON CONFLICT DO UPDATE`.
pub fn excluded(field: &Field) -> Field {
    let name = match &field.kind {
        FieldKind::Column { name, .. } => name.clone(),
        _ => field.key(),
    };
    Field::new("EXCLUDED", name)
}

fn aggregate(name: &str, field: &Field, distinct: bool) -> Field {
    Field::from_kind(FieldKind::Function {
        name: name.to_string(),
        args: vec![Operand::Field(field.clone())],
        distinct,
        over: None,
    })
}

/// `COUNT(*)`
pub fn count_all() -> Field {
    Field::function("COUNT", [Field::literal("*")])
}

/// `COUNT(field)`
pub fn count(field: &Field) -> Field {
    aggregate("COUNT", field, false)
}

/// `COUNT(DISTINCT field)`
pub fn count_distinct(field: &Field) -> Field {
    aggregate("COUNT", field, true)
}

pub fn sum(field: &Field) -> Field {
    aggregate("SUM", field, false)
}

pub fn avg(field: &Field) -> Field {
    aggregate("AVG", field, false)
}

pub fn min(field: &Field) -> Field {
    aggregate("MIN", field, false)
}

pub fn max(field: &Field) -> Field {
    aggregate("MAX", field, false)
}

pub fn row_number() -> Field {
    Field::function("ROW_NUMBER", Vec::<Operand>::new())
}

pub fn rank() -> Field {
    Field::function("RANK", Vec::<Operand>::new())
}

pub fn dense_rank() -> Field {
    Field::function("DENSE_RANK", Vec::<Operand>::new())
}

/// Render `format`, substituting each unquoted `?` with the next operand.
///
/// `??` is kept as is so that the placeholder rewrite turns it into a literal `?`.
pub(crate) fn append_format(
    buf: &mut SqlBuilder,
    format: &str,
    operands: &[Operand],
    excluded: &[&str],
) {
    let mut operands = operands.iter();
    let mut in_quote = false;
    let mut start = 0;
    let bytes = format.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b'?' if !in_quote => {
                if bytes.get(i + 1) == Some(&b'?') {
                    i += 2;
                    continue;
                }
                buf.push(&format[start..i]);
                match operands.next() {
                    Some(operand) => operand.append_sql(buf, excluded),
                    None => buf.fail(SqError::render(format!(
                        "expression {format:?} has more ? slots than operands"
                    ))),
                }
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    buf.push(&format[start..]);
    if operands.next().is_some() {
        buf.fail(SqError::render(format!(
            "expression {format:?} has more operands than ? slots"
        )));
    }
}

/// The right-hand side of a comparison or assignment.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Bound as a placeholder argument.
    Value(Value),
    /// Rendered as its (possibly qualified) name.
    Field(Field),
    /// Rendered as a parenthesized subquery.
    Query(Box<Query>),
    /// Comma-separated operands.
    List(Vec<Operand>),
    /// The `DEFAULT` keyword.
    Default,
}

impl Operand {
    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        match self {
            Operand::Field(f) => f.collect_ctes(out),
            Operand::Query(q) => q.collect_ctes(out),
            Operand::List(items) => items.iter().for_each(|o| o.collect_ctes(out)),
            Operand::Value(_) | Operand::Default => {}
        }
    }
}

impl AppendSql for Operand {
    fn append_sql(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        match self {
            Operand::Value(v) => {
                buf.push_arg(v.clone());
            }
            Operand::Field(f) => f.append_sql(buf, excluded),
            Operand::Query(q) => {
                buf.push("(");
                q.append_nested(buf);
                buf.push(")");
            }
            Operand::List(items) => {
                buf.push_elems(items, ", ", excluded);
            }
            Operand::Default => {
                buf.push("DEFAULT");
            }
        }
    }
}

impl<T: Into<Value>> From<T> for Operand {
    fn from(v: T) -> Self {
        Operand::Value(v.into())
    }
}

impl From<Field> for Operand {
    fn from(f: Field) -> Self {
        Operand::Field(f)
    }
}

impl From<&Field> for Operand {
    fn from(f: &Field) -> Self {
        Operand::Field(f.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut SqlBuilder)) -> (String, Vec<Value>) {
        let mut buf = SqlBuilder::new();
        f(&mut buf);
        buf.into_parts().unwrap()
    }

    #[test]
    fn columns_drop_excluded_qualifiers() {
        let f = Field::new("u", "email");
        let (sql, _) = render(|b| f.append_sql(b, &[]));
        assert_eq!(sql, "u.email");
        let (sql, _) = render(|b| f.append_sql(b, &["u"]));
        assert_eq!(sql, "email");
    }

    #[test]
    fn alias_and_ordering() {
        let f = Field::new("u", "email").as_("mail");
        let (sql, _) = render(|b| f.append_with_alias(b, &[]));
        assert_eq!(sql, "u.email AS mail");
        assert_eq!(f.name(), "mail");

        let f = Field::new("u", "email").desc().nulls_last();
        let (sql, _) = render(|b| f.append_ordered(b, &[]));
        assert_eq!(sql, "u.email DESC NULLS LAST");
    }

    #[test]
    fn custom_expressions_bind_operands_in_order() {
        let f = fieldf(
            "COALESCE(?, ?) || '?'",
            [Field::new("u", "nick").into(), "anon".into()],
        );
        let (sql, args) = render(|b| f.append_sql(b, &[]));
        assert_eq!(sql, "COALESCE(u.nick, ?) || '?'");
        assert_eq!(args, vec![Value::Text("anon".into())]);
    }

    #[test]
    fn custom_expression_slot_mismatch_fails() {
        let f = fieldf("? + ?", [Operand::from(1)]);
        let mut buf = SqlBuilder::new();
        f.append_sql(&mut buf, &[]);
        assert!(buf.has_failed());
    }

    #[test]
    fn aggregates_and_excluded() {
        let id = Field::new("u", "user_id");
        let (sql, _) = render(|b| {
            count_all().append_sql(b, &[]);
            b.push(", ");
            count_distinct(&id).append_sql(b, &[]);
            b.push(", ");
            excluded(&id).append_sql(b, &["u"]);
        });
        assert_eq!(sql, "COUNT(*), COUNT(DISTINCT u.user_id), EXCLUDED.user_id");
    }

    #[test]
    fn key_ignores_alias() {
        assert_eq!(Field::new("u", "id").as_("x").key(), "u.id");
        assert_eq!(sum(&Field::new("u", "id")).key(), "SUM(u.id)");
    }
}
