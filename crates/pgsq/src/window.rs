//! Window definitions for `OVER` and the `WINDOW` clause.

use crate::builder::SqlBuilder;
use crate::field::Field;

/// A window: `[PARTITION BY ...] [ORDER BY ...] [frame]`.
///
/// A named window is declared once in the select's `WINDOW` clause and referenced by name
/// from every function that uses it.
#[derive(Debug, Clone, Default)]
pub struct Window {
    name: Option<String>,
    partition_by: Vec<Field>,
    order_by: Vec<Field>,
    frame: Option<String>,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the window so it can be declared in a `WINDOW` clause.
    pub fn as_(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn partition_by(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.partition_by.extend(fields);
        self
    }

    pub fn order_by(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.order_by.extend(fields);
        self
    }

    /// Frame clause, e.g. `ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW`.
    pub fn frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<crate::cte::Cte>) {
        self.partition_by
            .iter()
            .chain(&self.order_by)
            .for_each(|f| f.collect_ctes(out));
    }

    pub(crate) fn append_definition(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        let mut first = true;
        let mut sep = |buf: &mut SqlBuilder| {
            if !first {
                buf.push(" ");
            }
            first = false;
        };
        if !self.partition_by.is_empty() {
            sep(buf);
            buf.push("PARTITION BY ")
                .push_elems(&self.partition_by, ", ", excluded);
        }
        if !self.order_by.is_empty() {
            sep(buf);
            buf.push("ORDER BY ");
            buf.push_iter(&self.order_by, ", ", |buf, f| f.append_ordered(buf, excluded));
        }
        if let Some(frame) = &self.frame {
            sep(buf);
            buf.push(frame);
        }
    }

    /// `name` for named windows, `(definition)` otherwise.
    pub(crate) fn append_reference(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        match &self.name {
            Some(name) => {
                buf.push(name);
            }
            None => {
                buf.push("(");
                self.append_definition(buf, excluded);
                buf.push(")");
            }
        }
    }

    /// `name AS (definition)`, as declared in the `WINDOW` clause.
    pub(crate) fn append_declaration(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        buf.push(self.name.as_deref().unwrap_or_default()).push(" AS (");
        self.append_definition(buf, excluded);
        buf.push(")");
    }
}

/// Anonymous window partitioned by `fields`.
pub fn partition_by(fields: impl IntoIterator<Item = Field>) -> Window {
    Window::new().partition_by(fields)
}

/// Anonymous window ordered by `fields`.
pub fn order_by(fields: impl IntoIterator<Item = Field>) -> Window {
    Window::new().order_by(fields)
}
