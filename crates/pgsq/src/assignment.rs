//! `field = value` pairs for SET and DO UPDATE SET lists.

use crate::builder::{AppendSql, SqlBuilder};
use crate::cte::Cte;
use crate::field::{Field, Operand};

#[derive(Debug, Clone)]
pub struct Assignment {
    pub field: Field,
    pub value: Operand,
}

impl Assignment {
    pub fn new(field: Field, value: impl Into<Operand>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    pub(crate) fn collect_ctes(&self, out: &mut Vec<Cte>) {
        self.value.collect_ctes(out);
    }
}

impl AppendSql for Assignment {
    fn append_sql(&self, buf: &mut SqlBuilder, excluded: &[&str]) {
        self.field.append_sql(buf, excluded);
        buf.push(" = ");
        self.value.append_sql(buf, excluded);
    }
}
