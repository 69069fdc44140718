//! Cursors handed to user callbacks.
//!
//! A [`Row`] is what a fetch mapper reads from. The first call of a mapper runs against a
//! discovery row: every accessor records the field it was asked for and returns a
//! placeholder, and the recorded fields become the statement's select list. Every later
//! call reads real values, position by position, in the same order.
//!
//! A [`Column`] is what `valuesx` and `setx` callbacks write to.

use crate::assignment::Assignment;
use crate::error::{SqError, SqResult};
use crate::exec::Exit;
use crate::field::{Field, Operand};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The target type a mapper requested for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Bool,
    Int64,
    Int32,
    Float64,
    String,
    Bytes,
    Time,
    Json,
    Uuid,
    /// Any value, untyped.
    Value,
}

#[derive(Debug, Clone)]
struct Binding {
    field: Field,
    key: String,
    kind: ScanKind,
    nullable: bool,
}

/// Per-row read cursor passed to fetch mappers.
///
/// One `Row` is reused for every row of a fetch. Fields must be read in the same order on
/// every call; reading a different field at a position than the one read during discovery
/// is a decode error.
#[derive(Debug)]
pub struct Row {
    discovering: bool,
    bindings: Vec<Binding>,
    values: Vec<Value>,
    index: usize,
}

impl Row {
    pub(crate) fn discovery() -> Self {
        Self {
            discovering: true,
            bindings: Vec::new(),
            values: Vec::new(),
            index: 0,
        }
    }

    /// The fields read during discovery, in read order.
    pub(crate) fn result_fields(&self) -> Vec<Field> {
        self.bindings.iter().map(|b| b.field.clone()).collect()
    }

    /// Switch to reading `values` from the first position.
    pub(crate) fn load(&mut self, values: Vec<Value>) {
        self.discovering = false;
        self.values = values;
        self.index = 0;
    }

    /// Whether this call is the discovery call. Accessors return placeholders during it.
    pub fn is_discovering(&self) -> bool {
        self.discovering
    }

    /// Fields bound so far with the kind they were read as.
    pub fn bindings(&self) -> impl Iterator<Item = (&Field, ScanKind)> {
        self.bindings.iter().map(|b| (&b.field, b.kind))
    }

    /// Next value, or `None` while discovering.
    fn next(&mut self, field: &Field, kind: ScanKind, nullable: bool) -> SqResult<Option<Value>> {
        if self.discovering {
            self.bindings.push(Binding {
                field: field.clone(),
                key: field.key(),
                kind,
                nullable,
            });
            return Ok(None);
        }

        let position = self.index;
        self.index += 1;
        let key = field.key();
        let Some(binding) = self.bindings.get(position) else {
            return Err(SqError::decode(
                key,
                format!("position {position} was not read on the first call"),
            ));
        };
        if binding.key != key {
            return Err(SqError::decode(
                key,
                format!("position {position} is bound to {}", binding.key),
            ));
        }
        if binding.kind != kind || binding.nullable != nullable {
            return Err(SqError::decode(
                key,
                format!(
                    "read as {kind:?} but bound as {:?}{}",
                    binding.kind,
                    if binding.nullable { " (nullable)" } else { "" }
                ),
            ));
        }
        match self.values.get_mut(position) {
            Some(value) => Ok(Some(std::mem::take(value))),
            None => Err(SqError::decode(
                key,
                format!("row has only {} columns", self.values.len()),
            )),
        }
    }

    fn scan<T: Default>(
        &mut self,
        field: &Field,
        kind: ScanKind,
        convert: impl FnOnce(Value) -> Result<T, String>,
    ) -> SqResult<T> {
        match self.next(field, kind, false)? {
            None => Ok(T::default()),
            Some(Value::Null) => Err(SqError::decode(
                field.key(),
                "unexpected NULL, use the _opt accessor",
            )),
            Some(value) => convert(value).map_err(|msg| SqError::decode(field.key(), msg)),
        }
    }

    fn scan_opt<T>(
        &mut self,
        field: &Field,
        kind: ScanKind,
        convert: impl FnOnce(Value) -> Result<T, String>,
    ) -> SqResult<Option<T>> {
        match self.next(field, kind, true)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => convert(value)
                .map(Some)
                .map_err(|msg| SqError::decode(field.key(), msg)),
        }
    }

    pub fn bool(&mut self, field: &Field) -> SqResult<bool> {
        self.scan(field, ScanKind::Bool, to_bool)
    }

    pub fn bool_opt(&mut self, field: &Field) -> SqResult<Option<bool>> {
        self.scan_opt(field, ScanKind::Bool, to_bool)
    }

    pub fn int64(&mut self, field: &Field) -> SqResult<i64> {
        self.scan(field, ScanKind::Int64, to_i64)
    }

    pub fn int64_opt(&mut self, field: &Field) -> SqResult<Option<i64>> {
        self.scan_opt(field, ScanKind::Int64, to_i64)
    }

    pub fn int32(&mut self, field: &Field) -> SqResult<i32> {
        self.scan(field, ScanKind::Int32, to_i32)
    }

    pub fn int32_opt(&mut self, field: &Field) -> SqResult<Option<i32>> {
        self.scan_opt(field, ScanKind::Int32, to_i32)
    }

    /// Integers are widened.
    pub fn float64(&mut self, field: &Field) -> SqResult<f64> {
        self.scan(field, ScanKind::Float64, to_f64)
    }

    pub fn float64_opt(&mut self, field: &Field) -> SqResult<Option<f64>> {
        self.scan_opt(field, ScanKind::Float64, to_f64)
    }

    pub fn string(&mut self, field: &Field) -> SqResult<String> {
        self.scan(field, ScanKind::String, to_string)
    }

    pub fn string_opt(&mut self, field: &Field) -> SqResult<Option<String>> {
        self.scan_opt(field, ScanKind::String, to_string)
    }

    pub fn bytes(&mut self, field: &Field) -> SqResult<Vec<u8>> {
        self.scan(field, ScanKind::Bytes, to_bytes)
    }

    pub fn bytes_opt(&mut self, field: &Field) -> SqResult<Option<Vec<u8>>> {
        self.scan_opt(field, ScanKind::Bytes, to_bytes)
    }

    pub fn time(&mut self, field: &Field) -> SqResult<DateTime<Utc>> {
        self.scan(field, ScanKind::Time, to_time)
    }

    pub fn time_opt(&mut self, field: &Field) -> SqResult<Option<DateTime<Utc>>> {
        self.scan_opt(field, ScanKind::Time, to_time)
    }

    pub fn json(&mut self, field: &Field) -> SqResult<serde_json::Value> {
        self.scan(field, ScanKind::Json, to_json)
    }

    pub fn json_opt(&mut self, field: &Field) -> SqResult<Option<serde_json::Value>> {
        self.scan_opt(field, ScanKind::Json, to_json)
    }

    /// Deserialize a JSON column. Returns `T::default()` during discovery.
    pub fn json_as<T: DeserializeOwned + Default>(&mut self, field: &Field) -> SqResult<T> {
        self.scan(field, ScanKind::Json, |v| {
            serde_json::from_value(to_json(v)?).map_err(|e| e.to_string())
        })
    }

    pub fn json_as_opt<T: DeserializeOwned>(&mut self, field: &Field) -> SqResult<Option<T>> {
        self.scan_opt(field, ScanKind::Json, |v| {
            serde_json::from_value(to_json(v)?).map_err(|e| e.to_string())
        })
    }

    pub fn uuid(&mut self, field: &Field) -> SqResult<Uuid> {
        self.scan(field, ScanKind::Uuid, to_uuid)
    }

    pub fn uuid_opt(&mut self, field: &Field) -> SqResult<Option<Uuid>> {
        self.scan_opt(field, ScanKind::Uuid, to_uuid)
    }

    /// The raw value, `NULL` included.
    pub fn value(&mut self, field: &Field) -> SqResult<Value> {
        Ok(self.next(field, ScanKind::Value, true)?.unwrap_or_default())
    }
}

fn mismatch(value: &Value, target: &str) -> String {
    format!("cannot scan {} into {target}", value.kind())
}

fn to_bool(value: Value) -> Result<bool, String> {
    match value {
        Value::Bool(v) => Ok(v),
        other => Err(mismatch(&other, "bool")),
    }
}

fn to_i64(value: Value) -> Result<i64, String> {
    match value {
        Value::Int(v) => Ok(v),
        other => Err(mismatch(&other, "i64")),
    }
}

fn to_i32(value: Value) -> Result<i32, String> {
    match value {
        Value::Int(v) => i32::try_from(v).map_err(|e| format!("{v}: {e}")),
        other => Err(mismatch(&other, "i32")),
    }
}

fn to_f64(value: Value) -> Result<f64, String> {
    match value {
        Value::Float(v) => Ok(v),
        Value::Int(v) => Ok(v as f64),
        other => Err(mismatch(&other, "f64")),
    }
}

fn to_string(value: Value) -> Result<String, String> {
    match value {
        Value::Text(v) => Ok(v),
        other => Err(mismatch(&other, "string")),
    }
}

fn to_bytes(value: Value) -> Result<Vec<u8>, String> {
    match value {
        Value::Bytes(v) => Ok(v),
        Value::Text(v) => Ok(v.into_bytes()),
        other => Err(mismatch(&other, "bytes")),
    }
}

fn to_time(value: Value) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Timestamp(v) => Ok(v),
        other => Err(mismatch(&other, "timestamp")),
    }
}

fn to_json(value: Value) -> Result<serde_json::Value, String> {
    match value {
        Value::Json(v) => Ok(v),
        Value::Text(v) => serde_json::from_str(&v).map_err(|e| e.to_string()),
        other => Err(mismatch(&other, "json")),
    }
}

fn to_uuid(value: Value) -> Result<Uuid, String> {
    match value {
        Value::Uuid(v) => Ok(v),
        Value::Text(v) => Uuid::parse_str(&v).map_err(|e| e.to_string()),
        other => Err(mismatch(&other, "uuid")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnMode {
    Insert,
    Update,
}

/// Write cursor passed to `valuesx` and `setx` callbacks.
///
/// In insert mode the first field set twice closes the column list; from then on values
/// fill rows in column order. Setting a field out of order, or leaving the last row
/// incomplete, fails the render.
#[derive(Debug)]
pub struct Column {
    mode: ColumnMode,
    fields: Vec<Field>,
    keys: Vec<String>,
    values: Vec<Operand>,
    closed: bool,
    error: Option<SqError>,
}

impl Column {
    fn new(mode: ColumnMode) -> Self {
        Self {
            mode,
            fields: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
            closed: false,
            error: None,
        }
    }

    fn fail(&mut self, err: SqError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Set `field` to any operand: a value, another field or a subquery.
    pub fn set(&mut self, field: &Field, value: impl Into<Operand>) {
        let value = value.into();
        if self.mode == ColumnMode::Update {
            self.fields.push(field.clone());
            self.values.push(value);
            return;
        }

        let key = field.key();
        if !self.closed {
            if !self.keys.contains(&key) {
                self.fields.push(field.clone());
                self.keys.push(key);
                self.values.push(value);
                return;
            }
            self.closed = true;
        }
        let position = self.values.len() % self.keys.len();
        if self.keys[position] != key {
            let expected = self.keys[position].clone();
            self.fail(SqError::render(format!(
                "column {key} set out of order, expected {expected}"
            )));
        }
        self.values.push(value);
    }

    pub fn set_string(&mut self, field: &Field, value: impl Into<String>) {
        self.set(field, Value::Text(value.into()));
    }

    pub fn set_int64(&mut self, field: &Field, value: i64) {
        self.set(field, Value::Int(value));
    }

    pub fn set_float64(&mut self, field: &Field, value: f64) {
        self.set(field, Value::Float(value));
    }

    pub fn set_bool(&mut self, field: &Field, value: bool) {
        self.set(field, Value::Bool(value));
    }

    pub fn set_time(&mut self, field: &Field, value: DateTime<Utc>) {
        self.set(field, Value::Timestamp(value));
    }

    pub fn set_bytes(&mut self, field: &Field, value: impl Into<Vec<u8>>) {
        self.set(field, Value::Bytes(value.into()));
    }

    pub fn set_json(&mut self, field: &Field, value: serde_json::Value) {
        self.set(field, Value::Json(value));
    }

    /// Serialize `value` to JSON. A serialization failure fails the render.
    pub fn set_json_from<T: Serialize + ?Sized>(&mut self, field: &Field, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.set_json(field, json),
            Err(err) => {
                self.fail(SqError::render(format!("{}: {err}", field.key())));
                self.set(field, Value::Null);
            }
        }
    }

    pub fn set_uuid(&mut self, field: &Field, value: Uuid) {
        self.set(field, Value::Uuid(value));
    }

    pub fn set_null(&mut self, field: &Field) {
        self.set(field, Value::Null);
    }

    /// `DEFAULT`
    pub fn set_default(&mut self, field: &Field) {
        self.set(field, Operand::Default);
    }
}

type MapperFn = dyn Fn(&mut Column) -> Result<(), Exit> + Send + Sync;

/// A `valuesx` / `setx` callback, run each time its statement is rendered or walked for CTEs.
#[derive(Clone)]
pub(crate) struct ColumnMapper(Arc<MapperFn>);

impl fmt::Debug for ColumnMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ColumnMapper(..)")
    }
}

impl ColumnMapper {
    pub(crate) fn new<F>(mapper: F) -> Self
    where
        F: Fn(&mut Column) -> Result<(), Exit> + Send + Sync + 'static,
    {
        Self(Arc::new(mapper))
    }

    fn run(&self, mode: ColumnMode) -> SqResult<Column> {
        let mut column = Column::new(mode);
        (self.0)(&mut column).or_else(Exit::into_result)?;
        match column.error.take() {
            Some(err) => Err(err),
            None => Ok(column),
        }
    }

    /// Column list and VALUES rows.
    pub(crate) fn insert_rows(&self) -> SqResult<(Vec<Field>, Vec<Vec<Operand>>)> {
        let column = self.run(ColumnMode::Insert)?;
        let width = column.keys.len();
        if width == 0 {
            return Ok((Vec::new(), Vec::new()));
        }
        if column.values.len() % width != 0 {
            return Err(SqError::render(format!(
                "incomplete row: {} values for {width} columns",
                column.values.len()
            )));
        }
        let rows = column
            .values
            .chunks(width)
            .map(<[Operand]>::to_vec)
            .collect();
        Ok((column.fields, rows))
    }

    /// SET assignments in the order they were made.
    pub(crate) fn update_assignments(&self) -> SqResult<Vec<Assignment>> {
        let column = self.run(ColumnMode::Update)?;
        Ok(column
            .fields
            .into_iter()
            .zip(column.values)
            .map(|(field, value)| Assignment { field, value })
            .collect())
    }
}
