/*
  The one seam to a relational backend: stored-procedure commands with
  named parameters, forward-only row cursors and scalar results.
*/

use {
  std::collections::VecDeque,
  crate::errors::{Error, Result},
};

/* Procedure names. Whatever implements BackendPort must provide these. */
pub const GET_GRAPH_ID: &str = "GetGraphID";
pub const GET_OR_CREATE_GRAPH_ID: &str = "GetOrCreateGraphID";
pub const GET_GRAPH_URI: &str = "GetGraphUri";
pub const GET_GRAPH_URIS: &str = "GetGraphUris";
pub const DELETE_GRAPH_BY_URI: &str = "DeleteGraphByUri";
pub const CLEAR_GRAPH_FOR_OVERWRITE: &str = "ClearGraphForOverwrite";
pub const GET_NODE_ID: &str = "GetNodeID";
pub const GET_OR_CREATE_NODE_ID: &str = "GetOrCreateNodeID";
pub const CREATE_BLANK_NODE_ID: &str = "CreateBlankNodeID";
pub const GET_NODE_DATA: &str = "GetNodeData";
pub const GET_GRAPH_QUADS_DATA: &str = "GetGraphQuadsData";
pub const GET_GRAPH_QUADS_VIRTUAL: &str = "GetGraphQuadsVirtual";
pub const ASSERT_QUAD: &str = "AssertQuad";
pub const RETRACT_QUAD: &str = "RetractQuad";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
  Null,
  Byte(u8),
  Int(i64),
  Text(String),
}

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }
  pub fn as_byte(&self) -> Result<u8> {
    match self {
      Value::Byte(b) => Ok(*b),
      Value::Int(i) if (0..=255).contains(i) => Ok(*i as u8),
      other => Err(Error::backend(format!("expected a byte column, got {:?}", other))),
    }
  }
  pub fn as_int(&self) -> Result<i64> {
    match self {
      Value::Int(i) => Ok(*i),
      Value::Byte(b) => Ok(*b as i64),
      other => Err(Error::backend(format!("expected an integer column, got {:?}", other))),
    }
  }
  pub fn as_text(&self) -> Result<&str> {
    match self {
      Value::Text(s) => Ok(s),
      other => Err(Error::backend(format!("expected a text column, got {:?}", other))),
    }
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Value::Int(i)
  }
}
impl From<u8> for Value {
  fn from(b: u8) -> Self {
    Value::Byte(b)
  }
}
impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Text(s.to_string())
  }
}
impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::Text(s)
  }
}
impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self {
    v.map_or(Value::Null, Into::into)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
  pub name: String,
  pub value: Value,
}

/// A stored-procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
  pub procedure: String,
  pub params: Vec<Parameter>,
}

impl Command {
  pub fn new(procedure: &str) -> Self {
    Command { procedure: procedure.to_string(), params: Vec::new() }
  }
  /// Builder form of `set`.
  pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.set(name, value);
    self
  }
  /// Adds or replaces a parameter.
  pub fn set(&mut self, name: &str, value: impl Into<Value>) {
    let value = value.into();
    match self.params.iter_mut().find(|p| p.name == name) {
      Some(param) => param.value = value,
      None => self.params.push(Parameter { name: name.to_string(), value }),
    }
  }
  pub fn remove(&mut self, name: &str) {
    self.params.retain(|p| p.name != name);
  }
  pub fn get(&self, name: &str) -> Option<&Value> {
    self.params.iter().find(|p| p.name == name).map(|p| &p.value)
  }
  pub fn contains(&self, name: &str) -> bool {
    self.get(name).is_some()
  }
}

/// One result row with named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
  columns: Vec<(String, Value)>,
}

impl Row {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.columns.push((name.to_string(), value.into()));
    self
  }
  pub fn get(&self, name: &str) -> Option<&Value> {
    self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
  }
  pub fn has(&self, name: &str) -> bool {
    self.get(name).is_some()
  }
  /// A column that must be present.
  pub fn require(&self, name: &str) -> Result<&Value> {
    self.get(name).ok_or_else(|| Error::backend(format!("result row has no {} column", name)))
  }
  pub fn byte(&self, name: &str) -> Result<u8> {
    self.require(name)?.as_byte()
  }
  pub fn int(&self, name: &str) -> Result<i64> {
    self.require(name)?.as_int()
  }
  /// Absent and NULL columns both read as `Value::Null`.
  pub fn value(&self, name: &str) -> Value {
    self.get(name).cloned().unwrap_or(Value::Null)
  }
}

pub type RowSet = Vec<Row>;

/// Forward-only reader over a command's result.
pub trait RowCursor: Send {
  fn next_row(&mut self) -> Result<Option<Row>>;
  /// Releases the reader. Must tolerate being called more than once.
  fn close(&mut self) -> Result<()>;
}

/// Cursor over rows already in memory.
#[derive(Debug, Default)]
pub struct RowSetCursor {
  rows: VecDeque<Row>,
}

impl RowSetCursor {
  pub fn new(rows: RowSet) -> Self {
    RowSetCursor { rows: rows.into() }
  }
}

impl RowCursor for RowSetCursor {
  fn next_row(&mut self) -> Result<Option<Row>> {
    Ok(self.rows.pop_front())
  }
  fn close(&mut self) -> Result<()> {
    self.rows.clear();
    Ok(())
  }
}

/// Everything the store needs from a relational backend.
pub trait BackendPort: Send + Sync {
  /// Runs the command and opens a reader over its result.
  fn execute(&self, cmd: &Command) -> Result<Box<dyn RowCursor>>;

  /// Runs the command for its return value, `Value::Null` when it has none.
  fn execute_scalar(&self, cmd: &Command) -> Result<Value>;

  /// Runs the command and reads the whole result in one go.
  fn fill(&self, cmd: &Command) -> Result<RowSet> {
    let mut cursor = self.execute(cmd)?;
    let mut rows = RowSet::new();
    let drained = loop {
      match cursor.next_row() {
        Ok(Some(row)) => rows.push(row),
        Ok(None) => break Ok(()),
        Err(e) => break Err(e),
      }
    };
    let closed = cursor.close();
    drained?;
    closed?;
    Ok(rows)
  }

  fn new_parameter(&self, name: &str, value: Value) -> Parameter {
    Parameter { name: name.to_string(), value }
  }
}
