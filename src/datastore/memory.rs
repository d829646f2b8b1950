/*
  A reference backend that keeps the node, graph and quad tables in
  memory and answers the stored-procedure contract. Used by the tests
  and benches; it also records every call and counts open readers.
*/

use {
  std::{
    collections::{HashSet, VecDeque},
    sync::{
      atomic::{AtomicUsize, Ordering},
      Arc,
    },
  },
  bimap::BiHashMap,
  parking_lot::Mutex,
  tracing::trace,
  crate::{
    datastore::{
      backend::*,
      codec::Segment,
    },
    errors::{Error, Result},
  },
};

/* Node table row. Blank nodes are keyed by their owning graph too. */
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoredTerm {
  type_byte: u8,
  value: String,
  meta: Option<String>,
  graph: Option<i64>,
}

#[derive(Debug, Default)]
struct Tables {
  graphs: BiHashMap<Option<String>, i64>,
  nodes: BiHashMap<StoredTerm, i64>,
  /* [graph, subject, predicate, object] in insertion order */
  quads: Vec<[i64; 4]>,
  next_graph: i64,
  next_node: i64,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
  tables: Mutex<Tables>,
  calls: Mutex<Vec<String>>,
  failing: Mutex<HashSet<String>>,
  fail_reads_after: Mutex<Option<usize>>,
  open_readers: Arc<AtomicUsize>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every procedure executed so far, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().clone()
  }
  pub fn count_calls(&self, procedure: &str) -> usize {
    self.calls.lock().iter().filter(|c| *c == procedure).count()
  }
  pub fn clear_calls(&self) {
    self.calls.lock().clear();
  }
  pub fn open_readers(&self) -> usize {
    self.open_readers.load(Ordering::SeqCst)
  }
  pub fn node_count(&self) -> usize {
    self.tables.lock().nodes.len()
  }
  pub fn quad_count(&self) -> usize {
    self.tables.lock().quads.len()
  }

  /// Makes every later call of `procedure` fail with a backend error.
  pub fn fail_on(&self, procedure: &str) {
    self.failing.lock().insert(procedure.to_string());
  }
  /// Readers opened from now on fail after yielding `rows` rows.
  pub fn fail_reads_after(&self, rows: Option<usize>) {
    *self.fail_reads_after.lock() = rows;
  }

  fn enter(&self, cmd: &Command) -> Result<()> {
    trace!(procedure = %cmd.procedure, "memory backend call");
    self.calls.lock().push(cmd.procedure.clone());
    if self.failing.lock().contains(&cmd.procedure) {
      return Err(Error::backend(format!("{} failed", cmd.procedure)))
    }
    Ok(())
  }

  fn rows(&self, cmd: &Command) -> Result<Option<RowSet>> {
    let tables = self.tables.lock();
    let rows = match cmd.procedure.as_str() {
      GET_GRAPH_URIS => tables.graphs.iter()
        .map(|(uri, _)| Row::new().with("graphUri", uri.clone()))
        .collect(),
      GET_NODE_DATA => {
        let id = int_param(cmd, "nodeID")?;
        tables.nodes.get_by_right(&id)
          .map(|term| vec![Row::new()
            .with("nodeType", term.type_byte)
            .with("nodeValue", term.value.as_str())
            .with("nodeMeta", term.meta.clone())])
          .unwrap_or_default()
      },
      GET_GRAPH_QUADS_DATA => {
        let graph = int_param(cmd, "graphID")?;
        let mut rows = RowSet::new();
        for quad in tables.quads.iter().filter(|q| q[0] == graph) {
          let mut row = Row::new().with("graphID", quad[0]);
          for (segment, id) in Segment::TRIPLE.iter().zip(&quad[1..]) {
            let term = tables.term(*id)?;
            row = row
              .with(&segment.column("Type"), term.type_byte)
              .with(&segment.column("Value"), term.value.as_str())
              .with(&segment.column("Meta"), term.meta.clone());
          }
          rows.push(row);
        }
        rows
      },
      GET_GRAPH_QUADS_VIRTUAL => {
        let graph = opt_int_param(cmd, "graphID")?;
        let bound = [
          opt_int_param(cmd, "subjectID")?,
          opt_int_param(cmd, "predicateID")?,
          opt_int_param(cmd, "objectID")?,
        ];
        let mut rows = RowSet::new();
        let matching = tables.quads.iter()
          .filter(|q| graph.map_or(true, |g| q[0] == g))
          .filter(|q| bound.iter().zip(&q[1..]).all(|(b, id)| b.map_or(true, |b| b == *id)));
        for quad in matching {
          let mut row = Row::new().with("graphID", quad[0]);
          for ((segment, id), fixed) in Segment::TRIPLE.iter().zip(&quad[1..]).zip(&bound) {
            /* Bound positions are not selected */
            if fixed.is_none() {
              row = row
                .with(&segment.column("Type"), tables.term(*id)?.type_byte)
                .with(&segment.column("ID"), *id);
            }
          }
          rows.push(row);
        }
        rows
      },
      _ => return Ok(None),
    };
    Ok(Some(rows))
  }

  fn scalar(&self, cmd: &Command) -> Result<Value> {
    let mut tables = self.tables.lock();
    let value = match cmd.procedure.as_str() {
      GET_GRAPH_ID => {
        let uri = opt_text_param(cmd, "graphUri")?;
        Value::Int(tables.graphs.get_by_left(&uri).copied().unwrap_or(0))
      },
      GET_OR_CREATE_GRAPH_ID => {
        let uri = opt_text_param(cmd, "graphUri")?;
        Value::Int(tables.graph_id_or_create(uri))
      },
      GET_GRAPH_URI => {
        let id = int_param(cmd, "graphID")?;
        match tables.graphs.get_by_right(&id) {
          Some(uri) => uri.clone().into(),
          None => return Err(Error::NotFound(format!("graph {}", id))),
        }
      },
      DELETE_GRAPH_BY_URI => {
        let uri = opt_text_param(cmd, "graphUri")?;
        if let Some((_, id)) = tables.graphs.remove_by_left(&uri) {
          tables.quads.retain(|q| q[0] != id);
        }
        Value::Null
      },
      CLEAR_GRAPH_FOR_OVERWRITE => {
        let id = int_param(cmd, "graphID")?;
        tables.quads.retain(|q| q[0] != id);
        Value::Null
      },
      GET_NODE_ID => {
        let term = term_param(cmd)?;
        Value::Int(tables.nodes.get_by_left(&term).copied().unwrap_or(0))
      },
      GET_OR_CREATE_NODE_ID => {
        let term = term_param(cmd)?;
        Value::Int(tables.node_id_or_create(term))
      },
      CREATE_BLANK_NODE_ID => {
        let graph = int_param(cmd, "graphID")?;
        let id = tables.next_node + 1;
        let term = StoredTerm { type_byte: 0, value: format!("_:b{}", id), meta: None, graph: Some(graph) };
        Value::Int(tables.node_id_or_create(term))
      },
      ASSERT_QUAD => {
        let quad = quad_param(cmd)?;
        let added = !tables.quads.contains(&quad);
        if added {
          tables.quads.push(quad);
        }
        Value::Int(added as i64)
      },
      RETRACT_QUAD => {
        let quad = quad_param(cmd)?;
        let before = tables.quads.len();
        tables.quads.retain(|q| *q != quad);
        Value::Int((before - tables.quads.len()) as i64)
      },
      other => return Err(Error::backend(format!("unknown procedure {}", other))),
    };
    Ok(value)
  }
}

impl Tables {
  fn term(&self, id: i64) -> Result<&StoredTerm> {
    self.nodes.get_by_right(&id).ok_or_else(|| Error::NotFound(format!("node {}", id)))
  }
  fn graph_id_or_create(&mut self, uri: Option<String>) -> i64 {
    if let Some(id) = self.graphs.get_by_left(&uri) {
      return *id
    }
    self.next_graph += 1;
    self.graphs.insert(uri, self.next_graph);
    self.next_graph
  }
  fn node_id_or_create(&mut self, term: StoredTerm) -> i64 {
    if let Some(id) = self.nodes.get_by_left(&term) {
      return *id
    }
    self.next_node += 1;
    self.nodes.insert(term, self.next_node);
    self.next_node
  }
}

impl BackendPort for MemoryBackend {
  fn execute(&self, cmd: &Command) -> Result<Box<dyn RowCursor>> {
    self.enter(cmd)?;
    let rows = match self.rows(cmd)? {
      Some(rows) => rows,
      None => vec![Row::new().with("RC", self.scalar(cmd)?)],
    };
    self.open_readers.fetch_add(1, Ordering::SeqCst);
    Ok(Box::new(MemoryCursor {
      rows: rows.into(),
      fail_after: *self.fail_reads_after.lock(),
      yielded: 0,
      open: Some(self.open_readers.clone()),
    }))
  }
  fn execute_scalar(&self, cmd: &Command) -> Result<Value> {
    self.enter(cmd)?;
    if self.rows(cmd)?.is_some() {
      return Err(Error::backend(format!("{} returns rows, not a scalar", cmd.procedure)))
    }
    self.scalar(cmd)
  }
}

/* Reader that stays counted as open until closed. Dropping it without
  closing leaks, the way a real driver connection would. */
struct MemoryCursor {
  rows: VecDeque<Row>,
  fail_after: Option<usize>,
  yielded: usize,
  open: Option<Arc<AtomicUsize>>,
}

impl RowCursor for MemoryCursor {
  fn next_row(&mut self) -> Result<Option<Row>> {
    if self.open.is_none() {
      return Err(Error::InvalidState("reader is closed".into()))
    }
    if self.fail_after.map_or(false, |limit| self.yielded >= limit) {
      return Err(Error::backend("connection lost while reading"))
    }
    self.yielded += 1;
    Ok(self.rows.pop_front())
  }
  fn close(&mut self) -> Result<()> {
    if let Some(open) = self.open.take() {
      open.fetch_sub(1, Ordering::SeqCst);
    }
    Ok(())
  }
}

/* Parameter access */

fn int_param(cmd: &Command, name: &str) -> Result<i64> {
  cmd.get(name)
    .ok_or_else(|| Error::backend(format!("{} requires {}", cmd.procedure, name)))?
    .as_int()
}
fn opt_int_param(cmd: &Command, name: &str) -> Result<Option<i64>> {
  match cmd.get(name) {
    None | Some(Value::Null) => Ok(None),
    Some(value) => value.as_int().map(Some),
  }
}
fn opt_text_param(cmd: &Command, name: &str) -> Result<Option<String>> {
  match cmd.get(name) {
    None | Some(Value::Null) => Ok(None),
    Some(value) => value.as_text().map(|s| Some(s.to_string())),
  }
}
fn term_param(cmd: &Command) -> Result<StoredTerm> {
  let type_byte = cmd.get("nodeType")
    .ok_or_else(|| Error::backend(format!("{} requires nodeType", cmd.procedure)))?
    .as_byte()?;
  let value = opt_text_param(cmd, "nodeValue")?.unwrap_or_default();
  let meta = opt_text_param(cmd, "nodeMeta")?;
  let graph = if type_byte == 0 { opt_int_param(cmd, "graphID")? } else { None };
  Ok(StoredTerm { type_byte, value, meta, graph })
}
fn quad_param(cmd: &Command) -> Result<[i64; 4]> {
  Ok([
    int_param(cmd, "graphID")?,
    int_param(cmd, "subjectID")?,
    int_param(cmd, "predicateID")?,
    int_param(cmd, "objectID")?,
  ])
}

#[cfg(test)]
mod unit_tests {
  use super::*;

  fn node_cmd(procedure: &str, value: &str) -> Command {
    Command::new(procedure).with("nodeType", 1u8).with("nodeValue", value)
  }

  #[test]
  fn node_ids_are_stable() -> Result<()> {
    let backend = MemoryBackend::new();
    let a = backend.execute_scalar(&node_cmd(GET_OR_CREATE_NODE_ID, "http://a"))?.as_int()?;
    let again = backend.execute_scalar(&node_cmd(GET_OR_CREATE_NODE_ID, "http://a"))?.as_int()?;
    assert_eq!(a, again);
    assert_eq!(backend.execute_scalar(&node_cmd(GET_NODE_ID, "http://b"))?, Value::Int(0));
    assert_eq!(backend.node_count(), 1);
    Ok(())
  }

  #[test]
  fn virtual_quads_omit_bound_columns() -> Result<()> {
    let backend = MemoryBackend::new();
    let g = backend.execute_scalar(&Command::new(GET_OR_CREATE_GRAPH_ID).with("graphUri", "http://g"))?.as_int()?;
    let ids: Vec<i64> = ["http://s", "http://p", "http://o"].iter()
      .map(|v| backend.execute_scalar(&node_cmd(GET_OR_CREATE_NODE_ID, v)).and_then(|v| v.as_int()))
      .collect::<Result<_>>()?;
    backend.execute_scalar(&Command::new(ASSERT_QUAD)
      .with("graphID", g).with("subjectID", ids[0]).with("predicateID", ids[1]).with("objectID", ids[2]))?;
    let rows = backend.fill(&Command::new(GET_GRAPH_QUADS_VIRTUAL).with("graphID", g).with("subjectID", ids[0]))?;
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].has("subjectType") && !rows[0].has("subjectID"));
    assert_eq!(rows[0].int("objectID")?, ids[2]);
    assert_eq!(backend.open_readers(), 0);
    Ok(())
  }

  #[test]
  fn readers_count_until_closed() -> Result<()> {
    let backend = MemoryBackend::new();
    let mut cursor = backend.execute(&Command::new(GET_GRAPH_URIS))?;
    assert_eq!(backend.open_readers(), 1);
    cursor.close()?;
    cursor.close()?;
    assert_eq!(backend.open_readers(), 0);
    Ok(())
  }

  #[test]
  fn injected_failures() {
    let backend = MemoryBackend::new();
    backend.fail_on(GET_GRAPH_ID);
    assert_eq!(backend.execute_scalar(&Command::new(GET_GRAPH_ID)).unwrap_err().code(), "BACKEND");
    assert_eq!(backend.calls(), vec![GET_GRAPH_ID.to_string()]);
  }

  #[test]
  fn blank_nodes_are_scoped_to_their_graph() -> Result<()> {
    let backend = MemoryBackend::new();
    let b1 = backend.execute_scalar(&Command::new(CREATE_BLANK_NODE_ID).with("graphID", 1i64))?.as_int()?;
    let b2 = backend.execute_scalar(&Command::new(CREATE_BLANK_NODE_ID).with("graphID", 1i64))?.as_int()?;
    assert_ne!(b1, b2);
    let lookup = |graph: i64| backend.execute_scalar(&Command::new(GET_NODE_ID)
      .with("nodeType", 0u8).with("nodeValue", format!("_:b{}", b1)).with("graphID", graph));
    assert_eq!(lookup(1)?, Value::Int(b1));
    assert_eq!(lookup(2)?, Value::Int(0));
    Ok(())
  }
}
