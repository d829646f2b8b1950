use {
  std::{collections::{HashMap, VecDeque}, sync::Arc},
  serde::{Deserialize, Serialize},
  tracing::{debug, warn},
  crate::{
    datastore::{
      backend::{BackendPort, Command, Row, RowCursor},
      codec::{decode_meta, decode_node, decode_virtual_node, Segment},
    },
    errors::{Error, Result},
    rdf::{
      graph::{GraphName, Quad, Triple},
      node::Node,
    },
    virtualisation::provider::VirtualRdfProvider,
  },
};

/// How result rows are pulled from the backend. Purely a performance
/// choice, both modes decode the same triples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
  /// Hold a forward-only reader open and decode row by row.
  #[default]
  Streaming,
  /// Read the whole result up front, then decode from memory.
  Batched,
}

/// How the non-fixed positions of a row are turned into nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDecoding {
  /// `<pos>Type` + `<pos>ID` columns become virtual nodes.
  Virtual,
  /// `<pos>Type` + `<pos>Value` + `<pos>Meta` columns become concrete nodes.
  Values,
}

/* One shared name per graph so every triple of a graph carries the same
  graph instance. Lives as long as the cursor. */
#[derive(Debug)]
pub struct GraphFactory {
  provider: Arc<dyn VirtualRdfProvider>,
  by_id: HashMap<i64, GraphName>,
  by_uri: HashMap<Option<String>, GraphName>,
}

impl GraphFactory {
  pub fn new(provider: Arc<dyn VirtualRdfProvider>) -> Self {
    GraphFactory { provider, by_id: HashMap::new(), by_uri: HashMap::new() }
  }
  pub fn graph(&mut self, graph_id: i64) -> Result<GraphName> {
    if let Some(name) = self.by_id.get(&graph_id) {
      return Ok(name.clone())
    }
    let uri = self.provider.get_graph_uri(graph_id)?;
    let name = self.by_uri.entry(uri)
      .or_insert_with_key(|uri| uri.as_deref().map(Arc::from))
      .clone();
    self.by_id.insert(graph_id, name.clone());
    Ok(name)
  }
}

enum Source {
  Pending(Command),
  Streaming(Box<dyn RowCursor>),
  Batched(VecDeque<Row>),
  Done,
}

/// Lazy, single-pass sequence of quads decoded from backend rows.
///
/// The backend command runs on the first pull. Positions the caller
/// supplied as fixed terms are never decoded; the backend is not expected
/// to return their columns. The reader is closed on exhaustion, on error,
/// on `close()` and on drop, whichever comes first.
pub struct TripleCursor {
  backend: Arc<dyn BackendPort>,
  provider: Arc<dyn VirtualRdfProvider>,
  mode: AccessMode,
  decoding: RowDecoding,
  fixed: [Option<Node>; 3],
  graphs: GraphFactory,
  source: Source,
}

impl TripleCursor {
  pub fn new(
    backend: Arc<dyn BackendPort>,
    provider: Arc<dyn VirtualRdfProvider>,
    mode: AccessMode,
    decoding: RowDecoding,
    command: Command,
    fixed: [Option<Node>; 3],
  ) -> Self {
    TripleCursor {
      backend,
      graphs: GraphFactory::new(provider.clone()),
      provider,
      mode,
      decoding,
      fixed,
      source: Source::Pending(command),
    }
  }
  /// A cursor known to yield nothing, e.g. because a fixed term is not in the store.
  pub fn empty(backend: Arc<dyn BackendPort>, provider: Arc<dyn VirtualRdfProvider>, mode: AccessMode) -> Self {
    TripleCursor {
      backend,
      graphs: GraphFactory::new(provider.clone()),
      provider,
      mode,
      decoding: RowDecoding::Virtual,
      fixed: [None, None, None],
      source: Source::Done,
    }
  }

  pub fn mode(&self) -> AccessMode {
    self.mode
  }

  /// Cursors cannot be rewound, re-issue the query instead.
  pub fn reset(&mut self) -> Result<()> {
    Err(Error::Unsupported("triple cursors are forward-only, re-run the query to iterate again".into()))
  }

  pub fn close(&mut self) -> Result<()> {
    match std::mem::replace(&mut self.source, Source::Done) {
      Source::Streaming(mut reader) => {
        debug!("closing streaming reader");
        reader.close()
      },
      _ => Ok(()),
    }
  }

  fn open(&mut self, command: Command) -> Result<()> {
    debug!(procedure = %command.procedure, mode = ?self.mode, "opening triple cursor");
    self.source = match self.mode {
      AccessMode::Streaming => Source::Streaming(self.backend.execute(&command)?),
      AccessMode::Batched => Source::Batched(self.backend.fill(&command)?.into()),
    };
    Ok(())
  }

  fn next_row(&mut self) -> Result<Option<Row>> {
    if let Source::Pending(_) = self.source {
      if let Source::Pending(command) = std::mem::replace(&mut self.source, Source::Done) {
        self.open(command)?;
      }
    }
    match &mut self.source {
      Source::Streaming(reader) => reader.next_row(),
      Source::Batched(rows) => Ok(rows.pop_front()),
      _ => Ok(None),
    }
  }

  fn decode(&mut self, row: &Row) -> Result<Quad> {
    let graph = self.graphs.graph(row.int("graphID")?)?;
    let [s, p, o] = Segment::TRIPLE;
    Ok(Quad {
      triple: Triple {
        subject: self.decode_position(row, s, 0, graph.as_deref())?,
        predicate: self.decode_position(row, p, 1, graph.as_deref())?,
        object: self.decode_position(row, o, 2, graph.as_deref())?,
      },
      graph,
    })
  }

  fn decode_position(&self, row: &Row, segment: Segment, index: usize, graph: Option<&str>) -> Result<Node> {
    if let Some(fixed) = &self.fixed[index] {
      return Ok(fixed.rehome(graph))
    }
    let type_byte = row.byte(&segment.column("Type"))?;
    Ok(match self.decoding {
      RowDecoding::Virtual => {
        let id = row.int(&segment.column("ID"))?;
        Node::Virtual(decode_virtual_node(type_byte, id, &self.provider, graph)?)
      },
      RowDecoding::Values => {
        let value = row.require(&segment.column("Value"))?.as_text()?;
        let meta = decode_meta(&row.value(&segment.column("Meta")))?;
        Node::Concrete(decode_node(type_byte, value, meta.as_deref(), graph)?)
      },
    })
  }

  fn pull(&mut self) -> Result<Option<Quad>> {
    match self.next_row()? {
      Some(row) => self.decode(&row).map(Some),
      None => Ok(None),
    }
  }

  fn close_quietly(&mut self) {
    if let Err(e) = self.close() {
      warn!(error = %e, "failed to close backend reader");
    }
  }
}

impl Iterator for TripleCursor {
  type Item = Result<Quad>;
  fn next(&mut self) -> Option<Self::Item> {
    match self.pull() {
      Ok(Some(quad)) => Some(Ok(quad)),
      Ok(None) => {
        self.close_quietly();
        None
      },
      Err(e) => {
        self.close_quietly();
        Some(Err(e))
      },
    }
  }
}

impl Drop for TripleCursor {
  fn drop(&mut self) {
    self.close_quietly();
  }
}

impl std::fmt::Debug for TripleCursor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = match self.source {
      Source::Pending(_) => "pending",
      Source::Streaming(_) => "streaming",
      Source::Batched(_) => "batched",
      Source::Done => "done",
    };
    f.debug_struct("TripleCursor")
      .field("mode", &self.mode)
      .field("decoding", &self.decoding)
      .field("state", &state)
      .finish()
  }
}
