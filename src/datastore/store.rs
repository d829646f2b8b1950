use {
  std::sync::{Arc, Weak},
  tracing::{debug, info},
  crate::{
    config::StoreConfig,
    datastore::{
      backend::*,
      codec::{decode_meta, decode_node, encode_node, encode_node_id, Segment},
      cursor::{RowDecoding, TripleCursor},
    },
    errors::{Error, Result},
    rdf::{
      graph::{Graph, Triple},
      node::Node,
    },
    update::manager::{Capabilities, IoBehaviour, StorageManager},
    virtualisation::{
      cache::{GraphUriCache, IdCache},
      id::{GraphKey, SurrogateId},
      provider::{resolve_id, VirtualRdfProvider},
      write_cache::WriteCache,
    },
    NodeKind, RdfNode,
  },
};

/// Which graphs a quad lookup ranges over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphScope {
  All,
  Graph(Option<String>),
}

/// RDF store over a relational backend speaking the stored-procedure
/// contract in `datastore::backend`.
///
/// Acts as the `VirtualRdfProvider` for every node it hands out, so nodes
/// loaded through `load_graph_virtual` or `quads` compare by ID. Always
/// lives behind an `Arc`.
pub struct AdoStore {
  backend: Arc<dyn BackendPort>,
  config: StoreConfig,
  ids: IdCache,
  graph_uris: GraphUriCache,
  this: Weak<AdoStore>,
}

impl AdoStore {
  pub fn new(backend: Arc<dyn BackendPort>, config: StoreConfig) -> Arc<Self> {
    Arc::new_cyclic(|this| AdoStore {
      backend,
      config,
      ids: IdCache::new(),
      graph_uris: GraphUriCache::new(),
      this: this.clone(),
    })
  }

  pub fn config(&self) -> &StoreConfig {
    &self.config
  }
  pub fn id_cache(&self) -> &IdCache {
    &self.ids
  }
  pub fn backend(&self) -> &Arc<dyn BackendPort> {
    &self.backend
  }

  fn provider(&self) -> Result<Arc<dyn VirtualRdfProvider>> {
    match self.this.upgrade() {
      Some(this) => Ok(this),
      None => Err(Error::InvalidState("store is being dropped".into())),
    }
  }

  fn scalar_id(&self, cmd: &Command) -> Result<i64> {
    match self.backend.execute_scalar(cmd)? {
      Value::Null => Ok(0),
      value => value.as_int(),
    }
  }

  /* Graphs */

  fn graph_id(&self, graph_uri: Option<&str>, create_if_absent: bool) -> Result<i64> {
    let procedure = if create_if_absent { GET_OR_CREATE_GRAPH_ID } else { GET_GRAPH_ID };
    let mut cmd = Command::new(procedure);
    if let Some(uri) = graph_uri {
      cmd.set("graphUri", uri);
    }
    self.scalar_id(&cmd)
  }

  fn required_graph_id(&self, graph_uri: Option<&str>) -> Result<i64> {
    let id = self.graph_id(graph_uri, true)?;
    if id <= 0 {
      return Err(Error::backend(format!("backend returned no graph ID for {}", graph_uri.unwrap_or("the default graph"))))
    }
    Ok(id)
  }

  /* Nodes */

  fn node_id(&self, node: &RdfNode, create_if_absent: bool) -> Result<i64> {
    let procedure = if create_if_absent { GET_OR_CREATE_NODE_ID } else { GET_NODE_ID };
    let mut cmd = Command::new(procedure);
    encode_node(&mut cmd, node, Segment::Node);
    self.scalar_id(&cmd)
  }

  /* Blank nodes are looked up by label within their graph and only
    minted when that fails. */
  fn blank_node_id(&self, node: &RdfNode, graph_id: i64, create_if_absent: bool) -> Result<i64> {
    let mut cmd = Command::new(GET_NODE_ID).with("graphID", graph_id);
    encode_node(&mut cmd, node, Segment::Node);
    let id = self.scalar_id(&cmd)?;
    if id > 0 || !create_if_absent {
      return Ok(id)
    }
    self.scalar_id(&Command::new(CREATE_BLANK_NODE_ID).with("graphID", graph_id))
  }

  /// ID of `node` for a write into `graph_id`, through the batch cache.
  /// `Ok(None)` when the node is absent and `create_if_absent` is false.
  fn write_id(&self, node: &Node, graph_id: i64, cache: &mut WriteCache, create_if_absent: bool) -> Result<Option<i64>> {
    if let Node::Virtual(virt) = node {
      if virt.kind() != NodeKind::Blank && self.is_issuer_of(virt.provider()) {
        return Ok(Some(virt.id().key()))
      }
    }
    let value = node.value()?;
    let mut handle = cache.get_or_new(value);
    if handle.is_assigned() {
      return Ok(Some(handle.id()))
    }
    let id = if value.is_blank() {
      self.blank_node_id(value, graph_id, create_if_absent)?
    }
    else {
      self.node_id(value, create_if_absent)?
    };
    if id <= 0 {
      if create_if_absent {
        return Err(Error::backend(format!("backend returned no ID for {}", value)))
      }
      return Ok(None)
    }
    handle.assign(id)?;
    cache.commit(handle)?;
    Ok(Some(id))
  }

  fn is_issuer_of(&self, provider: &Arc<dyn VirtualRdfProvider>) -> bool {
    std::ptr::eq(Arc::as_ptr(provider) as *const (), self as *const AdoStore as *const ())
  }

  /// Issues `procedure` for one triple. Returns false, without calling the
  /// backend, when a node has no ID and none may be created.
  fn write_quad(&self, procedure: &str, graph_id: i64, triple: &Triple, cache: &mut WriteCache, create_if_absent: bool) -> Result<bool> {
    let mut cmd = Command::new(procedure).with("graphID", graph_id);
    for (node, segment) in triple.nodes().into_iter().zip(Segment::TRIPLE) {
      match self.write_id(node, graph_id, cache, create_if_absent)? {
        Some(id) => encode_node_id(&mut cmd, id, segment),
        None => return Ok(false),
      }
    }
    self.backend.execute_scalar(&cmd)?;
    Ok(true)
  }

  /* Only after the batch succeeded, so IDs of a failed write never reach readers */
  fn publish(&self, cache: WriteCache) {
    if !self.config.cache_written_ids {
      return
    }
    for handle in cache.into_assigned().filter(|h| !h.node().is_blank()) {
      self.ids.insert(SurrogateId::new(handle.node().kind(), handle.id()), handle.node().clone());
    }
  }

  /* Reading */

  fn cursor(&self, decoding: RowDecoding, command: Command, fixed: [Option<Node>; 3]) -> Result<TripleCursor> {
    Ok(TripleCursor::new(self.backend.clone(), self.provider()?, self.config.access_mode, decoding, command, fixed))
  }

  fn load_into(&self, graph_uri: Option<&str>, procedure: &str, decoding: RowDecoding) -> Result<Graph> {
    let mut graph = Graph::new(graph_uri);
    let graph_id = self.graph_id(graph_uri, false)?;
    if graph_id <= 0 {
      debug!(graph = ?graph_uri, "graph not in store, loading nothing");
      return Ok(graph)
    }
    let cursor = self.cursor(decoding, Command::new(procedure).with("graphID", graph_id), [None, None, None])?;
    graph.try_assert_all(cursor.map(|quad| quad.map(|q| q.triple)))?;
    Ok(graph)
  }

  /// Loads a graph with every node materialised from the backend.
  pub fn load_graph_values(&self, graph_uri: Option<&str>) -> Result<Graph> {
    self.load_into(graph_uri, GET_GRAPH_QUADS_DATA, RowDecoding::Values)
  }

  /// Loads a graph of virtual nodes, values are fetched only when read.
  pub fn load_graph_virtual(&self, graph_uri: Option<&str>) -> Result<Graph> {
    self.load_into(graph_uri, GET_GRAPH_QUADS_VIRTUAL, RowDecoding::Virtual)
  }

  /// Lazily matches quads against the given fixed positions. A fixed node
  /// the store has never seen cannot match, so no query is issued for it.
  pub fn quads(&self, scope: GraphScope, fixed: [Option<Node>; 3]) -> Result<TripleCursor> {
    let provider = self.provider()?;
    let empty = || TripleCursor::empty(self.backend.clone(), provider.clone(), self.config.access_mode);
    let mut cmd = Command::new(GET_GRAPH_QUADS_VIRTUAL);
    if let GraphScope::Graph(uri) = &scope {
      let graph_id = self.graph_id(uri.as_deref(), false)?;
      if graph_id <= 0 {
        return Ok(empty())
      }
      cmd.set("graphID", graph_id);
    }
    for (node, segment) in fixed.iter().zip(Segment::TRIPLE) {
      if let Some(node) = node {
        let id = resolve_id(&provider, node, false)?;
        if !id.is_assigned() {
          return Ok(empty())
        }
        encode_node_id(&mut cmd, id.key(), segment);
      }
    }
    self.cursor(RowDecoding::Virtual, cmd, fixed)
  }
}

impl std::fmt::Debug for AdoStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AdoStore")
      .field("config", &self.config)
      .field("cached_ids", &self.ids.len())
      .field("cached_graphs", &self.graph_uris.len())
      .finish()
  }
}

impl VirtualRdfProvider for AdoStore {
  fn get_term(&self, graph: Option<&str>, id: SurrogateId) -> Result<RdfNode> {
    if let Some(node) = self.ids.get(id, graph) {
      return Ok(node)
    }
    let rows = self.backend.fill(&Command::new(GET_NODE_DATA).with("nodeID", id.key()))?;
    let row = rows.first().ok_or_else(|| Error::NotFound(format!("no node with ID {}", id)))?;
    let meta = decode_meta(&row.value("nodeMeta"))?;
    let node = decode_node(row.byte("nodeType")?, row.require("nodeValue")?.as_text()?, meta.as_deref(), graph)?;
    if node.kind() != id.kind() {
      return Err(Error::WrongKind{ expected: id.kind().name(), actual: node.kind().name() })
    }
    self.ids.insert(id, node.clone());
    Ok(node)
  }

  fn get_id(&self, node: &RdfNode, create_if_absent: bool) -> Result<SurrogateId> {
    if node.is_blank() {
      return Err(Error::Unsupported("blank nodes are graph scoped, use get_blank_node_id".into()))
    }
    if let Some(id) = self.ids.get_id(node) {
      return Ok(id)
    }
    let key = self.node_id(node, create_if_absent)?;
    if key <= 0 {
      return Ok(self.null_id())
    }
    let id = SurrogateId::new(node.kind(), key);
    self.ids.insert(id, node.clone());
    Ok(id)
  }

  fn get_blank_node_id(&self, node: &RdfNode, create_if_absent: bool) -> Result<SurrogateId> {
    let graph = match node {
      RdfNode::Blank{ graph, .. } => graph.as_deref(),
      _ => return self.get_id(node, create_if_absent),
    };
    let graph_id = self.graph_id(graph, create_if_absent)?;
    if graph_id <= 0 {
      return Ok(self.null_id())
    }
    let key = self.blank_node_id(node, graph_id, create_if_absent)?;
    if key <= 0 {
      return Ok(self.null_id())
    }
    let id = SurrogateId::new(node.kind(), key);
    self.ids.insert(id, node.clone());
    Ok(id)
  }

  fn get_graph_id(&self, graph_uri: Option<&str>, create_if_absent: bool) -> Result<GraphKey> {
    Ok(GraphKey {
      graph_id: self.graph_id(graph_uri, create_if_absent)?,
      graph_uri: graph_uri.map(str::to_string),
    })
  }

  fn get_graph_uri(&self, graph_id: i64) -> Result<Option<String>> {
    if let Some(uri) = self.graph_uris.get(graph_id) {
      return Ok(uri)
    }
    let uri = decode_meta(&self.backend.execute_scalar(&Command::new(GET_GRAPH_URI).with("graphID", graph_id))?)?;
    self.graph_uris.insert(graph_id, uri.clone());
    Ok(uri)
  }
}

impl StorageManager for AdoStore {
  fn capabilities(&self) -> Capabilities {
    Capabilities {
      supports_native_update: false,
      supports_delete_graph: true,
      supports_list_graphs: true,
      supports_triple_update: true,
      supports_query: false,
      read_only: false,
      io_behaviour: IoBehaviour::GRAPH_STORE
        | IoBehaviour::CAN_UPDATE_ADD_TRIPLES
        | IoBehaviour::CAN_UPDATE_DELETE_TRIPLES,
    }
  }

  fn load_graph(&self, graph_uri: Option<&str>) -> Result<Graph> {
    self.load_graph_values(graph_uri)
  }

  fn save_graph(&self, graph: &Graph) -> Result<()> {
    let graph_id = self.required_graph_id(graph.base_uri())?;
    self.backend.execute_scalar(&Command::new(CLEAR_GRAPH_FOR_OVERWRITE).with("graphID", graph_id))?;
    let mut cache = WriteCache::new();
    for triple in graph {
      self.write_quad(ASSERT_QUAD, graph_id, triple, &mut cache, true)?;
    }
    info!(graph = ?graph.base_uri(), triples = graph.len(), distinct_nodes = cache.len(), "saved graph");
    self.publish(cache);
    Ok(())
  }

  fn update_graph(&self, graph_uri: Option<&str>, additions: &[Triple], removals: &[Triple]) -> Result<()> {
    let graph_id = self.required_graph_id(graph_uri)?;
    let mut cache = WriteCache::new();
    /* Retractions complete before any assertion is issued */
    for triple in removals {
      let triple = triple.rehome(graph_uri);
      self.write_quad(RETRACT_QUAD, graph_id, &triple, &mut cache, false)?;
    }
    for triple in additions {
      let triple = triple.rehome(graph_uri);
      self.write_quad(ASSERT_QUAD, graph_id, &triple, &mut cache, true)?;
    }
    debug!(graph = ?graph_uri, added = additions.len(), removed = removals.len(), "updated graph");
    self.publish(cache);
    Ok(())
  }

  fn delete_graph(&self, graph_uri: Option<&str>) -> Result<()> {
    let mut cmd = Command::new(DELETE_GRAPH_BY_URI);
    if let Some(uri) = graph_uri {
      cmd.set("graphUri", uri);
    }
    self.backend.execute_scalar(&cmd)?;
    Ok(())
  }

  fn list_graphs(&self) -> Result<Vec<Option<String>>> {
    self.backend.fill(&Command::new(GET_GRAPH_URIS))?
      .iter()
      .map(|row| decode_meta(&row.value("graphUri")))
      .collect()
  }

  fn flush(&self) -> Result<()> {
    Ok(())
  }

  /* IDs minted by the abandoned work must not outlive it */
  fn discard(&self) -> Result<()> {
    self.ids.reset();
    Ok(())
  }
}

#[cfg(test)]
mod interface_tests {
  use {
    super::*,
    crate::datastore::memory::MemoryBackend,
    proptest::prelude::*,
  };

  fn store() -> (Arc<MemoryBackend>, Arc<AdoStore>) {
    let backend = Arc::new(MemoryBackend::new());
    let store = AdoStore::new(backend.clone(), StoreConfig::default());
    (backend, store)
  }

  fn t(s: &str, p: &str, o: RdfNode) -> Triple {
    Triple::new(RdfNode::named(s), RdfNode::named(p), o)
  }

  fn graph(uri: &str, triples: Vec<Triple>) -> Graph {
    let mut g = Graph::new(Some(uri));
    g.assert_all(triples);
    g
  }

  #[test]
  fn save_allocates_each_distinct_node_once() -> Result<()> {
    let (backend, store) = store();
    let g = graph("http://g", vec![
      t("http://a", "http://b", RdfNode::named("http://c")),
      t("http://a", "http://b", RdfNode::named("http://d")),
    ]);
    store.save_graph(&g)?;
    /* a, b, c, d */
    assert_eq!(backend.count_calls(GET_OR_CREATE_NODE_ID), 4);
    assert_eq!(backend.count_calls(ASSERT_QUAD), 2);

    backend.clear_calls();
    let g = graph("http://h", vec![
      t("http://a", "http://b", RdfNode::named("http://c")),
      Triple::new(RdfNode::named("http://c"), RdfNode::named("http://b"), RdfNode::named("http://a")),
    ]);
    store.save_graph(&g)?;
    assert_eq!(backend.count_calls(GET_OR_CREATE_NODE_ID), 3);
    Ok(())
  }

  #[test]
  fn save_overwrites_and_loads_back() -> Result<()> {
    let (backend, store) = store();
    store.save_graph(&graph("http://g", vec![t("http://a", "http://p", RdfNode::literal("old"))]))?;
    let fresh = graph("http://g", vec![
      t("http://a", "http://p", RdfNode::lang_literal("neu", "de")),
      Triple::new(RdfNode::blank("x"), RdfNode::named("http://p"), RdfNode::typed_literal("1", "http://dt")),
    ]);
    store.save_graph(&fresh)?;
    assert_eq!(backend.quad_count(), 2);
    let values = store.load_graph_values(Some("http://g"))?;
    assert_eq!(values.len(), 2);
    assert!(values.contains(&t("http://a", "http://p", RdfNode::lang_literal("neu", "de"))));
    let virtuals = store.load_graph_virtual(Some("http://g"))?;
    assert!(virtuals.iter().all(|t| t.subject.is_virtual()));
    assert_eq!(backend.open_readers(), 0);
    Ok(())
  }

  #[test]
  fn missing_graphs_load_empty() -> Result<()> {
    let (backend, store) = store();
    assert!(store.load_graph(Some("http://nowhere"))?.is_empty());
    assert!(store.load_graph_virtual(Some("http://nowhere"))?.is_empty());
    assert_eq!(backend.count_calls(GET_GRAPH_QUADS_DATA) + backend.count_calls(GET_GRAPH_QUADS_VIRTUAL), 0);
    Ok(())
  }

  #[test]
  fn update_retracts_before_asserting() -> Result<()> {
    let (backend, store) = store();
    let c = t("http://a", "http://b", RdfNode::named("http://c"));
    let e = t("http://a", "http://b", RdfNode::named("http://e"));
    store.save_graph(&graph("http://g", vec![c.clone()]))?;
    backend.clear_calls();
    store.update_graph(Some("http://g"), &[e.clone()], &[c.clone()])?;
    let writes: Vec<String> = backend.calls().into_iter().filter(|c| c == ASSERT_QUAD || c == RETRACT_QUAD).collect();
    assert_eq!(writes, vec![RETRACT_QUAD.to_string(), ASSERT_QUAD.to_string()]);
    let loaded = store.load_graph(Some("http://g"))?;
    assert!(loaded.contains(&e) && !loaded.contains(&c));
    Ok(())
  }

  #[test]
  fn retracting_unknown_nodes_allocates_nothing() -> Result<()> {
    let (backend, store) = store();
    store.update_graph(Some("http://g"), &[], &[t("http://x", "http://y", RdfNode::literal("z"))])?;
    assert_eq!(backend.node_count(), 0);
    assert_eq!(backend.count_calls(RETRACT_QUAD), 0);
    Ok(())
  }

  #[test]
  fn virtual_nodes_round_trip_without_reallocation() -> Result<()> {
    let (backend, store) = store();
    store.save_graph(&graph("http://g", vec![t("http://a", "http://p", RdfNode::literal("v"))]))?;
    let mut copy = store.load_graph_virtual(Some("http://g"))?;
    copy.set_base_uri(Some("http://copy"));
    backend.clear_calls();
    store.save_graph(&copy)?;
    assert_eq!(backend.count_calls(GET_OR_CREATE_NODE_ID), 0);
    assert_eq!(backend.count_calls(GET_NODE_DATA), 0);
    Ok(())
  }

  #[test]
  fn unknown_fixed_terms_short_circuit_quads() -> Result<()> {
    let (backend, store) = store();
    store.save_graph(&graph("http://g", vec![t("http://a", "http://p", RdfNode::literal("v"))]))?;
    backend.clear_calls();
    let none = store.quads(GraphScope::All, [Some(RdfNode::named("http://zzz").into()), None, None])?;
    assert_eq!(none.count(), 0);
    assert_eq!(backend.count_calls(GET_GRAPH_QUADS_VIRTUAL), 0);
    let some: Vec<_> = store.quads(GraphScope::Graph(Some("http://g".into())), [Some(RdfNode::named("http://a").into()), None, None])?
      .collect::<Result<_>>()?;
    assert_eq!(some.len(), 1);
    assert_eq!(some[0].triple.object.value()?, &RdfNode::literal("v"));
    Ok(())
  }

  #[test]
  fn graph_uris_are_cached() -> Result<()> {
    let (backend, store) = store();
    let key = store.get_graph_id(Some("http://g"), true)?;
    assert!(key.exists());
    assert_eq!(store.get_graph_uri(key.graph_id)?, Some("http://g".into()));
    assert_eq!(store.get_graph_uri(key.graph_id)?, Some("http://g".into()));
    assert_eq!(backend.count_calls(GET_GRAPH_URI), 1);
    assert!(!store.get_graph_id(Some("http://none"), false)?.exists());
    Ok(())
  }

  #[test]
  fn blank_node_ids_are_graph_scoped() -> Result<()> {
    let (_, store) = store();
    let blank = RdfNode::blank("b").rehome(Some("http://g"));
    assert_eq!(store.get_id(&blank, true).unwrap_err().code(), "UNSUPPORTED");
    assert_eq!(store.get_blank_node_id(&blank, false)?, SurrogateId::NULL);
    let id = store.get_blank_node_id(&blank, true)?;
    assert_eq!(id.kind(), NodeKind::Blank);
    assert!(id.is_assigned());
    Ok(())
  }

  #[test]
  fn discard_resets_the_read_cache() -> Result<()> {
    let (_, store) = store();
    store.get_id(&RdfNode::named("http://a"), true)?;
    assert!(!store.id_cache().is_empty());
    store.discard()?;
    assert!(store.id_cache().is_empty());
    Ok(())
  }

  #[test]
  fn written_ids_are_published_only_when_configured() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let config = StoreConfig { cache_written_ids: true, ..StoreConfig::default() };
    let publishing = AdoStore::new(backend, config);
    publishing.save_graph(&graph("http://g", vec![t("http://a", "http://p", RdfNode::literal("v"))]))?;
    assert_eq!(publishing.id_cache().len(), 3);
    let (_, plain) = store();
    plain.save_graph(&graph("http://g", vec![t("http://a", "http://p", RdfNode::literal("v"))]))?;
    assert!(plain.id_cache().is_empty());
    Ok(())
  }

  #[test]
  fn list_and_delete_graphs() -> Result<()> {
    let (_, store) = store();
    store.save_graph(&graph("http://g1", vec![t("http://a", "http://p", RdfNode::literal("1"))]))?;
    store.save_graph(&graph("http://g2", vec![t("http://a", "http://p", RdfNode::literal("2"))]))?;
    let mut graphs = store.list_graphs()?;
    graphs.sort();
    assert_eq!(graphs, vec![Some("http://g1".to_string()), Some("http://g2".to_string())]);
    store.delete_graph(Some("http://g1"))?;
    assert_eq!(store.list_graphs()?, vec![Some("http://g2".to_string())]);
    assert!(store.load_graph(Some("http://g1"))?.is_empty());
    Ok(())
  }

  #[test]
  fn unknown_ids_are_not_found() {
    let (_, store) = store();
    let err = store.get_term(None, SurrogateId::new(NodeKind::Uri, 99)).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
  }

  fn arb_node() -> impl Strategy<Value = RdfNode> {
    prop_oneof![
      "[a-z]{1,8}".prop_map(|s| RdfNode::named(format!("http://example.org/{}", s))),
      ".{0,12}".prop_map(RdfNode::literal),
      ("[a-z]{0,6}", "[a-z]{2}").prop_map(|(v, l)| RdfNode::lang_literal(v, l)),
      ("[0-9]{1,4}", "[a-z]{1,6}").prop_map(|(v, d)| RdfNode::typed_literal(v, format!("http://dt/{}", d))),
    ]
  }

  proptest! {
    #[test]
    fn ids_are_stable_and_materialise_back(node in arb_node()) {
      let (_, store) = store();
      let first = store.get_id(&node, true).unwrap();
      let second = store.get_id(&node, true).unwrap();
      prop_assert_eq!(first, second);
      store.discard().unwrap();
      prop_assert_eq!(store.get_id(&node, true).unwrap(), first);
      prop_assert_eq!(store.get_term(None, first).unwrap(), node);
    }
  }
}
