use {
  dashmap::DashMap,
  tracing::debug,
  crate::{
    virtualisation::id::SurrogateId,
    RdfNode,
  },
};

/* Read-through cache shared by every cursor and optimiser run on one
  provider. IDs are immutable once allocated, so entries never go stale;
  the only thing that needs purging is IDs minted by a discarded
  transaction, hence reset(). Concurrent inserts of the same ID carry the
  same term, last writer wins. */
#[derive(Debug, Default)]
pub struct IdCache {
  terms: DashMap<SurrogateId, RdfNode>,
  ids: DashMap<RdfNode, SurrogateId>,
}

impl IdCache {
  pub fn new() -> Self {
    Self::default()
  }
  /// Copy of the cached term re-homed into `graph`.
  pub fn get(&self, id: SurrogateId, graph: Option<&str>) -> Option<RdfNode> {
    let hit = self.terms.get(&id).map(|entry| entry.value().rehome(graph));
    debug!(%id, hit = hit.is_some(), "id cache lookup");
    hit
  }
  /* Blank nodes are graph-scoped so only their ID -> term side is kept */
  pub fn get_id(&self, node: &RdfNode) -> Option<SurrogateId> {
    if node.is_blank() {
      return None
    }
    self.ids.get(node).map(|entry| *entry.value())
  }
  pub fn insert(&self, id: SurrogateId, node: RdfNode) {
    if !node.is_blank() {
      self.ids.insert(node.clone(), id);
    }
    self.terms.insert(id, node);
  }
  pub fn contains(&self, id: SurrogateId) -> bool {
    self.terms.contains_key(&id)
  }
  pub fn len(&self) -> usize {
    self.terms.len()
  }
  pub fn is_empty(&self) -> bool {
    self.terms.is_empty()
  }
  pub fn reset(&self) {
    debug!(entries = self.terms.len(), "resetting id cache");
    self.terms.clear();
    self.ids.clear();
  }
}

/// Graph ID -> URI bindings, kept for the provider's lifetime.
#[derive(Debug, Default)]
pub struct GraphUriCache {
  uris: DashMap<i64, Option<String>>,
}

impl GraphUriCache {
  pub fn new() -> Self {
    Self::default()
  }
  /* Outer None is a miss, inner None is the default graph */
  pub fn get(&self, graph_id: i64) -> Option<Option<String>> {
    self.uris.get(&graph_id).map(|entry| entry.value().clone())
  }
  pub fn insert(&self, graph_id: i64, uri: Option<String>) {
    self.uris.insert(graph_id, uri);
  }
  pub fn len(&self) -> usize {
    self.uris.len()
  }
  pub fn is_empty(&self) -> bool {
    self.uris.is_empty()
  }
}
