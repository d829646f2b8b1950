use {
  std::sync::Arc,
  crate::{
    errors::Result,
    rdf::node::Node,
    virtualisation::id::{GraphKey, SurrogateId},
    RdfNode,
  },
};

/// What a backend must offer for terms to be swapped for surrogate IDs.
///
/// Every method may be called from several threads at once.
pub trait VirtualRdfProvider: Send + Sync + std::fmt::Debug {
  /// Materialise `id`, with blank nodes owned by `graph`.
  /// Fails with `NotFound` when the backend has no such ID.
  fn get_term(&self, graph: Option<&str>, id: SurrogateId) -> Result<RdfNode>;

  /// Blank nodes are rejected with `Unsupported`, use `get_blank_node_id`.
  /// Returns `null_id()` when absent and `create_if_absent` is false.
  fn get_id(&self, node: &RdfNode, create_if_absent: bool) -> Result<SurrogateId>;

  /// Resolves within the blank node's owning graph.
  fn get_blank_node_id(&self, node: &RdfNode, create_if_absent: bool) -> Result<SurrogateId>;

  fn get_graph_id(&self, graph_uri: Option<&str>, create_if_absent: bool) -> Result<GraphKey>;

  /// `None` is the default graph.
  fn get_graph_uri(&self, graph_id: i64) -> Result<Option<String>>;

  fn null_id(&self) -> SurrogateId {
    SurrogateId::NULL
  }
}

/// Identity comparison of two providers, ignoring vtables.
pub fn same_provider(a: &Arc<dyn VirtualRdfProvider>, b: &Arc<dyn VirtualRdfProvider>) -> bool {
  std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Resolve a node that may already be virtual, the way the optimiser and
/// the write path both need it.
pub fn resolve_id(provider: &Arc<dyn VirtualRdfProvider>, node: &Node, create_if_absent: bool) -> Result<SurrogateId> {
  if let Some(id) = node.virtual_id_for(provider) {
    return Ok(id)
  }
  let value = node.value()?;
  if value.is_blank() {
    provider.get_blank_node_id(value, create_if_absent)
  }
  else {
    provider.get_id(value, create_if_absent)
  }
}

/* Table-backed provider for unit tests across the crate */
