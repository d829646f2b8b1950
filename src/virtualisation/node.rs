use {
  std::{cmp::Ordering, sync::{Arc, OnceLock}},
  tracing::debug,
  crate::{
    errors::{Error, Result},
    virtualisation::{
      id::SurrogateId,
      provider::{same_provider, VirtualRdfProvider},
    },
    NodeKind, RdfNode,
  },
};

/// A node standing in for a backend term by its surrogate ID.
///
/// The value is fetched from the provider the first time it is needed and
/// then kept for the lifetime of this node (clones share nothing, each clone
/// carries whatever had been materialised when it was made). Two virtual
/// nodes from the same provider are compared by ID alone.
#[derive(Clone)]
pub struct VirtualNode {
  kind: NodeKind,
  id: SurrogateId,
  provider: Arc<dyn VirtualRdfProvider>,
  graph: Option<String>,
  value: OnceLock<RdfNode>,
}

impl VirtualNode {
  pub fn new(id: SurrogateId, provider: Arc<dyn VirtualRdfProvider>, graph: Option<&str>) -> Self {
    VirtualNode {
      kind: id.kind(),
      id,
      provider,
      graph: graph.map(str::to_string),
      value: OnceLock::new(),
    }
  }
  /// Pre-materialised node, the value must be of the ID's kind.
  pub fn with_value(id: SurrogateId, provider: Arc<dyn VirtualRdfProvider>, graph: Option<&str>, value: RdfNode) -> Result<Self> {
    check_kind(id.kind(), &value)?;
    let node = Self::new(id, provider, graph);
    let _ = node.value.set(value.rehome(graph));
    Ok(node)
  }

  pub fn kind(&self) -> NodeKind {
    self.kind
  }
  pub fn id(&self) -> SurrogateId {
    self.id
  }
  pub fn provider(&self) -> &Arc<dyn VirtualRdfProvider> {
    &self.provider
  }
  pub fn graph(&self) -> Option<&str> {
    self.graph.as_deref()
  }
  pub fn is_materialised(&self) -> bool {
    self.value.get().is_some()
  }
  pub fn is_from(&self, provider: &Arc<dyn VirtualRdfProvider>) -> bool {
    same_provider(&self.provider, provider)
  }

  pub fn materialise(&self) -> Result<&RdfNode> {
    if let Some(value) = self.value.get() {
      return Ok(value)
    }
    debug!(id = %self.id, "materialising virtual node");
    let value = self.provider.get_term(self.graph(), self.id)?;
    check_kind(self.kind, &value)?;
    /* A racing materialisation computed the same value, keep whichever won */
    Ok(self.value.get_or_init(|| value))
  }

  /// Copy of this node owned by another graph, keeping any materialised value.
  pub fn rehome(&self, graph: Option<&str>) -> Self {
    let node = VirtualNode {
      kind: self.kind,
      id: self.id,
      provider: self.provider.clone(),
      graph: graph.map(str::to_string),
      value: OnceLock::new(),
    };
    if let Some(value) = self.value.get() {
      let _ = node.value.set(value.rehome(graph));
    }
    node
  }

  /// Equality without materialising, when both sides share a provider.
  pub fn try_virtual_eq(&self, other: &VirtualNode) -> Option<bool> {
    if same_provider(&self.provider, &other.provider) {
      Some(self.id == other.id)
    }
    else {
      None
    }
  }
  pub fn try_compare_virtual_id(&self, other: &VirtualNode) -> Option<Ordering> {
    if same_provider(&self.provider, &other.provider) {
      Some(self.id.key().cmp(&other.id.key()))
    }
    else {
      None
    }
  }
}

impl std::fmt::Debug for VirtualNode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VirtualNode")
      .field("id", &self.id)
      .field("graph", &self.graph)
      .field("value", &self.value.get())
      .finish()
  }
}

fn check_kind(expected: NodeKind, value: &RdfNode) -> Result<()> {
  if value.kind() != expected {
    return Err(Error::WrongKind{ expected: expected.name(), actual: value.kind().name() })
  }
  Ok(())
}
