use {
  std::{cmp::Ordering, sync::Arc},
  crate::{
    errors::Result,
    virtualisation::{
      id::SurrogateId,
      node::VirtualNode,
      provider::VirtualRdfProvider,
    },
    NodeKind, RdfNode,
  },
};

/// A term as the evaluator sees it: either a plain value or a surrogate ID
/// that is materialised on demand.
#[derive(Debug, Clone)]
pub enum Node {
  Concrete(RdfNode),
  Virtual(VirtualNode),
}

/// Hashable identity of a node. Virtual nodes are keyed by their issuing
/// provider and ID, so building a key never touches the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
  Virtual(usize, SurrogateId),
  Concrete(RdfNode),
}

impl Node {
  pub fn kind(&self) -> NodeKind {
    match self {
      Node::Concrete(node) => node.kind(),
      Node::Virtual(node) => node.kind(),
    }
  }
  pub fn is_blank(&self) -> bool {
    self.kind() == NodeKind::Blank
  }
  pub fn is_virtual(&self) -> bool {
    matches!(self, Node::Virtual(_))
  }
  pub fn as_virtual(&self) -> Option<&VirtualNode> {
    match self {
      Node::Virtual(node) => Some(node),
      Node::Concrete(_) => None,
    }
  }

  /// The materialised value, fetching it from the provider if needed.
  pub fn value(&self) -> Result<&RdfNode> {
    match self {
      Node::Concrete(node) => Ok(node),
      Node::Virtual(node) => node.materialise(),
    }
  }

  pub fn key(&self) -> NodeKey {
    match self {
      Node::Concrete(node) => NodeKey::Concrete(node.clone()),
      Node::Virtual(node) => NodeKey::Virtual(
        Arc::as_ptr(node.provider()) as *const () as usize,
        node.id(),
      ),
    }
  }

  pub fn rehome(&self, graph: Option<&str>) -> Self {
    match self {
      Node::Concrete(node) => Node::Concrete(node.rehome(graph)),
      Node::Virtual(node) => Node::Virtual(node.rehome(graph)),
    }
  }

  /// The node's ID when it was issued by `provider`, without any lookup.
  pub fn virtual_id_for(&self, provider: &Arc<dyn VirtualRdfProvider>) -> Option<SurrogateId> {
    match self {
      Node::Virtual(node) if node.is_from(provider) => Some(node.id()),
      _ => None,
    }
  }

  pub fn try_compare_virtual_id(&self, other: &Node) -> Option<Ordering> {
    match (self, other) {
      (Node::Virtual(a), Node::Virtual(b)) => a.try_compare_virtual_id(b),
      _ => None,
    }
  }
}

impl PartialEq for Node {
  fn eq(&self, other: &Self) -> bool {
    if let (Node::Virtual(a), Node::Virtual(b)) = (self, other) {
      if let Some(eq) = a.try_virtual_eq(b) {
        return eq
      }
    }
    /* Different providers or mixed kinds, fall back to values. An unreadable
      node equals nothing. */
    match (self.value(), other.value()) {
      (Ok(a), Ok(b)) => a == b,
      _ => false,
    }
  }
}

impl From<RdfNode> for Node {
  fn from(node: RdfNode) -> Self {
    Node::Concrete(node)
  }
}
impl From<VirtualNode> for Node {
  fn from(node: VirtualNode) -> Self {
    Node::Virtual(node)
  }
}

impl std::fmt::Display for Node {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.value() {
      Ok(value) => write!(f, "{}", value),
      Err(_) => write!(f, "[unresolved {}]", self.key_label()),
    }
  }
}

impl Node {
  fn key_label(&self) -> String {
    match self {
      Node::Virtual(node) => node.id().to_string(),
      Node::Concrete(node) => node.kind().name().to_string(),
    }
  }
}

#[cfg(test)]
mod unit_tests {
  use {
    super::*,
    crate::virtualisation::provider::test_provider::TableProvider,
  };

  fn virtual_node(provider: &Arc<dyn VirtualRdfProvider>, kind: NodeKind, key: i64) -> Node {
    Node::Virtual(VirtualNode::new(SurrogateId::new(kind, key), provider.clone(), None))
  }

  #[test]
  fn same_provider_equality_never_materialises() {
    let table = TableProvider::with_terms(vec![(1, RdfNode::named("http://a")), (2, RdfNode::named("http://b"))]);
    let provider: Arc<dyn VirtualRdfProvider> = table.clone();
    let a = virtual_node(&provider, NodeKind::Uri, 1);
    let a2 = virtual_node(&provider, NodeKind::Uri, 1);
    let b = virtual_node(&provider, NodeKind::Uri, 2);
    assert_eq!(a, a2);
    assert_ne!(a, b);
    assert_eq!(a.try_compare_virtual_id(&b), Some(Ordering::Less));
    assert_eq!(table.lookups(), 0);
  }

  #[test]
  fn cross_provider_equality_compares_values() {
    let left: Arc<dyn VirtualRdfProvider> = TableProvider::with_terms(vec![(1, RdfNode::literal("x"))]);
    let right: Arc<dyn VirtualRdfProvider> = TableProvider::with_terms(vec![(5, RdfNode::literal("x"))]);
    let a = virtual_node(&left, NodeKind::Literal, 1);
    let b = virtual_node(&right, NodeKind::Literal, 5);
    assert_eq!(a, b);
    assert_eq!(a, Node::from(RdfNode::literal("x")));
    assert_eq!(a.try_compare_virtual_id(&b), None);
  }

  #[test]
  fn unresolvable_nodes_equal_nothing() {
    let provider: Arc<dyn VirtualRdfProvider> = TableProvider::with_terms(vec![]);
    let ghost = virtual_node(&provider, NodeKind::Uri, 9);
    assert_ne!(ghost, Node::from(RdfNode::named("http://a")));
    assert!(ghost.to_string().contains("unresolved"));
  }

  #[test]
  fn materialised_value_is_kept() -> Result<()> {
    let table = TableProvider::with_terms(vec![(1, RdfNode::named("http://a"))]);
    let provider: Arc<dyn VirtualRdfProvider> = table.clone();
    let node = virtual_node(&provider, NodeKind::Uri, 1);
    assert_eq!(node.value()?, &RdfNode::named("http://a"));
    assert_eq!(node.value()?, &RdfNode::named("http://a"));
    assert_eq!(table.lookups(), 1);
    Ok(())
  }

  #[test]
  fn wrong_kind_is_rejected() {
    let provider: Arc<dyn VirtualRdfProvider> = TableProvider::with_terms(vec![(1, RdfNode::named("http://a"))]);
    let forced = VirtualNode::with_value(SurrogateId::new(NodeKind::Literal, 1), provider, None, RdfNode::named("http://a"));
    assert!(matches!(forced, Err(crate::Error::WrongKind{ .. })));
  }

  #[test]
  fn virtual_id_short_cut_only_for_the_issuer() {
    let one: Arc<dyn VirtualRdfProvider> = TableProvider::with_terms(vec![]);
    let two: Arc<dyn VirtualRdfProvider> = TableProvider::with_terms(vec![]);
    let node = virtual_node(&one, NodeKind::Uri, 3);
    assert_eq!(node.virtual_id_for(&one), Some(SurrogateId::new(NodeKind::Uri, 3)));
    assert_eq!(node.virtual_id_for(&two), None);
    assert_eq!(Node::from(RdfNode::named("http://a")).virtual_id_for(&one), None);
  }

  #[test]
  fn keys_follow_provider_identity() {
    let provider: Arc<dyn VirtualRdfProvider> = TableProvider::with_terms(vec![]);
    let a = virtual_node(&provider, NodeKind::Uri, 3);
    let b = virtual_node(&provider, NodeKind::Uri, 3).rehome(Some("http://g"));
    assert_eq!(a.key(), b.key());
    assert_ne!(a.key(), Node::from(RdfNode::named("http://a")).key());
  }
}
