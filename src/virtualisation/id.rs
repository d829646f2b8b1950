use crate::NodeKind;

/// Typed surrogate identifier handed out by a `VirtualRdfProvider`.
///
/// An ID is only meaningful relative to the provider that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurrogateId {
  kind: NodeKind,
  key: i64,
}

impl SurrogateId {
  /// Sentinel returned for "no such term/graph". Its kind carries no meaning.
  pub const NULL: SurrogateId = SurrogateId { kind: NodeKind::Blank, key: 0 };

  pub fn new(kind: NodeKind, key: i64) -> Self {
    SurrogateId { kind, key }
  }
  pub fn kind(&self) -> NodeKind {
    self.kind
  }
  pub fn key(&self) -> i64 {
    self.key
  }
  /* Keys at or below zero are never allocated by a backend */
  pub fn is_assigned(&self) -> bool {
    self.key > 0
  }
}

impl std::fmt::Display for SurrogateId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}#{}", self.kind.name(), self.key)
  }
}

/// Graph identity in the backend. An ID of 0 means the graph does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphKey {
  pub graph_id: i64,
  pub graph_uri: Option<String>,
}

impl GraphKey {
  pub fn exists(&self) -> bool {
    self.graph_id > 0
  }
}

#[cfg(test)]
mod unit_tests {
  use super::*;
  #[test]
  fn equality_is_structural() {
    assert_eq!(SurrogateId::new(NodeKind::Uri, 7), SurrogateId::new(NodeKind::Uri, 7));
    assert_ne!(SurrogateId::new(NodeKind::Uri, 7), SurrogateId::new(NodeKind::Literal, 7));
    assert!(!SurrogateId::NULL.is_assigned());
    assert!(SurrogateId::new(NodeKind::Literal, 1).is_assigned());
  }
}
