use {
  std::{collections::HashMap, sync::Arc},
  crate::{
    errors::Result,
    rdf::node::{Node, NodeKey},
  },
};

/* Common Definitions */

/// Graph a quad belongs to, `None` being the default graph. Shared so that
/// every quad decoded from the same graph points at one allocation.
pub type GraphName = Option<Arc<str>>;

type TripleKey = (NodeKey, NodeKey, NodeKey);

#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
  pub subject: Node,
  pub predicate: Node,
  pub object: Node,
}

impl Triple {
  pub fn new(subject: impl Into<Node>, predicate: impl Into<Node>, object: impl Into<Node>) -> Self {
    Triple {
      subject: subject.into(),
      predicate: predicate.into(),
      object: object.into(),
    }
  }
  pub fn nodes(&self) -> [&Node; 3] {
    [&self.subject, &self.predicate, &self.object]
  }
  pub fn key(&self) -> TripleKey {
    (self.subject.key(), self.predicate.key(), self.object.key())
  }
  pub fn has_virtual(&self) -> bool {
    self.nodes().iter().any(|node| node.is_virtual())
  }
  pub fn rehome(&self, graph: Option<&str>) -> Self {
    Triple {
      subject: self.subject.rehome(graph),
      predicate: self.predicate.rehome(graph),
      object: self.object.rehome(graph),
    }
  }
}

impl std::fmt::Display for Triple {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
  pub graph: GraphName,
  pub triple: Triple,
}

impl Quad {
  pub fn graph_uri(&self) -> Option<&str> {
    self.graph.as_deref()
  }
}

/* Graph */

/// An in-memory set of triples with an optional base URI, kept in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  base_uri: Option<String>,
  triples: Vec<Triple>,
  /// Position of each triple in `triples`.
  index: HashMap<TripleKey, usize>,
  virtual_triples: usize,
}

impl Graph {
  pub fn new(base_uri: Option<&str>) -> Self {
    Graph {
      base_uri: base_uri.map(str::to_string),
      triples: Vec::new(),
      index: HashMap::new(),
      virtual_triples: 0,
    }
  }
  pub fn base_uri(&self) -> Option<&str> {
    self.base_uri.as_deref()
  }
  pub fn set_base_uri(&mut self, base_uri: Option<&str>) {
    self.base_uri = base_uri.map(str::to_string);
    let triples = std::mem::take(&mut self.triples);
    self.index.clear();
    self.virtual_triples = 0;
    for triple in triples {
      self.assert(triple);
    }
  }

  /// Adds a triple, re-homing its blank nodes into this graph.
  /// Returns false if it was already present.
  pub fn assert(&mut self, triple: Triple) -> bool {
    let triple = triple.rehome(self.base_uri());
    let key = triple.key();
    if self.index.contains_key(&key) {
      return false
    }
    self.index.insert(key, self.triples.len());
    if triple.has_virtual() {
      self.virtual_triples += 1;
    }
    self.triples.push(triple);
    true
  }
  pub fn assert_all(&mut self, triples: impl IntoIterator<Item = Triple>) -> usize {
    triples.into_iter().map(|t| self.assert(t)).filter(|added| *added).count()
  }
  /// Fallible variant for decoded streams.
  pub fn try_assert_all(&mut self, triples: impl IntoIterator<Item = Result<Triple>>) -> Result<usize> {
    let mut added = 0;
    for triple in triples {
      if self.assert(triple?) {
        added += 1;
      }
    }
    Ok(added)
  }

  /* A triple can be present under another key when one side is virtual and
    the other concrete, so misses fall back to value equality. That scan only
    runs when virtual nodes are involved. */
  fn position(&self, triple: &Triple) -> Option<usize> {
    if let Some(at) = self.index.get(&triple.key()) {
      return Some(*at)
    }
    if self.virtual_triples == 0 && !triple.has_virtual() {
      return None
    }
    self.triples.iter().position(|t| t == triple)
  }

  pub fn retract(&mut self, triple: &Triple) -> bool {
    self.retract_all(std::iter::once(triple)) == 1
  }

  /// Removes every given triple present, keeping the order of the rest.
  /// Returns how many were removed.
  pub fn retract_all<'a>(&mut self, triples: impl IntoIterator<Item = &'a Triple>) -> usize {
    let base_uri = self.base_uri.clone();
    let mut doomed: Vec<usize> = triples.into_iter()
      .filter_map(|t| self.position(&t.rehome(base_uri.as_deref())))
      .collect();
    if doomed.is_empty() {
      return 0
    }
    doomed.sort_unstable();
    doomed.dedup();
    for at in &doomed {
      let removed = &self.triples[*at];
      self.index.remove(&removed.key());
      if removed.has_virtual() {
        self.virtual_triples -= 1;
      }
    }
    let mut at = 0;
    self.triples.retain(|_| {
      let keep = doomed.binary_search(&at).is_err();
      at += 1;
      keep
    });
    for position in self.index.values_mut() {
      let shift = doomed.partition_point(|d| *d < *position);
      *position -= shift;
    }
    doomed.len()
  }

  pub fn merge(&mut self, other: &Graph) -> usize {
    self.assert_all(other.triples.iter().cloned())
  }
  pub fn clear(&mut self) {
    self.triples.clear();
    self.index.clear();
    self.virtual_triples = 0;
  }
  pub fn contains(&self, triple: &Triple) -> bool {
    self.position(&triple.rehome(self.base_uri())).is_some()
  }
  pub fn is_empty(&self) -> bool {
    self.triples.is_empty()
  }
  pub fn len(&self) -> usize {
    self.triples.len()
  }
  pub fn iter(&self) -> std::slice::Iter<'_, Triple> {
    self.triples.iter()
  }
  pub fn triples(&self) -> &[Triple] {
    &self.triples
  }
}

impl PartialEq for Graph {
  fn eq(&self, other: &Self) -> bool {
    self.base_uri == other.base_uri
      && self.index.len() == other.index.len()
      && self.index.keys().all(|key| other.index.contains_key(key))
  }
}

impl<'a> IntoIterator for &'a Graph {
  type Item = &'a Triple;
  type IntoIter = std::slice::Iter<'a, Triple>;
  fn into_iter(self) -> Self::IntoIter {
    self.triples.iter()
  }
}

#[cfg(test)]
mod unit_tests {
  use {
    super::*,
    crate::RdfNode,
  };

  fn t(s: &str, p: &str, o: &str) -> Triple {
    Triple::new(RdfNode::named(s), RdfNode::named(p), RdfNode::named(o))
  }

  #[test]
  fn duplicates_are_ignored() {
    let mut g = Graph::new(Some("http://g"));
    assert!(g.assert(t("http://a", "http://b", "http://c")));
    assert!(!g.assert(t("http://a", "http://b", "http://c")));
    assert_eq!(g.len(), 1);
  }

  #[test]
  fn blank_nodes_are_rehomed_on_assert() {
    let mut g = Graph::new(Some("http://g"));
    g.assert(Triple::new(RdfNode::blank("x"), RdfNode::named("http://p"), RdfNode::literal("v")));
    let subject = g.iter().next().map(|t| t.subject.clone());
    assert_eq!(subject, Some(Node::from(RdfNode::Blank{ id: "x".into(), graph: Some("http://g".into()) })));
    /* Membership checks re-home the lookup too */
    assert!(g.contains(&Triple::new(RdfNode::blank("x"), RdfNode::named("http://p"), RdfNode::literal("v"))));
  }

  #[test]
  fn retract_keeps_order_of_the_rest() {
    let mut g = Graph::new(None);
    g.assert(t("http://a", "http://p", "http://1"));
    g.assert(t("http://a", "http://p", "http://2"));
    g.assert(t("http://a", "http://p", "http://3"));
    assert!(g.retract(&t("http://a", "http://p", "http://2")));
    assert!(!g.retract(&t("http://a", "http://p", "http://2")));
    let objects: Vec<String> = g.iter().map(|t| t.object.to_string()).collect();
    assert_eq!(objects, vec!["<http://1>", "<http://3>"]);
  }

  #[test]
  fn bulk_retract_keeps_positions_consistent() {
    let mut g = Graph::new(None);
    for i in 0..6 {
      g.assert(t("http://a", "http://p", &format!("http://{}", i)));
    }
    let gone = [t("http://a", "http://p", "http://1"), t("http://a", "http://p", "http://4"), t("http://x", "http://p", "http://1")];
    assert_eq!(g.retract_all(&gone), 2);
    let objects: Vec<String> = g.iter().map(|t| t.object.to_string()).collect();
    assert_eq!(objects, vec!["<http://0>", "<http://2>", "<http://3>", "<http://5>"]);
    /* Later positions shifted with the removals */
    assert!(g.retract(&t("http://a", "http://p", "http://5")));
    assert!(g.retract(&t("http://a", "http://p", "http://0")));
    assert_eq!(g.len(), 2);
    assert!(g.contains(&t("http://a", "http://p", "http://3")));
    assert!(!g.contains(&t("http://a", "http://p", "http://5")));
  }

  #[test]
  fn merge_adds_only_new_triples() {
    let mut a = Graph::new(None);
    a.assert(t("http://a", "http://p", "http://1"));
    let mut b = Graph::new(None);
    b.assert(t("http://a", "http://p", "http://1"));
    b.assert(t("http://a", "http://p", "http://2"));
    assert_eq!(a.merge(&b), 1);
    assert_eq!(a, b);
    a.clear();
    assert!(a.is_empty());
  }
}
