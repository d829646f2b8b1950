/* Exports */

pub mod config;
pub mod datastore;
pub mod errors;
pub mod query;
pub mod rdf;
pub mod update;
pub mod virtualisation;

pub use config::StoreConfig;
pub use datastore::{
  backend::BackendPort,
  cursor::{AccessMode, TripleCursor},
  store::AdoStore,
};
pub use errors::{Error, Result};
pub use query::optimiser::{AlgebraVirtualizer, OptimiserPipeline};
pub use rdf::{
  graph::{Graph, Quad, Triple},
  node::Node,
};
pub use update::{
  context::UpdateEvaluationContext,
  processor::GenericUpdateProcessor,
};
pub use virtualisation::{
  id::SurrogateId,
  node::VirtualNode,
  provider::VirtualRdfProvider,
};

/* Common Definitions */

/// A materialised RDF term.
///
/// Blank nodes carry the URI of the graph that owns them (`None` is the
/// default graph), so two blank nodes with the same label in different
/// graphs are different nodes. Literals can never carry both a language
/// tag and a datatype: the two are separate variants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize, Hash)]
pub enum RdfNode {
  Named{ iri: String },
  Blank{ id: String, graph: Option<String> },
  RawLit{ val: String },
  LangTaggedLit{ val: String, lang: String },
  TypedLit{ val: String, datatype: String },
}
impl RdfNode {
  pub fn named(iri: impl Into<String>) -> Self {
    Self::Named{ iri: iri.into() }
  }
  pub fn blank(id: impl Into<String>) -> Self {
    Self::Blank{ id: id.into(), graph: None }
  }
  pub fn literal(val: impl Into<String>) -> Self {
    Self::RawLit{ val: val.into() }
  }
  /* An empty tag means a plain literal */
  pub fn lang_literal(val: impl Into<String>, lang: impl Into<String>) -> Self {
    let lang = lang.into();
    if lang.is_empty() {
      Self::RawLit{ val: val.into() }
    }
    else {
      Self::LangTaggedLit{ val: val.into(), lang }
    }
  }
  pub fn typed_literal(val: impl Into<String>, datatype: impl Into<String>) -> Self {
    Self::TypedLit{ val: val.into(), datatype: datatype.into() }
  }
  pub fn kind(&self) -> NodeKind {
    match self {
      Self::Named{..} => NodeKind::Uri,
      Self::Blank{..} => NodeKind::Blank,
      Self::RawLit{..} | Self::LangTaggedLit{..} | Self::TypedLit{..} => NodeKind::Literal,
    }
  }
  pub fn is_blank(&self) -> bool {
    matches!(self, Self::Blank{..})
  }
  /// Copy of this node owned by `graph`. Only blank nodes are graph-scoped,
  /// every other kind comes back unchanged.
  pub fn rehome(&self, graph: Option<&str>) -> Self {
    match self {
      Self::Blank{ id, .. } => Self::Blank{ id: id.clone(), graph: graph.map(str::to_string) },
      other => other.clone(),
    }
  }
}
impl std::convert::From<&str> for RdfNode {
  fn from(s: &str) -> Self {
    Self::Named{ iri: s.to_string() }
  }
}
impl std::fmt::Display for RdfNode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Named{ iri } => write!(f, "<{}>", iri),
      Self::Blank{ id, .. } => write!(f, "_:{}", id),
      Self::RawLit{ val } => write!(f, "\"{}\"", escape_literal(val)),
      Self::LangTaggedLit{ val, lang } => write!(f, "\"{}\"@{}", escape_literal(val), lang),
      Self::TypedLit{ val, datatype } => write!(f, "\"{}\"^^<{}>", escape_literal(val), datatype),
    }
  }
}

/// Node type codes. The first three are the byte encoding used in backend
/// rows; graph literals and variables only exist as virtual nodes built
/// while rewriting algebra and are never decoded from rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
  Blank = 0,
  Uri = 1,
  Literal = 2,
  GraphLiteral = 3,
  Variable = 4,
}
impl NodeKind {
  pub fn as_byte(self) -> u8 {
    self as u8
  }
  pub fn from_byte(byte: u8) -> Option<Self> {
    match byte {
      0 => Some(Self::Blank),
      1 => Some(Self::Uri),
      2 => Some(Self::Literal),
      3 => Some(Self::GraphLiteral),
      4 => Some(Self::Variable),
      _ => None,
    }
  }
  pub fn name(self) -> &'static str {
    match self {
      Self::Blank => "blank",
      Self::Uri => "URI",
      Self::Literal => "literal",
      Self::GraphLiteral => "graph literal",
      Self::Variable => "variable",
    }
  }
}

fn escape_literal(val: &str) -> String {
  let mut escaped = String::with_capacity(val.len());
  for c in val.chars() {
    match c {
      '"' => escaped.push_str("\\\""),
      '\\' => escaped.push_str("\\\\"),
      '\n' => escaped.push_str("\\n"),
      '\r' => escaped.push_str("\\r"),
      '\t' => escaped.push_str("\\t"),
      c => escaped.push(c),
    }
  }
  escaped
}

#[cfg(test)]
mod unit_tests {
  use super::*;
  #[test]
  fn empty_language_tag_is_a_plain_literal() {
    assert_eq!(RdfNode::lang_literal("chat", ""), RdfNode::literal("chat"));
    assert_eq!(
      RdfNode::lang_literal("chat", "fr"),
      RdfNode::LangTaggedLit{ val: "chat".into(), lang: "fr".into() }
    );
  }
  #[test]
  fn rehome_only_touches_blank_nodes() {
    let b = RdfNode::blank("b1").rehome(Some("http://g"));
    assert_eq!(b, RdfNode::Blank{ id: "b1".into(), graph: Some("http://g".into()) });
    assert_ne!(b, RdfNode::blank("b1"));
    let u = RdfNode::named("http://x");
    assert_eq!(u.rehome(Some("http://g")), u);
  }
  #[test]
  fn display_as_sparql_terms() {
    assert_eq!(RdfNode::named("http://x").to_string(), "<http://x>");
    assert_eq!(RdfNode::literal("a \"q\"").to_string(), "\"a \\\"q\\\"\"");
    assert_eq!(
      RdfNode::typed_literal("42", "http://www.w3.org/2001/XMLSchema#integer").to_string(),
      "\"42\"^^<http://www.w3.org/2001/XMLSchema#integer>"
    );
  }
  #[test]
  fn kind_bytes_round_trip() {
    for b in 0..5u8 {
      assert_eq!(NodeKind::from_byte(b).map(NodeKind::as_byte), Some(b));
    }
    assert_eq!(NodeKind::from_byte(5), None);
  }
}
