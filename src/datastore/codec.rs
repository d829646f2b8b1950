use {
  std::sync::Arc,
  crate::{
    datastore::backend::{Command, Value},
    errors::{Error, Result},
    virtualisation::{id::SurrogateId, node::VirtualNode, provider::VirtualRdfProvider},
    NodeKind, RdfNode,
  },
};

/// Which parameter/column prefix a node is encoded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
  Node,
  Subject,
  Predicate,
  Object,
}

impl Segment {
  pub const TRIPLE: [Segment; 3] = [Segment::Subject, Segment::Predicate, Segment::Object];

  pub fn prefix(self) -> &'static str {
    match self {
      Segment::Node => "node",
      Segment::Subject => "subject",
      Segment::Predicate => "predicate",
      Segment::Object => "object",
    }
  }
  pub fn column(self, suffix: &str) -> String {
    format!("{}{}", self.prefix(), suffix)
  }
}

const BLANK_PREFIX: &str = "_:";

/* Encoding */

pub fn encode_node(cmd: &mut Command, node: &RdfNode, segment: Segment) {
  cmd.set(&segment.column("Type"), node.kind().as_byte());
  let (value, meta) = match node {
    RdfNode::Named{ iri } => (iri.clone(), None),
    RdfNode::Blank{ id, .. } => (format!("{}{}", BLANK_PREFIX, id), None),
    RdfNode::RawLit{ val } => (val.clone(), None),
    RdfNode::LangTaggedLit{ val, lang } => (val.clone(), Some(format!("@{}", lang))),
    RdfNode::TypedLit{ val, datatype } => (val.clone(), Some(datatype.clone())),
  };
  cmd.set(&segment.column("Value"), value);
  match meta {
    Some(meta) => cmd.set(&segment.column("Meta"), meta),
    None => cmd.remove(&segment.column("Meta")),
  }
}

pub fn encode_node_id(cmd: &mut Command, id: i64, segment: Segment) {
  cmd.set(&segment.column("ID"), id);
}

/* Decoding */

/// Only blank, URI and literal rows exist on the wire.
fn wire_kind(type_byte: u8) -> Result<NodeKind> {
  match NodeKind::from_byte(type_byte) {
    Some(kind @ (NodeKind::Blank | NodeKind::Uri | NodeKind::Literal)) => Ok(kind),
    Some(kind) => Err(Error::Unsupported(format!("{} nodes cannot be decoded from backend rows", kind.name()))),
    None => Err(Error::Unsupported(format!("unknown node type byte {}", type_byte))),
  }
}

pub fn decode_node(type_byte: u8, value: &str, meta: Option<&str>, graph: Option<&str>) -> Result<RdfNode> {
  Ok(match wire_kind(type_byte)? {
    NodeKind::Blank => {
      let label = value.get(BLANK_PREFIX.len()..)
        .ok_or_else(|| Error::backend(format!("malformed blank node value {:?}", value)))?;
      RdfNode::blank(label).rehome(graph)
    },
    NodeKind::Uri => RdfNode::named(value),
    _ => match meta {
      None => RdfNode::literal(value),
      Some(tag) if tag.starts_with('@') => RdfNode::lang_literal(value, &tag[1..]),
      Some(datatype) => RdfNode::typed_literal(value, datatype),
    },
  })
}

pub fn decode_virtual_node(type_byte: u8, id: i64, provider: &Arc<dyn VirtualRdfProvider>, graph: Option<&str>) -> Result<VirtualNode> {
  let kind = wire_kind(type_byte)?;
  Ok(VirtualNode::new(SurrogateId::new(kind, id), provider.clone(), graph))
}

pub fn decode_meta(meta: &Value) -> Result<Option<String>> {
  match meta {
    Value::Null => Ok(None),
    Value::Text(s) => Ok(Some(s.clone())),
    other => Err(Error::backend(format!("expected a text or NULL meta column, got {:?}", other))),
  }
}

#[cfg(test)]
mod unit_tests {
  use {
    super::*,
    crate::virtualisation::provider::test_provider::TableProvider,
  };

  #[test]
  fn meta_carries_language_or_datatype() {
    let mut cmd = Command::new("AssertQuad");
    encode_node(&mut cmd, &RdfNode::lang_literal("chat", "fr"), Segment::Object);
    assert_eq!(cmd.get("objectType"), Some(&Value::Byte(2)));
    assert_eq!(cmd.get("objectMeta"), Some(&Value::Text("@fr".into())));
    /* Re-encoding a plain literal into the same command drops the stale meta */
    encode_node(&mut cmd, &RdfNode::literal("chat"), Segment::Object);
    assert!(!cmd.contains("objectMeta"));
    encode_node(&mut cmd, &RdfNode::typed_literal("1", "http://www.w3.org/2001/XMLSchema#int"), Segment::Object);
    assert_eq!(cmd.get("objectMeta"), Some(&Value::Text("http://www.w3.org/2001/XMLSchema#int".into())));
  }

  #[test]
  fn blank_values_are_prefixed() {
    let mut cmd = Command::new("GetNodeID");
    encode_node(&mut cmd, &RdfNode::blank("b1"), Segment::Node);
    assert_eq!(cmd.get("nodeValue"), Some(&Value::Text("_:b1".into())));
    let decoded = decode_node(0, "_:b1", None, Some("http://g")).unwrap();
    assert_eq!(decoded, RdfNode::Blank{ id: "b1".into(), graph: Some("http://g".into()) });
  }

  #[test]
  fn decodes_literal_meta() {
    assert_eq!(decode_node(2, "x", None, None).unwrap(), RdfNode::literal("x"));
    assert_eq!(decode_node(2, "x", Some("@en"), None).unwrap(), RdfNode::lang_literal("x", "en"));
    assert_eq!(decode_node(2, "5", Some("http://dt"), None).unwrap(), RdfNode::typed_literal("5", "http://dt"));
    assert_eq!(decode_node(1, "http://a", None, None).unwrap(), RdfNode::named("http://a"));
  }

  #[test]
  fn graph_literal_and_variable_bytes_are_not_decodable() {
    let provider: Arc<dyn VirtualRdfProvider> = TableProvider::with_terms(vec![]);
    for byte in [3u8, 4, 9] {
      assert_eq!(decode_node(byte, "x", None, None).unwrap_err().code(), "UNSUPPORTED");
      assert_eq!(decode_virtual_node(byte, 1, &provider, None).unwrap_err().code(), "UNSUPPORTED");
    }
    let node = decode_virtual_node(2, 7, &provider, None).unwrap();
    assert_eq!(node.id(), SurrogateId::new(NodeKind::Literal, 7));
  }

  #[test]
  fn null_meta_is_none() {
    assert_eq!(decode_meta(&Value::Null).unwrap(), None);
    assert_eq!(decode_meta(&Value::Text("@en".into())).unwrap(), Some("@en".into()));
    assert!(decode_meta(&Value::Int(1)).is_err());
  }
}
