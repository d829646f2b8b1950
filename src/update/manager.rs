/*
  What the update processor needs from a store: graph-level load/save,
  optional triple-level update, deletion, listing and querying, all
  advertised through a capability descriptor.
*/

use {
  std::collections::HashMap,
  bitflags::bitflags,
  crate::{
    errors::{Error, Result},
    rdf::{graph::{Graph, Triple}, node::Node},
    update::commands::GraphPattern,
  },
};

bitflags! {
  /// What a store can do with the graphs it holds.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct IoBehaviour: u32 {
    const HAS_DEFAULT_GRAPH = 1;
    const HAS_NAMED_GRAPHS = 1 << 1;
    const OVERWRITE_DEFAULT = 1 << 2;
    const OVERWRITE_NAMED = 1 << 3;
    const CAN_UPDATE_ADD_TRIPLES = 1 << 4;
    const CAN_UPDATE_DELETE_TRIPLES = 1 << 5;

    /// A store holding a default graph plus named graphs, either of which
    /// a save replaces wholesale.
    const GRAPH_STORE = Self::HAS_DEFAULT_GRAPH.bits()
      | Self::HAS_NAMED_GRAPHS.bits()
      | Self::OVERWRITE_DEFAULT.bits()
      | Self::OVERWRITE_NAMED.bits();
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
  /// Update text can be handed to the store as is.
  pub supports_native_update: bool,
  pub supports_delete_graph: bool,
  pub supports_list_graphs: bool,
  /// `update_graph` adds and removes individual triples.
  pub supports_triple_update: bool,
  pub supports_query: bool,
  pub read_only: bool,
  pub io_behaviour: IoBehaviour,
}

impl Capabilities {
  pub fn has_graph_kind(&self, graph_uri: Option<&str>) -> bool {
    match graph_uri {
      None => self.io_behaviour.contains(IoBehaviour::HAS_DEFAULT_GRAPH),
      Some(_) => self.io_behaviour.contains(IoBehaviour::HAS_NAMED_GRAPHS),
    }
  }
  /// Whether saving an empty graph at `graph_uri` empties it.
  pub fn can_overwrite(&self, graph_uri: Option<&str>) -> bool {
    match graph_uri {
      None => self.io_behaviour.contains(IoBehaviour::OVERWRITE_DEFAULT),
      Some(_) => self.io_behaviour.contains(IoBehaviour::OVERWRITE_NAMED),
    }
  }
  pub fn can_add_triples(&self) -> bool {
    self.supports_triple_update && self.io_behaviour.contains(IoBehaviour::CAN_UPDATE_ADD_TRIPLES)
  }
  pub fn can_delete_triples(&self) -> bool {
    self.supports_triple_update && self.io_behaviour.contains(IoBehaviour::CAN_UPDATE_DELETE_TRIPLES)
  }
}

/* Queries */

/// Variable bindings of one solution, keyed by variable name without the `?`.
pub type Solution = HashMap<String, Node>;

/// `SELECT *` over a group pattern and its dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
  pub pattern: GraphPattern,
  pub default_graphs: Vec<String>,
  pub named_graphs: Vec<String>,
}

impl std::fmt::Display for SelectQuery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "SELECT *")?;
    for uri in &self.default_graphs {
      writeln!(f, "FROM <{}>", uri)?;
    }
    for uri in &self.named_graphs {
      writeln!(f, "FROM NAMED <{}>", uri)?;
    }
    write!(f, "WHERE {}", self.pattern)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResults {
  Solutions(Vec<Solution>),
  Graph(Graph),
}

/* Store */

pub trait StorageManager: Send + Sync {
  fn capabilities(&self) -> Capabilities;

  /// Loads a graph, `None` being the default graph. A graph the store does
  /// not hold loads empty.
  fn load_graph(&self, graph_uri: Option<&str>) -> Result<Graph>;

  /// Replaces the graph named by `graph.base_uri()` with `graph`.
  fn save_graph(&self, graph: &Graph) -> Result<()>;

  /// Removes `removals` then adds `additions`.
  fn update_graph(&self, graph_uri: Option<&str>, additions: &[Triple], removals: &[Triple]) -> Result<()>;

  fn delete_graph(&self, graph_uri: Option<&str>) -> Result<()>;

  fn list_graphs(&self) -> Result<Vec<Option<String>>>;

  fn query(&self, _query: &SelectQuery) -> Result<QueryResults> {
    Err(Error::Unsupported("this store cannot answer queries".to_string()))
  }

  /// Runs update text natively.
  fn update(&self, _update: &str) -> Result<()> {
    Err(Error::Unsupported("this store has no native update support".to_string()))
  }

  fn flush(&self) -> Result<()> {
    Ok(())
  }
  fn discard(&self) -> Result<()> {
    Ok(())
  }
}

#[cfg(test)]
mod unit_tests {
  use super::*;

  #[test]
  fn graph_store_behaviour() {
    let caps = Capabilities { io_behaviour: IoBehaviour::GRAPH_STORE, ..Default::default() };
    assert!(caps.has_graph_kind(None) && caps.has_graph_kind(Some("http://g")));
    assert!(caps.can_overwrite(None) && caps.can_overwrite(Some("http://g")));
    assert!(!caps.can_delete_triples());
  }

  #[test]
  fn triple_updates_need_both_the_flag_and_update_support() {
    let mut caps = Capabilities {
      io_behaviour: IoBehaviour::CAN_UPDATE_DELETE_TRIPLES,
      ..Default::default()
    };
    assert!(!caps.can_delete_triples());
    caps.supports_triple_update = true;
    assert!(caps.can_delete_triples());
    assert!(!caps.can_add_triples());
    assert!(!caps.can_overwrite(None));
    caps.io_behaviour |= IoBehaviour::CAN_UPDATE_ADD_TRIPLES;
    assert!(caps.can_add_triples());
  }

  #[test]
  fn select_query_text() {
    let query = SelectQuery {
      pattern: GraphPattern::group(vec![]),
      default_graphs: vec!["http://d".into()],
      named_graphs: vec!["http://n".into()],
    };
    assert_eq!(query.to_string(), "SELECT *\nFROM <http://d>\nFROM NAMED <http://n>\nWHERE { }");
  }
}
