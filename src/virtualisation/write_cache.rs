use {
  std::collections::HashMap,
  tracing::error,
  crate::{
    errors::{Error, Result},
    RdfNode,
  },
};

/// A node paired with the ID the backend allocated for it in the current
/// bulk write. The ID can be set once; hashing and equality go through the
/// node so a handle can key a map before its ID is known.
#[derive(Debug, Clone)]
pub struct StoreNodeId {
  node: RdfNode,
  id: i64,
}

impl StoreNodeId {
  pub fn new(node: RdfNode) -> Self {
    StoreNodeId { node, id: 0 }
  }
  pub fn node(&self) -> &RdfNode {
    &self.node
  }
  pub fn id(&self) -> i64 {
    self.id
  }
  pub fn is_assigned(&self) -> bool {
    self.id > 0
  }
  pub fn assign(&mut self, id: i64) -> Result<()> {
    if self.is_assigned() {
      return Err(already_assigned(&self.node, self.id, id))
    }
    self.id = id;
    Ok(())
  }
}
impl PartialEq for StoreNodeId {
  fn eq(&self, other: &Self) -> bool {
    self.node == other.node
  }
}
impl Eq for StoreNodeId {}
impl std::hash::Hash for StoreNodeId {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.node.hash(state)
  }
}

/* Scoped to one SaveGraph/UpdateGraph call and owned by it, never shared
  between writers. Collapses the N*3 allocation round-trips of a bulk write
  down to one per distinct term. */
#[derive(Debug, Default)]
pub struct WriteCache {
  entries: HashMap<RdfNode, StoreNodeId>,
}

impl WriteCache {
  pub fn new() -> Self {
    Self::default()
  }
  /// The handle seen earlier in this batch, or a fresh unassigned one.
  pub fn get_or_new(&self, node: &RdfNode) -> StoreNodeId {
    match self.entries.get(node) {
      Some(handle) => handle.clone(),
      None => StoreNodeId::new(node.clone()),
    }
  }
  pub fn commit(&mut self, handle: StoreNodeId) -> Result<()> {
    if !handle.is_assigned() {
      return Err(Error::InvalidState(format!("cannot commit {} before the backend assigned it an ID", handle.node)))
    }
    if let Some(existing) = self.entries.get(&handle.node) {
      if existing.is_assigned() {
        return Err(already_assigned(&handle.node, existing.id, handle.id))
      }
    }
    self.entries.insert(handle.node.clone(), handle);
    Ok(())
  }
  pub fn len(&self) -> usize {
    self.entries.len()
  }
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
  pub fn into_assigned(self) -> impl Iterator<Item = StoreNodeId> {
    self.entries.into_values().filter(StoreNodeId::is_assigned)
  }
}

fn already_assigned(node: &RdfNode, existing: i64, attempted: i64) -> Error {
  error!(%node, existing, attempted, "write cache double assignment");
  Error::AlreadyAssigned { node: node.to_string(), existing, attempted }
}
