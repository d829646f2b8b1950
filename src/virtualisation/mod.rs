/*
  Surrogate-ID virtualisation: IDs, the provider contract backends
  implement, the lazy virtual node, and the two caches (long-lived
  read cache, batch-scoped write cache).
*/

pub mod cache;
pub mod id;
pub mod node;
pub mod provider;
pub mod write_cache;
