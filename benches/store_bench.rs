use {
  std::sync::Arc,
  criterion::*,
  rand::{rngs::StdRng, Rng, SeedableRng},
  ripple_virt::{
    datastore::memory::MemoryBackend,
    rdf::node::Node,
    update::manager::StorageManager,
    AccessMode, AdoStore, Graph, RdfNode, StoreConfig, Triple,
  },
};

fn random_graph(size: usize, uri: Option<&str>) -> Graph {
  let mut rng = StdRng::seed_from_u64(7);
  let mut graph = Graph::new(uri);
  while graph.len() < size {
    let s = Node::from(RdfNode::named(format!("http://s/{}", rng.gen_range(0..size / 4))));
    let p = Node::from(RdfNode::named(format!("http://p/{}", rng.gen_range(0..8))));
    let o = match rng.gen_bool(0.5) {
      true => RdfNode::literal(format!("{}", rng.gen::<u32>())),
      false => RdfNode::blank(format!("b{}", rng.gen_range(0..64))),
    };
    graph.assert(Triple::new(s, p, o));
  }
  graph
}

fn store(config: StoreConfig) -> Arc<AdoStore> {
  AdoStore::new(Arc::new(MemoryBackend::new()), config)
}

pub fn save_graph(c: &mut Criterion) {
  let graph = random_graph(2_000, Some("http://bench"));
  let mut group = c.benchmark_group("save_graph");
  group.sample_size(10);
  group.bench_function("AdoStore::save_graph() into an empty store", |b| b.iter_batched(
    || store(StoreConfig::default()),
    |store| store.save_graph(black_box(&graph)),
    BatchSize::SmallInput,
  ));
  let config = StoreConfig { cache_written_ids: true, ..StoreConfig::default() };
  let warm = store(config);
  let _ = warm.save_graph(&graph);
  group.bench_function("AdoStore::save_graph() overwriting with published IDs", |b| b.iter(
    || warm.save_graph(black_box(&graph))
  ));
  group.finish();
}

pub fn load_graph(c: &mut Criterion) {
  let graph = random_graph(2_000, Some("http://bench"));
  let mut group = c.benchmark_group("load_graph");
  group.sample_size(10);
  for mode in [AccessMode::Streaming, AccessMode::Batched] {
    let store = store(StoreConfig { access_mode: mode, ..StoreConfig::default() });
    let _ = store.save_graph(&graph);
    group.bench_function(format!("AdoStore::load_graph_values() {:?}", mode), |b| b.iter(
      || store.load_graph_values(black_box(Some("http://bench")))
    ));
    group.bench_function(format!("AdoStore::load_graph_virtual() {:?}", mode), |b| b.iter(
      || store.load_graph_virtual(black_box(Some("http://bench")))
    ));
  }
  group.finish();
}

criterion_group!(benches, save_graph, load_graph);
criterion_main!(benches);
