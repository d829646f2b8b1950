use {
  std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
  },
  tracing::{debug, info, warn},
  crate::{
    config::StoreConfig,
    errors::{Error, Result},
    query::algebra::{PatternItem, TriplePattern},
    rdf::{
      graph::{Graph, Triple},
      node::Node,
      parser::{FileLoader, RdfLoader},
    },
    update::{
      commands::{
        ClearCommand, ClearTarget, CommandSet, GraphPattern, GraphSpecifier, LoadCommand,
        ModifyCommand, PatternKind, TransferCommand, UpdateCommand,
      },
      context::{Clock, SystemClock, UpdateEvaluationContext},
      manager::{Capabilities, IoBehaviour, QueryResults, Solution, StorageManager},
    },
    NodeKind, RdfNode,
  },
};

/// Runs update commands against any `StorageManager`.
///
/// Stores with native update support get the command text as is. For
/// everything else each command is approximated with graph loads, saves,
/// deletions and triple-level updates, as far as the store's capabilities
/// allow. Nothing is transactional: when a command fails, the work done by
/// the commands before it stays in place.
pub struct GenericUpdateProcessor {
  manager: Arc<dyn StorageManager>,
  loader: Arc<dyn RdfLoader>,
  clock: Arc<dyn Clock>,
  global_timeout_ms: u64,
}

impl GenericUpdateProcessor {
  pub fn new(manager: Arc<dyn StorageManager>) -> Result<Self> {
    if manager.capabilities().read_only {
      return Err(Error::InvalidState("cannot process updates against a read-only store".to_string()))
    }
    Ok(GenericUpdateProcessor {
      manager,
      loader: Arc::new(FileLoader),
      clock: Arc::new(SystemClock::new()),
      global_timeout_ms: 0,
    })
  }
  pub fn with_loader(mut self, loader: Arc<dyn RdfLoader>) -> Self {
    self.loader = loader;
    self
  }
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }
  pub fn with_global_timeout(mut self, timeout_ms: u64) -> Self {
    self.global_timeout_ms = timeout_ms;
    self
  }
  pub fn with_config(self, config: &StoreConfig) -> Self {
    self.with_global_timeout(config.update_timeout_ms)
  }
  pub fn manager(&self) -> &Arc<dyn StorageManager> {
    &self.manager
  }

  /// Processes the commands in order, stopping at the first failure of a
  /// command that is not silent. `execution_time` is recorded either way.
  pub fn process_command_set(&self, commands: &mut CommandSet) -> Result<()> {
    commands.execution_time = None;
    let mut ctx = UpdateEvaluationContext::with_clock(commands.timeout_ms, self.global_timeout_ms, self.clock.clone());
    ctx.start()?;
    info!(commands = commands.len(), timeout_ms = ctx.timeout(), "processing update command set");
    let result = self.run_set(commands, &ctx);
    ctx.stop();
    let elapsed = ctx.elapsed()?;
    commands.execution_time = Some(Duration::from_millis(elapsed));
    match &result {
      Ok(()) => info!(elapsed_ms = elapsed, "update command set done"),
      Err(e) => info!(elapsed_ms = elapsed, error = %e, "update command set aborted"),
    }
    result
  }

  /// Processes one command under the global timeout only. SILENT hides any
  /// failure except `TimedOut`.
  pub fn process_command(&self, cmd: &UpdateCommand) -> Result<()> {
    let mut ctx = UpdateEvaluationContext::with_clock(0, self.global_timeout_ms, self.clock.clone());
    ctx.start()?;
    let result = self.run(cmd, &ctx);
    ctx.stop();
    result
  }

  pub fn flush(&self) -> Result<()> {
    self.manager.flush()
  }
  pub fn discard(&self) -> Result<()> {
    self.manager.discard()
  }

  fn run_set(&self, commands: &CommandSet, ctx: &UpdateEvaluationContext) -> Result<()> {
    if self.manager.capabilities().supports_native_update {
      return self.manager.update(&commands.to_string())
    }
    for cmd in &commands.commands {
      ctx.check_timeout()?;
      self.run(cmd, ctx)?;
    }
    Ok(())
  }

  fn run(&self, cmd: &UpdateCommand, ctx: &UpdateEvaluationContext) -> Result<()> {
    let caps = self.manager.capabilities();
    if caps.supports_native_update {
      return self.manager.update(&cmd.to_string())
    }
    debug!(command = cmd.name(), "approximating update command");
    match self.approximate(cmd, &caps, ctx) {
      Err(e @ Error::TimedOut { .. }) => Err(e),
      Err(e) if cmd.is_silent() => {
        warn!(command = cmd.name(), error = %e, "ignoring failure of silent command");
        Ok(())
      },
      other => other,
    }
  }

  fn approximate(&self, cmd: &UpdateCommand, caps: &Capabilities, ctx: &UpdateEvaluationContext) -> Result<()> {
    match cmd {
      UpdateCommand::Add(cmd) => self.add(cmd, caps),
      UpdateCommand::Clear(cmd) => self.clear(cmd, caps, ctx, false),
      UpdateCommand::Drop(cmd) => self.clear(cmd, caps, ctx, true),
      UpdateCommand::Copy(cmd) => self.copy(cmd, caps, false),
      UpdateCommand::Move(cmd) => self.copy(cmd, caps, true),
      /* May replace an existing graph, stores cannot be asked whether one exists */
      UpdateCommand::Create(cmd) => {
        require_kind(caps, Some(&cmd.graph), "CREATE")?;
        self.manager.save_graph(&Graph::new(Some(&cmd.graph)))
      },
      UpdateCommand::InsertData(data) => self.insert_data(data, caps),
      UpdateCommand::DeleteData(data) => self.delete_data(data, caps),
      UpdateCommand::Insert(cmd) | UpdateCommand::Delete(cmd) | UpdateCommand::Modify(cmd) => self.modify(cmd, caps),
      UpdateCommand::Load(cmd) => self.load(cmd, caps),
    }
  }

  /* A loaded graph named after the graph it came from */
  fn load_graph(&self, graph_uri: Option<&str>) -> Result<Graph> {
    let mut graph = self.manager.load_graph(graph_uri)?;
    if graph.base_uri() != graph_uri {
      graph.set_base_uri(graph_uri);
    }
    Ok(graph)
  }

  /* Graph management */

  fn add(&self, cmd: &TransferCommand, caps: &Capabilities) -> Result<()> {
    let (source_uri, destination_uri) = (cmd.source.as_deref(), cmd.destination.as_deref());
    if source_uri == destination_uri {
      return Ok(())
    }
    require_kind(caps, source_uri, "ADD")?;
    require_writable(caps, destination_uri, caps.can_add_triples(), "ADD")?;
    let source = self.load_graph(source_uri)?;
    if caps.can_add_triples() {
      return self.manager.update_graph(destination_uri, source.triples(), &[])
    }
    let mut destination = self.load_graph(destination_uri)?;
    destination.merge(&source);
    self.manager.save_graph(&destination)
  }

  fn copy(&self, cmd: &TransferCommand, caps: &Capabilities, remove_source: bool) -> Result<()> {
    let (source_uri, destination_uri) = (cmd.source.as_deref(), cmd.destination.as_deref());
    if source_uri == destination_uri {
      return Ok(())
    }
    let verb = if remove_source { "MOVE" } else { "COPY" };
    require_kind(caps, source_uri, verb)?;
    require_writable(caps, destination_uri, false, verb)?;
    if remove_source && !caps.supports_delete_graph {
      require_writable(caps, source_uri, false, verb)?;
    }
    let mut source = self.load_graph(source_uri)?;
    /* Without the delete the save below could merge instead of replace */
    if caps.supports_delete_graph {
      self.manager.delete_graph(destination_uri).map_err(|e| Error::update_caused_by(
        format!("could not delete {} before overwriting it", describe(destination_uri)), e,
      ))?;
    }
    let mut destination = self.load_graph(destination_uri)?;
    destination.clear();
    destination.merge(&source);
    self.manager.save_graph(&destination)?;
    if !remove_source {
      return Ok(())
    }
    source.clear();
    if caps.supports_delete_graph {
      self.manager.delete_graph(source_uri).map_err(|e| Error::update_caused_by(
        format!("could not delete {} after moving its triples", describe(source_uri)), e,
      ))
    }
    else {
      self.manager.save_graph(&source)
    }
  }

  fn clear(&self, cmd: &ClearCommand, caps: &Capabilities, ctx: &UpdateEvaluationContext, drop: bool) -> Result<()> {
    let verb = if drop { "DROP" } else { "CLEAR" };
    if let Some(graph_uri) = cmd.target.graph_uri() {
      if !drop && !caps.has_graph_kind(graph_uri) {
        return Err(Error::Unsupported(format!("the store has no {} to clear", graph_kind(graph_uri))))
      }
      return self.empty_graph(graph_uri, caps, drop, verb)
    }
    if !drop && !caps.io_behaviour.contains(IoBehaviour::HAS_NAMED_GRAPHS) {
      return Err(Error::Unsupported("the store has no named graphs to clear".to_string()))
    }
    if !caps.supports_list_graphs {
      return Err(Error::Unsupported(format!("{} {} needs a store that can list its graphs", verb, cmd.target)))
    }
    let graphs = self.manager.list_graphs()?;
    let targets = graphs.iter()
      .map(Option::as_deref)
      .filter(|uri| cmd.target == ClearTarget::All || uri.is_some());
    for graph_uri in targets {
      ctx.check_timeout()?;
      self.empty_graph(graph_uri, caps, drop, verb)?;
    }
    Ok(())
  }

  fn empty_graph(&self, graph_uri: Option<&str>, caps: &Capabilities, drop: bool, verb: &str) -> Result<()> {
    if drop && caps.supports_delete_graph {
      return self.manager.delete_graph(graph_uri)
    }
    if caps.can_overwrite(graph_uri) {
      return self.manager.save_graph(&Graph::new(graph_uri))
    }
    if caps.can_delete_triples() {
      let graph = self.manager.load_graph(graph_uri)?;
      return self.manager.update_graph(graph_uri, &[], graph.triples())
    }
    Err(Error::Unsupported(format!(
      "{} cannot be approximated, the store can neither overwrite nor delete triples from {}",
      verb, describe(graph_uri),
    )))
  }

  /* Data */

  fn insert_data(&self, data: &GraphPattern, caps: &Capabilities) -> Result<()> {
    let incremental = caps.can_add_triples();
    let blocks = data_blocks(data, "INSERT DATA")?;
    for block in &blocks {
      require_writable(caps, block.graph, incremental, "INSERT DATA")?;
    }
    for block in blocks {
      let triples = block.triples()?;
      if incremental {
        self.manager.update_graph(block.graph, &triples, &[])?;
      }
      else {
        let mut graph = self.load_graph(block.graph)?;
        graph.assert_all(triples);
        self.manager.save_graph(&graph)?;
      }
    }
    Ok(())
  }

  fn delete_data(&self, data: &GraphPattern, caps: &Capabilities) -> Result<()> {
    let incremental = caps.can_delete_triples();
    let blocks = data_blocks(data, "DELETE DATA")?;
    for block in &blocks {
      require_writable(caps, block.graph, incremental, "DELETE DATA")?;
    }
    for block in blocks {
      let triples = block.triples()?;
      if incremental {
        self.manager.update_graph(block.graph, &[], &triples)?;
        continue
      }
      let mut graph = self.load_graph(block.graph)?;
      if graph.is_empty() {
        continue
      }
      graph.retract_all(&triples);
      self.manager.save_graph(&graph)?;
    }
    Ok(())
  }

  /* Pattern-driven updates */

  fn modify(&self, cmd: &ModifyCommand, caps: &Capabilities) -> Result<()> {
    if !caps.supports_query {
      return Err(Error::Unsupported("INSERT and DELETE with a WHERE clause need a store that answers queries".to_string()))
    }
    let target = cmd.with_graph.as_deref();
    let (delete_incrementally, insert_incrementally) = (caps.can_delete_triples(), caps.can_add_triples());
    for graph_uri in template_targets(&cmd.delete, target) {
      require_writable(caps, graph_uri, delete_incrementally, "DELETE")?;
    }
    for graph_uri in template_targets(&cmd.insert, target) {
      require_writable(caps, graph_uri, insert_incrementally, "INSERT")?;
    }
    let solutions = match self.manager.query(&cmd.where_query())? {
      QueryResults::Solutions(solutions) => solutions,
      QueryResults::Graph(_) => return Err(Error::update("the store did not answer the WHERE clause with solutions")),
    };
    debug!(solutions = solutions.len(), "WHERE clause answered");
    let deletions = Instantiation::build(&cmd.delete, &solutions);
    let insertions = Instantiation::build(&cmd.insert, &solutions);

    if delete_incrementally || insert_incrementally {
      /* Every deletion goes out before any insertion, never in the same call */
      for (graph_uri, triples) in deletions.blocks(target) {
        match delete_incrementally {
          true => self.manager.update_graph(graph_uri, &[], triples)?,
          false => self.rewrite_graph(graph_uri, triples, &[])?,
        }
      }
      for (graph_uri, triples) in insertions.blocks(target) {
        match insert_incrementally {
          true => self.manager.update_graph(graph_uri, triples, &[])?,
          false => self.rewrite_graph(graph_uri, &[], triples)?,
        }
      }
      return Ok(())
    }

    if !deletions.default.is_empty() || !insertions.default.is_empty() {
      self.rewrite_graph(target, &deletions.default, &insertions.default)?;
    }
    let graphs: BTreeSet<&str> = deletions.graphs.keys().chain(insertions.graphs.keys()).map(String::as_str).collect();
    for uri in graphs {
      self.rewrite_graph(Some(uri), deletions.triples_for(uri), insertions.triples_for(uri))?;
    }
    Ok(())
  }

  fn rewrite_graph(&self, graph_uri: Option<&str>, removals: &[Triple], additions: &[Triple]) -> Result<()> {
    let mut graph = self.load_graph(graph_uri)?;
    graph.retract_all(removals);
    graph.assert_all(additions.iter().cloned());
    self.manager.save_graph(&graph)
  }

  fn load(&self, cmd: &LoadCommand, caps: &Capabilities) -> Result<()> {
    let target = cmd.target.as_deref();
    let incremental = caps.can_add_triples();
    require_writable(caps, target, incremental, "LOAD")?;
    let mut graph = match incremental {
      true => Graph::new(target),
      false => self.load_graph(target)?,
    };
    self.loader.load(&cmd.source, &mut graph)?;
    debug!(source = %cmd.source, triples = graph.len(), "loaded external rdf");
    if incremental {
      self.manager.update_graph(target, graph.triples(), &[])
    }
    else {
      self.manager.save_graph(&graph)
    }
  }
}

fn describe(graph_uri: Option<&str>) -> String {
  match graph_uri {
    Some(uri) => format!("graph <{}>", uri),
    None => "the default graph".to_string(),
  }
}

fn graph_kind(graph_uri: Option<&str>) -> &'static str {
  match graph_uri {
    Some(_) => "named graphs",
    None => "default graph",
  }
}

/* Capability preconditions, checked before a command touches the store */

fn require_kind(caps: &Capabilities, graph_uri: Option<&str>, verb: &str) -> Result<()> {
  if !caps.has_graph_kind(graph_uri) {
    return Err(Error::Unsupported(format!("{} needs {} but the store has none", verb, graph_kind(graph_uri))))
  }
  Ok(())
}

/* Writable either triple by triple or by saving the whole graph over itself */
fn require_writable(caps: &Capabilities, graph_uri: Option<&str>, incremental: bool, verb: &str) -> Result<()> {
  require_kind(caps, graph_uri, verb)?;
  if !incremental && !caps.can_overwrite(graph_uri) {
    return Err(Error::Unsupported(format!(
      "{} cannot be approximated, the store can neither update nor overwrite {}", verb, describe(graph_uri),
    )))
  }
  Ok(())
}

/* The graphs a template writes to: the target for its own triples, a
  stand-in named graph for each GRAPH block */
fn template_targets<'a>(template: &'a GraphPattern, target: Option<&'a str>) -> Vec<Option<&'a str>> {
  let (own, blocks) = template_parts(template);
  let mut targets = Vec::new();
  if !own.is_empty() {
    targets.push(target);
  }
  targets.extend(blocks.iter().filter_map(|block| block.graph_specifier()).map(|spec| Some(match spec {
    GraphSpecifier::Uri(name) | GraphSpecifier::Variable(name) | GraphSpecifier::QName(name) => name.as_str(),
  })));
  targets
}

/* A template that is itself a GRAPH block has no triples of its own */
fn template_parts(template: &GraphPattern) -> (&[TriplePattern], &[GraphPattern]) {
  match &template.kind {
    PatternKind::Graph(_) => (&[][..], std::slice::from_ref(template)),
    _ => (template.triples.as_slice(), template.children.as_slice()),
  }
}

/* Data blocks */

/// Ground triples destined for one graph.
struct DataBlock<'a> {
  graph: Option<&'a str>,
  patterns: &'a [TriplePattern],
}

impl DataBlock<'_> {
  fn triples(&self) -> Result<Vec<Triple>> {
    self.patterns.iter()
      .map(|pattern| match pattern.items() {
        [PatternItem::Node(s), PatternItem::Node(p), PatternItem::Node(o)] => Ok(Triple::new(s.clone(), p.clone(), o.clone())),
        _ => Err(Error::Unsupported(format!("{} is not a concrete triple", pattern))),
      })
      .collect()
  }
}

fn not_flat(verb: &str) -> Error {
  Error::Unsupported(format!("{} only accepts triples and GRAPH blocks, nothing nested", verb))
}

/// Splits data into a default-graph block and one block per GRAPH,
/// rejecting anything that would need pattern solving.
fn data_blocks<'a>(data: &'a GraphPattern, verb: &str) -> Result<Vec<DataBlock<'a>>> {
  let mut blocks = Vec::new();
  match &data.kind {
    PatternKind::Graph(spec) => blocks.push(graph_block(data, spec, verb)?),
    PatternKind::Group => {
      if !data.triples.is_empty() {
        blocks.push(ground_block(None, &data.triples, verb)?);
      }
      for child in &data.children {
        match &child.kind {
          PatternKind::Graph(spec) => blocks.push(graph_block(child, spec, verb)?),
          PatternKind::Group if child.children.is_empty() => blocks.push(ground_block(None, &child.triples, verb)?),
          _ => return Err(not_flat(verb)),
        }
      }
    },
    _ => return Err(not_flat(verb)),
  }
  Ok(blocks)
}

fn graph_block<'a>(block: &'a GraphPattern, spec: &'a GraphSpecifier, verb: &str) -> Result<DataBlock<'a>> {
  if !block.children.is_empty() {
    return Err(not_flat(verb))
  }
  let uri = match spec {
    GraphSpecifier::Uri(uri) => uri.as_str(),
    GraphSpecifier::QName(qname) => return Err(Error::Unsupported(format!(
      "{} graph {} must be given as an absolute URI", verb, qname,
    ))),
    GraphSpecifier::Variable(name) => return Err(Error::update(format!(
      "{} cannot target graph ?{}, data blocks must name their graph", verb, name,
    ))),
  };
  ground_block(Some(uri), &block.triples, verb)
}

fn ground_block<'a>(graph: Option<&'a str>, patterns: &'a [TriplePattern], verb: &str) -> Result<DataBlock<'a>> {
  if let Some(open) = patterns.iter().find(|p| !p.is_ground()) {
    return Err(Error::Unsupported(format!("{} only accepts concrete triples, found {}", verb, open)))
  }
  Ok(DataBlock { graph, patterns })
}

/* Templates */

/// Triples a template produces over a solution sequence, split by graph.
#[derive(Debug, Default)]
struct Instantiation {
  default: Vec<Triple>,
  graphs: BTreeMap<String, Vec<Triple>>,
}

impl Instantiation {
  fn build(template: &GraphPattern, solutions: &[Solution]) -> Self {
    let mut out = Instantiation::default();
    let (own, blocks) = template_parts(template);
    for (index, solution) in solutions.iter().enumerate() {
      out.default.extend(own.iter().filter_map(|p| construct(p, solution, index)));
      for block in blocks {
        /* A graph that does not resolve to an IRI drops this solution's block */
        let uri = match block.graph_specifier() {
          Some(GraphSpecifier::Uri(uri)) => uri.clone(),
          Some(GraphSpecifier::Variable(name)) => match solution.get(name).and_then(iri_of) {
            Some(uri) => uri,
            None => continue,
          },
          _ => continue,
        };
        let triples: Vec<Triple> = block.triples.iter().filter_map(|p| construct(p, solution, index)).collect();
        if !triples.is_empty() {
          out.graphs.entry(uri).or_default().extend(triples);
        }
      }
    }
    out
  }

  /* Non-empty triple lists by graph, the default part going to `target` */
  fn blocks<'a>(&'a self, target: Option<&'a str>) -> impl Iterator<Item = (Option<&'a str>, &'a [Triple])> + 'a {
    std::iter::once((target, self.default.as_slice()))
      .chain(self.graphs.iter().map(|(uri, triples)| (Some(uri.as_str()), triples.as_slice())))
      .filter(|(_, triples)| !triples.is_empty())
  }

  fn triples_for(&self, uri: &str) -> &[Triple] {
    self.graphs.get(uri).map_or(&[][..], Vec::as_slice)
  }
}

fn iri_of(node: &Node) -> Option<String> {
  match node.value().ok()? {
    RdfNode::Named { iri } => Some(iri.clone()),
    _ => None,
  }
}

/* None when a variable is unbound or the triple would not be valid RDF */
fn construct(pattern: &TriplePattern, solution: &Solution, index: usize) -> Option<Triple> {
  let subject = bind(&pattern.subject, solution, index)?;
  if subject.kind() == NodeKind::Literal {
    return None
  }
  let predicate = bind(&pattern.predicate, solution, index)?;
  if predicate.kind() != NodeKind::Uri {
    return None
  }
  let object = bind(&pattern.object, solution, index)?;
  Some(Triple::new(subject, predicate, object))
}

/* Template blank nodes get a fresh label for every solution */
fn bind(item: &PatternItem, solution: &Solution, index: usize) -> Option<Node> {
  match item {
    PatternItem::Variable(name) => solution.get(name).cloned(),
    PatternItem::Node(node) if node.is_blank() => match node.value().ok()? {
      RdfNode::Blank { id, .. } => Some(RdfNode::blank(format!("{}_s{}", id, index)).into()),
      _ => None,
    },
    PatternItem::Node(node) => Some(node.clone()),
  }
}
