use {
  std::time::Duration,
  crate::{
    query::algebra::{PatternItem, TriplePattern},
    update::manager::SelectQuery,
  },
};

/* Patterns */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphSpecifier {
  Uri(String),
  /// Variable name without the `?`.
  Variable(String),
  /// Prefixed name left unexpanded by the parser.
  QName(String),
}

impl std::fmt::Display for GraphSpecifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      GraphSpecifier::Uri(uri) => write!(f, "<{}>", uri),
      GraphSpecifier::Variable(name) => write!(f, "?{}", name),
      GraphSpecifier::QName(qname) => write!(f, "{}", qname),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
  Group,
  Graph(GraphSpecifier),
  Optional,
  /// Alternatives are the children.
  Union,
  Minus,
  Exists,
  NotExists,
  Service(String),
  SubQuery,
}

/// A group graph pattern as it appears in update commands: triple
/// patterns plus nested blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPattern {
  pub kind: PatternKind,
  pub triples: Vec<TriplePattern>,
  pub children: Vec<GraphPattern>,
}

impl GraphPattern {
  pub fn group(triples: Vec<TriplePattern>) -> Self {
    GraphPattern { kind: PatternKind::Group, triples, children: Vec::new() }
  }
  pub fn graph(specifier: GraphSpecifier, triples: Vec<TriplePattern>) -> Self {
    GraphPattern { kind: PatternKind::Graph(specifier), triples, children: Vec::new() }
  }
  pub fn nested(kind: PatternKind, triples: Vec<TriplePattern>) -> Self {
    GraphPattern { kind, triples, children: Vec::new() }
  }
  pub fn with_child(mut self, child: GraphPattern) -> Self {
    self.children.push(child);
    self
  }
  pub fn is_graph(&self) -> bool {
    matches!(self.kind, PatternKind::Graph(_))
  }
  pub fn graph_specifier(&self) -> Option<&GraphSpecifier> {
    match &self.kind {
      PatternKind::Graph(spec) => Some(spec),
      _ => None,
    }
  }
  pub fn is_empty(&self) -> bool {
    self.triples.is_empty() && self.children.is_empty()
  }
  /// True when no triple pattern anywhere in the block uses a variable.
  pub fn is_ground(&self) -> bool {
    self.triples.iter().all(TriplePattern::is_ground) && self.children.iter().all(GraphPattern::is_ground)
  }

  fn fmt_block(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{{ ")?;
    for triple in &self.triples {
      write!(f, "{} . ", triple)?;
    }
    for child in &self.children {
      write!(f, "{} ", child)?;
    }
    write!(f, "}}")
  }
}

impl std::fmt::Display for GraphPattern {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.kind {
      PatternKind::Group => self.fmt_block(f),
      PatternKind::Graph(spec) => {
        write!(f, "GRAPH {} ", spec)?;
        self.fmt_block(f)
      },
      PatternKind::Optional => {
        write!(f, "OPTIONAL ")?;
        self.fmt_block(f)
      },
      PatternKind::Union => {
        for (i, child) in self.children.iter().enumerate() {
          if i > 0 {
            write!(f, " UNION ")?;
          }
          write!(f, "{}", child)?;
        }
        Ok(())
      },
      PatternKind::Minus => {
        write!(f, "MINUS ")?;
        self.fmt_block(f)
      },
      PatternKind::Exists => {
        write!(f, "FILTER EXISTS ")?;
        self.fmt_block(f)
      },
      PatternKind::NotExists => {
        write!(f, "FILTER NOT EXISTS ")?;
        self.fmt_block(f)
      },
      PatternKind::Service(uri) => {
        write!(f, "SERVICE <{}> ", uri)?;
        self.fmt_block(f)
      },
      PatternKind::SubQuery => {
        write!(f, "{{ SELECT * WHERE ")?;
        self.fmt_block(f)?;
        write!(f, " }}")
      },
    }
  }
}

/* Commands */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
  Default,
  Graph(String),
  Named,
  All,
}

impl ClearTarget {
  /// The single graph this target names, if it names one.
  pub fn graph_uri(&self) -> Option<Option<&str>> {
    match self {
      ClearTarget::Default => Some(None),
      ClearTarget::Graph(uri) => Some(Some(uri)),
      ClearTarget::Named | ClearTarget::All => None,
    }
  }
}

impl std::fmt::Display for ClearTarget {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ClearTarget::Default => write!(f, "DEFAULT"),
      ClearTarget::Graph(uri) => write!(f, "GRAPH <{}>", uri),
      ClearTarget::Named => write!(f, "NAMED"),
      ClearTarget::All => write!(f, "ALL"),
    }
  }
}

/// ADD, COPY and MOVE. `None` is the default graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
  pub source: Option<String>,
  pub destination: Option<String>,
  pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearCommand {
  pub target: ClearTarget,
  pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCommand {
  pub graph: String,
  pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCommand {
  pub source: String,
  pub target: Option<String>,
  pub silent: bool,
}

/// INSERT, DELETE and DELETE/INSERT with a WHERE clause. An absent
/// template is an empty group.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyCommand {
  pub delete: GraphPattern,
  pub insert: GraphPattern,
  pub where_pattern: GraphPattern,
  pub with_graph: Option<String>,
  pub using: Vec<String>,
  pub using_named: Vec<String>,
}

impl ModifyCommand {
  pub fn new(delete: GraphPattern, insert: GraphPattern, where_pattern: GraphPattern) -> Self {
    ModifyCommand {
      delete,
      insert,
      where_pattern,
      with_graph: None,
      using: Vec::new(),
      using_named: Vec::new(),
    }
  }
  pub fn with_graph(mut self, uri: &str) -> Self {
    self.with_graph = Some(uri.to_string());
    self
  }
  pub fn using(mut self, uri: &str) -> Self {
    self.using.push(uri.to_string());
    self
  }
  pub fn using_named(mut self, uri: &str) -> Self {
    self.using_named.push(uri.to_string());
    self
  }

  /// The query answering the WHERE clause. USING graphs form the default
  /// graph, falling back to the WITH graph when there are none.
  pub fn where_query(&self) -> SelectQuery {
    let default_graphs = match (self.using.is_empty(), &self.with_graph) {
      (true, Some(uri)) => vec![uri.clone()],
      _ => self.using.clone(),
    };
    SelectQuery {
      pattern: self.where_pattern.clone(),
      default_graphs,
      named_graphs: self.using_named.clone(),
    }
  }

  /// Variables the templates read from each solution.
  pub fn template_variables(&self) -> Vec<&str> {
    let mut names = Vec::new();
    collect_variables(&self.delete, &mut names);
    collect_variables(&self.insert, &mut names);
    names
  }

  fn fmt_with(&self, f: &mut std::fmt::Formatter<'_>, delete: bool, insert: bool) -> std::fmt::Result {
    if let Some(uri) = &self.with_graph {
      writeln!(f, "WITH <{}>", uri)?;
    }
    if delete {
      writeln!(f, "DELETE {}", self.delete)?;
    }
    if insert {
      writeln!(f, "INSERT {}", self.insert)?;
    }
    for uri in &self.using {
      writeln!(f, "USING <{}>", uri)?;
    }
    for uri in &self.using_named {
      writeln!(f, "USING NAMED <{}>", uri)?;
    }
    write!(f, "WHERE {}", self.where_pattern)
  }
}

fn collect_variables<'a>(pattern: &'a GraphPattern, names: &mut Vec<&'a str>) {
  if let PatternKind::Graph(GraphSpecifier::Variable(name)) = &pattern.kind {
    if !names.contains(&name.as_str()) {
      names.push(name);
    }
  }
  for triple in &pattern.triples {
    for item in triple.items() {
      if let PatternItem::Variable(name) = item {
        if !names.contains(&name.as_str()) {
          names.push(name);
        }
      }
    }
  }
  for child in &pattern.children {
    collect_variables(child, names);
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateCommand {
  Add(TransferCommand),
  Clear(ClearCommand),
  Copy(TransferCommand),
  Create(CreateCommand),
  Delete(ModifyCommand),
  DeleteData(GraphPattern),
  Drop(ClearCommand),
  Insert(ModifyCommand),
  InsertData(GraphPattern),
  Load(LoadCommand),
  Modify(ModifyCommand),
  Move(TransferCommand),
}

impl UpdateCommand {
  pub fn name(&self) -> &'static str {
    match self {
      UpdateCommand::Add(_) => "ADD",
      UpdateCommand::Clear(_) => "CLEAR",
      UpdateCommand::Copy(_) => "COPY",
      UpdateCommand::Create(_) => "CREATE",
      UpdateCommand::Delete(_) => "DELETE",
      UpdateCommand::DeleteData(_) => "DELETE DATA",
      UpdateCommand::Drop(_) => "DROP",
      UpdateCommand::Insert(_) => "INSERT",
      UpdateCommand::InsertData(_) => "INSERT DATA",
      UpdateCommand::Load(_) => "LOAD",
      UpdateCommand::Modify(_) => "DELETE/INSERT",
      UpdateCommand::Move(_) => "MOVE",
    }
  }

  /// Only graph management and LOAD carry SILENT.
  pub fn is_silent(&self) -> bool {
    match self {
      UpdateCommand::Add(cmd) | UpdateCommand::Copy(cmd) | UpdateCommand::Move(cmd) => cmd.silent,
      UpdateCommand::Clear(cmd) | UpdateCommand::Drop(cmd) => cmd.silent,
      UpdateCommand::Create(cmd) => cmd.silent,
      UpdateCommand::Load(cmd) => cmd.silent,
      _ => false,
    }
  }
}

fn silent_keyword(silent: bool) -> &'static str {
  if silent { " SILENT" } else { "" }
}

fn graph_ref(uri: &Option<String>) -> String {
  match uri {
    Some(uri) => format!("<{}>", uri),
    None => "DEFAULT".to_string(),
  }
}

impl std::fmt::Display for UpdateCommand {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      UpdateCommand::Add(cmd) | UpdateCommand::Copy(cmd) | UpdateCommand::Move(cmd) => write!(
        f, "{}{} {} TO {}",
        self.name(), silent_keyword(cmd.silent), graph_ref(&cmd.source), graph_ref(&cmd.destination)
      ),
      UpdateCommand::Clear(cmd) | UpdateCommand::Drop(cmd) => write!(
        f, "{}{} {}", self.name(), silent_keyword(cmd.silent), cmd.target
      ),
      UpdateCommand::Create(cmd) => write!(f, "CREATE{} GRAPH <{}>", silent_keyword(cmd.silent), cmd.graph),
      UpdateCommand::InsertData(data) | UpdateCommand::DeleteData(data) => write!(f, "{} {}", self.name(), data),
      UpdateCommand::Insert(cmd) => cmd.fmt_with(f, false, true),
      UpdateCommand::Delete(cmd) => cmd.fmt_with(f, true, false),
      UpdateCommand::Modify(cmd) => cmd.fmt_with(f, true, true),
      UpdateCommand::Load(cmd) => {
        write!(f, "LOAD{} <{}>", silent_keyword(cmd.silent), cmd.source)?;
        match &cmd.target {
          Some(uri) => write!(f, " INTO GRAPH <{}>", uri),
          None => Ok(()),
        }
      },
    }
  }
}

/// A sequence of commands processed in order under one timeout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandSet {
  pub commands: Vec<UpdateCommand>,
  /// Milliseconds, `0` for no limit of its own.
  pub timeout_ms: u64,
  /// Set by the processor, including when processing fails.
  pub execution_time: Option<Duration>,
}

impl CommandSet {
  pub fn new(commands: Vec<UpdateCommand>) -> Self {
    CommandSet { commands, ..Default::default() }
  }
  pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = timeout_ms;
    self
  }
  pub fn len(&self) -> usize {
    self.commands.len()
  }
  pub fn is_empty(&self) -> bool {
    self.commands.is_empty()
  }
}

impl std::fmt::Display for CommandSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    for (i, cmd) in self.commands.iter().enumerate() {
      if i > 0 {
        write!(f, " ;\n")?;
      }
      write!(f, "{}", cmd)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod unit_tests {
  use {
    super::*,
    crate::RdfNode,
  };

  fn pattern(s: PatternItem, p: &str, o: PatternItem) -> TriplePattern {
    TriplePattern::new(s, PatternItem::node(RdfNode::named(p)), o)
  }

  #[test]
  fn graph_management_text() {
    let add = UpdateCommand::Add(TransferCommand {
      source: None,
      destination: Some("http://d".into()),
      silent: true,
    });
    assert_eq!(add.to_string(), "ADD SILENT DEFAULT TO <http://d>");
    let clear = UpdateCommand::Clear(ClearCommand { target: ClearTarget::Graph("http://g".into()), silent: false });
    assert_eq!(clear.to_string(), "CLEAR GRAPH <http://g>");
    let drop = UpdateCommand::Drop(ClearCommand { target: ClearTarget::All, silent: true });
    assert_eq!(drop.to_string(), "DROP SILENT ALL");
    let load = UpdateCommand::Load(LoadCommand { source: "file:///a.ttl".into(), target: Some("http://g".into()), silent: false });
    assert_eq!(load.to_string(), "LOAD <file:///a.ttl> INTO GRAPH <http://g>");
  }

  #[test]
  fn data_text() {
    let data = GraphPattern::group(vec![pattern(
      PatternItem::node(RdfNode::named("http://a")), "http://b", PatternItem::node(RdfNode::literal("c")),
    )]).with_child(GraphPattern::graph(GraphSpecifier::Uri("http://g".into()), vec![]));
    let cmd = UpdateCommand::InsertData(data);
    assert_eq!(cmd.to_string(), "INSERT DATA { <http://a> <http://b> \"c\" . GRAPH <http://g> { } }");
  }

  #[test]
  fn where_query_prefers_using_over_with() {
    let where_pattern = GraphPattern::group(vec![pattern(
      PatternItem::var("s"), "http://p", PatternItem::var("o"),
    )]);
    let cmd = ModifyCommand::new(GraphPattern::group(vec![]), GraphPattern::group(vec![]), where_pattern)
      .with_graph("http://w");
    assert_eq!(cmd.where_query().default_graphs, vec!["http://w".to_string()]);
    let cmd = cmd.using("http://u").using_named("http://n");
    let query = cmd.where_query();
    assert_eq!(query.default_graphs, vec!["http://u".to_string()]);
    assert_eq!(query.named_graphs, vec!["http://n".to_string()]);
  }

  #[test]
  fn modify_text_orders_clauses() {
    let delete = GraphPattern::group(vec![pattern(PatternItem::var("x"), "http://b", PatternItem::node(RdfNode::named("http://c")))]);
    let insert = GraphPattern::group(vec![]).with_child(GraphPattern::graph(
      GraphSpecifier::Variable("g".into()),
      vec![pattern(PatternItem::var("x"), "http://b", PatternItem::var("y"))],
    ));
    let cmd = ModifyCommand::new(delete, insert, GraphPattern::group(vec![])).with_graph("http://w");
    assert_eq!(cmd.template_variables(), vec!["x", "g", "y"]);
    let text = UpdateCommand::Modify(cmd).to_string();
    assert_eq!(
      text,
      "WITH <http://w>\nDELETE { ?x <http://b> <http://c> . }\nINSERT { GRAPH ?g { ?x <http://b> ?y . } }\nWHERE { }"
    );
  }

  #[test]
  fn silence_is_per_command() {
    let clear = UpdateCommand::Clear(ClearCommand { target: ClearTarget::Default, silent: true });
    assert!(clear.is_silent());
    assert!(!UpdateCommand::InsertData(GraphPattern::group(vec![])).is_silent());
    let set = CommandSet::new(vec![clear.clone(), clear]).with_timeout(10);
    assert_eq!(set.to_string(), "CLEAR SILENT DEFAULT ;\nCLEAR SILENT DEFAULT");
    assert_eq!(set.timeout_ms, 10);
    assert!(set.execution_time.is_none());
  }

  #[test]
  fn ground_patterns() {
    let ground = GraphPattern::group(vec![pattern(
      PatternItem::node(RdfNode::blank("b")), "http://p", PatternItem::node(RdfNode::literal("x")),
    )]);
    assert!(ground.is_ground());
    let open = ground.clone().with_child(GraphPattern::graph(
      GraphSpecifier::Uri("http://g".into()),
      vec![pattern(PatternItem::var("s"), "http://p", PatternItem::var("o"))],
    ));
    assert!(!open.is_ground());
  }
}
