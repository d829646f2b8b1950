/*
  Query algebra as handed over by the parser. Only BGPs and the constant
  terms inside them matter to the optimisers here; every other operator is
  carried through as structure.
*/

use crate::rdf::node::Node;

#[derive(Debug, Clone, PartialEq)]
pub enum PatternItem {
  /// Variable name without the `?`.
  Variable(String),
  Node(Node),
}

impl PatternItem {
  pub fn var(name: &str) -> Self {
    PatternItem::Variable(name.to_string())
  }
  pub fn node(node: impl Into<Node>) -> Self {
    PatternItem::Node(node.into())
  }
  pub fn is_variable(&self) -> bool {
    matches!(self, PatternItem::Variable(_))
  }
  pub fn as_node(&self) -> Option<&Node> {
    match self {
      PatternItem::Node(node) => Some(node),
      PatternItem::Variable(_) => None,
    }
  }
}

impl std::fmt::Display for PatternItem {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PatternItem::Variable(name) => write!(f, "?{}", name),
      PatternItem::Node(node) => write!(f, "{}", node),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriplePattern {
  pub subject: PatternItem,
  pub predicate: PatternItem,
  pub object: PatternItem,
}

impl TriplePattern {
  pub fn new(subject: PatternItem, predicate: PatternItem, object: PatternItem) -> Self {
    TriplePattern { subject, predicate, object }
  }
  pub fn items(&self) -> [&PatternItem; 3] {
    [&self.subject, &self.predicate, &self.object]
  }
  pub fn is_ground(&self) -> bool {
    self.items().iter().all(|item| !item.is_variable())
  }
}

impl std::fmt::Display for TriplePattern {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {} {}", self.subject, self.predicate, self.object)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
  Variable(String),
  Constant(Node),
  Function { name: String, args: Vec<Expression> },
  Binary { op: String, left: Box<Expression>, right: Box<Expression> },
  Unary { op: String, inner: Box<Expression> },
  Bound(String),
  Exists(Box<Algebra>),
  NotExists(Box<Algebra>),
}

impl Expression {
  pub fn binary(op: &str, left: Expression, right: Expression) -> Self {
    Expression::Binary { op: op.to_string(), left: Box::new(left), right: Box::new(right) }
  }
}

/// One entry of a BGP in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub enum BgpItem {
  Triple(TriplePattern),
  Filter(Expression),
  Bind { expression: Expression, variable: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Algebra {
  Bgp(Vec<BgpItem>),
  Join(Box<Algebra>, Box<Algebra>),
  LeftJoin { left: Box<Algebra>, right: Box<Algebra>, filter: Option<Expression> },
  Union(Box<Algebra>, Box<Algebra>),
  Minus(Box<Algebra>, Box<Algebra>),
  Filter { inner: Box<Algebra>, expression: Expression },
  Extend { inner: Box<Algebra>, expression: Expression, variable: String },
  Graph { name: PatternItem, inner: Box<Algebra> },
  Project { inner: Box<Algebra>, variables: Vec<String> },
  Distinct(Box<Algebra>),
  Reduced(Box<Algebra>),
  Slice { inner: Box<Algebra>, offset: usize, limit: Option<usize> },
  /// Conditions paired with ascending (`true`) or descending order.
  OrderBy { inner: Box<Algebra>, conditions: Vec<(Expression, bool)> },
  Table { variables: Vec<String>, rows: Vec<Vec<Option<Node>>> },
  /// No solutions at all.
  Zero { variables: Vec<String> },
}

impl Algebra {
  pub fn bgp(triples: Vec<TriplePattern>) -> Self {
    Algebra::Bgp(triples.into_iter().map(BgpItem::Triple).collect())
  }

  pub fn is_empty_bgp(&self) -> bool {
    matches!(self, Algebra::Bgp(items) if items.is_empty())
  }

  /// Joins two operators, an empty BGP on either side being the identity.
  pub fn join(left: Algebra, right: Algebra) -> Self {
    if left.is_empty_bgp() {
      right
    }
    else if right.is_empty_bgp() {
      left
    }
    else {
      Algebra::Join(Box::new(left), Box::new(right))
    }
  }

  pub fn union(left: Algebra, right: Algebra) -> Self {
    Algebra::Union(Box::new(left), Box::new(right))
  }

  /// Variables the operator can bind, in first-seen order.
  pub fn variables(&self) -> Vec<String> {
    let mut vars = Vec::new();
    self.collect_variables(&mut vars);
    vars
  }

  fn collect_variables(&self, vars: &mut Vec<String>) {
    fn add(name: &String, vars: &mut Vec<String>) {
      if !vars.contains(name) {
        vars.push(name.clone());
      }
    }
    match self {
      Algebra::Bgp(items) => for item in items {
        match item {
          BgpItem::Triple(triple) => for pos in triple.items() {
            if let PatternItem::Variable(name) = pos {
              add(name, vars);
            }
          },
          BgpItem::Bind { variable, .. } => add(variable, vars),
          BgpItem::Filter(_) => {},
        }
      },
      Algebra::Join(left, right)
      | Algebra::Union(left, right)
      | Algebra::LeftJoin { left, right, .. } => {
        left.collect_variables(vars);
        right.collect_variables(vars);
      },
      Algebra::Minus(left, _) => left.collect_variables(vars),
      Algebra::Extend { inner, variable, .. } => {
        inner.collect_variables(vars);
        add(variable, vars);
      },
      Algebra::Graph { name, inner } => {
        if let PatternItem::Variable(name) = name {
          add(name, vars);
        }
        inner.collect_variables(vars);
      },
      Algebra::Project { variables, .. }
      | Algebra::Table { variables, .. }
      | Algebra::Zero { variables } => for name in variables {
        add(name, vars);
      },
      Algebra::Filter { inner, .. }
      | Algebra::Distinct(inner)
      | Algebra::Reduced(inner)
      | Algebra::Slice { inner, .. }
      | Algebra::OrderBy { inner, .. } => inner.collect_variables(vars),
    }
  }
}

#[cfg(test)]
mod unit_tests {
  use {
    super::*,
    crate::RdfNode,
  };

  fn tp(s: &str, p: &str, o: &str) -> TriplePattern {
    let item = |x: &str| match x.strip_prefix('?') {
      Some(name) => PatternItem::var(name),
      None => PatternItem::node(RdfNode::named(x)),
    };
    TriplePattern::new(item(s), item(p), item(o))
  }

  #[test]
  fn empty_bgps_vanish_from_joins() {
    let bgp = Algebra::bgp(vec![tp("?s", "http://p", "?o")]);
    assert_eq!(Algebra::join(Algebra::Bgp(vec![]), bgp.clone()), bgp);
    assert_eq!(Algebra::join(bgp.clone(), Algebra::Bgp(vec![])), bgp);
    assert!(matches!(Algebra::join(bgp.clone(), bgp), Algebra::Join(..)));
  }

  #[test]
  fn variables_in_first_seen_order() {
    let algebra = Algebra::Extend {
      inner: Box::new(Algebra::union(
        Algebra::bgp(vec![tp("?s", "http://p", "?o")]),
        Algebra::bgp(vec![tp("?x", "http://p", "?s")]),
      )),
      expression: Expression::Variable("o".into()),
      variable: "z".into(),
    };
    assert_eq!(algebra.variables(), vec!["s", "o", "x", "z"]);
  }

  #[test]
  fn ground_patterns_have_no_variables() {
    assert!(tp("http://a", "http://p", "http://b").is_ground());
    assert!(!tp("?a", "http://p", "http://b").is_ground());
    assert_eq!(tp("?a", "http://p", "http://b").to_string(), "?a <http://p> <http://b>");
  }
}
