use {
  std::sync::Arc,
  tracing::debug,
  crate::{
    errors::Result,
    query::algebra::{Algebra, BgpItem, Expression, PatternItem, TriplePattern},
    rdf::node::Node,
    virtualisation::{
      node::VirtualNode,
      provider::{resolve_id, VirtualRdfProvider},
    },
  },
};

/// A rewrite applied to algebra before evaluation. Optimisers never fail:
/// whatever they cannot rewrite they leave as it was.
pub trait AlgebraOptimiser: Send + Sync {
  fn optimise(&self, algebra: Algebra) -> Algebra;

  fn is_applicable(&self, _algebra: &Algebra) -> bool {
    true
  }
}

/// Ordered optimisers for one evaluator, built by whoever assembles it.
#[derive(Default)]
pub struct OptimiserPipeline {
  optimisers: Vec<Box<dyn AlgebraOptimiser>>,
}

impl OptimiserPipeline {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn with(mut self, optimiser: impl AlgebraOptimiser + 'static) -> Self {
    self.optimisers.push(Box::new(optimiser));
    self
  }
  pub fn len(&self) -> usize {
    self.optimisers.len()
  }
  pub fn is_empty(&self) -> bool {
    self.optimisers.is_empty()
  }
  pub fn optimise(&self, algebra: Algebra) -> Algebra {
    self.optimisers.iter().fold(algebra, |algebra, optimiser| {
      if optimiser.is_applicable(&algebra) {
        optimiser.optimise(algebra)
      }
      else {
        algebra
      }
    })
  }
}

/* Virtualisation */

/// Outcome of looking a constant up in the provider.
enum Resolution {
  Virtual(Node),
  /// The store has never seen the term, so nothing can match it.
  Absent,
  Unchanged,
}

/// Swaps constant terms in BGPs and expressions for virtual nodes so the
/// evaluator compares surrogate IDs, and replaces any BGP holding a term
/// the store does not know with `Zero`.
pub struct AlgebraVirtualizer {
  provider: Arc<dyn VirtualRdfProvider>,
}

impl AlgebraVirtualizer {
  pub fn new(provider: Arc<dyn VirtualRdfProvider>) -> Self {
    AlgebraVirtualizer { provider }
  }

  fn resolve(&self, node: &Node) -> Resolution {
    /* Blank nodes in patterns act as variables */
    if node.is_blank() || node.virtual_id_for(&self.provider).is_some() {
      return Resolution::Unchanged
    }
    match self.virtualise(node) {
      Ok(Some(virt)) => Resolution::Virtual(virt),
      Ok(None) => Resolution::Absent,
      Err(e) => {
        debug!(node = %node, error = %e, "leaving term unvirtualised");
        Resolution::Unchanged
      },
    }
  }

  fn virtualise(&self, node: &Node) -> Result<Option<Node>> {
    let id = resolve_id(&self.provider, node, false)?;
    if id == self.provider.null_id() || !id.is_assigned() {
      return Ok(None)
    }
    let value = node.value()?.clone();
    Ok(Some(VirtualNode::with_value(id, self.provider.clone(), None, value)?.into()))
  }

  /* Some(None): the pattern can never match. None: nothing was rewritten. */
  fn virtualise_triple(&self, triple: &TriplePattern) -> Option<Option<TriplePattern>> {
    let mut rewritten = false;
    let mut items = Vec::with_capacity(3);
    for item in triple.items() {
      let node = match item {
        PatternItem::Node(node) => node,
        PatternItem::Variable(_) => {
          items.push(item.clone());
          continue
        },
      };
      match self.resolve(node) {
        Resolution::Virtual(virt) => {
          rewritten = true;
          items.push(PatternItem::Node(virt));
        },
        Resolution::Absent => return Some(None),
        Resolution::Unchanged => items.push(item.clone()),
      }
    }
    if !rewritten {
      return None
    }
    let mut items = items.into_iter();
    match (items.next(), items.next(), items.next()) {
      (Some(s), Some(p), Some(o)) => Some(Some(TriplePattern::new(s, p, o))),
      _ => None,
    }
  }

  /// Rewrites constants inside an expression. Constants the store does not
  /// know are kept as values.
  pub fn virtualise_expression(&self, expression: Expression) -> Expression {
    self.rewrite_expression(expression, &mut false)
  }

  fn rewrite_expression(&self, expression: Expression, changed: &mut bool) -> Expression {
    match expression {
      Expression::Constant(node) => match self.resolve(&node) {
        Resolution::Virtual(virt) => {
          *changed = true;
          Expression::Constant(virt)
        },
        Resolution::Absent | Resolution::Unchanged => Expression::Constant(node),
      },
      Expression::Function { name, args } => Expression::Function {
        name,
        args: args.into_iter().map(|arg| self.rewrite_expression(arg, changed)).collect(),
      },
      Expression::Binary { op, left, right } => Expression::Binary {
        op,
        left: Box::new(self.rewrite_expression(*left, changed)),
        right: Box::new(self.rewrite_expression(*right, changed)),
      },
      Expression::Unary { op, inner } => Expression::Unary {
        op,
        inner: Box::new(self.rewrite_expression(*inner, changed)),
      },
      Expression::Exists(inner) => Expression::Exists(self.boxed(inner, changed)),
      Expression::NotExists(inner) => Expression::NotExists(self.boxed(inner, changed)),
      other @ (Expression::Variable(_) | Expression::Bound(_)) => other,
    }
  }

  /*
    Filters and binds only see the triple patterns before them, so each one
    closes the run of triples accumulated so far: the run is joined onto
    the result and the filter or bind wraps that join.
  */
  fn virtualise_bgp(&self, items: Vec<BgpItem>, changed: &mut bool) -> Algebra {
    let mut result = Algebra::Bgp(Vec::new());
    let mut run: Vec<BgpItem> = Vec::new();
    let mut rewritten = false;
    for item in &items {
      match item {
        BgpItem::Triple(triple) => match self.virtualise_triple(triple) {
          Some(Some(virt)) => {
            rewritten = true;
            run.push(BgpItem::Triple(virt));
          },
          Some(None) => {
            let variables = Algebra::Bgp(items.clone()).variables();
            debug!(pattern = %triple, "constant unknown to the store, pattern cannot match");
            *changed = true;
            return Algebra::Zero { variables }
          },
          None => run.push(item.clone()),
        },
        BgpItem::Filter(expression) => {
          let virt = self.rewrite_expression(expression.clone(), &mut rewritten);
          result = Algebra::Filter {
            inner: Box::new(Algebra::join(result, Algebra::Bgp(std::mem::take(&mut run)))),
            expression: virt,
          };
        },
        BgpItem::Bind { expression, variable } => {
          let virt = self.rewrite_expression(expression.clone(), &mut rewritten);
          result = Algebra::Extend {
            inner: Box::new(Algebra::join(result, Algebra::Bgp(std::mem::take(&mut run)))),
            expression: virt,
            variable: variable.clone(),
          };
        },
      }
    }
    if !rewritten {
      return Algebra::Bgp(items)
    }
    debug!(patterns = items.len(), "virtualised BGP");
    *changed = true;
    Algebra::join(result, Algebra::Bgp(run))
  }

  fn boxed(&self, algebra: Box<Algebra>, changed: &mut bool) -> Box<Algebra> {
    Box::new(self.rewrite(*algebra, changed))
  }

  /* `changed` is set when anything below was rewritten */
  fn rewrite(&self, algebra: Algebra, changed: &mut bool) -> Algebra {
    match algebra {
      Algebra::Bgp(items) => self.virtualise_bgp(items, changed),
      Algebra::Join(left, right) => Algebra::Join(self.boxed(left, changed), self.boxed(right, changed)),
      Algebra::LeftJoin { left, right, filter } => Algebra::LeftJoin {
        left: self.boxed(left, changed),
        right: self.boxed(right, changed),
        filter: filter.map(|e| self.rewrite_expression(e, changed)),
      },
      Algebra::Union(left, right) => Algebra::Union(self.boxed(left, changed), self.boxed(right, changed)),
      Algebra::Minus(left, right) => Algebra::Minus(self.boxed(left, changed), self.boxed(right, changed)),
      Algebra::Filter { inner, expression } => Algebra::Filter {
        inner: self.boxed(inner, changed),
        expression: self.rewrite_expression(expression, changed),
      },
      Algebra::Extend { inner, expression, variable } => Algebra::Extend {
        inner: self.boxed(inner, changed),
        expression: self.rewrite_expression(expression, changed),
        variable,
      },
      Algebra::Graph { name, inner } => Algebra::Graph { name, inner: self.boxed(inner, changed) },
      Algebra::Project { inner, variables } => Algebra::Project { inner: self.boxed(inner, changed), variables },
      Algebra::Distinct(inner) => Algebra::Distinct(self.boxed(inner, changed)),
      Algebra::Reduced(inner) => Algebra::Reduced(self.boxed(inner, changed)),
      Algebra::Slice { inner, offset, limit } => Algebra::Slice { inner: self.boxed(inner, changed), offset, limit },
      Algebra::OrderBy { inner, conditions } => Algebra::OrderBy {
        inner: self.boxed(inner, changed),
        conditions: conditions.into_iter()
          .map(|(e, ascending)| (self.rewrite_expression(e, changed), ascending))
          .collect(),
      },
      leaf @ (Algebra::Table { .. } | Algebra::Zero { .. }) => leaf,
    }
  }
}

impl AlgebraOptimiser for AlgebraVirtualizer {
  fn optimise(&self, algebra: Algebra) -> Algebra {
    self.rewrite(algebra, &mut false)
  }
}
