//! SPARQL query and update execution
//!
//! Evaluation is bottom-up over the spargebra algebra. Solutions are
//! `variable → descriptor` maps; blank nodes in WHERE patterns behave as
//! variables named `_:label` and never appear in projections.

use super::results::{QuerySolution, SparqlResults, UpdateSummary};
use super::{SparqlError, SparqlResult};
use crate::engine::backend::QuadBackend;
use crate::engine::callbacks::ChangeSet;
use crate::engine::descriptor::{GraphSelector, QuadDescriptor, QuadPattern, TermDescriptor};
use crate::engine::lexicon::DEFAULT_GRAPH_URI;
use crate::engine::loader::{LoadResult, RdfLoader};
use crate::rdf::Triple;
use indexmap::IndexSet;
use spargebra::algebra::{GraphPattern, GraphTarget, OrderExpression, QueryDataset};
use spargebra::term::{
    GraphName, GraphNamePattern, GroundQuad, GroundQuadPattern, GroundSubject, GroundTerm,
    GroundTermPattern, NamedNodePattern, Quad as SparqlQuad, QuadPattern as SparqlQuadPattern,
    TermPattern, TriplePattern as SparqlTriplePattern,
};
use spargebra::{GraphUpdateOperation, Query, Update};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// One solution: variable name → bound term
pub type Solution = BTreeMap<String, TermDescriptor>;

/// Graph name as stored; the default-graph IRI maps to `None`
pub(crate) fn graph_key(iri: &str) -> Option<String> {
    (iri != DEFAULT_GRAPH_URI).then(|| iri.to_string())
}

fn selector(graph: &Option<String>) -> GraphSelector {
    match graph {
        Some(g) => GraphSelector::Named(g.clone()),
        None => GraphSelector::Default,
    }
}

/// RDF dataset of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// Graphs merged into the default graph (`None` = the store's default graph)
    pub default: Vec<Option<String>>,
    /// Graphs visible through GRAPH; `None` = every named graph
    pub named: Option<Vec<String>>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            default: vec![None],
            named: None,
        }
    }
}

impl Dataset {
    /// Dataset described by explicit graph lists
    pub fn from_graphs(default: &[String], named: &[String]) -> Self {
        let mut dataset = Self {
            default: default.iter().map(|g| graph_key(g)).collect(),
            named: (!named.is_empty()).then(|| named.to_vec()),
        };
        if dataset.default.is_empty() {
            dataset.default.push(None);
        }
        dataset
    }

    /// Dataset of a FROM / FROM NAMED clause
    pub fn from_query_dataset(dataset: Option<&QueryDataset>) -> Self {
        let Some(dataset) = dataset else {
            return Self::default();
        };
        let default: Vec<String> = dataset.default.iter().map(|g| g.as_str().to_string()).collect();
        let named: Vec<String> = dataset
            .named
            .as_ref()
            .map(|n| n.iter().map(|g| g.as_str().to_string()).collect())
            .unwrap_or_default();
        let mut result = Self::from_graphs(&default, &named);
        if dataset.named.is_some() && named.is_empty() {
            result.named = Some(Vec::new());
        }
        result
    }
}

/// Graph a pattern is matched against
#[derive(Debug, Clone)]
pub(super) enum ActiveGraph {
    /// RDF merge of the dataset's default graphs
    Default(Vec<Option<String>>),
    /// One named graph
    Named(Option<String>),
}

enum Slot {
    Bound(TermDescriptor),
    Var(String),
}

impl Slot {
    fn resolve(&self, solution: &Solution) -> Option<TermDescriptor> {
        match self {
            Slot::Bound(t) => Some(t.clone()),
            Slot::Var(v) => solution.get(v).cloned(),
        }
    }
}

fn term_slot(pattern: &TermPattern) -> SparqlResult<Slot> {
    match pattern {
        TermPattern::NamedNode(n) => Ok(Slot::Bound(TermDescriptor::from_ox_named_node(n))),
        TermPattern::BlankNode(b) => Ok(Slot::Var(format!("_:{}", b.as_str()))),
        TermPattern::Literal(l) => Ok(Slot::Bound(TermDescriptor::from_ox_literal(l))),
        TermPattern::Variable(v) => Ok(Slot::Var(v.as_str().to_string())),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlError::Unsupported("quoted triple patterns".to_string())),
    }
}

fn predicate_slot(pattern: &NamedNodePattern) -> Slot {
    match pattern {
        NamedNodePattern::NamedNode(n) => Slot::Bound(TermDescriptor::from_ox_named_node(n)),
        NamedNodePattern::Variable(v) => Slot::Var(v.as_str().to_string()),
    }
}

pub(super) fn compatible(a: &Solution, b: &Solution) -> bool {
    a.iter().all(|(k, v)| b.get(k).map_or(true, |w| w == v))
}

fn merge(a: &Solution, b: &Solution) -> Solution {
    let mut merged = a.clone();
    merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Evaluates query algebra against a backend
pub struct Evaluator<'a> {
    backend: &'a dyn QuadBackend,
    dataset: Dataset,
}

impl<'a> Evaluator<'a> {
    pub fn new(backend: &'a dyn QuadBackend, dataset: Dataset) -> Self {
        Self { backend, dataset }
    }

    /// Evaluate a query; `scope` replaces the query's own FROM clauses
    pub fn query(backend: &'a dyn QuadBackend, query: &Query, scope: Option<&Dataset>) -> SparqlResult<SparqlResults> {
        let dataset = match (scope, query_dataset(query)) {
            (Some(scope), _) => scope.clone(),
            (None, from) => Dataset::from_query_dataset(from),
        };
        Evaluator::new(backend, dataset).evaluate_query(query)
    }

    pub fn evaluate_query(&self, query: &Query) -> SparqlResult<SparqlResults> {
        match query {
            Query::Select { pattern, .. } => {
                let solutions = self.evaluate(pattern)?;
                let variables = projected_variables(pattern).unwrap_or_else(|| {
                    let mut vars: Vec<String> = solutions
                        .iter()
                        .flat_map(|s| s.keys().cloned())
                        .filter(|v| !v.starts_with("_:"))
                        .collect::<IndexSet<_>>()
                        .into_iter()
                        .collect();
                    vars.sort();
                    vars
                });
                let solutions = solutions
                    .iter()
                    .map(|s| {
                        let mut solution = QuerySolution::new();
                        for var in &variables {
                            if let Some(term) = s.get(var) {
                                solution.bind(var.clone(), term.to_rdf_term());
                            }
                        }
                        solution
                    })
                    .collect();
                Ok(SparqlResults::Bindings { variables, solutions })
            }
            Query::Ask { pattern, .. } => Ok(SparqlResults::Boolean(!self.evaluate(pattern)?.is_empty())),
            Query::Construct { template, pattern, .. } => {
                let solutions = self.evaluate(pattern)?;
                let mut triples = IndexSet::new();
                for solution in &solutions {
                    let mut fresh = HashMap::new();
                    for tp in template {
                        if let Some(quad) = instantiate_triple(tp, solution, &mut fresh)? {
                            triples.insert(quad);
                        }
                    }
                }
                Ok(SparqlResults::Graph(to_triples(triples)))
            }
            Query::Describe { pattern, .. } => {
                let solutions = self.evaluate(pattern)?;
                let resources: IndexSet<TermDescriptor> = solutions
                    .iter()
                    .flat_map(|s| s.values())
                    .filter(|t| !t.is_literal())
                    .cloned()
                    .collect();

                let mut triples = IndexSet::new();
                for resource in resources {
                    for graph in &self.dataset.default {
                        let pattern = QuadPattern {
                            subject: Some(resource.clone()),
                            predicate: None,
                            object: None,
                            graph: selector(graph),
                        };
                        for mut quad in self.backend.match_pattern(&pattern)? {
                            quad.graph = None;
                            triples.insert(quad);
                        }
                    }
                }
                Ok(SparqlResults::Graph(to_triples(triples)))
            }
        }
    }

    /// Evaluate a graph pattern against the dataset's default graph
    pub fn evaluate(&self, pattern: &GraphPattern) -> SparqlResult<Vec<Solution>> {
        self.eval(pattern, &ActiveGraph::Default(self.dataset.default.clone()))
    }

    pub(super) fn eval(&self, pattern: &GraphPattern, active: &ActiveGraph) -> SparqlResult<Vec<Solution>> {
        match pattern {
            GraphPattern::Bgp { patterns } => {
                let mut solutions = vec![Solution::new()];
                for tp in patterns {
                    let mut next = Vec::new();
                    for solution in &solutions {
                        next.extend(self.match_triple(tp, solution, active)?);
                    }
                    solutions = next;
                    if solutions.is_empty() {
                        break;
                    }
                }
                Ok(solutions)
            }
            GraphPattern::Join { left, right } => {
                let left = self.eval(left, active)?;
                if left.is_empty() {
                    return Ok(left);
                }
                let right = self.eval(right, active)?;
                let mut joined = Vec::new();
                for l in &left {
                    for r in &right {
                        if compatible(l, r) {
                            joined.push(merge(l, r));
                        }
                    }
                }
                Ok(joined)
            }
            GraphPattern::LeftJoin { left, right, expression } => {
                let left = self.eval(left, active)?;
                let right = self.eval(right, active)?;
                let mut joined = Vec::new();
                for l in &left {
                    let mut matched = false;
                    for r in right.iter().filter(|r| compatible(l, r)) {
                        let merged = merge(l, r);
                        let keep = match expression {
                            Some(expr) => self.ebv(expr, &merged, active).unwrap_or(false),
                            None => true,
                        };
                        if keep {
                            joined.push(merged);
                            matched = true;
                        }
                    }
                    if !matched {
                        joined.push(l.clone());
                    }
                }
                Ok(joined)
            }
            GraphPattern::Filter { expr, inner } => Ok(self
                .eval(inner, active)?
                .into_iter()
                .filter(|s| self.ebv(expr, s, active).unwrap_or(false))
                .collect()),
            GraphPattern::Union { left, right } => {
                let mut solutions = self.eval(left, active)?;
                solutions.extend(self.eval(right, active)?);
                Ok(solutions)
            }
            GraphPattern::Graph { name, inner } => match name {
                NamedNodePattern::NamedNode(n) => {
                    self.eval(inner, &ActiveGraph::Named(graph_key(n.as_str())))
                }
                NamedNodePattern::Variable(v) => {
                    let graphs = match &self.dataset.named {
                        Some(named) => named.clone(),
                        None => self.backend.named_graphs()?,
                    };
                    let mut solutions = Vec::new();
                    for graph in graphs {
                        let value = TermDescriptor::uri(graph.as_str());
                        for mut s in self.eval(inner, &ActiveGraph::Named(graph_key(&graph)))? {
                            match s.get(v.as_str()) {
                                Some(bound) if *bound != value => continue,
                                Some(_) => {}
                                None => {
                                    s.insert(v.as_str().to_string(), value.clone());
                                }
                            }
                            solutions.push(s);
                        }
                    }
                    Ok(solutions)
                }
            },
            GraphPattern::Extend { inner, variable, expression } => {
                let mut solutions = self.eval(inner, active)?;
                for solution in &mut solutions {
                    if solution.contains_key(variable.as_str()) {
                        continue;
                    }
                    if let Ok(value) = self.eval_expr(expression, solution, active) {
                        solution.insert(variable.as_str().to_string(), value);
                    }
                }
                Ok(solutions)
            }
            GraphPattern::Minus { left, right } => {
                let left = self.eval(left, active)?;
                let right = self.eval(right, active)?;
                Ok(left
                    .into_iter()
                    .filter(|l| {
                        !right.iter().any(|r| {
                            compatible(l, r) && r.keys().any(|k| l.contains_key(k))
                        })
                    })
                    .collect())
            }
            GraphPattern::Values { variables, bindings } => {
                let mut solutions = Vec::with_capacity(bindings.len());
                for row in bindings {
                    let mut solution = Solution::new();
                    for (var, value) in variables.iter().zip(row.iter()) {
                        if let Some(term) = value {
                            solution.insert(var.as_str().to_string(), ground_term(term)?);
                        }
                    }
                    solutions.push(solution);
                }
                Ok(solutions)
            }
            GraphPattern::OrderBy { inner, expression } => {
                let solutions = self.eval(inner, active)?;
                let mut keyed: Vec<(Vec<Option<TermDescriptor>>, Solution)> = solutions
                    .into_iter()
                    .map(|s| {
                        let keys = expression
                            .iter()
                            .map(|e| {
                                let expr = match e {
                                    OrderExpression::Asc(expr) | OrderExpression::Desc(expr) => expr,
                                };
                                self.eval_expr(expr, &s, active).ok()
                            })
                            .collect();
                        (keys, s)
                    })
                    .collect();
                keyed.sort_by(|(a, _), (b, _)| {
                    for ((x, y), order) in a.iter().zip(b.iter()).zip(expression.iter()) {
                        let ord = super::expression::compare_terms(x.as_ref(), y.as_ref());
                        let ord = match order {
                            OrderExpression::Asc(_) => ord,
                            OrderExpression::Desc(_) => ord.reverse(),
                        };
                        if ord != std::cmp::Ordering::Equal {
                            return ord;
                        }
                    }
                    std::cmp::Ordering::Equal
                });
                Ok(keyed.into_iter().map(|(_, s)| s).collect())
            }
            GraphPattern::Project { inner, variables } => {
                let keep: HashSet<&str> = variables.iter().map(|v| v.as_str()).collect();
                Ok(self
                    .eval(inner, active)?
                    .into_iter()
                    .map(|s| s.into_iter().filter(|(k, _)| keep.contains(k.as_str())).collect())
                    .collect())
            }
            GraphPattern::Distinct { inner } => {
                let mut seen = HashSet::new();
                Ok(self
                    .eval(inner, active)?
                    .into_iter()
                    .filter(|s| seen.insert(s.clone()))
                    .collect())
            }
            GraphPattern::Reduced { inner } => self.eval(inner, active),
            GraphPattern::Slice { inner, start, length } => {
                let solutions = self.eval(inner, active)?.into_iter().skip(*start);
                Ok(match length {
                    Some(length) => solutions.take(*length).collect(),
                    None => solutions.collect(),
                })
            }
            GraphPattern::Path { .. } => Err(SparqlError::Unsupported("property paths".to_string())),
            GraphPattern::Group { .. } => Err(SparqlError::Unsupported("GROUP BY and aggregates".to_string())),
            GraphPattern::Service { .. } => Err(SparqlError::Unsupported("SERVICE".to_string())),
            #[allow(unreachable_patterns)]
            _ => Err(SparqlError::Unsupported("graph pattern".to_string())),
        }
    }

    fn match_triple(
        &self,
        tp: &SparqlTriplePattern,
        solution: &Solution,
        active: &ActiveGraph,
    ) -> SparqlResult<Vec<Solution>> {
        let slots = [term_slot(&tp.subject)?, predicate_slot(&tp.predicate), term_slot(&tp.object)?];
        let bound: Vec<Option<TermDescriptor>> = slots.iter().map(|s| s.resolve(solution)).collect();

        // A literal can never be a stored subject
        if bound[0].as_ref().is_some_and(TermDescriptor::is_literal) {
            return Ok(Vec::new());
        }

        let graphs: Vec<GraphSelector> = match active {
            ActiveGraph::Default(graphs) => graphs.iter().map(selector).collect(),
            ActiveGraph::Named(graph) => vec![selector(graph)],
        };

        let mut quads = IndexSet::new();
        for graph in graphs {
            let pattern = QuadPattern {
                subject: bound[0].clone(),
                predicate: bound[1].clone(),
                object: bound[2].clone(),
                graph,
            };
            for mut quad in self.backend.match_pattern(&pattern)? {
                // Default graphs are merged, so graph membership is dropped
                quad.graph = None;
                quads.insert(quad);
            }
        }

        let mut solutions = Vec::with_capacity(quads.len());
        'quads: for quad in quads {
            let mut extended = solution.clone();
            for (slot, value) in slots.iter().zip([quad.subject, quad.predicate, quad.object]) {
                if let Slot::Var(name) = slot {
                    match extended.get(name) {
                        Some(existing) if *existing != value => continue 'quads,
                        Some(_) => {}
                        None => {
                            extended.insert(name.clone(), value);
                        }
                    }
                }
            }
            solutions.push(extended);
        }
        Ok(solutions)
    }
}

fn query_dataset(query: &Query) -> Option<&QueryDataset> {
    match query {
        Query::Select { dataset, .. }
        | Query::Construct { dataset, .. }
        | Query::Describe { dataset, .. }
        | Query::Ask { dataset, .. } => dataset.as_ref(),
    }
}

/// Variables of the outermost projection
fn projected_variables(pattern: &GraphPattern) -> Option<Vec<String>> {
    match pattern {
        GraphPattern::Project { variables, .. } => {
            Some(variables.iter().map(|v| v.as_str().to_string()).collect())
        }
        GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::OrderBy { inner, .. } => projected_variables(inner),
        _ => None,
    }
}

fn ground_term(term: &GroundTerm) -> SparqlResult<TermDescriptor> {
    match term {
        GroundTerm::NamedNode(n) => Ok(TermDescriptor::from_ox_named_node(n)),
        GroundTerm::Literal(l) => Ok(TermDescriptor::from_ox_literal(l)),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlError::Unsupported("quoted triples".to_string())),
    }
}

fn fresh_blank(label: &str, fresh: &mut HashMap<String, String>) -> TermDescriptor {
    let id = fresh
        .entry(label.to_string())
        .or_insert_with(|| format!("b{}", uuid::Uuid::new_v4().simple()));
    TermDescriptor::Blank(id.clone())
}

/// Template term for one solution; `None` when a variable is unbound
fn instantiate_term(
    pattern: &TermPattern,
    solution: &Solution,
    fresh: &mut HashMap<String, String>,
) -> SparqlResult<Option<TermDescriptor>> {
    Ok(match pattern {
        TermPattern::NamedNode(n) => Some(TermDescriptor::from_ox_named_node(n)),
        TermPattern::Literal(l) => Some(TermDescriptor::from_ox_literal(l)),
        TermPattern::BlankNode(b) => Some(fresh_blank(b.as_str(), fresh)),
        TermPattern::Variable(v) => solution.get(v.as_str()).cloned(),
        #[allow(unreachable_patterns)]
        _ => return Err(SparqlError::Unsupported("quoted triple templates".to_string())),
    })
}

fn instantiate_predicate(pattern: &NamedNodePattern, solution: &Solution) -> Option<TermDescriptor> {
    match pattern {
        NamedNodePattern::NamedNode(n) => Some(TermDescriptor::from_ox_named_node(n)),
        NamedNodePattern::Variable(v) => solution.get(v.as_str()).cloned(),
    }
}

fn valid_quad(quad: QuadDescriptor) -> Option<QuadDescriptor> {
    (!quad.subject.is_literal() && quad.predicate.is_uri()).then_some(quad)
}

fn instantiate_triple(
    tp: &SparqlTriplePattern,
    solution: &Solution,
    fresh: &mut HashMap<String, String>,
) -> SparqlResult<Option<QuadDescriptor>> {
    let (Some(s), Some(p), Some(o)) = (
        instantiate_term(&tp.subject, solution, fresh)?,
        instantiate_predicate(&tp.predicate, solution),
        instantiate_term(&tp.object, solution, fresh)?,
    ) else {
        return Ok(None);
    };
    Ok(valid_quad(QuadDescriptor::new(s, p, o, None)))
}

fn to_triples(quads: IndexSet<QuadDescriptor>) -> Vec<Triple> {
    quads
        .into_iter()
        .filter_map(|q| match q.to_triple() {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("Skipping invalid constructed triple: {}", e);
                None
            }
        })
        .collect()
}

fn graph_name(name: &GraphName) -> Option<String> {
    match name {
        GraphName::NamedNode(n) => graph_key(n.as_str()),
        GraphName::DefaultGraph => None,
    }
}

fn data_quad(quad: &SparqlQuad) -> SparqlResult<QuadDescriptor> {
    let subject = match &quad.subject {
        oxrdf::Subject::NamedNode(n) => TermDescriptor::from_ox_named_node(n),
        oxrdf::Subject::BlankNode(b) => TermDescriptor::from_ox_blank_node(b),
        #[allow(unreachable_patterns)]
        _ => return Err(SparqlError::Unsupported("quoted triples".to_string())),
    };
    let object = match &quad.object {
        oxrdf::Term::NamedNode(n) => TermDescriptor::from_ox_named_node(n),
        oxrdf::Term::BlankNode(b) => TermDescriptor::from_ox_blank_node(b),
        oxrdf::Term::Literal(l) => TermDescriptor::from_ox_literal(l),
        #[allow(unreachable_patterns)]
        _ => return Err(SparqlError::Unsupported("quoted triples".to_string())),
    };
    Ok(QuadDescriptor::new(
        subject,
        TermDescriptor::from_ox_named_node(&quad.predicate),
        object,
        graph_name(&quad.graph_name),
    ))
}

fn ground_data_quad(quad: &GroundQuad) -> SparqlResult<QuadDescriptor> {
    let subject = match &quad.subject {
        GroundSubject::NamedNode(n) => TermDescriptor::from_ox_named_node(n),
        #[allow(unreachable_patterns)]
        _ => return Err(SparqlError::Unsupported("quoted triples".to_string())),
    };
    Ok(QuadDescriptor::new(
        subject,
        TermDescriptor::from_ox_named_node(&quad.predicate),
        ground_term(&quad.object)?,
        graph_name(&quad.graph_name),
    ))
}

/// Graph of a template quad; `None` when its variable is unbound
fn template_graph(pattern: &GraphNamePattern, solution: &Solution) -> Option<Option<String>> {
    match pattern {
        GraphNamePattern::NamedNode(n) => Some(graph_key(n.as_str())),
        GraphNamePattern::DefaultGraph => Some(None),
        GraphNamePattern::Variable(v) => match solution.get(v.as_str()) {
            Some(TermDescriptor::Uri(g)) => Some(graph_key(g)),
            _ => None,
        },
    }
}

fn ground_pattern_term(pattern: &GroundTermPattern, solution: &Solution) -> SparqlResult<Option<TermDescriptor>> {
    Ok(match pattern {
        GroundTermPattern::NamedNode(n) => Some(TermDescriptor::from_ox_named_node(n)),
        GroundTermPattern::Literal(l) => Some(TermDescriptor::from_ox_literal(l)),
        GroundTermPattern::Variable(v) => solution.get(v.as_str()).cloned(),
        #[allow(unreachable_patterns)]
        _ => return Err(SparqlError::Unsupported("quoted triple templates".to_string())),
    })
}

fn instantiate_delete(pattern: &GroundQuadPattern, solution: &Solution) -> SparqlResult<Option<QuadDescriptor>> {
    let (Some(s), Some(p), Some(o), Some(g)) = (
        ground_pattern_term(&pattern.subject, solution)?,
        instantiate_predicate(&pattern.predicate, solution),
        ground_pattern_term(&pattern.object, solution)?,
        template_graph(&pattern.graph_name, solution),
    ) else {
        return Ok(None);
    };
    Ok(valid_quad(QuadDescriptor::new(s, p, o, g)))
}

fn instantiate_insert(
    pattern: &SparqlQuadPattern,
    solution: &Solution,
    fresh: &mut HashMap<String, String>,
) -> SparqlResult<Option<QuadDescriptor>> {
    let (Some(s), Some(p), Some(o), Some(g)) = (
        instantiate_term(&pattern.subject, solution, fresh)?,
        instantiate_predicate(&pattern.predicate, solution),
        instantiate_term(&pattern.object, solution, fresh)?,
        template_graph(&pattern.graph_name, solution),
    ) else {
        return Ok(None);
    };
    Ok(valid_quad(QuadDescriptor::new(s, p, o, g)))
}

/// Documents fetched for the LOAD operations of an update, in operation order
///
/// Fetching happens before the backend is borrowed so a slow transport
/// never holds up readers.
#[derive(Debug, Default)]
pub struct FetchedLoads {
    documents: VecDeque<(String, LoadResult<Vec<QuadDescriptor>>)>,
}

impl FetchedLoads {
    /// Fetch the source of every LOAD in `update`
    pub async fn fetch(loader: &RdfLoader, update: &Update) -> Self {
        let mut documents = VecDeque::new();
        for operation in &update.operations {
            if let GraphUpdateOperation::Load { source, destination, .. } = operation {
                let graph = graph_name(destination);
                let fetched = loader.load_remote(source.as_str(), graph.as_deref()).await;
                documents.push_back((source.as_str().to_string(), fetched));
            }
        }
        Self { documents }
    }

    /// Whether `update` has any LOAD to fetch
    pub fn needed(update: &Update) -> bool {
        update
            .operations
            .iter()
            .any(|op| matches!(op, GraphUpdateOperation::Load { .. }))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn next(&mut self, source: &str) -> SparqlResult<LoadResult<Vec<QuadDescriptor>>> {
        match self.documents.pop_front() {
            Some((fetched, document)) if fetched == source => Ok(document),
            _ => Err(SparqlError::Execution(format!("LOAD <{}> was not fetched", source))),
        }
    }
}

/// Applies update operations, tracking what actually changed
pub struct UpdateExecutor<'a> {
    backend: &'a mut dyn QuadBackend,
    loads: FetchedLoads,
    /// Whether LOAD results enter the change set
    record_loads: bool,
    changes: ChangeSet,
    summary: UpdateSummary,
}

impl<'a> UpdateExecutor<'a> {
    pub fn new(backend: &'a mut dyn QuadBackend, loads: FetchedLoads, record_loads: bool) -> Self {
        Self {
            backend,
            loads,
            record_loads,
            changes: ChangeSet::default(),
            summary: UpdateSummary::default(),
        }
    }

    /// Run every operation of `update` in order
    ///
    /// Operations are not rolled back when a later one fails, so the changes
    /// made up to the failure are returned alongside the result.
    pub fn execute(mut self, update: &Update, scope: Option<&Dataset>) -> (SparqlResult<UpdateSummary>, ChangeSet) {
        for operation in &update.operations {
            if let Err(e) = self.apply(operation, scope) {
                return (Err(e), self.changes);
            }
        }
        (Ok(self.summary), self.changes)
    }

    fn apply(&mut self, operation: &GraphUpdateOperation, scope: Option<&Dataset>) -> SparqlResult<()> {
        match operation {
            GraphUpdateOperation::InsertData { data } => {
                let quads = data.iter().map(data_quad).collect::<SparqlResult<Vec<_>>>()?;
                self.insert_quads(quads, true)
            }
            GraphUpdateOperation::DeleteData { data } => {
                let quads = data.iter().map(ground_data_quad).collect::<SparqlResult<Vec<_>>>()?;
                self.remove_quads(quads)
            }
            GraphUpdateOperation::DeleteInsert { delete, insert, using, pattern } => {
                let dataset = match (scope, using) {
                    (Some(scope), _) => scope.clone(),
                    (None, using) => Dataset::from_query_dataset(using.as_ref()),
                };
                let solutions = Evaluator::new(&*self.backend, dataset).evaluate(pattern)?;

                let mut removals = Vec::new();
                let mut additions = Vec::new();
                for solution in &solutions {
                    for template in delete {
                        removals.extend(instantiate_delete(template, solution)?);
                    }
                    let mut fresh = HashMap::new();
                    for template in insert {
                        additions.extend(instantiate_insert(template, solution, &mut fresh)?);
                    }
                }
                self.remove_quads(removals)?;
                self.insert_quads(additions, true)
            }
            GraphUpdateOperation::Load { silent, source, .. } => match self.loads.next(source.as_str())? {
                Ok(quads) => {
                    let record = self.record_loads;
                    self.insert_quads(quads, record)
                }
                Err(e) if *silent => {
                    warn!("LOAD SILENT <{}> failed: {}", source.as_str(), e);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            GraphUpdateOperation::Clear { graph, .. } | GraphUpdateOperation::Drop { graph, .. } => {
                let graphs: Vec<Option<String>> = match graph {
                    GraphTarget::NamedNode(n) => vec![graph_key(n.as_str())],
                    GraphTarget::DefaultGraph => vec![None],
                    GraphTarget::NamedGraphs => self.backend.named_graphs()?.into_iter().map(Some).collect(),
                    GraphTarget::AllGraphs => std::iter::once(None)
                        .chain(self.backend.named_graphs()?.into_iter().map(Some))
                        .collect(),
                };
                for graph in graphs {
                    let removed = self.backend.clear_graph(graph.as_deref())?;
                    debug!("Cleared {} quads from {:?}", removed.len(), graph);
                    self.summary.removed += removed.len();
                    self.changes.removed.extend(removed);
                }
                Ok(())
            }
            // Graphs exist as long as they hold quads
            GraphUpdateOperation::Create { .. } => Ok(()),
        }
    }

    fn insert_quads(&mut self, quads: Vec<QuadDescriptor>, record: bool) -> SparqlResult<()> {
        for quad in quads {
            if self.backend.insert(&quad)? {
                self.summary.inserted += 1;
                if record {
                    self.changes.added.push(quad);
                }
            }
        }
        Ok(())
    }

    fn remove_quads(&mut self, quads: Vec<QuadDescriptor>) -> SparqlResult<()> {
        for quad in quads {
            if self.backend.remove(&quad)? {
                self.summary.removed += 1;
                self.changes.removed.push(quad);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::EmbeddedBackend;
    use crate::engine::index::QuadIndex;
    use crate::engine::lexicon::Lexicon;
    use crate::sparql::ParsedRequest;
    use crate::transport::HttpTransport;
    use std::sync::Arc;

    fn backend() -> EmbeddedBackend {
        EmbeddedBackend::new(Lexicon::new(), QuadIndex::new(15))
    }

    fn parse_update(text: &str) -> Update {
        let ParsedRequest::Update(update) = ParsedRequest::parse(text, None).unwrap() else {
            panic!("not an update: {}", text);
        };
        update
    }

    async fn update(backend: &mut EmbeddedBackend, text: &str) -> (UpdateSummary, ChangeSet) {
        let loader = RdfLoader::new(Arc::new(HttpTransport::new()));
        let update = parse_update(text);
        let loads = FetchedLoads::fetch(&loader, &update).await;
        let (result, changes) = UpdateExecutor::new(backend, loads, false).execute(&update, None);
        (result.unwrap(), changes)
    }

    fn select(backend: &EmbeddedBackend, text: &str) -> SparqlResults {
        let query = ParsedRequest::parse_query(text, None).unwrap();
        Evaluator::query(backend, &query, None).unwrap()
    }

    const DATA: &str = r#"
        PREFIX ex: <http://example.org/>
        INSERT DATA {
            ex:alice ex:name "Alice" ; ex:age 30 ; ex:knows ex:bob .
            ex:bob ex:name "Bob" ; ex:age 25 .
            GRAPH ex:g { ex:carol ex:name "Carol" }
        }
    "#;

    #[tokio::test]
    async fn test_insert_data_summary() {
        let mut backend = backend();
        let (summary, changes) = update(&mut backend, DATA).await;
        assert_eq!(summary.inserted, 6);
        assert_eq!(changes.added.len(), 6);

        // Re-inserting changes nothing
        let (summary, changes) = update(&mut backend, DATA).await;
        assert_eq!(summary.inserted, 0);
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_default_graph_excludes_named_graphs() {
        let mut backend = backend();
        update(&mut backend, DATA).await;

        let results = select(&backend, "SELECT ?n WHERE { ?s <http://example.org/name> ?n }");
        assert_eq!(results.len(), 2);

        let results = select(
            &backend,
            "SELECT ?g ?n WHERE { GRAPH ?g { ?s <http://example.org/name> ?n } }",
        );
        assert_eq!(results.len(), 1);
        let solution = &results.solutions().unwrap()[0];
        assert_eq!(solution.get("g").unwrap().to_string(), "<http://example.org/g>");
    }

    #[tokio::test]
    async fn test_filter_optional_order() {
        let mut backend = backend();
        update(&mut backend, DATA).await;

        let results = select(
            &backend,
            r#"PREFIX ex: <http://example.org/>
               SELECT ?n ?friend WHERE {
                 ?s ex:name ?n ; ex:age ?age .
                 OPTIONAL { ?s ex:knows ?friend }
                 FILTER(?age > 20)
               } ORDER BY DESC(?age)"#,
        );
        let solutions = results.solutions().unwrap();
        assert_eq!(solutions.len(), 2);
        assert_eq!(solutions[0].get("n").unwrap().to_string(), "\"Alice\"");
        assert!(solutions[0].get("friend").is_some());
        assert!(solutions[1].get("friend").is_none());
    }

    #[tokio::test]
    async fn test_from_clause_selects_graph() {
        let mut backend = backend();
        update(&mut backend, DATA).await;

        let results = select(
            &backend,
            "SELECT ?n FROM <http://example.org/g> WHERE { ?s <http://example.org/name> ?n }",
        );
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_construct_and_ask() {
        let mut backend = backend();
        update(&mut backend, DATA).await;

        let query = ParsedRequest::parse_query(
            "CONSTRUCT { ?s <http://example.org/label> ?n } WHERE { ?s <http://example.org/name> ?n }",
            None,
        )
        .unwrap();
        let results = Evaluator::query(&backend, &query, None).unwrap();
        assert_eq!(results.triples().unwrap().len(), 2);

        let query = ParsedRequest::parse_query("ASK { ?s <http://example.org/knows> ?o }", None).unwrap();
        assert_eq!(
            Evaluator::query(&backend, &query, None).unwrap(),
            SparqlResults::Boolean(true)
        );
    }

    #[tokio::test]
    async fn test_delete_insert_where() {
        let mut backend = backend();
        update(&mut backend, DATA).await;

        let (summary, changes) = update(
            &mut backend,
            r#"PREFIX ex: <http://example.org/>
               DELETE { ?s ex:age ?a } INSERT { ?s ex:age 40 } WHERE { ?s ex:age ?a FILTER(?a < 28) }"#,
        )
        .await;
        assert_eq!(summary, UpdateSummary { inserted: 1, removed: 1 });
        assert_eq!(changes.removed[0].object, TermDescriptor::typed_literal("25", "http://www.w3.org/2001/XMLSchema#integer"));
    }

    #[tokio::test]
    async fn test_clear_default_graph_alias() {
        let mut backend = backend();
        update(&mut backend, DATA).await;

        let (summary, _) = update(&mut backend, &format!("CLEAR GRAPH <{}>", DEFAULT_GRAPH_URI)).await;
        assert_eq!(summary.removed, 5);
        assert_eq!(backend.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_values_and_distinct() {
        let mut backend = backend();
        update(&mut backend, DATA).await;

        let results = select(
            &backend,
            r#"PREFIX ex: <http://example.org/>
               SELECT DISTINCT ?p WHERE {
                 VALUES ?s { ex:alice ex:bob }
                 ?s ?p ?o
               }"#,
        );
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_operation_keeps_earlier_changes() {
        let mut backend = backend();
        let update = parse_update(
            "INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" } ; \
             LOAD <ftp://example.org/data.ttl>",
        );
        let loader = RdfLoader::new(Arc::new(HttpTransport::new()));
        let loads = FetchedLoads::fetch(&loader, &update).await;
        assert_eq!(loads.len(), 1);

        let (result, changes) = UpdateExecutor::new(&mut backend, loads, false).execute(&update, None);
        assert!(matches!(result, Err(SparqlError::Load(_))));
        assert_eq!(changes.added.len(), 1);
        assert_eq!(backend.len().unwrap(), 1);
    }

    #[test]
    fn test_unfetched_load_is_an_error() {
        let mut backend = backend();
        let update = parse_update("LOAD <http://example.org/data.ttl>");
        assert!(FetchedLoads::needed(&update));

        let (result, _) = UpdateExecutor::new(&mut backend, FetchedLoads::default(), false).execute(&update, None);
        assert!(matches!(result, Err(SparqlError::Execution(_))));
    }

    #[test]
    fn test_dataset_from_graphs() {
        let dataset = Dataset::from_graphs(&[DEFAULT_GRAPH_URI.to_string()], &[]);
        assert_eq!(dataset, Dataset::default());
    }
}
