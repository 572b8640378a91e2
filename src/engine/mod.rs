//! SPARQL engine over a pluggable quad backend
//!
//! The engine owns the backend, the observer registry and the RDF loader.
//! Mutations return the notifications they caused as [`Delivery`] values;
//! callers invoke them once they no longer hold the engine.

pub mod backend;
pub mod callbacks;
pub mod descriptor;
pub mod document;
pub mod index;
pub mod lexicon;
pub mod loader;

pub use backend::{BackendError, BackendResult, EmbeddedBackend, QuadBackend};
pub use callbacks::{CallbacksBackend, ChangeEvent, ChangeSet, Delivery, ObserverId};
pub use descriptor::{GraphSelector, QuadDescriptor, QuadPattern, TermDescriptor};
pub use document::DocumentStore;
pub use index::QuadIndex;
pub use lexicon::{Lexicon, DEFAULT_GRAPH_URI};
pub use loader::{LoadError, ParserHandle, RdfLoader};

use crate::config::StoreConfig;
use crate::rdf::NamedNode;
use crate::sparql::{
    Dataset, Evaluator, FetchedLoads, SparqlResult, SparqlResults, UpdateExecutor, UpdateSummary,
};
use spargebra::{Query, Update};
use tracing::{debug, info, warn};

/// Graphs a request is evaluated against, overriding FROM / FROM NAMED
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphScope {
    pub default: Vec<NamedNode>,
    pub named: Vec<NamedNode>,
}

impl GraphScope {
    pub fn new(default: Vec<NamedNode>, named: Vec<NamedNode>) -> Self {
        Self { default, named }
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.named.is_empty()
    }

    fn dataset(&self) -> Dataset {
        let names = |nodes: &[NamedNode]| -> Vec<String> {
            nodes.iter().map(|n| n.as_str().to_string()).collect()
        };
        Dataset::from_graphs(&names(&self.default), &names(&self.named))
    }
}

/// Query engine bound to one backend for its whole lifetime
pub struct SparqlEngine {
    backend: Box<dyn QuadBackend>,
    callbacks: CallbacksBackend,
    loader: RdfLoader,
    events_on_batch_load: bool,
}

impl SparqlEngine {
    pub fn new(backend: Box<dyn QuadBackend>, loader: RdfLoader, config: &StoreConfig) -> Self {
        info!("SPARQL engine ready on the {} backend", backend.name());
        Self {
            backend,
            callbacks: CallbacksBackend::new(),
            loader,
            events_on_batch_load: config.events_on_batch_load,
        }
    }

    /// Evaluate a read-only query
    pub fn query(&self, query: &Query, scope: Option<&GraphScope>) -> SparqlResult<SparqlResults> {
        let dataset = scope.filter(|s| !s.is_empty()).map(GraphScope::dataset);
        Evaluator::query(self.backend.as_ref(), query, dataset.as_ref())
    }

    /// Apply an update and compute the notifications it caused
    ///
    /// `loads` holds the documents for the update's LOAD operations, fetched
    /// with [`FetchedLoads::fetch`] before the engine was locked. A failing
    /// operation leaves earlier ones applied, so notifications for those are
    /// returned with the error.
    pub fn update(
        &mut self,
        update: &Update,
        scope: Option<&GraphScope>,
        loads: FetchedLoads,
    ) -> (SparqlResult<UpdateSummary>, Vec<Delivery>) {
        let dataset = scope.filter(|s| !s.is_empty()).map(GraphScope::dataset);
        let executor = UpdateExecutor::new(self.backend.as_mut(), loads, self.events_on_batch_load);
        let (result, changes) = executor.execute(update, dataset.as_ref());
        match &result {
            Ok(summary) => debug!("Update inserted {} and removed {} quads", summary.inserted, summary.removed),
            Err(e) => warn!("Update failed after {} changes: {}", changes.len(), e),
        }
        (result, self.notify(&changes))
    }

    /// Insert parsed quads directly
    ///
    /// `notify` overrides the batch-load events flag for this call.
    pub fn batch_load(
        &mut self,
        quads: Vec<QuadDescriptor>,
        notify: Option<bool>,
    ) -> SparqlResult<(usize, Vec<Delivery>)> {
        let mut changes = ChangeSet::default();
        for quad in quads {
            if self.backend.insert(&quad)? {
                changes.added.push(quad);
            }
        }
        let inserted = changes.added.len();
        info!("Batch load inserted {} quads", inserted);

        let deliveries = if notify.unwrap_or(self.events_on_batch_load) {
            self.notify(&changes)
        } else {
            Vec::new()
        };
        Ok((inserted, deliveries))
    }

    fn notify(&mut self, changes: &ChangeSet) -> Vec<Delivery> {
        let backend = self.backend.as_ref();
        self.callbacks
            .collect(changes, backend, &|query| Evaluator::query(backend, query, None))
    }

    /// Current quads of `subject` in `graph` (`None` = default graph)
    pub fn describe_node(&self, subject: &TermDescriptor, graph: &Option<String>) -> BackendResult<Vec<QuadDescriptor>> {
        callbacks::node_description(self.backend.as_ref(), subject, graph)
    }

    pub fn callbacks(&self) -> &CallbacksBackend {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut CallbacksBackend {
        &mut self.callbacks
    }

    pub fn loader(&self) -> &RdfLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut RdfLoader {
        &mut self.loader
    }

    pub fn backend(&self) -> &dyn QuadBackend {
        self.backend.as_ref()
    }

    pub fn events_on_batch_load(&self) -> bool {
        self.events_on_batch_load
    }

    pub fn set_batch_load_events(&mut self, enabled: bool) {
        debug!("Batch load events {}", if enabled { "enabled" } else { "disabled" });
        self.events_on_batch_load = enabled;
    }

    /// Named graphs holding at least one quad
    pub fn named_graphs(&self) -> BackendResult<Vec<String>> {
        self.backend.named_graphs()
    }

    pub fn len(&self) -> BackendResult<usize> {
        self.backend.len()
    }

    pub fn is_empty(&self) -> BackendResult<bool> {
        Ok(self.backend.len()? == 0)
    }

    pub fn flush(&mut self) -> BackendResult<()> {
        self.backend.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::ParsedRequest;
    use crate::transport::HttpTransport;
    use std::sync::{Arc, Mutex};

    fn engine() -> SparqlEngine {
        let backend = EmbeddedBackend::new(Lexicon::new(), QuadIndex::new(15));
        let loader = RdfLoader::new(Arc::new(HttpTransport::new()));
        SparqlEngine::new(Box::new(backend), loader, &StoreConfig::default())
    }

    fn parse_update(text: &str) -> Update {
        match ParsedRequest::parse(text, None).unwrap() {
            ParsedRequest::Update(update) => update,
            ParsedRequest::Query(_) => panic!("expected an update"),
        }
    }

    fn quad(s: &str) -> QuadDescriptor {
        QuadDescriptor::new(
            TermDescriptor::uri(s),
            TermDescriptor::uri("http://example.org/p"),
            TermDescriptor::simple_literal("1"),
            None,
        )
    }

    #[test]
    fn test_scope_overrides_from() {
        let mut engine = engine();
        let update = parse_update(
            "INSERT DATA { GRAPH <http://example.org/g1> { <http://example.org/a> <http://example.org/p> 1 } }",
        );
        engine.update(&update, None, FetchedLoads::default()).0.unwrap();

        let query = ParsedRequest::parse_query("SELECT * WHERE { ?s ?p ?o }", None).unwrap();
        assert!(engine.query(&query, None).unwrap().is_empty());

        let scope = GraphScope::new(vec![NamedNode::new_unchecked("http://example.org/g1")], vec![]);
        assert_eq!(engine.query(&query, Some(&scope)).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_load_suppression() {
        let mut engine = engine();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        engine.callbacks_mut().subscribe(
            QuadPattern::any(GraphSelector::All),
            Arc::new(move |_, quads| *counter.lock().unwrap() += quads.len()),
        );

        let (inserted, deliveries) = engine.batch_load(vec![quad("http://example.org/a")], None).unwrap();
        assert_eq!(inserted, 1);
        assert!(deliveries.is_empty());

        engine.set_batch_load_events(true);
        let (_, deliveries) = engine.batch_load(vec![quad("http://example.org/b")], None).unwrap();
        for delivery in deliveries {
            delivery.deliver();
        }
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_update_notifies_pattern_observers() {
        let mut engine = engine();
        engine
            .callbacks_mut()
            .subscribe(QuadPattern::any(GraphSelector::Default), Arc::new(|_, _| {}));

        let update = parse_update("INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" }");
        let (summary, deliveries) = engine.update(&update, None, FetchedLoads::default());
        assert_eq!(summary.unwrap().inserted, 1);
        assert_eq!(deliveries.len(), 1);

        // Nothing changed: nothing delivered
        let (_, deliveries) = engine.update(&update, None, FetchedLoads::default());
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_still_notifies() {
        let mut engine = engine();
        engine
            .callbacks_mut()
            .subscribe(QuadPattern::any(GraphSelector::Default), Arc::new(|_, _| {}));

        let update = parse_update(
            "INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" } ; \
             LOAD <ftp://example.org/data.ttl>",
        );
        let loads = FetchedLoads::fetch(engine.loader(), &update).await;
        let (result, deliveries) = engine.update(&update, None, loads);
        assert!(result.is_err());
        assert_eq!(deliveries.len(), 1);
        assert_eq!(engine.len().unwrap(), 1);
    }
}
