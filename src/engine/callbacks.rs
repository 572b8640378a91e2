//! Change notification for node, query and pattern observers
//!
//! The backend only computes what each observer should receive. Payloads
//! are returned as [`Delivery`] values and invoked by the caller after the
//! engine lock has been released, so observers may call back into the store.

use super::backend::{BackendResult, QuadBackend};
use super::descriptor::{GraphSelector, QuadDescriptor, QuadPattern, TermDescriptor};
use crate::sparql::{SparqlResult, SparqlResults};
use indexmap::IndexMap;
use spargebra::Query;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifier of a registered observer
pub type ObserverId = u64;

/// Kind of change reported to pattern observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Added,
    Deleted,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::Added => write!(f, "added"),
            ChangeEvent::Deleted => write!(f, "deleted"),
        }
    }
}

/// Quads added and removed by one mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<QuadDescriptor>,
    pub removed: Vec<QuadDescriptor>,
}

impl ChangeSet {
    /// Quads added plus quads removed
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn extend(&mut self, other: ChangeSet) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

/// Receives the full current description of an observed node
pub type NodeAdapter = Arc<dyn Fn(&[QuadDescriptor]) + Send + Sync>;

/// Receives the new results of an observed query
pub type QueryAdapter = Arc<dyn Fn(&SparqlResults) + Send + Sync>;

/// Receives matching quads of a pattern subscription
pub type PatternAdapter = Arc<dyn Fn(ChangeEvent, &[QuadDescriptor]) + Send + Sync>;

struct NodeObserver {
    subject: TermDescriptor,
    graph: Option<String>,
    adapter: NodeAdapter,
}

struct QueryObserver {
    query: Query,
    last: SparqlResults,
    adapter: QueryAdapter,
}

struct PatternObserver {
    pattern: QuadPattern,
    adapter: PatternAdapter,
}

/// A notification ready to be invoked
pub enum Delivery {
    Node(NodeAdapter, Vec<QuadDescriptor>),
    Query(QueryAdapter, SparqlResults),
    Pattern(PatternAdapter, ChangeEvent, Vec<QuadDescriptor>),
}

impl Delivery {
    /// Invoke the observer
    pub fn deliver(self) {
        match self {
            Delivery::Node(adapter, quads) => adapter(&quads),
            Delivery::Query(adapter, results) => adapter(&results),
            Delivery::Pattern(adapter, event, quads) => adapter(event, &quads),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Node(_, quads) => f.debug_tuple("Node").field(&quads.len()).finish(),
            Delivery::Query(_, results) => f.debug_tuple("Query").field(&results.len()).finish(),
            Delivery::Pattern(_, event, quads) => {
                f.debug_tuple("Pattern").field(event).field(&quads.len()).finish()
            }
        }
    }
}

/// Registry of observers kept alongside the quad backend
#[derive(Default)]
pub struct CallbacksBackend {
    next_id: ObserverId,
    nodes: IndexMap<ObserverId, NodeObserver>,
    queries: IndexMap<ObserverId, QueryObserver>,
    patterns: IndexMap<ObserverId, PatternObserver>,
}

impl CallbacksBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> ObserverId {
        self.next_id += 1;
        self.next_id
    }

    /// Observe every quad with `subject` in `graph` (`None` = default graph)
    pub fn observe_node(&mut self, subject: TermDescriptor, graph: Option<String>, adapter: NodeAdapter) -> ObserverId {
        let id = self.allocate();
        debug!("Observing node {} in {:?} as #{}", subject, graph, id);
        self.nodes.insert(id, NodeObserver { subject, graph, adapter });
        id
    }

    pub fn stop_observing_node(&mut self, id: ObserverId) -> bool {
        self.nodes.shift_remove(&id).is_some()
    }

    /// Observe the results of `query`; `initial` is what the caller already saw
    pub fn observe_query(&mut self, query: Query, initial: SparqlResults, adapter: QueryAdapter) -> ObserverId {
        let id = self.allocate();
        debug!("Observing query #{}", id);
        self.queries.insert(
            id,
            QueryObserver {
                query,
                last: initial,
                adapter,
            },
        );
        id
    }

    pub fn stop_observing_query(&mut self, id: ObserverId) -> bool {
        self.queries.shift_remove(&id).is_some()
    }

    /// Receive added and deleted quads matching `pattern`
    pub fn subscribe(&mut self, pattern: QuadPattern, adapter: PatternAdapter) -> ObserverId {
        let id = self.allocate();
        debug!("Pattern subscription #{}: {:?}", id, pattern);
        self.patterns.insert(id, PatternObserver { pattern, adapter });
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.patterns.shift_remove(&id).is_some()
    }

    /// Number of registered observers of every kind
    pub fn len(&self) -> usize {
        self.nodes.len() + self.queries.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute the notifications caused by `changes`
    ///
    /// Must run after `changes` has been applied to `backend`. Query
    /// observers are re-evaluated with `evaluate` and only notified when
    /// their results differ from the last delivery.
    pub fn collect(
        &mut self,
        changes: &ChangeSet,
        backend: &dyn QuadBackend,
        evaluate: &dyn Fn(&Query) -> SparqlResult<SparqlResults>,
    ) -> Vec<Delivery> {
        if changes.is_empty() || self.is_empty() {
            return Vec::new();
        }
        let mut deliveries = Vec::new();

        for observer in self.nodes.values() {
            let touched = changes
                .added
                .iter()
                .chain(changes.removed.iter())
                .any(|q| q.subject == observer.subject && q.graph == observer.graph);
            if !touched {
                continue;
            }
            match node_description(backend, &observer.subject, &observer.graph) {
                Ok(quads) => deliveries.push(Delivery::Node(observer.adapter.clone(), quads)),
                Err(e) => warn!("Failed to describe observed node {}: {}", observer.subject, e),
            }
        }

        for (id, observer) in self.queries.iter_mut() {
            match evaluate(&observer.query) {
                Ok(results) if !results.same_as(&observer.last) => {
                    observer.last = results.clone();
                    deliveries.push(Delivery::Query(observer.adapter.clone(), results));
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to re-evaluate observed query #{}: {}", id, e),
            }
        }

        for observer in self.patterns.values() {
            for (event, quads) in [(ChangeEvent::Added, &changes.added), (ChangeEvent::Deleted, &changes.removed)] {
                let matching: Vec<QuadDescriptor> =
                    quads.iter().filter(|q| observer.pattern.matches(q)).cloned().collect();
                if !matching.is_empty() {
                    deliveries.push(Delivery::Pattern(observer.adapter.clone(), event, matching));
                }
            }
        }

        debug!("{} notifications for {} added / {} removed quads", deliveries.len(), changes.added.len(), changes.removed.len());
        deliveries
    }
}

/// Every quad currently stored for `subject` in `graph`
pub fn node_description(
    backend: &dyn QuadBackend,
    subject: &TermDescriptor,
    graph: &Option<String>,
) -> BackendResult<Vec<QuadDescriptor>> {
    let selector = match graph {
        Some(g) => GraphSelector::Named(g.clone()),
        None => GraphSelector::Default,
    };
    let mut pattern = QuadPattern::any(selector);
    pattern.subject = Some(subject.clone());
    backend.match_pattern(&pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::EmbeddedBackend;
    use crate::engine::index::QuadIndex;
    use crate::engine::lexicon::Lexicon;
    use std::sync::Mutex;

    fn quad(s: &str, o: &str) -> QuadDescriptor {
        QuadDescriptor::new(
            TermDescriptor::uri(s),
            TermDescriptor::uri("http://example.org/p"),
            TermDescriptor::simple_literal(o),
            None,
        )
    }

    fn no_queries(_: &Query) -> SparqlResult<SparqlResults> {
        Ok(SparqlResults::empty())
    }

    #[test]
    fn test_node_observer_receives_full_description() {
        let mut backend = EmbeddedBackend::new(Lexicon::new(), QuadIndex::new(15));
        let mut callbacks = CallbacksBackend::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        callbacks.observe_node(
            TermDescriptor::uri("http://example.org/a"),
            None,
            Arc::new(move |quads| sink.lock().unwrap().push(quads.len())),
        );

        let first = quad("http://example.org/a", "1");
        backend.insert(&first).unwrap();
        backend.insert(&quad("http://example.org/a", "2")).unwrap();
        let changes = ChangeSet {
            added: vec![quad("http://example.org/a", "2")],
            removed: vec![],
        };
        for delivery in callbacks.collect(&changes, &backend, &no_queries) {
            delivery.deliver();
        }
        assert_eq!(*seen.lock().unwrap(), vec![2]);

        // Unrelated subject: no delivery
        let changes = ChangeSet {
            added: vec![quad("http://example.org/b", "1")],
            removed: vec![],
        };
        assert!(callbacks.collect(&changes, &backend, &no_queries).is_empty());
    }

    #[test]
    fn test_pattern_observer_splits_events() {
        let backend = EmbeddedBackend::new(Lexicon::new(), QuadIndex::new(15));
        let mut callbacks = CallbacksBackend::new();
        let mut pattern = QuadPattern::any(GraphSelector::All);
        pattern.subject = Some(TermDescriptor::uri("http://example.org/a"));
        let id = callbacks.subscribe(pattern, Arc::new(|_, _| {}));

        let changes = ChangeSet {
            added: vec![quad("http://example.org/a", "1"), quad("http://example.org/b", "1")],
            removed: vec![quad("http://example.org/a", "0")],
        };
        let deliveries = callbacks.collect(&changes, &backend, &no_queries);
        assert_eq!(deliveries.len(), 2);
        assert!(matches!(&deliveries[0], Delivery::Pattern(_, ChangeEvent::Added, q) if q.len() == 1));
        assert!(matches!(&deliveries[1], Delivery::Pattern(_, ChangeEvent::Deleted, q) if q.len() == 1));

        assert!(callbacks.unsubscribe(id));
        assert!(!callbacks.unsubscribe(id));
        assert!(callbacks.collect(&changes, &backend, &no_queries).is_empty());
    }

    #[test]
    fn test_query_observer_only_on_change() {
        let backend = EmbeddedBackend::new(Lexicon::new(), QuadIndex::new(15));
        let mut callbacks = CallbacksBackend::new();
        let query = crate::sparql::ParsedRequest::parse_query("ASK { ?s ?p ?o }", None).unwrap();
        callbacks.observe_query(query, SparqlResults::Boolean(false), Arc::new(|_| {}));

        let changes = ChangeSet {
            added: vec![quad("http://example.org/a", "1")],
            removed: vec![],
        };
        let unchanged = |_: &Query| -> SparqlResult<SparqlResults> { Ok(SparqlResults::Boolean(false)) };
        assert!(callbacks.collect(&changes, &backend, &unchanged).is_empty());

        let changed = |_: &Query| -> SparqlResult<SparqlResults> { Ok(SparqlResults::Boolean(true)) };
        assert_eq!(callbacks.collect(&changes, &backend, &changed).len(), 1);
        // Last results were updated
        assert!(callbacks.collect(&changes, &backend, &changed).is_empty());
    }
}
