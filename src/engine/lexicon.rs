//! Term dictionary for the embedded backend
//!
//! Maps term descriptors to dense `u64` ids. The quad index stores ids only,
//! so every term reaching the index goes through [`Lexicon::intern`].

use super::descriptor::TermDescriptor;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// IRI naming the default graph wherever a graph IRI is expected
pub const DEFAULT_GRAPH_URI: &str = "https://github.com/antoniogarrote/rdfstore-js#default_graph";

/// Id of the default graph, reserved at construction
pub const DEFAULT_GRAPH_ID: u64 = 0;

/// Term ↔ id dictionary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lexicon {
    ids: FxHashMap<TermDescriptor, u64>,
    terms: FxHashMap<u64, TermDescriptor>,
    next_id: u64,
    /// Named graph id → number of quads stored in it
    graph_counts: FxHashMap<u64, usize>,
}

impl Lexicon {
    /// Create an empty lexicon with the default graph reserved
    pub fn new() -> Self {
        let mut lexicon = Self {
            ids: FxHashMap::default(),
            terms: FxHashMap::default(),
            next_id: DEFAULT_GRAPH_ID,
            graph_counts: FxHashMap::default(),
        };
        lexicon.intern(&TermDescriptor::uri(DEFAULT_GRAPH_URI));
        lexicon
    }

    /// Drop every term except the default graph
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Id of a term, assigning a new one if needed
    pub fn intern(&mut self, term: &TermDescriptor) -> u64 {
        if let Some(id) = self.ids.get(term) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(term.clone(), id);
        self.terms.insert(id, term.clone());
        id
    }

    /// Id of a known term
    pub fn lookup(&self, term: &TermDescriptor) -> Option<u64> {
        self.ids.get(term).copied()
    }

    /// Id of a graph name; `None` is the default graph
    pub fn lookup_graph(&self, graph: Option<&str>) -> Option<u64> {
        match graph {
            None => Some(DEFAULT_GRAPH_ID),
            Some(DEFAULT_GRAPH_URI) => Some(DEFAULT_GRAPH_ID),
            Some(iri) => self.lookup(&TermDescriptor::uri(iri)),
        }
    }

    /// Intern a graph name; `None` is the default graph
    pub fn intern_graph(&mut self, graph: Option<&str>) -> u64 {
        match graph {
            None | Some(DEFAULT_GRAPH_URI) => DEFAULT_GRAPH_ID,
            Some(iri) => self.intern(&TermDescriptor::uri(iri)),
        }
    }

    /// Term for an id
    pub fn resolve(&self, id: u64) -> Option<&TermDescriptor> {
        self.terms.get(&id)
    }

    /// Graph name for a graph id; `None` is the default graph
    pub fn resolve_graph(&self, id: u64) -> Option<Option<String>> {
        if id == DEFAULT_GRAPH_ID {
            return Some(None);
        }
        self.resolve(id).map(|t| Some(t.value().to_string()))
    }

    /// Record a quad stored in a graph
    pub fn retain_graph(&mut self, id: u64) {
        if id != DEFAULT_GRAPH_ID {
            *self.graph_counts.entry(id).or_insert(0) += 1;
        }
    }

    /// Record a quad removed from a graph
    pub fn release_graph(&mut self, id: u64) {
        if let Some(count) = self.graph_counts.get_mut(&id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.graph_counts.remove(&id);
            }
        }
    }

    /// Named graphs currently holding at least one quad, sorted
    pub fn registered_graphs(&self) -> Vec<String> {
        let mut graphs: Vec<String> = self
            .graph_counts
            .keys()
            .filter_map(|id| self.resolve(*id))
            .map(|t| t.value().to_string())
            .collect();
        graphs.sort();
        graphs
    }

    /// Number of interned terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut lexicon = Lexicon::new();
        let a = TermDescriptor::uri("http://example.org/a");
        let id = lexicon.intern(&a);
        assert_eq!(lexicon.intern(&a), id);
        assert_eq!(lexicon.resolve(id), Some(&a));
        assert_ne!(id, DEFAULT_GRAPH_ID);
    }

    #[test]
    fn test_default_graph_alias() {
        let mut lexicon = Lexicon::new();
        assert_eq!(lexicon.intern_graph(Some(DEFAULT_GRAPH_URI)), DEFAULT_GRAPH_ID);
        assert_eq!(lexicon.lookup_graph(None), Some(DEFAULT_GRAPH_ID));
        assert_eq!(lexicon.resolve_graph(DEFAULT_GRAPH_ID), Some(None));
    }

    #[test]
    fn test_registered_graphs_follow_counts() {
        let mut lexicon = Lexicon::new();
        let g = lexicon.intern_graph(Some("http://example.org/g"));
        lexicon.retain_graph(g);
        lexicon.retain_graph(g);
        lexicon.retain_graph(DEFAULT_GRAPH_ID);
        assert_eq!(lexicon.registered_graphs(), vec!["http://example.org/g".to_string()]);

        lexicon.release_graph(g);
        assert_eq!(lexicon.registered_graphs().len(), 1);
        lexicon.release_graph(g);
        assert!(lexicon.registered_graphs().is_empty());
    }

    #[test]
    fn test_clear_keeps_default_graph() {
        let mut lexicon = Lexicon::new();
        lexicon.intern(&TermDescriptor::simple_literal("x"));
        lexicon.clear();
        assert_eq!(lexicon.len(), 1);
        assert_eq!(lexicon.resolve(DEFAULT_GRAPH_ID), Some(&TermDescriptor::uri(DEFAULT_GRAPH_URI)));
    }
}
