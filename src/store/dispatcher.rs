//! Canonical SPARQL statements for the store's helper operations
//!
//! Every helper (`insert`, `delete`, `clear`, remote `load`, `graph`,
//! `node`) is expressed as SPARQL text and sent through the same execute
//! path as user queries.

use super::serializer::TermSerializer;
use crate::engine::{GraphScope, DEFAULT_GRAPH_URI};
use crate::rdf::{NamedNode, NamespaceManager, Triple};

/// Builds statements and graph scopes against one namespace snapshot
pub struct QueryDispatcher<'a> {
    serializer: TermSerializer<'a>,
}

impl<'a> QueryDispatcher<'a> {
    pub fn new(namespaces: &'a NamespaceManager) -> Self {
        Self {
            serializer: TermSerializer::new(namespaces),
        }
    }

    pub fn serializer(&self) -> &TermSerializer<'a> {
        &self.serializer
    }

    /// `INSERT DATA { … }`, wrapped in `GRAPH` when a graph is given
    pub fn insert_statement(&self, triples: &[Triple], graph: Option<&NamedNode>) -> String {
        format!("INSERT DATA {{ {} }}", self.data_block(triples, graph))
    }

    /// `DELETE DATA { … }`, wrapped in `GRAPH` when a graph is given
    pub fn delete_statement(&self, triples: &[Triple], graph: Option<&NamedNode>) -> String {
        format!("DELETE DATA {{ {} }}", self.data_block(triples, graph))
    }

    /// `CLEAR GRAPH <g>`; the default graph is named by its IRI
    pub fn clear_statement(&self, graph: Option<&NamedNode>) -> String {
        format!("CLEAR GRAPH {}", self.graph_ref(graph))
    }

    /// `LOAD <uri> INTO GRAPH <g>`; `uri` must already be absolute
    pub fn load_statement(&self, uri: &str, graph: Option<&NamedNode>) -> String {
        format!("LOAD <{}> INTO GRAPH {}", uri, self.graph_ref(graph))
    }

    /// Every triple of a graph
    pub fn graph_statement(&self, graph: Option<&NamedNode>) -> String {
        match graph {
            Some(g) => format!(
                "CONSTRUCT {{ ?s ?p ?o }} WHERE {{ GRAPH {} {{ ?s ?p ?o }} }}",
                self.serializer.named_node(g)
            ),
            None => "CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }".to_string(),
        }
    }

    /// Every triple with `subject` in a graph
    pub fn node_statement(&self, subject: &NamedNode, graph: Option<&NamedNode>) -> String {
        let subject = self.serializer.named_node(subject);
        match graph {
            Some(g) => format!(
                "CONSTRUCT {{ {s} ?p ?o }} WHERE {{ GRAPH {} {{ {s} ?p ?o }} }}",
                self.serializer.named_node(g),
                s = subject
            ),
            None => format!("CONSTRUCT {{ {s} ?p ?o }} WHERE {{ {s} ?p ?o }}", s = subject),
        }
    }

    /// Graph scope with every URI resolved through the namespaces
    pub fn scope(&self, default: &[String], named: &[String]) -> GraphScope {
        let resolve = |uris: &[String]| -> Vec<NamedNode> {
            uris.iter()
                .map(|u| NamedNode::new_unchecked(self.serializer.resolve(&NamedNode::new_unchecked(u.as_str()))))
                .collect()
        };
        GraphScope::new(resolve(default), resolve(named))
    }

    fn data_block(&self, triples: &[Triple], graph: Option<&NamedNode>) -> String {
        let body = triples
            .iter()
            .map(|t| self.serializer.triple(t))
            .collect::<Vec<_>>()
            .join(" ");
        match graph {
            Some(g) => format!("GRAPH {} {{ {} }}", self.serializer.named_node(g), body),
            None => body,
        }
    }

    fn graph_ref(&self, graph: Option<&NamedNode>) -> String {
        match graph {
            Some(g) => self.serializer.named_node(g),
            None => format!("<{}>", DEFAULT_GRAPH_URI),
        }
    }
}
