//! RDF term factory
//!
//! Builds structured terms from plain strings. Named nodes keep their raw
//! value; prefixed names are resolved when the term is serialized.

use super::namespace::NamespaceManager;
use super::types::{
    BlankNode, Literal, NamedNode, RdfError, RdfResult, RdfTerm, Triple,
};

/// Factory for RDF terms bound to a namespace snapshot
#[derive(Debug, Clone, Default)]
pub struct TermFactory {
    namespaces: NamespaceManager,
}

impl TermFactory {
    /// Create a factory resolving names against `namespaces`
    pub fn new(namespaces: NamespaceManager) -> Self {
        Self { namespaces }
    }

    /// Create a named node from an IRI, prefixed name or relative reference
    pub fn create_named_node(&self, value: &str) -> NamedNode {
        NamedNode::new_unchecked(value)
    }

    /// Create a fresh blank node
    pub fn create_blank_node(&self) -> BlankNode {
        BlankNode::new()
    }

    /// Create a literal with an optional language tag or datatype.
    ///
    /// Supplying both is rejected; the datatype may be a prefixed name.
    pub fn create_literal(
        &self,
        value: &str,
        language: Option<&str>,
        datatype: Option<&str>,
    ) -> RdfResult<Literal> {
        match (language, datatype) {
            (Some(_), Some(_)) => Err(RdfError::InvalidLiteral(format!(
                "\"{}\" can't have both a language tag and a datatype",
                value
            ))),
            (Some(lang), None) => Literal::new_language_tagged_literal(value, lang),
            (None, Some(dt)) => {
                let iri = self.namespaces.resolve(dt).unwrap_or_else(|| dt.to_string());
                Ok(Literal::new_typed_literal(value, NamedNode::new_unchecked(iri)))
            }
            (None, None) => Ok(Literal::new_simple_literal(value)),
        }
    }

    /// Create a triple, checking term positions
    pub fn create_triple(&self, subject: RdfTerm, predicate: RdfTerm, object: RdfTerm) -> RdfResult<Triple> {
        Triple::from_terms(subject, predicate, object)
    }

    /// Resolve a prefixed name against the factory's namespaces
    pub fn resolve(&self, value: &str) -> Option<String> {
        self.namespaces.resolve(value)
    }
}
