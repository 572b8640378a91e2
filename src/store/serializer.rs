//! Structured RDF terms → SPARQL lexical text
//!
//! Named nodes are resolved through the namespace manager; a value that
//! can't be resolved is written as-is. Literal values are written verbatim
//! (no escaping of quotes or backslashes).

use crate::engine::TermDescriptor;
use crate::rdf::{Literal, NamedNode, NamespaceManager, RdfObject, RdfPredicate, RdfSubject, RdfTerm, Triple, XSD_STRING};

/// Writes terms in SPARQL triple-pattern syntax
pub struct TermSerializer<'a> {
    namespaces: &'a NamespaceManager,
}

impl<'a> TermSerializer<'a> {
    pub fn new(namespaces: &'a NamespaceManager) -> Self {
        Self { namespaces }
    }

    /// Absolute form of a named node, or its raw value
    pub fn resolve(&self, node: &NamedNode) -> String {
        self.namespaces
            .resolve(node.as_str())
            .unwrap_or_else(|| node.as_str().to_string())
    }

    pub fn named_node(&self, node: &NamedNode) -> String {
        format!("<{}>", self.resolve(node))
    }

    pub fn literal(&self, literal: &Literal) -> String {
        if let Some(lang) = literal.language() {
            return format!("\"{}\"@{}", literal.value(), lang);
        }
        let datatype = literal.datatype();
        if datatype.as_str() == XSD_STRING {
            format!("\"{}\"", literal.value())
        } else {
            format!("\"{}\"^^{}", literal.value(), self.named_node(&datatype))
        }
    }

    pub fn term(&self, term: &RdfTerm) -> String {
        match term {
            RdfTerm::NamedNode(n) => self.named_node(n),
            RdfTerm::BlankNode(b) => format!("_:{}", b.as_str()),
            RdfTerm::Literal(l) => self.literal(l),
        }
    }

    pub fn subject(&self, subject: &RdfSubject) -> String {
        match subject {
            RdfSubject::NamedNode(n) => self.named_node(n),
            RdfSubject::BlankNode(b) => format!("_:{}", b.as_str()),
        }
    }

    pub fn predicate(&self, predicate: &RdfPredicate) -> String {
        self.named_node(predicate.as_named_node())
    }

    pub fn object(&self, object: &RdfObject) -> String {
        match object {
            RdfObject::NamedNode(n) => self.named_node(n),
            RdfObject::BlankNode(b) => format!("_:{}", b.as_str()),
            RdfObject::Literal(l) => self.literal(l),
        }
    }

    /// Engine form of a term, with named nodes and datatypes resolved
    pub fn descriptor(&self, term: &RdfTerm) -> TermDescriptor {
        match term {
            RdfTerm::NamedNode(n) => TermDescriptor::uri(self.resolve(n)),
            RdfTerm::BlankNode(b) => TermDescriptor::Blank(b.as_str().to_string()),
            RdfTerm::Literal(l) => match l.language() {
                Some(lang) => TermDescriptor::lang_literal(l.value(), lang),
                None => TermDescriptor::typed_literal(l.value(), self.resolve(&l.datatype())),
            },
        }
    }

    /// `subject predicate object .`
    pub fn triple(&self, triple: &Triple) -> String {
        format!(
            "{} {} {} .",
            self.subject(&triple.subject),
            self.predicate(&triple.predicate),
            self.object(&triple.object)
        )
    }
}
