//! Engine-internal term descriptors
//!
//! Descriptors are the plain-data form of RDF terms used as lexicon keys,
//! document-store payloads and notification payloads. They are rehydrated
//! into [`rdf`](crate::rdf) terms at the public boundary.

use crate::rdf::{
    BlankNode, Literal, NamedNode, Quad, RdfObject, RdfResult, RdfSubject, RdfTerm, Triple,
    XSD_STRING,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `rdf:langString`, the datatype of language-tagged literals
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// Engine-internal form of an RDF term
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TermDescriptor {
    /// IRI
    Uri(String),
    /// Literal; `datatype` is `None` for simple and language-tagged literals
    Literal {
        value: String,
        lang: Option<String>,
        datatype: Option<String>,
    },
    /// Blank node label
    Blank(String),
}

impl TermDescriptor {
    /// Create an IRI descriptor
    pub fn uri(iri: impl Into<String>) -> Self {
        TermDescriptor::Uri(iri.into())
    }

    /// Create a simple literal descriptor
    pub fn simple_literal(value: impl Into<String>) -> Self {
        TermDescriptor::Literal {
            value: value.into(),
            lang: None,
            datatype: None,
        }
    }

    /// Create a typed literal descriptor; `xsd:string` collapses to a simple literal
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        TermDescriptor::Literal {
            value: value.into(),
            lang: None,
            datatype: (datatype != XSD_STRING).then_some(datatype),
        }
    }

    /// Create a language-tagged literal descriptor
    pub fn lang_literal(value: impl Into<String>, lang: impl Into<String>) -> Self {
        TermDescriptor::Literal {
            value: value.into(),
            lang: Some(lang.into()),
            datatype: None,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, TermDescriptor::Uri(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, TermDescriptor::Blank(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, TermDescriptor::Literal { .. })
    }

    /// IRI, label or lexical value
    pub fn value(&self) -> &str {
        match self {
            TermDescriptor::Uri(v) | TermDescriptor::Blank(v) => v,
            TermDescriptor::Literal { value, .. } => value,
        }
    }

    /// Effective datatype IRI of a literal
    pub fn datatype(&self) -> Option<&str> {
        match self {
            TermDescriptor::Literal { lang: Some(_), .. } => Some(RDF_LANG_STRING),
            TermDescriptor::Literal { datatype: Some(dt), .. } => Some(dt),
            TermDescriptor::Literal { .. } => Some(XSD_STRING),
            _ => None,
        }
    }

    /// Language tag of a literal
    pub fn lang(&self) -> Option<&str> {
        match self {
            TermDescriptor::Literal { lang, .. } => lang.as_deref(),
            _ => None,
        }
    }

    pub fn from_rdf_term(term: &RdfTerm) -> Self {
        match term {
            RdfTerm::NamedNode(n) => TermDescriptor::Uri(n.as_str().to_string()),
            RdfTerm::BlankNode(b) => TermDescriptor::Blank(b.as_str().to_string()),
            RdfTerm::Literal(l) => Self::from_literal(l),
        }
    }

    pub fn from_subject(subject: &RdfSubject) -> Self {
        match subject {
            RdfSubject::NamedNode(n) => TermDescriptor::Uri(n.as_str().to_string()),
            RdfSubject::BlankNode(b) => TermDescriptor::Blank(b.as_str().to_string()),
        }
    }

    pub fn from_object(object: &RdfObject) -> Self {
        match object {
            RdfObject::NamedNode(n) => TermDescriptor::Uri(n.as_str().to_string()),
            RdfObject::BlankNode(b) => TermDescriptor::Blank(b.as_str().to_string()),
            RdfObject::Literal(l) => Self::from_literal(l),
        }
    }

    pub fn from_literal(literal: &Literal) -> Self {
        match literal.language() {
            Some(lang) => Self::lang_literal(literal.value(), lang),
            None => Self::typed_literal(literal.value(), literal.datatype().as_str()),
        }
    }

    pub fn from_ox_named_node(node: &oxrdf::NamedNode) -> Self {
        TermDescriptor::Uri(node.as_str().to_string())
    }

    pub fn from_ox_blank_node(node: &oxrdf::BlankNode) -> Self {
        TermDescriptor::Blank(node.as_str().to_string())
    }

    pub fn from_ox_literal(literal: &oxrdf::Literal) -> Self {
        match literal.language() {
            Some(lang) => Self::lang_literal(literal.value(), lang),
            None => Self::typed_literal(literal.value(), literal.datatype().as_str()),
        }
    }

    /// Rehydrate into a public RDF term
    pub fn to_rdf_term(&self) -> RdfTerm {
        match self {
            TermDescriptor::Uri(iri) => NamedNode::new_unchecked(iri.as_str()).into(),
            TermDescriptor::Blank(label) => BlankNode::new_unchecked(label.as_str()).into(),
            TermDescriptor::Literal { value, lang: Some(lang), .. } => {
                Literal::new_language_tagged_literal_unchecked(value.as_str(), lang.as_str()).into()
            }
            TermDescriptor::Literal { value, datatype: Some(dt), .. } => {
                Literal::new_typed_literal(value.as_str(), NamedNode::new_unchecked(dt.as_str())).into()
            }
            TermDescriptor::Literal { value, .. } => Literal::new_simple_literal(value.as_str()).into(),
        }
    }
}

impl fmt::Display for TermDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rdf_term())
    }
}

/// A quad of descriptors; `graph == None` is the default graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuadDescriptor {
    pub subject: TermDescriptor,
    pub predicate: TermDescriptor,
    pub object: TermDescriptor,
    pub graph: Option<String>,
}

impl QuadDescriptor {
    pub fn new(
        subject: TermDescriptor,
        predicate: TermDescriptor,
        object: TermDescriptor,
        graph: Option<String>,
    ) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph,
        }
    }

    pub fn from_quad(quad: &Quad) -> Self {
        Self {
            subject: TermDescriptor::from_subject(&quad.subject),
            predicate: TermDescriptor::Uri(quad.predicate.as_named_node().as_str().to_string()),
            object: TermDescriptor::from_object(&quad.object),
            graph: quad.graph.as_ref().map(|g| g.as_str().to_string()),
        }
    }

    /// Rehydrate the triple part
    pub fn to_triple(&self) -> RdfResult<Triple> {
        Triple::from_terms(
            self.subject.to_rdf_term(),
            self.predicate.to_rdf_term(),
            self.object.to_rdf_term(),
        )
    }

    /// Rehydrate the whole quad
    pub fn to_quad(&self) -> RdfResult<Quad> {
        let graph = self.graph.as_deref().map(NamedNode::new_unchecked);
        Ok(Quad::from_triple(self.to_triple()?, graph))
    }
}

/// Which graphs a pattern ranges over
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphSelector {
    /// The default graph only
    Default,
    /// One named graph
    Named(String),
    /// Every named graph, excluding the default graph
    AllNamed,
    /// Every graph
    All,
}

impl GraphSelector {
    pub fn matches(&self, graph: Option<&str>) -> bool {
        match (self, graph) {
            (GraphSelector::All, _) => true,
            (GraphSelector::Default, None) => true,
            (GraphSelector::Named(name), Some(g)) => name == g,
            (GraphSelector::AllNamed, Some(_)) => true,
            _ => false,
        }
    }
}

/// Quad pattern; `None` positions match anything
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuadPattern {
    pub subject: Option<TermDescriptor>,
    pub predicate: Option<TermDescriptor>,
    pub object: Option<TermDescriptor>,
    pub graph: GraphSelector,
}

impl QuadPattern {
    /// Pattern matching every quad of the selected graphs
    pub fn any(graph: GraphSelector) -> Self {
        Self {
            subject: None,
            predicate: None,
            object: None,
            graph,
        }
    }

    pub fn matches(&self, quad: &QuadDescriptor) -> bool {
        fn position(expected: &Option<TermDescriptor>, actual: &TermDescriptor) -> bool {
            expected.as_ref().map_or(true, |e| e == actual)
        }

        position(&self.subject, &quad.subject)
            && position(&self.predicate, &quad.predicate)
            && position(&self.object, &quad.object)
            && self.graph.matches(quad.graph.as_deref())
    }
}
