//! RDF data model for the quad store
//!
//! This module provides:
//! - RDF terms, triples and quads (oxrdf wrappers)
//! - Triple patterns for subscriptions
//! - Namespace prefixes and IRI resolution
//! - A term factory for building terms from strings
//! - RDF parsers (Turtle, N-Triples, N-Quads, TriG, RDF/XML) and serializers
//!
//! # Example
//!
//! ```rust
//! use quadstore::rdf::{NamedNode, Literal, RdfPredicate, Triple};
//!
//! let subject = NamedNode::new("http://example.org/alice").unwrap();
//! let predicate = RdfPredicate::new("http://xmlns.com/foaf/0.1/name").unwrap();
//! let object = Literal::new_simple_literal("Alice");
//!
//! let triple = Triple::new(subject.into(), predicate, object.into());
//! assert_eq!(
//!     triple.to_string(),
//!     "<http://example.org/alice> <http://xmlns.com/foaf/0.1/name> \"Alice\" ."
//! );
//! ```

mod factory;
mod namespace;
pub mod serialization;
mod types;

pub use types::{
    RdfTerm, RdfSubject, RdfPredicate, RdfObject, TermKind,
    NamedNode, BlankNode, Literal, Triple, Quad,
    TriplePattern, RdfError, RdfResult, XSD_STRING,
};

pub use factory::TermFactory;

pub use namespace::{
    NamespaceManager, Namespace,
    PrefixError, PrefixResult,
};

pub use serialization::{
    FormatParser, RdfFormat, RdfParser, RdfSerializer,
    ParseError, ParseResult,
    SerializeError, SerializeResult,
};
