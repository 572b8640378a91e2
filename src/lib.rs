//! Quadstore
//!
//! An RDF quad store with a SPARQL 1.1 engine, bulk loading of RDF documents
//! and live change notifications.
//!
//! # Architecture
//!
//! - [`store`]: public facade. Every convenience operation (insert, delete,
//!   clear, load, graph, node) is rewritten into SPARQL text and runs
//!   through the same execute path as user queries.
//! - [`engine`]: the SPARQL engine bound to one quad backend, the observer
//!   registry and the RDF loader.
//! - [`sparql`]: parsing (spargebra) and evaluation of queries and updates.
//! - [`rdf`]: terms, namespaces, parsers and serializers.
//! - [`transport`]: fetching remote documents for `LOAD`.
//! - [`http`]: SPARQL endpoint for out-of-process stores.
//!
//! Two backends are available: an embedded lexicon plus in-memory quad
//! index (optionally snapshotted to disk) and a RocksDB document store.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use quadstore::config::StoreConfig;
//! use quadstore::rdf::{Literal, NamedNode, RdfPredicate, Triple};
//! use quadstore::store::create;
//!
//! # async fn example() -> quadstore::store::StoreResult<()> {
//! let store = create(StoreConfig::default()).await?;
//! store.set_prefix("foaf", "http://xmlns.com/foaf/0.1/");
//!
//! let alice = NamedNode::new_unchecked("http://example.org/alice");
//! let handle = store
//!     .start_observing_node(&alice, None, |triples| {
//!         println!("alice now has {} triples", triples.len());
//!     })
//!     .await?;
//!
//! let name = Triple::new(
//!     alice.clone().into(),
//!     RdfPredicate::from(NamedNode::new_unchecked("foaf:name")),
//!     Literal::new_simple_literal("Alice").into(),
//! );
//! store.insert(&[name], None).await?;
//!
//! store.stop_observing_node(handle).await;
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod http;
pub mod rdf;
pub mod sparql;
pub mod store;
pub mod transport;

// Re-export main types for convenience
pub use config::{ConfigError, EngineKind, StoreConfig};

pub use engine::{ChangeEvent, SparqlEngine, DEFAULT_GRAPH_URI};

pub use rdf::{
    NamedNode, BlankNode, Literal, Triple, Quad,
    RdfTerm, RdfSubject, RdfPredicate, RdfObject,
    TriplePattern, NamespaceManager, RdfFormat,
};

pub use sparql::{ExecutionOutcome, SparqlError, SparqlResults, UpdateSummary};

pub use store::{
    connect, create, Connection, LoadSource, SparqlClient, Store, StoreBuilder,
    StoreError, StoreResult, SubscriptionHandle,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "0.1.0");
    }
}
