//! SPARQL 1.1 query language support
//!
//! Requests are parsed with spargebra and evaluated against a
//! [`QuadBackend`](crate::engine::QuadBackend). The evaluator covers the
//! commonly used subset of the algebra:
//!
//! - Query forms: SELECT, CONSTRUCT, ASK, DESCRIBE
//! - Graph patterns: BGP, OPTIONAL, FILTER, UNION, GRAPH, BIND, MINUS,
//!   VALUES, ORDER BY, projection, DISTINCT/REDUCED, LIMIT/OFFSET
//! - Updates: INSERT DATA, DELETE DATA, DELETE/INSERT WHERE, LOAD, CLEAR,
//!   CREATE, DROP
//!
//! Property paths, aggregates and SERVICE are rejected with
//! [`SparqlError::Unsupported`].
//!
//! # Example
//!
//! ```rust
//! use quadstore::sparql::ParsedRequest;
//!
//! let request = ParsedRequest::parse("SELECT * WHERE { ?s ?p ?o }", None).unwrap();
//! assert!(request.is_query());
//! ```

mod executor;
mod expression;
mod parser;
mod results;

pub use executor::{Dataset, Evaluator, FetchedLoads, Solution, UpdateExecutor};
pub use parser::ParsedRequest;
pub use results::{
    EncodedOutcome, ExecutionOutcome, QuerySolution, SparqlResults, UpdateSummary, N_TRIPLES,
    SPARQL_RESULTS_JSON, UPDATE_JSON,
};

use crate::engine::backend::BackendError;
use crate::engine::loader::LoadError;
use crate::rdf::RdfError;
use thiserror::Error;

/// SPARQL errors
#[derive(Error, Debug)]
pub enum SparqlError {
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Algebra the evaluator doesn't implement
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Type error
    #[error("Type error: {0}")]
    Type(String),

    /// Malformed results document
    #[error("Results error: {0}")]
    Results(String),

    /// Backend failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// LOAD failure
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Invalid term
    #[error("RDF error: {0}")]
    Rdf(#[from] RdfError),
}

pub type SparqlResult<T> = Result<T, SparqlError>;
