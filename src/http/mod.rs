//! SPARQL endpoint served over HTTP
//!
//! Used by [`RemoteStore`](crate::store::RemoteStore) to talk to a store
//! running in another process.

mod handler;
mod server;

pub use handler::{sparql_handler, status_handler, ErrorBody, SparqlRequest};
pub use server::SparqlServer;
