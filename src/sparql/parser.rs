//! SPARQL parser using the spargebra library

use super::{SparqlError, SparqlResult};
use spargebra::{Query, Update};

/// A parsed query or update request
#[derive(Debug, Clone)]
pub enum ParsedRequest {
    /// SELECT, CONSTRUCT, ASK or DESCRIBE
    Query(Query),
    /// One or more update operations
    Update(Update),
}

impl ParsedRequest {
    /// Parse `text` as a query, falling back to an update.
    ///
    /// When both fail the query error is reported unless the text looks
    /// like an update.
    pub fn parse(text: &str, base_iri: Option<&str>) -> SparqlResult<Self> {
        let query_error = match Query::parse(text, base_iri) {
            Ok(query) => return Ok(ParsedRequest::Query(query)),
            Err(e) => e,
        };
        match Update::parse(text, base_iri) {
            Ok(update) => Ok(ParsedRequest::Update(update)),
            Err(update_error) => {
                let message = if Self::looks_like_update(text) {
                    update_error.to_string()
                } else {
                    query_error.to_string()
                };
                Err(SparqlError::Parse(message))
            }
        }
    }

    /// Parse `text` as a query only
    pub fn parse_query(text: &str, base_iri: Option<&str>) -> SparqlResult<Query> {
        Query::parse(text, base_iri).map_err(|e| SparqlError::Parse(e.to_string()))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, ParsedRequest::Query(_))
    }

    pub fn is_update(&self) -> bool {
        matches!(self, ParsedRequest::Update(_))
    }

    fn looks_like_update(text: &str) -> bool {
        const KEYWORDS: [&str; 9] = [
            "INSERT", "DELETE", "LOAD", "CLEAR", "CREATE", "DROP", "WITH", "COPY", "MOVE",
        ];
        let upper = text.to_uppercase();
        KEYWORDS.iter().any(|k| upper.contains(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let request = ParsedRequest::parse("SELECT * WHERE { ?s ?p ?o }", None).unwrap();
        assert!(request.is_query());
    }

    #[test]
    fn test_parse_update() {
        let request = ParsedRequest::parse(
            "INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" }",
            None,
        )
        .unwrap();
        assert!(request.is_update());
    }

    #[test]
    fn test_syntax_error() {
        let result = ParsedRequest::parse("SELECT WHERE {", None);
        assert!(matches!(result, Err(SparqlError::Parse(_))));
    }

    #[test]
    fn test_relative_iri_needs_base() {
        assert!(ParsedRequest::parse("SELECT * WHERE { <a> ?p ?o }", None).is_err());
        assert!(ParsedRequest::parse("SELECT * WHERE { <a> ?p ?o }", Some("http://example.org/")).is_ok());
    }
}
