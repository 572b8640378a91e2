//! SPARQL query results
//!
//! SELECT and ASK results travel between processes as SPARQL 1.1 JSON
//! through sparesults, graph results as N-Triples.

use super::{SparqlError, SparqlResult};
use crate::rdf::{
    BlankNode, FormatParser, Literal, NamedNode, Quad, RdfFormat, RdfParser, RdfSerializer, RdfTerm, Triple,
};
use indexmap::IndexMap;
use oxrdf::{Term, Variable};
use serde::{Deserialize, Serialize};
use sparesults::{
    QueryResultsFormat, QueryResultsParser, QueryResultsSerializer, ReaderQueryResultsParserOutput,
};

/// Query solution (variable bindings)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuerySolution {
    /// Variable name → RDF term bindings, in projection order
    pub bindings: IndexMap<String, RdfTerm>,
}

impl QuerySolution {
    /// Create a new query solution
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a binding
    pub fn get(&self, variable: &str) -> Option<&RdfTerm> {
        self.bindings.get(variable)
    }

    /// Add a binding
    pub fn bind(&mut self, variable: impl Into<String>, term: RdfTerm) {
        self.bindings.insert(variable.into(), term);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Order-independent text form, used to compare solution multisets
    fn canonical(&self) -> String {
        let mut pairs: Vec<String> = self
            .bindings
            .iter()
            .map(|(var, term)| format!("{}={}", var, term))
            .collect();
        pairs.sort();
        pairs.join(" ")
    }
}

/// SPARQL query results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SparqlResults {
    /// Bindings from SELECT query
    Bindings {
        /// Variables
        variables: Vec<String>,
        /// Solutions
        solutions: Vec<QuerySolution>,
    },

    /// Boolean result from ASK query
    Boolean(bool),

    /// Graph from CONSTRUCT/DESCRIBE query
    Graph(Vec<Triple>),
}

impl SparqlResults {
    /// Create empty bindings result
    pub fn empty() -> Self {
        SparqlResults::Bindings {
            variables: Vec::new(),
            solutions: Vec::new(),
        }
    }

    /// Number of solutions, triples, or 1 for a boolean
    pub fn len(&self) -> usize {
        match self {
            SparqlResults::Bindings { solutions, .. } => solutions.len(),
            SparqlResults::Boolean(_) => 1,
            SparqlResults::Graph(triples) => triples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Solutions of a SELECT result
    pub fn solutions(&self) -> Option<&[QuerySolution]> {
        match self {
            SparqlResults::Bindings { solutions, .. } => Some(solutions),
            _ => None,
        }
    }

    /// Triples of a CONSTRUCT/DESCRIBE result
    pub fn triples(&self) -> Option<&[Triple]> {
        match self {
            SparqlResults::Graph(triples) => Some(triples),
            _ => None,
        }
    }

    /// Whether two results hold the same solutions or triples, ignoring order
    pub fn same_as(&self, other: &SparqlResults) -> bool {
        match (self, other) {
            (SparqlResults::Boolean(a), SparqlResults::Boolean(b)) => a == b,
            (
                SparqlResults::Bindings { solutions: a, .. },
                SparqlResults::Bindings { solutions: b, .. },
            ) => {
                let mut a: Vec<String> = a.iter().map(QuerySolution::canonical).collect();
                let mut b: Vec<String> = b.iter().map(QuerySolution::canonical).collect();
                a.sort();
                b.sort();
                a == b
            }
            (SparqlResults::Graph(a), SparqlResults::Graph(b)) => {
                let mut a: Vec<String> = a.iter().map(Triple::to_string).collect();
                let mut b: Vec<String> = b.iter().map(Triple::to_string).collect();
                a.sort();
                b.sort();
                a == b
            }
            _ => false,
        }
    }
}

/// Effect of an update request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSummary {
    /// Quads actually added
    pub inserted: usize,
    /// Quads actually removed
    pub removed: usize,
}

/// Result of executing a query or an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// SELECT, ASK, CONSTRUCT or DESCRIBE
    Results(SparqlResults),
    /// Update request
    Update(UpdateSummary),
}

impl ExecutionOutcome {
    /// The query results, if this was a query
    pub fn results(&self) -> Option<&SparqlResults> {
        match self {
            ExecutionOutcome::Results(results) => Some(results),
            ExecutionOutcome::Update(_) => None,
        }
    }

    pub fn into_results(self) -> Option<SparqlResults> {
        match self {
            ExecutionOutcome::Results(results) => Some(results),
            ExecutionOutcome::Update(_) => None,
        }
    }

    /// The update summary, if this was an update
    pub fn update(&self) -> Option<UpdateSummary> {
        match self {
            ExecutionOutcome::Update(summary) => Some(*summary),
            ExecutionOutcome::Results(_) => None,
        }
    }

    /// Encode for the wire
    ///
    /// SELECT and ASK results become SPARQL 1.1 JSON, graphs N-Triples and
    /// update summaries a small JSON envelope.
    pub fn encode(&self) -> SparqlResult<EncodedOutcome> {
        let serializer = QueryResultsSerializer::from_format(QueryResultsFormat::Json);
        match self {
            ExecutionOutcome::Results(SparqlResults::Bindings { variables, solutions }) => {
                let variables = variables
                    .iter()
                    .map(|v| Variable::new(v.as_str()).map_err(|e| SparqlError::Results(e.to_string())))
                    .collect::<SparqlResult<Vec<_>>>()?;
                let mut writer = serializer
                    .serialize_solutions_to_writer(Vec::new(), variables.clone())
                    .map_err(results_error)?;
                for solution in solutions {
                    let row: Vec<(&Variable, Term)> = variables
                        .iter()
                        .filter_map(|v| solution.get(v.as_str()).map(|t| (v, to_ox_term(t))))
                        .collect();
                    writer
                        .serialize(row.iter().map(|(v, t)| (Variable::as_ref(v), Term::as_ref(t))))
                        .map_err(results_error)?;
                }
                Ok(EncodedOutcome::new(SPARQL_RESULTS_JSON, writer.finish().map_err(results_error)?))
            }
            ExecutionOutcome::Results(SparqlResults::Boolean(value)) => {
                let body = serializer
                    .serialize_boolean_to_writer(Vec::new(), *value)
                    .map_err(results_error)?;
                Ok(EncodedOutcome::new(SPARQL_RESULTS_JSON, body))
            }
            ExecutionOutcome::Results(SparqlResults::Graph(triples)) => {
                let text = RdfSerializer::serialize(triples, RdfFormat::NTriples).map_err(results_error)?;
                Ok(EncodedOutcome::new(N_TRIPLES, text.into_bytes()))
            }
            ExecutionOutcome::Update(summary) => {
                let body = serde_json::to_vec(&UpdateEnvelope { update: *summary }).map_err(results_error)?;
                Ok(EncodedOutcome::new(UPDATE_JSON, body))
            }
        }
    }

    /// Decode a body produced by [`ExecutionOutcome::encode`]
    pub fn decode(content_type: &str, body: &[u8]) -> SparqlResult<Self> {
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        match media_type {
            SPARQL_RESULTS_JSON => decode_query_results(body),
            N_TRIPLES => {
                let text = std::str::from_utf8(body).map_err(results_error)?;
                let quads = FormatParser::new(RdfFormat::NTriples)
                    .parse(text, None)
                    .map_err(results_error)?;
                let triples = quads.iter().map(Quad::as_triple).collect();
                Ok(ExecutionOutcome::Results(SparqlResults::Graph(triples)))
            }
            UPDATE_JSON => {
                let envelope: UpdateEnvelope = serde_json::from_slice(body).map_err(results_error)?;
                Ok(ExecutionOutcome::Update(envelope.update))
            }
            other => Err(SparqlError::Results(format!("unexpected content type: {}", other))),
        }
    }
}

/// Media type of SELECT and ASK results
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
/// Media type of CONSTRUCT and DESCRIBE results
pub const N_TRIPLES: &str = "application/n-triples";
/// Media type of update summaries
pub const UPDATE_JSON: &str = "application/json";

/// An [`ExecutionOutcome`] ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedOutcome {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl EncodedOutcome {
    fn new(content_type: &'static str, body: Vec<u8>) -> Self {
        Self { content_type, body }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateEnvelope {
    update: UpdateSummary,
}

fn results_error(e: impl std::fmt::Display) -> SparqlError {
    SparqlError::Results(e.to_string())
}

fn decode_query_results(body: &[u8]) -> SparqlResult<ExecutionOutcome> {
    let parser = QueryResultsParser::from_format(QueryResultsFormat::Json);
    let results = match parser.for_reader(body).map_err(results_error)? {
        ReaderQueryResultsParserOutput::Boolean(value) => SparqlResults::Boolean(value),
        ReaderQueryResultsParserOutput::Solutions(reader) => {
            let variables: Vec<String> = reader.variables().iter().map(|v| v.as_str().to_string()).collect();
            let mut solutions = Vec::new();
            for row in reader {
                let row = row.map_err(results_error)?;
                let mut solution = QuerySolution::new();
                // Keep projection order rather than the document's key order
                for variable in &variables {
                    if let Some(term) = row.get(variable.as_str()) {
                        solution.bind(variable.clone(), from_ox_term(term)?);
                    }
                }
                solutions.push(solution);
            }
            SparqlResults::Bindings { variables, solutions }
        }
    };
    Ok(ExecutionOutcome::Results(results))
}

fn to_ox_term(term: &RdfTerm) -> Term {
    match term {
        RdfTerm::NamedNode(n) => Term::NamedNode(n.inner().clone()),
        RdfTerm::BlankNode(b) => Term::BlankNode(b.inner().clone()),
        RdfTerm::Literal(l) => Term::Literal(l.inner().clone()),
    }
}

fn from_ox_term(term: &Term) -> SparqlResult<RdfTerm> {
    match term {
        Term::NamedNode(n) => Ok(NamedNode::from(n.clone()).into()),
        Term::BlankNode(b) => Ok(BlankNode::from(b.clone()).into()),
        Term::Literal(l) => Ok(Literal::from(l.clone()).into()),
        #[allow(unreachable_patterns)]
        _ => Err(SparqlError::Unsupported("quoted triples in results".to_string())),
    }
}
