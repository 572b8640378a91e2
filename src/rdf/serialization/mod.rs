//! RDF serialization formats
//!
//! Parsing supports:
//! - Turtle (TTL), N-Triples (NT), N-Quads (NQ), TriG
//! - RDF/XML
//!
//! Serialization supports N-Triples, Turtle and a basic expanded JSON-LD.

mod jsonld;
mod rdfxml;
mod turtle;

use super::{Quad, Triple};
use thiserror::Error;

pub use jsonld::JsonLdSerializerWrapper;
pub use rdfxml::RdfXmlParserWrapper;
pub use turtle::{QuadTextParser, TurtleParserWrapper, TurtleSerializerWrapper};

/// RDF serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdfFormat {
    /// Turtle format (.ttl)
    Turtle,
    /// N-Triples format (.nt)
    NTriples,
    /// N-Quads format (.nq)
    NQuads,
    /// TriG format (.trig)
    TriG,
    /// RDF/XML format (.rdf)
    RdfXml,
    /// JSON-LD format (.jsonld)
    JsonLd,
}

impl RdfFormat {
    /// All known formats
    pub const ALL: [RdfFormat; 6] = [
        RdfFormat::Turtle,
        RdfFormat::NTriples,
        RdfFormat::NQuads,
        RdfFormat::TriG,
        RdfFormat::RdfXml,
        RdfFormat::JsonLd,
    ];

    /// Canonical media type
    pub fn media_type(&self) -> &'static str {
        match self {
            RdfFormat::Turtle => "text/turtle",
            RdfFormat::NTriples => "application/n-triples",
            RdfFormat::NQuads => "application/n-quads",
            RdfFormat::TriG => "application/trig",
            RdfFormat::RdfXml => "application/rdf+xml",
            RdfFormat::JsonLd => "application/ld+json",
        }
    }

    /// Format for an exact media type
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.media_type() == media_type)
    }

    /// Guess a format from a file name or URL path extension
    pub fn from_extension(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "ttl" | "n3" => Some(RdfFormat::Turtle),
            "nt" => Some(RdfFormat::NTriples),
            "nq" => Some(RdfFormat::NQuads),
            "trig" => Some(RdfFormat::TriG),
            "rdf" | "owl" | "xml" => Some(RdfFormat::RdfXml),
            "jsonld" => Some(RdfFormat::JsonLd),
            _ => None,
        }
    }
}

/// Parse errors
#[derive(Error, Debug)]
pub enum ParseError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Syntax error reported by the underlying parser
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Unsupported format
    #[error("Unsupported format: {0:?}")]
    UnsupportedFormat(RdfFormat),

    /// No parser registered for the media type
    #[error("No parser registered for media type: {0}")]
    UnknownMediaType(String),
}

impl From<rio_turtle::TurtleError> for ParseError {
    fn from(e: rio_turtle::TurtleError) -> Self {
        ParseError::Syntax(e.to_string())
    }
}

impl From<rio_xml::RdfXmlError> for ParseError {
    fn from(e: rio_xml::RdfXmlError) -> Self {
        ParseError::Syntax(e.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Serialization errors
#[derive(Error, Debug)]
pub enum SerializeError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0:?}")]
    UnsupportedFormat(RdfFormat),
}

pub type SerializeResult<T> = Result<T, SerializeError>;

/// A pluggable RDF parser.
///
/// Parsers return quads; triples of triple-only formats are placed in the
/// default graph (`graph == None`) and moved by the caller if needed.
pub trait RdfParser: Send + Sync {
    /// Parse a document held in memory
    fn parse(&self, input: &str, base_iri: Option<&str>) -> ParseResult<Vec<Quad>>;
}

/// Built-in parser for one of the known formats
#[derive(Debug, Clone, Copy)]
pub struct FormatParser {
    format: RdfFormat,
}

impl FormatParser {
    /// Create a parser for `format`
    pub fn new(format: RdfFormat) -> Self {
        Self { format }
    }

    /// The format handled by this parser
    pub fn format(&self) -> RdfFormat {
        self.format
    }
}

impl RdfParser for FormatParser {
    fn parse(&self, input: &str, base_iri: Option<&str>) -> ParseResult<Vec<Quad>> {
        let in_default_graph = |triples: Vec<Triple>| {
            triples
                .into_iter()
                .map(|t| Quad::from_triple(t, None))
                .collect()
        };

        match self.format {
            RdfFormat::Turtle => TurtleParserWrapper::parse(input, base_iri).map(in_default_graph),
            RdfFormat::NTriples => TurtleParserWrapper::parse_ntriples(input).map(in_default_graph),
            RdfFormat::NQuads => QuadTextParser::parse_nquads(input),
            RdfFormat::TriG => QuadTextParser::parse_trig(input, base_iri),
            RdfFormat::RdfXml => RdfXmlParserWrapper::parse(input, base_iri).map(in_default_graph),
            RdfFormat::JsonLd => Err(ParseError::UnsupportedFormat(RdfFormat::JsonLd)),
        }
    }
}

/// RDF serializer
pub struct RdfSerializer;

impl RdfSerializer {
    /// Serialize triples to a string
    pub fn serialize(triples: &[Triple], format: RdfFormat) -> SerializeResult<String> {
        match format {
            RdfFormat::Turtle => TurtleSerializerWrapper::serialize(triples),
            RdfFormat::NTriples => TurtleSerializerWrapper::serialize_ntriples(triples),
            RdfFormat::JsonLd => JsonLdSerializerWrapper::serialize(triples),
            other => Err(SerializeError::UnsupportedFormat(other)),
        }
    }

    /// Serialize triples to a file
    pub fn serialize_file(
        triples: &[Triple],
        path: &std::path::Path,
        format: RdfFormat,
    ) -> SerializeResult<()> {
        let text = Self::serialize(triples, format)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_lookup() {
        assert_eq!(RdfFormat::from_media_type("text/turtle"), Some(RdfFormat::Turtle));
        assert_eq!(RdfFormat::from_media_type("text/turtle; charset=utf-8"), None);
        assert_eq!(RdfFormat::from_extension("http://example.org/data.nt"), Some(RdfFormat::NTriples));
        assert_eq!(RdfFormat::from_extension("README"), None);
    }

    #[test]
    fn test_ntriples_parser_places_triples_in_default_graph() {
        let parser = FormatParser::new(RdfFormat::NTriples);
        let quads = parser
            .parse("<http://example.org/a> <http://example.org/b> \"c\" .\n", None)
            .unwrap();
        assert_eq!(quads.len(), 1);
        assert!(quads[0].graph.is_none());
    }

    #[test]
    fn test_jsonld_parsing_unsupported() {
        let parser = FormatParser::new(RdfFormat::JsonLd);
        assert!(matches!(
            parser.parse("{}", None),
            Err(ParseError::UnsupportedFormat(RdfFormat::JsonLd))
        ));
    }

    #[test]
    fn test_serializer_rejects_quad_formats() {
        assert!(RdfSerializer::serialize(&[], RdfFormat::NQuads).is_err());
    }
}
