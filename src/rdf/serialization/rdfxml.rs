//! RDF/XML parsing

use crate::rdf::Triple;
use super::turtle::{convert_object, convert_predicate, convert_subject, parse_base};
use super::{ParseError, ParseResult};
use rio_api::parser::TriplesParser;
use rio_xml::RdfXmlParser;
use std::io::{BufReader, Cursor};

/// RDF/XML parser
pub struct RdfXmlParserWrapper;

impl RdfXmlParserWrapper {
    /// Parse an RDF/XML document to Triples
    pub fn parse(input: &str, base_iri: Option<&str>) -> ParseResult<Vec<Triple>> {
        let reader = BufReader::new(Cursor::new(input));
        let mut parser = RdfXmlParser::new(reader, parse_base(base_iri)?);

        let mut triples = Vec::new();
        parser.parse_all(&mut |t| -> Result<(), ParseError> {
            triples.push(Triple::new(
                convert_subject(t.subject)?,
                convert_predicate(t.predicate)?,
                convert_object(t.object)?,
            ));
            Ok(())
        })?;
        Ok(triples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdfxml_parse() {
        let input = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:foaf="http://xmlns.com/foaf/0.1/">
  <rdf:Description rdf:about="http://example.org/alice">
    <foaf:name>Alice</foaf:name>
  </rdf:Description>
</rdf:RDF>"#;
        let triples = RdfXmlParserWrapper::parse(input, None).unwrap();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].predicate.to_string(), "<http://xmlns.com/foaf/0.1/name>");
    }
}
