//! Turtle family implementation (Turtle, N-Triples, N-Quads, TriG)

use crate::rdf::{
    BlankNode, Literal, NamedNode, Quad, RdfObject, RdfPredicate, RdfSubject, Triple,
};
use super::{ParseError, ParseResult, SerializeError, SerializeResult};
use oxiri::Iri;
use rio_api::formatter::TriplesFormatter;
use rio_api::parser::{QuadsParser, TriplesParser};
use rio_turtle::{NQuadsParser, NTriplesFormatter, NTriplesParser, TriGParser, TurtleFormatter, TurtleParser};
use std::io::{BufReader, Cursor};

pub(super) fn parse_base(base_iri: Option<&str>) -> ParseResult<Option<Iri<String>>> {
    base_iri
        .map(|b| Iri::parse(b.to_string()).map_err(|e| ParseError::Parse(e.to_string())))
        .transpose()
}

/// Turtle / N-Triples parser
pub struct TurtleParserWrapper;

impl TurtleParserWrapper {
    /// Parse Turtle string to Triples
    pub fn parse(input: &str, base_iri: Option<&str>) -> ParseResult<Vec<Triple>> {
        let reader = BufReader::new(Cursor::new(input));
        let mut parser = TurtleParser::new(reader, parse_base(base_iri)?);

        let mut triples = Vec::new();
        parser.parse_all(&mut |t| -> Result<(), ParseError> {
            triples.push(convert_triple(t)?);
            Ok(())
        })?;
        Ok(triples)
    }

    /// Parse N-Triples string to Triples
    pub fn parse_ntriples(input: &str) -> ParseResult<Vec<Triple>> {
        let reader = BufReader::new(Cursor::new(input));
        let mut parser = NTriplesParser::new(reader);

        let mut triples = Vec::new();
        parser.parse_all(&mut |t| -> Result<(), ParseError> {
            triples.push(convert_triple(t)?);
            Ok(())
        })?;
        Ok(triples)
    }
}

/// N-Quads / TriG parser
pub struct QuadTextParser;

impl QuadTextParser {
    /// Parse N-Quads string to Quads
    pub fn parse_nquads(input: &str) -> ParseResult<Vec<Quad>> {
        let reader = BufReader::new(Cursor::new(input));
        let mut parser = NQuadsParser::new(reader);

        let mut quads = Vec::new();
        parser.parse_all(&mut |q| -> Result<(), ParseError> {
            quads.push(convert_quad(q)?);
            Ok(())
        })?;
        Ok(quads)
    }

    /// Parse TriG string to Quads
    pub fn parse_trig(input: &str, base_iri: Option<&str>) -> ParseResult<Vec<Quad>> {
        let reader = BufReader::new(Cursor::new(input));
        let mut parser = TriGParser::new(reader, parse_base(base_iri)?);

        let mut quads = Vec::new();
        parser.parse_all(&mut |q| -> Result<(), ParseError> {
            quads.push(convert_quad(q)?);
            Ok(())
        })?;
        Ok(quads)
    }
}

/// Turtle / N-Triples serializer
pub struct TurtleSerializerWrapper;

impl TurtleSerializerWrapper {
    /// Serialize Triples to Turtle string
    pub fn serialize(triples: &[Triple]) -> SerializeResult<String> {
        let mut output = Vec::new();
        let mut formatter = TurtleFormatter::new(&mut output);
        for triple in triples {
            with_rio_triple(triple, |t| formatter.format(t))
                .map_err(|e| SerializeError::Serialize(e.to_string()))?;
        }
        formatter.finish()
            .map_err(|e| SerializeError::Serialize(e.to_string()))?;

        String::from_utf8(output)
            .map_err(|e| SerializeError::Serialize(e.to_string()))
    }

    /// Serialize Triples to N-Triples string
    pub fn serialize_ntriples(triples: &[Triple]) -> SerializeResult<String> {
        let mut output = Vec::new();
        let mut formatter = NTriplesFormatter::new(&mut output);
        for triple in triples {
            with_rio_triple(triple, |t| formatter.format(t))
                .map_err(|e| SerializeError::Serialize(e.to_string()))?;
        }
        formatter.finish()
            .map_err(|e| SerializeError::Serialize(e.to_string()))?;

        String::from_utf8(output)
            .map_err(|e| SerializeError::Serialize(e.to_string()))
    }
}

/// Borrow a triple as a rio model triple for the duration of `f`
fn with_rio_triple<R>(triple: &Triple, f: impl FnOnce(&rio_api::model::Triple<'_>) -> R) -> R {
    let subject = match &triple.subject {
        RdfSubject::NamedNode(n) => {
            rio_api::model::Subject::NamedNode(rio_api::model::NamedNode { iri: n.as_str() })
        }
        RdfSubject::BlankNode(b) => {
            rio_api::model::Subject::BlankNode(rio_api::model::BlankNode { id: b.as_str() })
        }
    };

    let predicate = rio_api::model::NamedNode { iri: triple.predicate.as_named_node().as_str() };

    let datatype;
    let object = match &triple.object {
        RdfObject::NamedNode(n) => {
            rio_api::model::Term::NamedNode(rio_api::model::NamedNode { iri: n.as_str() })
        }
        RdfObject::BlankNode(b) => {
            rio_api::model::Term::BlankNode(rio_api::model::BlankNode { id: b.as_str() })
        }
        RdfObject::Literal(l) => {
            if let Some(lang) = l.language() {
                rio_api::model::Term::Literal(rio_api::model::Literal::LanguageTaggedString {
                    value: l.value(),
                    language: lang,
                })
            } else if l.is_plain() {
                rio_api::model::Term::Literal(rio_api::model::Literal::Simple { value: l.value() })
            } else {
                datatype = l.datatype();
                rio_api::model::Term::Literal(rio_api::model::Literal::Typed {
                    value: l.value(),
                    datatype: rio_api::model::NamedNode { iri: datatype.as_str() },
                })
            }
        }
    };

    f(&rio_api::model::Triple { subject, predicate, object })
}

fn convert_triple(t: rio_api::model::Triple<'_>) -> Result<Triple, ParseError> {
    Ok(Triple::new(
        convert_subject(t.subject)?,
        convert_predicate(t.predicate)?,
        convert_object(t.object)?,
    ))
}

fn convert_quad(q: rio_api::model::Quad<'_>) -> Result<Quad, ParseError> {
    let graph = match q.graph_name {
        None => None,
        Some(rio_api::model::GraphName::NamedNode(n)) => {
            Some(NamedNode::new(n.iri).map_err(|e| ParseError::Parse(e.to_string()))?)
        }
        Some(rio_api::model::GraphName::BlankNode(b)) => {
            return Err(ParseError::Parse(format!(
                "blank node graph names are not supported: _:{}",
                b.id
            )));
        }
    };
    Ok(Quad::new(
        convert_subject(q.subject)?,
        convert_predicate(q.predicate)?,
        convert_object(q.object)?,
        graph,
    ))
}

pub(super) fn convert_subject(s: rio_api::model::Subject<'_>) -> Result<RdfSubject, ParseError> {
    match s {
        rio_api::model::Subject::NamedNode(n) => {
            Ok(RdfSubject::NamedNode(NamedNode::new(n.iri).map_err(|e| ParseError::Parse(e.to_string()))?))
        },
        rio_api::model::Subject::BlankNode(b) => {
            Ok(RdfSubject::BlankNode(BlankNode::from_str(b.id).map_err(|e| ParseError::Parse(e.to_string()))?))
        },
        #[allow(unreachable_patterns)]
        _ => Err(ParseError::Parse("Unsupported subject type".to_string())),
    }
}

pub(super) fn convert_predicate(p: rio_api::model::NamedNode<'_>) -> Result<RdfPredicate, ParseError> {
    RdfPredicate::new(p.iri).map_err(|e| ParseError::Parse(e.to_string()))
}

pub(super) fn convert_object(o: rio_api::model::Term<'_>) -> Result<RdfObject, ParseError> {
    match o {
        rio_api::model::Term::NamedNode(n) => {
            Ok(RdfObject::NamedNode(NamedNode::new(n.iri).map_err(|e| ParseError::Parse(e.to_string()))?))
        },
        rio_api::model::Term::BlankNode(b) => {
            Ok(RdfObject::BlankNode(BlankNode::from_str(b.id).map_err(|e| ParseError::Parse(e.to_string()))?))
        },
        rio_api::model::Term::Literal(l) => {
            match l {
                rio_api::model::Literal::Simple { value } => {
                    Ok(RdfObject::Literal(Literal::new_simple_literal(value)))
                },
                rio_api::model::Literal::LanguageTaggedString { value, language } => {
                    Ok(RdfObject::Literal(
                        Literal::new_language_tagged_literal(value, language)
                            .map_err(|e| ParseError::Parse(e.to_string()))?
                    ))
                },
                rio_api::model::Literal::Typed { value, datatype } => {
                    let dt = NamedNode::new(datatype.iri)
                        .map_err(|e| ParseError::Parse(e.to_string()))?;
                    Ok(RdfObject::Literal(Literal::new_typed_literal(value, dt)))
                }
            }
        },
        #[allow(unreachable_patterns)]
        _ => Err(ParseError::Parse("Unsupported object type".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turtle_parse_with_prefixes() {
        let input = r#"
            @prefix ex: <http://example.org/> .
            ex:alice ex:name "Alice"@en ;
                     ex:age 30 .
        "#;
        let triples = TurtleParserWrapper::parse(input, None).unwrap();
        assert_eq!(triples.len(), 2);
        assert!(triples.iter().all(|t| t.subject.to_string() == "<http://example.org/alice>"));
    }

    #[test]
    fn test_turtle_relative_iri_uses_base() {
        let input = "<alice> <knows> <bob> .";
        let triples = TurtleParserWrapper::parse(input, Some("http://example.org/")).unwrap();
        assert_eq!(triples[0].subject.to_string(), "<http://example.org/alice>");
    }

    #[test]
    fn test_turtle_syntax_error() {
        let result = TurtleParserWrapper::parse("<http://example.org/a> <http://example.org/b>", None);
        assert!(result.is_err());
    }

    #[test]
    fn test_nquads_keep_graph() {
        let input = "<http://example.org/a> <http://example.org/b> <http://example.org/c> <http://example.org/g> .\n\
                     <http://example.org/a> <http://example.org/b> \"d\" .\n";
        let quads = QuadTextParser::parse_nquads(input).unwrap();
        assert_eq!(quads.len(), 2);
        assert_eq!(quads[0].graph.as_ref().map(|g| g.as_str()), Some("http://example.org/g"));
        assert!(quads[1].graph.is_none());
    }

    #[test]
    fn test_ntriples_serialization() {
        let input = r#"<http://example.org/a> <http://example.org/b> "c" ."#;
        let triples = TurtleParserWrapper::parse_ntriples(input).unwrap();
        let output = TurtleSerializerWrapper::serialize_ntriples(&triples).unwrap();
        assert_eq!(output.trim(), input);
    }
}
