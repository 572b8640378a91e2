//! RDF document loading
//!
//! Parsers are registered by exact media type. Looking up an unknown type
//! succeeds and returns a [`ParserHandle`] that fails only when used.

use super::descriptor::QuadDescriptor;
use super::lexicon::DEFAULT_GRAPH_URI;
use crate::rdf::{FormatParser, ParseError, Quad, RdfFormat, RdfParser};
use crate::transport::{Transport, TransportError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Loader errors
#[derive(Error, Debug)]
pub enum LoadError {
    /// Fetching the document failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The document didn't parse
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// No parser registered for the media type
    #[error("No parser registered for media type: {0}")]
    UnknownMediaType(String),

    /// Reading a local file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Parser registered for a media type, or a placeholder for an unknown one
#[derive(Clone)]
pub struct ParserHandle {
    media_type: String,
    parser: Option<Arc<dyn RdfParser>>,
}

impl ParserHandle {
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn is_registered(&self) -> bool {
        self.parser.is_some()
    }

    /// Parse `input`; fails with [`LoadError::UnknownMediaType`] for a placeholder
    pub fn parse(&self, input: &str, base_iri: Option<&str>) -> LoadResult<Vec<Quad>> {
        match &self.parser {
            Some(parser) => Ok(parser.parse(input, base_iri)?),
            None => Err(LoadError::UnknownMediaType(self.media_type.clone())),
        }
    }
}

impl std::fmt::Debug for ParserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserHandle")
            .field("media_type", &self.media_type)
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Parser registry plus the transport used for remote documents
#[derive(Clone)]
pub struct RdfLoader {
    parsers: HashMap<String, Arc<dyn RdfParser>>,
    transport: Arc<dyn Transport>,
}

impl RdfLoader {
    /// Loader with parsers for every built-in format
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let mut parsers: HashMap<String, Arc<dyn RdfParser>> = HashMap::new();
        for format in RdfFormat::ALL {
            if format != RdfFormat::JsonLd {
                parsers.insert(format.media_type().to_string(), Arc::new(FormatParser::new(format)));
            }
        }
        parsers.insert("text/n3".to_string(), Arc::new(FormatParser::new(RdfFormat::Turtle)));
        Self { parsers, transport }
    }

    /// Register (or replace) the parser for `media_type`
    pub fn register_parser(&mut self, media_type: impl Into<String>, parser: Arc<dyn RdfParser>) {
        let media_type = media_type.into();
        debug!("Registering parser for {}", media_type);
        self.parsers.insert(media_type, parser);
    }

    pub fn parser(&self, media_type: &str) -> ParserHandle {
        ParserHandle {
            media_type: media_type.to_string(),
            parser: self.parsers.get(media_type).cloned(),
        }
    }

    /// Registered media types, sorted
    pub fn media_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.parsers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = transport;
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Parse an in-memory document, moving default-graph quads into `graph`
    pub fn try_to_parse(
        &self,
        media_type: &str,
        data: &str,
        graph: Option<&str>,
        base_iri: Option<&str>,
    ) -> LoadResult<Vec<QuadDescriptor>> {
        let quads = self.parser(media_type).parse(data, base_iri)?;
        Ok(into_descriptors(quads, graph))
    }

    /// Read and parse a local file
    pub async fn load_from_file(
        &self,
        media_type: &str,
        path: &Path,
        graph: Option<&str>,
    ) -> LoadResult<Vec<QuadDescriptor>> {
        let handle = self.parser(media_type);
        let data = tokio::fs::read_to_string(path).await?;
        let quads = handle.parse(&data, None)?;
        info!("Parsed {} quads from {}", quads.len(), path.display());
        Ok(into_descriptors(quads, graph))
    }

    /// Fetch `uri` through the transport and parse it by its content type
    ///
    /// The parser is chosen from the response `Content-Type`, then from the
    /// URI extension, then Turtle.
    pub async fn load_remote(&self, uri: &str, graph: Option<&str>) -> LoadResult<Vec<QuadDescriptor>> {
        let accept = self.accept_header();
        let response = self.transport.load(uri, &accept).await?;

        let media_type = response
            .content_type
            .filter(|t| self.parsers.contains_key(t))
            .or_else(|| RdfFormat::from_extension(uri).map(|f| f.media_type().to_string()))
            .unwrap_or_else(|| RdfFormat::Turtle.media_type().to_string());
        debug!("Parsing {} as {}", uri, media_type);

        let quads = self.parser(&media_type).parse(&response.body, Some(uri))?;
        info!("Loaded {} quads from {}", quads.len(), uri);
        Ok(into_descriptors(quads, graph))
    }

    /// `Accept` header listing every registered media type, Turtle first
    fn accept_header(&self) -> String {
        let turtle = RdfFormat::Turtle.media_type();
        let mut types = vec![turtle.to_string()];
        types.extend(
            self.media_types()
                .into_iter()
                .filter(|t| t != turtle)
                .map(|t| format!("{};q=0.8", t)),
        );
        types.join(", ")
    }
}

fn into_descriptors(quads: Vec<Quad>, graph: Option<&str>) -> Vec<QuadDescriptor> {
    let target = graph.filter(|g| *g != DEFAULT_GRAPH_URI);
    quads
        .iter()
        .map(|q| {
            let mut quad = QuadDescriptor::from_quad(q);
            match &quad.graph {
                None => quad.graph = target.map(str::to_string),
                Some(g) if g == DEFAULT_GRAPH_URI => quad.graph = None,
                Some(_) => {}
            }
            quad
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportResponse, TransportResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const TURTLE: &str = "@prefix ex: <http://example.org/> . ex:a ex:p \"1\" .";

    struct StaticTransport {
        content_type: Option<String>,
        accept: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn load(&self, _uri: &str, accept: &str) -> TransportResult<TransportResponse> {
            *self.accept.lock().unwrap() = Some(accept.to_string());
            Ok(TransportResponse {
                body: TURTLE.to_string(),
                content_type: self.content_type.clone(),
            })
        }
    }

    fn loader(content_type: Option<&str>) -> (RdfLoader, Arc<StaticTransport>) {
        let transport = Arc::new(StaticTransport {
            content_type: content_type.map(str::to_string),
            accept: Mutex::new(None),
        });
        (RdfLoader::new(transport.clone()), transport)
    }

    #[test]
    fn test_unknown_media_type_fails_on_use() {
        let (loader, _) = loader(None);
        let handle = loader.parser("application/x-unknown");
        assert!(!handle.is_registered());
        assert!(matches!(
            handle.parse(TURTLE, None),
            Err(LoadError::UnknownMediaType(t)) if t == "application/x-unknown"
        ));
    }

    #[test]
    fn test_try_to_parse_targets_graph() {
        let (loader, _) = loader(None);
        let quads = loader
            .try_to_parse("text/turtle", TURTLE, Some("http://example.org/g"), None)
            .unwrap();
        assert_eq!(quads.len(), 1);
        assert_eq!(quads[0].graph.as_deref(), Some("http://example.org/g"));

        let quads = loader
            .try_to_parse("text/n3", TURTLE, Some(DEFAULT_GRAPH_URI), None)
            .unwrap();
        assert_eq!(quads[0].graph, None);
    }

    #[tokio::test]
    async fn test_load_remote_negotiates() {
        let (loader, transport) = loader(Some("text/turtle"));
        let quads = loader.load_remote("http://example.org/data", None).await.unwrap();
        assert_eq!(quads.len(), 1);

        let accept = transport.accept.lock().unwrap().clone().unwrap();
        assert!(accept.starts_with("text/turtle"));
        assert!(accept.contains("application/rdf+xml;q=0.8"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.ttl");
        std::fs::write(&path, TURTLE).unwrap();

        let (loader, _) = loader(None);
        let quads = loader.load_from_file("text/turtle", &path, None).await.unwrap();
        assert_eq!(quads.len(), 1);
    }
}
