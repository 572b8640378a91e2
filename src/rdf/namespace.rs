//! RDF namespace and prefix management
//!
//! This module handles namespace prefixes for compact IRI notation and the
//! resolution of prefixed names into absolute IRIs.

use indexmap::IndexMap;
use oxiri::Iri;
use thiserror::Error;

/// Prefix errors
#[derive(Error, Debug)]
pub enum PrefixError {
    /// Unknown prefix
    #[error("Unknown prefix: {0}")]
    UnknownPrefix(String),

    /// Invalid IRI
    #[error("Invalid IRI: {0}")]
    InvalidIri(String),
}

pub type PrefixResult<T> = Result<T, PrefixError>;

/// Namespace (prefix → IRI mapping)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Prefix
    pub prefix: String,
    /// IRI
    pub iri: String,
}

impl Namespace {
    /// Create a new namespace
    pub fn new(prefix: impl Into<String>, iri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            iri: iri.into(),
        }
    }
}

/// Prefixes of the RDFa 1.1 initial context
const PROFILE_NAMESPACES: &[(&str, &str)] = &[
    ("cc", "http://creativecommons.org/ns#"),
    ("ctag", "http://commontag.org/ns#"),
    ("gr", "http://purl.org/goodrelations/v1#"),
    ("grddl", "http://www.w3.org/2003/g/data-view#"),
    ("ical", "http://www.w3.org/2002/12/cal/icaltzd#"),
    ("ma", "http://www.w3.org/ns/ma-ont#"),
    ("rdfa", "http://www.w3.org/ns/rdfa#"),
    ("rif", "http://www.w3.org/2007/rif#"),
    ("rr", "http://www.w3.org/ns/r2rml#"),
    ("schema", "http://schema.org/"),
    ("sioc", "http://rdfs.org/sioc/ns#"),
    ("skos", "http://www.w3.org/2004/02/skos/core#"),
    ("skosxl", "http://www.w3.org/2008/05/skos-xl#"),
    ("v", "http://rdf.data-vocabulary.org/#"),
    ("vcard", "http://www.w3.org/2006/vcard/ns#"),
    ("void", "http://rdfs.org/ns/void#"),
    ("wdr", "http://www.w3.org/2007/05/powder#"),
    ("wdrs", "http://www.w3.org/2007/05/powder-s#"),
    ("xhv", "http://www.w3.org/1999/xhtml/vocab#"),
    ("xml", "http://www.w3.org/XML/1998/namespace"),
];

/// Namespace manager with common prefixes
#[derive(Debug, Clone)]
pub struct NamespaceManager {
    /// Prefix → IRI mappings, in registration order
    prefixes: IndexMap<String, String>,
    /// Namespace applied to bare local names
    default_prefix: Option<String>,
}

impl NamespaceManager {
    /// Create a new namespace manager with common prefixes
    pub fn new() -> Self {
        let mut mgr = Self {
            prefixes: IndexMap::new(),
            default_prefix: None,
        };

        // Add common RDF/RDFS/OWL prefixes
        mgr.add_prefix("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        mgr.add_prefix("rdfs", "http://www.w3.org/2000/01/rdf-schema#");
        mgr.add_prefix("xsd", "http://www.w3.org/2001/XMLSchema#");
        mgr.add_prefix("owl", "http://www.w3.org/2002/07/owl#");
        mgr.add_prefix("foaf", "http://xmlns.com/foaf/0.1/");
        mgr.add_prefix("dc", "http://purl.org/dc/elements/1.1/");
        mgr.add_prefix("dcterms", "http://purl.org/dc/terms/");

        mgr
    }

    /// Add a prefix, replacing any previous mapping
    pub fn add_prefix(&mut self, prefix: impl Into<String>, iri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), iri.into());
    }

    /// Set the namespace used to resolve names without a prefix
    pub fn set_default_prefix(&mut self, iri: impl Into<String>) {
        self.default_prefix = Some(iri.into());
    }

    /// Namespace used for names without a prefix, if any
    pub fn default_prefix(&self) -> Option<&str> {
        self.default_prefix.as_deref()
    }

    /// Register the RDFa initial-context prefixes on top of the common ones
    ///
    /// Returns the prefixes that were added; existing mappings are kept.
    pub fn register_profile_namespaces(&mut self) -> Vec<Namespace> {
        let mut added = Vec::new();
        for (prefix, iri) in PROFILE_NAMESPACES {
            if !self.prefixes.contains_key(*prefix) {
                self.add_prefix(*prefix, *iri);
                added.push(Namespace::new(*prefix, *iri));
            }
        }
        added
    }

    /// Get IRI for a prefix
    pub fn get_iri(&self, prefix: &str) -> PrefixResult<&str> {
        self.prefixes
            .get(prefix)
            .map(|s| s.as_str())
            .ok_or_else(|| PrefixError::UnknownPrefix(prefix.to_string()))
    }

    /// Expand a compact IRI (prefix:local) to full IRI
    pub fn expand(&self, compact_iri: &str) -> PrefixResult<String> {
        if let Some((prefix, local)) = compact_iri.split_once(':') {
            let iri = self.get_iri(prefix)?;
            Ok(format!("{}{}", iri, local))
        } else {
            Err(PrefixError::InvalidIri(compact_iri.to_string()))
        }
    }

    /// Resolve a prefixed name, bare local name or absolute IRI.
    ///
    /// Registered prefixes win over IRI schemes, so `foaf:name` expands even
    /// though it is also a syntactically valid IRI. Returns `None` when the
    /// value can't be turned into an absolute IRI.
    pub fn resolve(&self, value: &str) -> Option<String> {
        if let Some((prefix, local)) = value.split_once(':') {
            if let Some(iri) = self.prefixes.get(prefix) {
                return Some(format!("{}{}", iri, local));
            }
            return Iri::parse(value).ok().map(|_| value.to_string());
        }
        self.default_prefix
            .as_ref()
            .map(|ns| format!("{}{}", ns, value))
    }

    /// Resolve a value, then resolve what is still relative against `base`
    pub fn resolve_against(&self, value: &str, base: Option<&str>) -> PrefixResult<String> {
        if let Some(resolved) = self.resolve(value) {
            return Ok(resolved);
        }
        let base = base.ok_or_else(|| PrefixError::InvalidIri(value.to_string()))?;
        let base = Iri::parse(base.to_string())
            .map_err(|e| PrefixError::InvalidIri(format!("{}: {}", base, e)))?;
        base.resolve(value)
            .map(|iri| iri.into_inner())
            .map_err(|e| PrefixError::InvalidIri(format!("{}: {}", value, e)))
    }

    /// Compact an IRI using known prefixes
    pub fn compact(&self, iri: &str) -> Option<String> {
        for (prefix, namespace_iri) in &self.prefixes {
            if let Some(local) = iri.strip_prefix(namespace_iri.as_str()) {
                return Some(format!("{}:{}", prefix, local));
            }
        }
        None
    }

    /// Get all registered prefixes
    pub fn prefixes(&self) -> Vec<Namespace> {
        self.prefixes
            .iter()
            .map(|(prefix, iri)| Namespace::new(prefix.clone(), iri.clone()))
            .collect()
    }
}

impl Default for NamespaceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_prefixes() {
        let mgr = NamespaceManager::new();

        assert_eq!(
            mgr.get_iri("rdf").unwrap(),
            "http://www.w3.org/1999/02/22-rdf-syntax-ns#"
        );
        assert_eq!(
            mgr.get_iri("rdfs").unwrap(),
            "http://www.w3.org/2000/01/rdf-schema#"
        );
        assert_eq!(mgr.get_iri("xsd").unwrap(), "http://www.w3.org/2001/XMLSchema#");
    }

    #[test]
    fn test_expand() {
        let mgr = NamespaceManager::new();

        let expanded = mgr.expand("foaf:name").unwrap();
        assert_eq!(expanded, "http://xmlns.com/foaf/0.1/name");

        let expanded = mgr.expand("rdf:type").unwrap();
        assert_eq!(expanded, "http://www.w3.org/1999/02/22-rdf-syntax-ns#type");
    }

    #[test]
    fn test_compact() {
        let mgr = NamespaceManager::new();

        let compacted = mgr.compact("http://xmlns.com/foaf/0.1/name");
        assert_eq!(compacted, Some("foaf:name".to_string()));

        let compacted = mgr.compact("http://www.w3.org/1999/02/22-rdf-syntax-ns#type");
        assert_eq!(compacted, Some("rdf:type".to_string()));
    }

    #[test]
    fn test_custom_prefix() {
        let mut mgr = NamespaceManager::new();
        mgr.add_prefix("ex", "http://example.org/");

        let expanded = mgr.expand("ex:alice").unwrap();
        assert_eq!(expanded, "http://example.org/alice");
    }

    #[test]
    fn test_resolve() {
        let mut mgr = NamespaceManager::new();
        mgr.add_prefix("ex", "http://example.org/");

        assert_eq!(mgr.resolve("ex:alice").as_deref(), Some("http://example.org/alice"));
        assert_eq!(
            mgr.resolve("http://example.org/bob").as_deref(),
            Some("http://example.org/bob")
        );
        assert_eq!(mgr.resolve("alice"), None);

        mgr.set_default_prefix("http://example.org/people/");
        assert_eq!(
            mgr.resolve("alice").as_deref(),
            Some("http://example.org/people/alice")
        );
    }

    #[test]
    fn test_resolve_against_base() {
        let mgr = NamespaceManager::new();

        let resolved = mgr
            .resolve_against("data/people.ttl", Some("http://example.org/root/"))
            .unwrap();
        assert_eq!(resolved, "http://example.org/root/data/people.ttl");

        assert!(mgr.resolve_against("data/people.ttl", None).is_err());
    }

    #[test]
    fn test_profile_namespaces() {
        let mut mgr = NamespaceManager::new();
        assert!(mgr.get_iri("skos").is_err());

        mgr.register_profile_namespaces();
        assert_eq!(
            mgr.get_iri("skos").unwrap(),
            "http://www.w3.org/2004/02/skos/core#"
        );
        // Existing mappings are kept
        assert_eq!(mgr.get_iri("foaf").unwrap(), "http://xmlns.com/foaf/0.1/");
    }
}
