//! JSON-LD format implementation (Basic)

use crate::rdf::{RdfObject, RdfSubject, Triple, XSD_STRING};
use super::{SerializeError, SerializeResult};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

/// JSON-LD serializer
pub struct JsonLdSerializerWrapper;

impl JsonLdSerializerWrapper {
    /// Serialize Triples to JSON-LD string
    ///
    /// This implements a basic "expanded" JSON-LD serialization.
    pub fn serialize(triples: &[Triple]) -> SerializeResult<String> {
        // Group by subject, keeping first-seen order
        let mut map: IndexMap<String, IndexMap<String, Vec<Value>>> = IndexMap::new();

        for triple in triples {
            let s_key = match &triple.subject {
                RdfSubject::NamedNode(n) => n.as_str().to_string(),
                RdfSubject::BlankNode(b) => format!("_:{}", b.as_str()),
            };
            let p_key = triple.predicate.as_named_node().as_str().to_string();

            let o_val = match &triple.object {
                RdfObject::NamedNode(n) => {
                    json!({ "@id": n.as_str() })
                },
                RdfObject::BlankNode(b) => {
                    json!({ "@id": format!("_:{}", b.as_str()) })
                },
                RdfObject::Literal(l) => {
                    if let Some(lang) = l.language() {
                         json!({ "@value": l.value(), "@language": lang })
                    } else {
                        let dt = l.datatype();
                        if dt.as_str() == XSD_STRING {
                            json!({ "@value": l.value() })
                        } else {
                            json!({ "@value": l.value(), "@type": dt.as_str() })
                        }
                    }
                }
            };

            map.entry(s_key)
                .or_default()
                .entry(p_key)
                .or_default()
                .push(o_val);
        }

        let mut output = Vec::new();
        for (subject, props) in map {
            let mut node = Map::new();
            node.insert("@id".to_string(), Value::String(subject));
            for (pred, objs) in props {
                node.insert(pred, Value::Array(objs));
            }
            output.push(Value::Object(node));
        }

        serde_json::to_string_pretty(&output)
            .map_err(|e| SerializeError::Serialize(e.to_string()))
    }
}
