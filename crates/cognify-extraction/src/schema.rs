//! The `KnowledgeGraph` output shape (§4.2) and the strict JSON schema
//! handed to `LlmProvider::structured_complete` to constrain it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedRelation {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub nodes: Vec<ExtractedEntity>,
    #[serde(default)]
    pub edges: Vec<ExtractedRelation>,
}

/// The strict JSON schema passed alongside the prompt (§4.2). `declared_types`
/// becomes the node `type` enum; anything the model returns outside it is
/// rewritten to `"Other"` by the extractor rather than rejected by the
/// schema, so extraction degrades gracefully instead of hard-failing on an
/// unanticipated entity type.
pub fn knowledge_graph_schema(declared_types: &[String]) -> Value {
    json!({
        "type": "object",
        "required": ["nodes", "edges"],
        "properties": {
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "type"],
                    "properties": {
                        "name": { "type": "string" },
                        "type": { "type": "string", "enum": declared_types },
                        "description": { "type": "string" },
                        "aliases": { "type": "array", "items": { "type": "string" } }
                    }
                }
            },
            "edges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["subject", "predicate", "object"],
                    "properties": {
                        "subject": { "type": "string" },
                        "predicate": { "type": "string" },
                        "object": { "type": "string" },
                        "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
                    }
                }
            }
        }
    })
}

pub const DEFAULT_DECLARED_TYPES: &[&str] = &["Person", "Organization", "Location", "Event", "Concept"];
