//! The shared result type all three retrievers and the fusion step produce
//! (§4.7): a chunk-shaped hit with as much provenance as the graph actually
//! stores, or a subject/predicate/object triplet surfaced by the graph
//! retriever's traversal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Provenance reconstructed from a `DocumentChunk` node's stored properties
/// (`cognify_core::model::DocumentChunk::nodes`). Only `chunk_index`,
/// `start_char` and `end_char` are ever projected onto the graph node, so
/// `data_id`, `line_range` and `page` stay `None` here rather than being
/// invented — the GLOSSARY's `(data_id, chunk_id, line_range, char_range,
/// page)` tuple is carried honestly, not completed by guesswork.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub data_id: Option<String>,
    pub chunk_id: Option<String>,
    pub chunk_index: Option<usize>,
    pub start_char: Option<usize>,
    pub end_char: Option<usize>,
    pub line_range: Option<(usize, usize)>,
    pub page: Option<usize>,
}

/// One retrieved unit of context (§4.7): either a chunk surfaced by the
/// vector or lexical retriever, or a triplet surfaced by the graph
/// retriever's bounded traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RetrievedItem {
    Chunk {
        chunk_id: String,
        text: String,
        score: f32,
        provenance: Provenance,
    },
    Triplet {
        subject: String,
        predicate: String,
        object: String,
        source_chunk: Option<String>,
        score: f32,
    },
}

impl RetrievedItem {
    /// The fusion key (§4.7): a chunk's own id, or a stable composite of a
    /// triplet's three fields so the same fact surfaced twice fuses into one
    /// entry instead of two.
    pub fn id(&self) -> String {
        match self {
            RetrievedItem::Chunk { chunk_id, .. } => chunk_id.clone(),
            RetrievedItem::Triplet { subject, predicate, object, .. } => {
                format!("{subject}::{predicate}::{object}")
            }
        }
    }

    pub fn score(&self) -> f32 {
        match self {
            RetrievedItem::Chunk { score, .. } => *score,
            RetrievedItem::Triplet { score, .. } => *score,
        }
    }

    pub fn with_score(&self, score: f32) -> RetrievedItem {
        let mut item = self.clone();
        match &mut item {
            RetrievedItem::Chunk { score: s, .. } => *s = score,
            RetrievedItem::Triplet { score: s, .. } => *s = score,
        }
        item
    }

    /// Flattened text used to build the Answer Generator's prompt and to
    /// feed the reranker (§4.7-§4.8).
    pub fn text(&self) -> String {
        match self {
            RetrievedItem::Chunk { text, .. } => text.clone(),
            RetrievedItem::Triplet { subject, predicate, object, .. } => {
                format!("{subject} {predicate} {object}")
            }
        }
    }
}

pub(crate) fn provenance_from_properties(
    chunk_id: &str,
    properties: &HashMap<String, serde_json::Value>,
) -> Provenance {
    Provenance {
        data_id: None,
        chunk_id: Some(chunk_id.to_string()),
        chunk_index: properties.get("chunk_index").and_then(|v| v.as_u64()).map(|n| n as usize),
        start_char: properties.get("start_char").and_then(|v| v.as_u64()).map(|n| n as usize),
        end_char: properties.get("end_char").and_then(|v| v.as_u64()).map(|n| n as usize),
        line_range: None,
        page: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_its_own_fusion_key() {
        let item = RetrievedItem::Chunk {
            chunk_id: "c1".to_string(),
            text: "hello".to_string(),
            score: 0.5,
            provenance: Provenance::default(),
        };
        assert_eq!(item.id(), "c1");
    }

    #[test]
    fn triplet_fusion_key_is_a_stable_composite() {
        let item = RetrievedItem::Triplet {
            subject: "Alice".to_string(),
            predicate: "works_at".to_string(),
            object: "Acme".to_string(),
            source_chunk: None,
            score: 0.3,
        };
        assert_eq!(item.id(), "Alice::works_at::Acme");
    }

    #[test]
    fn provenance_from_properties_skips_absent_fields() {
        let mut props = HashMap::new();
        props.insert("chunk_index".to_string(), serde_json::json!(2));
        props.insert("start_char".to_string(), serde_json::json!(10));
        let prov = provenance_from_properties("c1", &props);
        assert_eq!(prov.chunk_index, Some(2));
        assert_eq!(prov.start_char, Some(10));
        assert_eq!(prov.end_char, None);
        assert_eq!(prov.data_id, None);
    }
}
