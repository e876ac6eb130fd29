//! Fixture generators shared by this crate's `benches/` harnesses (SPEC_FULL
//! §2): synthetic documents for the Chunker and synthetic duplicate-entity
//! batches for the Entity Resolver, the two CPU-bound hot paths §5's
//! worker-pool sizing is tuned against.

use cognify_core::{DataId, Entity, TenantId};

/// A repeating paragraph pattern long enough to exercise the chunker's
/// paragraph/sentence/character-fallback boundary logic across many chunks.
pub fn synthetic_document_text(paragraphs: usize) -> String {
    let paragraph = "Acme Corporation builds widgets in Springfield. The plant opened in 1998 and employs four hundred people. \
         Quality control inspects every batch before shipment. Customers across the region rely on the parts for their own products.";
    std::iter::repeat(paragraph).take(paragraphs).collect::<Vec<_>>().join("\n\n")
}

/// `count` near-duplicate entities sharing `base_name` with light casing and
/// whitespace variance, plus a handful of genuinely distinct entities, so
/// the resolver's bucketing and fuzzy-match passes both do real work.
pub fn synthetic_entity_batch(tenant: TenantId, base_name: &str, count: usize) -> Vec<Entity> {
    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let name = match i % 4 {
            0 => base_name.to_string(),
            1 => base_name.to_uppercase(),
            2 => format!(" {base_name} "),
            _ => format!("{base_name} Inc."),
        };
        let mut entity = Entity::new(tenant, name, "Organization");
        entity.source_chunks.push(cognify_core::ChunkId::derive_from_chunk(DataId::new(), i, &format!("chunk-{i}")));
        entities.push(entity);
    }
    entities
}
