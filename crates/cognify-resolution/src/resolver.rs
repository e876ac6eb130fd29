//! The Entity Resolver (§4.4): a deterministic, single-pass merge of
//! duplicate entity mentions into canonical entities, by normalization,
//! exact and alias bucketing, Levenshtein similarity, and (for the
//! remaining ambiguous pairs) embedding cosine similarity.

use std::collections::HashMap;
use std::sync::Arc;

use cognify_adapters::{cosine_similarity, Embedder};
use cognify_core::{CognifyError, Entity, EntityId};

use crate::normalize::{core_name, is_family_name_prefix_match, normalize};
use crate::union_find::UnionFind;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub fuzzy_threshold: f64,
    pub embedding_threshold: f64,
    /// Lower bound of the fuzzy-score "gap" routed to the embedding pass
    /// (§4.4 step 5: "fuzzy score is in `[0.6, 0.85)`").
    pub fuzzy_gap_low: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
            embedding_threshold: 0.90,
            fuzzy_gap_low: 0.6,
        }
    }
}

/// `alias_of[non_canonical_id] == canonical_id`, so callers holding an id
/// from before resolution can still resolve it (§4.4 step 7).
pub type AliasOf = HashMap<EntityId, EntityId>;

pub struct EntityResolver {
    config: ResolverConfig,
    embedder: Option<Arc<dyn Embedder>>,
}

impl EntityResolver {
    pub fn new(config: ResolverConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { config, embedder }
    }

    /// Runs the full seven-step algorithm over `candidates`, returning the
    /// canonicalized entities plus the `alias_of` side-table. Entities of
    /// different `entity_type` are never merged (§4.4 step 6), so the whole
    /// pass partitions by type first and resolves each partition
    /// independently — this is also the `O(N²/T)` complexity bound §4.4
    /// names, T being the number of distinct types.
    pub async fn resolve(&self, candidates: Vec<Entity>) -> Result<(Vec<Entity>, AliasOf), CognifyError> {
        let mut by_type: HashMap<String, Vec<Entity>> = HashMap::new();
        for entity in candidates {
            by_type.entry(entity.entity_type.clone()).or_default().push(entity);
        }

        let mut canonical = Vec::new();
        let mut alias_of = AliasOf::new();

        for (_type, group) in by_type {
            let (group_canonical, group_alias_of) = self.resolve_within_type(group).await?;
            canonical.extend(group_canonical);
            alias_of.extend(group_alias_of);
        }

        canonical.sort_by(|a, b| a.name.cmp(&b.name));
        Ok((canonical, alias_of))
    }

    async fn resolve_within_type(&self, entities: Vec<Entity>) -> Result<(Vec<Entity>, AliasOf), CognifyError> {
        let n = entities.len();
        if n == 0 {
            return Ok((Vec::new(), AliasOf::new()));
        }

        let normalized: Vec<String> = entities.iter().map(|e| normalize(&e.name)).collect();
        let mut uf = UnionFind::new(n);

        // Step 2: exact bucket on (normalized_name, type). Type is already
        // fixed within this call, so bucket on normalized name alone.
        let mut exact_buckets: HashMap<&str, usize> = HashMap::new();
        for (i, name) in normalized.iter().enumerate() {
            if let Some(&first) = exact_buckets.get(name.as_str()) {
                uf.union(first, i);
            } else {
                exact_buckets.insert(name.as_str(), i);
            }
        }

        // Step 3: alias bucket. Union any entity whose normalized name
        // matches another entity's declared alias.
        let normalized_aliases: Vec<Vec<String>> =
            entities.iter().map(|e| e.aliases.iter().map(|a| normalize(a)).collect()).collect();
        for i in 0..n {
            for j in (i + 1)..n {
                if normalized_aliases[i].contains(&normalized[j]) || normalized_aliases[j].contains(&normalized[i]) {
                    uf.union(i, j);
                }
            }
        }

        // Step 4: fuzzy pass (Levenshtein on normalized names), with the
        // core-name and family-name-prefix boosts for script-specific
        // policies, plus step 5's embedding pass for the ambiguous gap.
        let mut embedding_pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if uf.find(i) == uf.find(j) {
                    continue;
                }
                let score = fuzzy_score(&normalized[i], &normalized[j]);
                if score >= self.config.fuzzy_threshold {
                    uf.union(i, j);
                } else if score >= self.config.fuzzy_gap_low {
                    embedding_pairs.push((i, j));
                }
            }
        }

        if !embedding_pairs.is_empty() {
            if let Some(embedder) = &self.embedder {
                let texts: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
                let embeddings = embedder
                    .embed("default", &texts)
                    .await
                    .map_err(|e| e.into_cognify("entity resolution"))?;
                for (i, j) in embedding_pairs {
                    if uf.find(i) == uf.find(j) {
                        continue;
                    }
                    let sim = cosine_similarity(&embeddings[i], &embeddings[j]);
                    if sim as f64 >= self.config.embedding_threshold {
                        uf.union(i, j);
                    }
                }
            }
        }

        let groups = uf.groups();
        let mut canonical_entities = Vec::with_capacity(groups.len());
        let mut alias_of = AliasOf::new();

        for group in groups {
            let members: Vec<&Entity> = group.iter().map(|&i| &entities[i]).collect();
            let canonical_index = canonicalize_index(&members);
            let canonical_member = members[canonical_index];

            let mut merged = canonical_member.clone();
            let mut alias_set: std::collections::BTreeSet<String> = merged.aliases.iter().cloned().collect();
            for (k, member) in members.iter().enumerate() {
                if k == canonical_index {
                    continue;
                }
                alias_set.insert(member.name.clone());
                alias_set.extend(member.aliases.iter().cloned());
                merged.source_chunks.extend(member.source_chunks.iter().cloned());
                alias_of.insert(member.id, canonical_member.id);
            }
            merged.aliases = alias_set.into_iter().collect();
            merged.source_chunks.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            merged.source_chunks.dedup();
            canonical_entities.push(merged);
        }

        Ok((canonical_entities, alias_of))
    }
}

/// Levenshtein similarity in `[0, 1]`, boosted for script-specific "core
/// name" matches and single-character family-name prefixes (§4.4 step 4).
fn fuzzy_score(a: &str, b: &str) -> f64 {
    let base = strsim::normalized_levenshtein(a, b);
    let core_a = core_name(a);
    let core_b = core_name(b);
    if !core_a.is_empty() && core_a == core_b {
        return base.max(0.95);
    }
    if is_family_name_prefix_match(a, b) {
        return base.max(0.85);
    }
    base
}

/// §4.4 step 7: `(highest confidence, longest description, lexicographically
/// smallest name)`.
fn canonicalize_index(members: &[&Entity]) -> usize {
    let mut best = 0;
    for (i, member) in members.iter().enumerate().skip(1) {
        let candidate = members[best];
        let better = match member.confidence.partial_cmp(&candidate.confidence).unwrap_or(std::cmp::Ordering::Equal) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => match member.description.len().cmp(&candidate.description.len()) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => member.name < candidate.name,
            },
        };
        if better {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognify_adapters::StubEmbedder;
    use cognify_core::TenantId;

    fn entity(tenant: TenantId, name: &str, entity_type: &str, confidence: f64) -> Entity {
        let mut e = Entity::new(tenant, normalize(name), entity_type);
        e.name = name.to_string();
        e.confidence = confidence;
        e
    }

    fn resolver() -> EntityResolver {
        EntityResolver::new(ResolverConfig::default(), Some(Arc::new(StubEmbedder::default())))
    }

    #[tokio::test]
    async fn exact_duplicates_merge_into_one_canonical_entity() {
        let tenant = TenantId::new();
        let candidates = vec![
            entity(tenant, "Acme Corp", "Organization", 0.9),
            entity(tenant, "acme corp", "Organization", 0.5),
        ];
        let (canonical, alias_of) = resolver().resolve(candidates).await.unwrap();
        assert_eq!(canonical.len(), 1);
        assert_eq!(alias_of.len(), 1);
    }

    #[tokio::test]
    async fn different_types_are_never_merged() {
        let tenant = TenantId::new();
        let candidates = vec![
            entity(tenant, "Paris", "Location", 0.9),
            entity(tenant, "Paris", "Person", 0.9),
        ];
        let (canonical, _) = resolver().resolve(candidates).await.unwrap();
        assert_eq!(canonical.len(), 2);
    }

    #[tokio::test]
    async fn alias_match_merges_entities() {
        let tenant = TenantId::new();
        let mut a = entity(tenant, "International Business Machines", "Organization", 0.9);
        a.aliases.push("IBM".to_string());
        let b = entity(tenant, "IBM", "Organization", 0.4);
        let (canonical, _) = resolver().resolve(vec![a, b]).await.unwrap();
        assert_eq!(canonical.len(), 1);
    }

    #[tokio::test]
    async fn near_miss_names_fuzzy_merge() {
        let tenant = TenantId::new();
        let candidates = vec![
            entity(tenant, "Jonathan Smith", "Person", 0.9),
            entity(tenant, "Jonathan Smithh", "Person", 0.5),
        ];
        let (canonical, _) = resolver().resolve(candidates).await.unwrap();
        assert_eq!(canonical.len(), 1);
    }

    #[tokio::test]
    async fn canonical_pick_prefers_highest_confidence_then_longest_description() {
        let tenant = TenantId::new();
        let mut low = entity(tenant, "acme corp", "Organization", 0.3);
        low.description = "short".to_string();
        let mut high = entity(tenant, "Acme Corp", "Organization", 0.9);
        high.description = "a longer description of the company".to_string();
        let (canonical, _) = resolver().resolve(vec![low, high]).await.unwrap();
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical[0].name, "Acme Corp");
    }

    #[tokio::test]
    async fn unrelated_names_are_not_merged() {
        let tenant = TenantId::new();
        let candidates = vec![
            entity(tenant, "Alice", "Person", 0.9),
            entity(tenant, "Bob", "Person", 0.9),
        ];
        let (canonical, _) = resolver().resolve(candidates).await.unwrap();
        assert_eq!(canonical.len(), 2);
    }
}
