//! Strongly typed identifiers.
//!
//! Every id in the data model is a 128-bit UUID wrapped in a distinct type so
//! a `DataId` can never be passed where a `ChunkId` is expected. Semantic
//! content ids (chunk, entity) are not random: they are derived
//! deterministically from their defining fields so re-ingesting the same
//! input reproduces the same id (see `ChunkId::derive` / `EntityId::derive`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Deterministic id derived from a namespace string and a set of
            /// fields that define identity. Same inputs always produce the
            /// same id (UUIDv5-style, but keyed on our own namespace rather
            /// than the DNS/URL namespaces `uuid` ships).
            pub fn derive(namespace: &str, parts: &[&str]) -> Self {
                let mut hasher = Sha256::new();
                hasher.update(namespace.as_bytes());
                for part in parts {
                    hasher.update(0u8.to_le_bytes());
                    hasher.update(part.as_bytes());
                }
                let digest = hasher.finalize();
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(&digest[0..16]);
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(TenantId);
uuid_id!(DatasetId);
uuid_id!(DataId);
uuid_id!(ChunkId);
uuid_id!(EntityId);
uuid_id!(RunId);

impl DataId {
    /// `(tenant_id, content_hash)` is unique per §3 — the id is derived from
    /// it so re-ingesting identical bytes yields the same `Data` row.
    pub fn derive_from_content(tenant: TenantId, content_hash: &str) -> Self {
        Self::derive("cognify.data", &[&tenant.to_string(), content_hash])
    }
}

impl ChunkId {
    /// Derived from `(data_id, chunk_index, text_hash)` per §3.
    pub fn derive_from_chunk(data: DataId, chunk_index: usize, text_hash: &str) -> Self {
        Self::derive(
            "cognify.chunk",
            &[&data.to_string(), &chunk_index.to_string(), text_hash],
        )
    }
}

impl EntityId {
    /// Derived from `(tenant, normalized_name, type)` per §3.
    pub fn derive_from_identity(tenant: TenantId, normalized_name: &str, entity_type: &str) -> Self {
        Self::derive(
            "cognify.entity",
            &[&tenant.to_string(), normalized_name, entity_type],
        )
    }
}

/// SHA-256 hex digest, used both for `Data.content_hash` and for the
/// `text_hash` component of a chunk id.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
