//! The Entity Resolver (§4.4): merges duplicate entity mentions across
//! chunks and documents into canonical entities via normalization, exact and
//! alias bucketing, Levenshtein similarity, and embedding similarity for
//! ambiguous pairs.

pub mod normalize;
pub mod resolver;
pub mod union_find;

pub use resolver::{AliasOf, EntityResolver, ResolverConfig};
