//! The Hybrid Retrieval Engine (§4.7-§4.8): Vector/Graph/Lexical retrievers
//! fused by Reciprocal Rank Fusion with optional cross-encoder reranking,
//! plus the grounded Answer Generator.

pub mod answer;
pub mod graph_retriever;
pub mod hybrid;
pub mod item;
pub mod lexical_retriever;
pub mod reranker;
pub mod vector_retriever;

pub use answer::{AnswerGenerator, GeneratedAnswer};
pub use graph_retriever::{GraphRetriever, TripletWeights};
pub use hybrid::HybridRetriever;
pub use item::{Provenance, RetrievedItem};
pub use lexical_retriever::LexicalRetriever;
pub use reranker::{CrossEncoderReranker, RerankDocument, RerankerProvider, RerankerResult, StubRerankerProvider};
pub use vector_retriever::VectorRetriever;
