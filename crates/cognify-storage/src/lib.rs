//! Storage ports (§6), in-memory reference implementations, the
//! Graph/Vector Writer (§4.5), and the `Runtime` composition root.

pub mod memory;
pub mod ports;
pub mod runtime;
pub mod writer;

pub use memory::{arc_loader_registry, InMemoryGraphStore, InMemoryRelationalStore, InMemoryVectorStore, PlainTextLoader};
pub use ports::{collection_name, GraphStore, LoadedDocument, Loader, LoaderRegistry, RelationalStore, TextBlock, VectorHit, VectorStore};
pub use runtime::Runtime;
pub use writer::Writer;
