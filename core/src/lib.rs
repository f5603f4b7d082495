pub mod bm25;
pub mod html;
pub mod index;
pub mod lru;
pub mod memory;
pub mod persist;
pub mod store;
pub mod tokenizer;

pub use bm25::Bm25Params;
pub use index::{DocHash, DocMetadata, InvertedIndex, PartialIndex, Posting, Stats};
pub use lru::LruCache;
pub use persist::{DataPaths, FsDocumentStore, FsObjectStore, IndexStore, SledStore};
pub use store::{BufferedDocumentStore, DocumentStore, KeyValueStore, ObjectStore};
