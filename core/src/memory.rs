//! Map-backed collaborators for tests and single-process pipelines.

use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::index::DocMetadata;
use crate::store::{DocumentStore, KeyValueStore, ObjectStore};

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.objects.read().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn keys(&self) -> Vec<String> { self.objects.read().keys().cloned().collect() }
}

impl ObjectStore for MemoryObjectStore {
    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().get(key).cloned())
    }

    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.objects.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<String, DocMetadata>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.docs.read().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl DocumentStore for MemoryDocumentStore {
    fn list_metadata(&self) -> Result<Vec<DocMetadata>> {
        Ok(self.docs.read().values().cloned().collect())
    }

    fn get_metadata(&self, hash: &str) -> Result<Option<DocMetadata>> {
        Ok(self.docs.read().get(hash).cloned())
    }

    fn get_batch_metadata(&self, hashes: &[String]) -> Result<Vec<DocMetadata>> {
        let docs = self.docs.read();
        Ok(hashes.iter().filter_map(|h| docs.get(h).cloned()).collect())
    }

    fn put_metadata(&self, meta: &DocMetadata) -> Result<()> {
        self.docs.write().insert(meta.hash.clone(), meta.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.entries.read().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
