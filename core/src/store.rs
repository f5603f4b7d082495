//! Storage collaborators shared by the crawler, the indexer and the server.
//!
//! Absent keys are `Ok(None)`; `Err` is reserved for a store that could not
//! answer at all.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::index::DocMetadata;

/// Raw document bodies keyed by content hash.
pub trait ObjectStore: Send + Sync {
    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Crawl metadata keyed by content hash.
pub trait DocumentStore: Send + Sync {
    fn list_metadata(&self) -> Result<Vec<DocMetadata>>;
    fn get_metadata(&self, hash: &str) -> Result<Option<DocMetadata>>;
    /// Records for the hashes that exist, in no particular order.
    fn get_batch_metadata(&self, hashes: &[String]) -> Result<Vec<DocMetadata>>;
    fn put_metadata(&self, meta: &DocMetadata) -> Result<()>;
    fn flush(&self) -> Result<()> { Ok(()) }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn flush(&self) -> Result<()> { Ok(()) }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> { (**self).get_bytes(key) }
    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> { (**self).put_bytes(key, bytes) }
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn list_metadata(&self) -> Result<Vec<DocMetadata>> { (**self).list_metadata() }
    fn get_metadata(&self, hash: &str) -> Result<Option<DocMetadata>> { (**self).get_metadata(hash) }
    fn get_batch_metadata(&self, hashes: &[String]) -> Result<Vec<DocMetadata>> { (**self).get_batch_metadata(hashes) }
    fn put_metadata(&self, meta: &DocMetadata) -> Result<()> { (**self).put_metadata(meta) }
    fn flush(&self) -> Result<()> { (**self).flush() }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> { (**self).get(key) }
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> { (**self).set(key, value) }
    fn flush(&self) -> Result<()> { (**self).flush() }
}

pub const DEFAULT_METADATA_BATCH: usize = 300;

/// Write-behind wrapper: `put_metadata` only queues, and the queue is written
/// through once it reaches `batch_size` or on `flush`.
pub struct BufferedDocumentStore<S> {
    inner: S,
    batch_size: usize,
    pending: Mutex<Vec<DocMetadata>>,
}

impl<S: DocumentStore> BufferedDocumentStore<S> {
    pub fn new(inner: S, batch_size: usize) -> Self {
        Self { inner, batch_size: batch_size.max(1), pending: Mutex::new(Vec::new()) }
    }

    pub fn pending(&self) -> usize { self.pending.lock().len() }

    fn write_batch(&self, batch: Vec<DocMetadata>) -> Result<()> {
        let mut first_err = None;
        for meta in &batch {
            if let Err(err) = self.inner.put_metadata(meta) {
                tracing::warn!(hash = %meta.hash, error = %err, "metadata write failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl<S: DocumentStore> DocumentStore for BufferedDocumentStore<S> {
    fn list_metadata(&self) -> Result<Vec<DocMetadata>> { self.inner.list_metadata() }

    fn get_metadata(&self, hash: &str) -> Result<Option<DocMetadata>> {
        if let Some(meta) = self.pending.lock().iter().find(|m| m.hash == hash) {
            return Ok(Some(meta.clone()));
        }
        self.inner.get_metadata(hash)
    }

    fn get_batch_metadata(&self, hashes: &[String]) -> Result<Vec<DocMetadata>> {
        let mut found = Vec::with_capacity(hashes.len());
        let mut rest = Vec::new();
        {
            let pending = self.pending.lock();
            for hash in hashes {
                match pending.iter().find(|m| &m.hash == hash) {
                    Some(meta) => found.push(meta.clone()),
                    None => rest.push(hash.clone()),
                }
            }
        }
        if !rest.is_empty() {
            found.extend(self.inner.get_batch_metadata(&rest)?);
        }
        Ok(found)
    }

    fn put_metadata(&self, meta: &DocMetadata) -> Result<()> {
        let full = {
            let mut pending = self.pending.lock();
            pending.push(meta.clone());
            if pending.len() >= self.batch_size { Some(std::mem::take(&mut *pending)) } else { None }
        };
        match full {
            Some(batch) => self.write_batch(batch),
            None => Ok(()),
        }
    }

    fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return self.inner.flush();
        }
        tracing::debug!(count = batch.len(), "flushing metadata batch");
        self.write_batch(batch)?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocumentStore;

    fn meta(hash: &str) -> DocMetadata {
        DocMetadata { hash: hash.into(), url: format!("https://example.com/{hash}"), ..Default::default() }
    }

    #[test]
    fn buffered_store_writes_on_threshold_and_flush() {
        let inner = Arc::new(MemoryDocumentStore::new());
        let store = BufferedDocumentStore::new(inner.clone(), 2);

        store.put_metadata(&meta("a")).unwrap();
        assert_eq!(inner.len(), 0);
        assert_eq!(store.pending(), 1);
        assert!(store.get_metadata("a").unwrap().is_some());

        store.put_metadata(&meta("b")).unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(store.pending(), 0);

        store.put_metadata(&meta("c")).unwrap();
        assert_eq!(inner.len(), 2);
        store.flush().unwrap();
        assert_eq!(inner.len(), 3);
    }

    #[test]
    fn batch_lookup_sees_queued_records() {
        let inner = Arc::new(MemoryDocumentStore::new());
        inner.put_metadata(&meta("c")).unwrap();
        let store = BufferedDocumentStore::new(inner.clone(), 10);

        let mut newer = meta("c");
        newer.title = "updated".into();
        store.put_metadata(&meta("a")).unwrap();
        store.put_metadata(&newer).unwrap();

        let batch = store.get_batch_metadata(&["a".into(), "c".into(), "z".into()]).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().any(|m| m.hash == "a"));
        let c: Vec<_> = batch.iter().filter(|m| m.hash == "c").collect();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].title, "updated");
    }
}
