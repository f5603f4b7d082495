use crate::index::{DocMetadata, Posting, Stats};
use crate::store::{DocumentStore, KeyValueStore, ObjectStore};
use anyhow::{Context, Result};
use std::fs::{create_dir_all, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// On-disk layout shared by the three binaries.
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn pages(&self) -> PathBuf { self.root.join("pages") }
    pub fn metadata(&self) -> PathBuf { self.root.join("metadata") }
    pub fn index(&self) -> PathBuf { self.root.join("index") }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("open {}", path.display())),
    };
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

/// Store keys name a single file: ASCII letters, digits, `-` and `_` only.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn key_path(root: &Path, key: &str, ext: Option<&str>) -> Option<PathBuf> {
    if !is_valid_key(key) {
        return None;
    }
    Some(match ext {
        Some(ext) => root.join(format!("{key}.{ext}")),
        None => root.join(key),
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    f.write_all(bytes)?;
    Ok(())
}

/// One file per object under `root`.
pub struct FsObjectStore {
    root: PathBuf,
    extension: Option<String>,
}

impl FsObjectStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;
        Ok(Self { root, extension: None })
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extension = Some(ext.to_string());
        self
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        key_path(&self.root, key, self.extension.as_deref())
    }
}

impl ObjectStore for FsObjectStore {
    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.path_for(key) {
            Some(path) => read_if_exists(&path),
            None => Ok(None),
        }
    }

    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key).with_context(|| format!("invalid object key {key:?}"))?;
        write_file(&path, bytes)
    }
}

/// Metadata as `<root>/<hash>.json`.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, hash: &str) -> Option<PathBuf> { key_path(&self.root, hash, Some("json")) }
}

impl DocumentStore for FsDocumentStore {
    fn list_metadata(&self) -> Result<Vec<DocMetadata>> {
        let mut docs = Vec::new();
        for entry in WalkDir::new(&self.root).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if !p.is_file() || p.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(p).with_context(|| format!("read {}", p.display()))?;
            match serde_json::from_slice::<DocMetadata>(&bytes) {
                Ok(meta) => docs.push(meta),
                Err(err) => tracing::warn!(path = %p.display(), error = %err, "skipping unreadable metadata"),
            }
        }
        Ok(docs)
    }

    fn get_metadata(&self, hash: &str) -> Result<Option<DocMetadata>> {
        let Some(path) = self.path_for(hash) else {
            return Ok(None);
        };
        match read_if_exists(&path)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_batch_metadata(&self, hashes: &[String]) -> Result<Vec<DocMetadata>> {
        let mut docs = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(meta) = self.get_metadata(hash)? {
                docs.push(meta);
            }
        }
        Ok(docs)
    }

    fn put_metadata(&self, meta: &DocMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(meta)?;
        let path = self.path_for(&meta.hash).with_context(|| format!("invalid document hash {:?}", meta.hash))?;
        write_file(&path, json.as_bytes())
    }
}

pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).with_context(|| format!("open sled at {}", path.as_ref().display()))?;
        Ok(Self { db })
    }

    /// Throwaway database, removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open().context("open temporary sled")?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

const POSTINGS_PREFIX: &str = "postings:";
const DOC_LENGTH_PREFIX: &str = "doclen:";
const STATS_KEY: &[u8] = b"stats";

/// Typed access to the index records kept in a key-value store.
pub struct IndexStore<K> {
    kv: K,
}

impl<K: KeyValueStore> IndexStore<K> {
    pub fn new(kv: K) -> Self { Self { kv } }

    pub fn kv(&self) -> &K { &self.kv }

    /// Replaces the whole postings list for `term`.
    pub fn save_postings_for_term(&self, term: &str, postings: &[Posting]) -> Result<()> {
        let bytes = bincode::serialize(postings)?;
        self.kv.set(format!("{POSTINGS_PREFIX}{term}").as_bytes(), &bytes)
    }

    /// Empty when the term was never indexed.
    pub fn load_postings_for_term(&self, term: &str) -> Result<Vec<Posting>> {
        match self.kv.get(format!("{POSTINGS_PREFIX}{term}").as_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn save_doc_length(&self, hash: &str, length: u32) -> Result<()> {
        self.kv.set(format!("{DOC_LENGTH_PREFIX}{hash}").as_bytes(), &length.to_be_bytes())
    }

    pub fn load_doc_length(&self, hash: &str) -> Result<Option<u32>> {
        let Some(bytes) = self.kv.get(format!("{DOC_LENGTH_PREFIX}{hash}").as_bytes())? else {
            return Ok(None);
        };
        let raw: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .with_context(|| format!("doc length for {hash} has {} bytes", bytes.len()))?;
        Ok(Some(u32::from_be_bytes(raw)))
    }

    pub fn save_stats(&self, stats: &Stats) -> Result<()> {
        let json = serde_json::to_vec_pretty(stats)?;
        self.kv.set(STATS_KEY, &json)
    }

    pub fn load_stats(&self) -> Result<Option<Stats>> {
        match self.kv.get(STATS_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> Result<()> { self.kv.flush() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;
    use tempfile::tempdir;

    #[test]
    fn postings_are_replaced_per_term() {
        let store = IndexStore::new(MemoryKv::new());
        assert!(store.load_postings_for_term("rust").unwrap().is_empty());

        store.save_postings_for_term("rust", &[Posting::new("a", vec![1, 4])]).unwrap();
        store.save_postings_for_term("rust", &[Posting::new("b", vec![2])]).unwrap();
        let postings = store.load_postings_for_term("rust").unwrap();
        assert_eq!(postings, vec![Posting::new("b", vec![2])]);
    }

    #[test]
    fn doc_length_and_stats_round_trip_through_sled() {
        let store = IndexStore::new(SledStore::temporary().unwrap());
        assert_eq!(store.load_doc_length("a").unwrap(), None);
        assert_eq!(store.load_stats().unwrap(), None);

        store.save_doc_length("a", 1234).unwrap();
        assert_eq!(store.load_doc_length("a").unwrap(), Some(1234));

        let stats = Stats { avg_doc_length: 75.0, total_docs: 2, built_at: "2024-01-01T00:00:00Z".into() };
        store.save_stats(&stats).unwrap();
        assert_eq!(store.load_stats().unwrap(), Some(stats));
    }

    #[test]
    fn corrupt_doc_length_is_an_error() {
        let store = IndexStore::new(MemoryKv::new());
        store.kv().set(b"doclen:a", &[1, 2]).unwrap();
        assert!(store.load_doc_length("a").is_err());
    }

    #[test]
    fn fs_stores_persist_pages_and_metadata() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let pages = FsObjectStore::open(paths.pages()).unwrap().with_extension("html");
        let docs = FsDocumentStore::open(paths.metadata()).unwrap();

        pages.put_bytes("abc", b"<html></html>").unwrap();
        assert!(paths.pages().join("abc.html").exists());
        assert_eq!(pages.get_bytes("abc").unwrap().as_deref(), Some(&b"<html></html>"[..]));
        assert_eq!(pages.get_bytes("missing").unwrap(), None);

        let meta = DocMetadata { url: "https://example.com".into(), hash: "abc".into(), title: "Example".into(), ..Default::default() };
        docs.put_metadata(&meta).unwrap();
        assert_eq!(docs.get_metadata("abc").unwrap(), Some(meta.clone()));
        assert_eq!(docs.list_metadata().unwrap(), vec![meta.clone()]);
        assert_eq!(docs.get_batch_metadata(&["abc".into(), "nope".into()]).unwrap(), vec![meta]);
    }

    #[test]
    fn fs_stores_stay_inside_their_root() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let docs = FsDocumentStore::open(paths.metadata()).unwrap();
        let pages = FsObjectStore::open(paths.pages()).unwrap();

        let outside = DocMetadata { url: "file://secret".into(), hash: "private".into(), ..Default::default() };
        std::fs::write(dir.path().join("private.json"), serde_json::to_vec(&outside).unwrap()).unwrap();
        std::fs::write(dir.path().join("secret"), b"x").unwrap();

        assert_eq!(docs.get_metadata("../private").unwrap(), None);
        assert_eq!(docs.get_metadata("..").unwrap(), None);
        assert_eq!(docs.get_metadata("").unwrap(), None);
        assert_eq!(pages.get_bytes("../secret").unwrap(), None);

        let escaping = DocMetadata { hash: "../escape".into(), ..Default::default() };
        assert!(docs.put_metadata(&escaping).is_err());
        assert!(pages.put_bytes("a/b", b"x").is_err());
        assert!(!dir.path().join("escape.json").exists());
    }

    #[test]
    fn valid_keys() {
        assert!(is_valid_key("abc123"));
        assert!(is_valid_key("A_b-9"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(".."));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key("a\\b"));
        assert!(!is_valid_key("a.json"));
    }
}
