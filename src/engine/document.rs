//! RocksDB document store backend
//!
//! Quads live in the `quads` column family, keyed by graph so a graph is a
//! contiguous key range. The `meta` column family holds the store's own
//! configuration document, written on first open and read back afterwards.

use super::backend::{BackendError, BackendResult, QuadBackend};
use super::descriptor::{GraphSelector, QuadDescriptor, QuadPattern};
use super::lexicon::DEFAULT_GRAPH_URI;
use crate::config::StoreConfig;
use lru::LruCache;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const QUADS_CF: &str = "quads";
const META_CF: &str = "meta";
const CONFIG_KEY: &[u8] = b"config";

/// Configuration document persisted by the store itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    pub name: String,
    pub tree_order: usize,
    /// Creation time, milliseconds since the Unix epoch
    pub created_at: i64,
}

/// RocksDB-backed quad store
pub struct DocumentStore {
    db: Arc<DB>,
    path: PathBuf,
    stored_config: StoredConfig,
    /// Pattern → matches; emptied on every write
    cache: Option<Mutex<LruCache<QuadPattern, Vec<QuadDescriptor>>>>,
}

impl DocumentStore {
    /// Open the store described by `config`, creating it if needed
    pub fn open(config: &StoreConfig) -> BackendResult<Self> {
        Self::open_at(config.store_path(), config)
    }

    /// Open a store at an explicit path
    pub fn open_at(path: impl AsRef<Path>, config: &StoreConfig) -> BackendResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening document store at: {}", path.display());

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        for (key, value) in &config.options {
            match key.as_str() {
                "write_buffer_size" => opts.set_write_buffer_size(*value as usize),
                "max_open_files" => opts.set_max_open_files(*value as i32),
                other => warn!("Ignoring unknown document store option: {}", other),
            }
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(QUADS_CF, Self::quads_cf_options()),
            ColumnFamilyDescriptor::new(META_CF, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        let cache = NonZeroUsize::new(config.max_cache_size)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));

        let mut store = Self {
            db: Arc::new(db),
            path,
            stored_config: StoredConfig {
                name: config.name.clone(),
                tree_order: config.tree_order,
                created_at: chrono::Utc::now().timestamp_millis(),
            },
            cache,
        };

        match store.read_config()? {
            Some(existing) if !config.overwrite => {
                info!(
                    "Document store '{}' created at {} (tree order {})",
                    existing.name, existing.created_at, existing.tree_order
                );
                store.stored_config = existing;
            }
            _ => {
                if config.overwrite {
                    info!("Overwriting document store at: {}", store.path.display());
                    store.clear()?;
                }
                store.write_config()?;
            }
        }

        Ok(store)
    }

    fn quads_cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    /// The persisted configuration document
    pub fn stored_config(&self) -> &StoredConfig {
        &self.stored_config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf(&self, name: &str) -> BackendResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BackendError::ColumnFamily(name.to_string()))
    }

    fn read_config(&self) -> BackendResult<Option<StoredConfig>> {
        let cf = self.cf(META_CF)?;
        match self.db.get_cf(cf, CONFIG_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_config(&self) -> BackendResult<()> {
        let cf = self.cf(META_CF)?;
        let bytes = bincode::serialize(&self.stored_config)?;
        self.db.put_cf(cf, CONFIG_KEY, bytes)?;
        Ok(())
    }

    /// Key prefix shared by every quad of a graph
    fn graph_prefix(graph: Option<&str>) -> Vec<u8> {
        match graph {
            None | Some(DEFAULT_GRAPH_URI) => b"d\0".to_vec(),
            Some(iri) => {
                let mut key = Vec::with_capacity(iri.len() + 2);
                key.push(b'n');
                key.extend_from_slice(iri.as_bytes());
                key.push(0);
                key
            }
        }
    }

    fn quad_key(quad: &QuadDescriptor) -> BackendResult<Vec<u8>> {
        let mut key = Self::graph_prefix(quad.graph.as_deref());
        key.extend(bincode::serialize(quad)?);
        Ok(key)
    }

    fn scan(&self, prefix: &[u8]) -> BackendResult<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(QUADS_CF)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// The match cache; a poisoned lock still yields the cache
    fn cache(&self) -> Option<MutexGuard<'_, LruCache<QuadPattern, Vec<QuadDescriptor>>>> {
        self.cache
            .as_ref()
            .map(|cache| cache.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn invalidate_cache(&self) {
        if let Some(mut cache) = self.cache() {
            cache.clear();
        }
    }

    fn normalize(quad: &QuadDescriptor) -> QuadDescriptor {
        let mut quad = quad.clone();
        if quad.graph.as_deref() == Some(DEFAULT_GRAPH_URI) {
            quad.graph = None;
        }
        quad
    }
}

impl QuadBackend for DocumentStore {
    fn name(&self) -> &'static str {
        "document"
    }

    fn insert(&mut self, quad: &QuadDescriptor) -> BackendResult<bool> {
        let quad = Self::normalize(quad);
        let cf = self.cf(QUADS_CF)?;
        let key = Self::quad_key(&quad)?;
        if self.db.get_cf(cf, &key)?.is_some() {
            return Ok(false);
        }
        self.db.put_cf(cf, &key, bincode::serialize(&quad)?)?;
        self.invalidate_cache();
        Ok(true)
    }

    fn remove(&mut self, quad: &QuadDescriptor) -> BackendResult<bool> {
        let quad = Self::normalize(quad);
        let cf = self.cf(QUADS_CF)?;
        let key = Self::quad_key(&quad)?;
        if self.db.get_cf(cf, &key)?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf(cf, &key)?;
        self.invalidate_cache();
        Ok(true)
    }

    fn match_pattern(&self, pattern: &QuadPattern) -> BackendResult<Vec<QuadDescriptor>> {
        if let Some(hit) = self.cache().and_then(|mut cache| cache.get(pattern).cloned()) {
            return Ok(hit);
        }

        let prefix = match &pattern.graph {
            GraphSelector::Default => Self::graph_prefix(None),
            GraphSelector::Named(g) => Self::graph_prefix(Some(g)),
            GraphSelector::AllNamed => b"n".to_vec(),
            GraphSelector::All => Vec::new(),
        };

        let mut matches = Vec::new();
        for (_key, value) in self.scan(&prefix)? {
            let quad: QuadDescriptor = bincode::deserialize(&value)?;
            if pattern.matches(&quad) {
                matches.push(quad);
            }
        }

        if let Some(mut cache) = self.cache() {
            cache.put(pattern.clone(), matches.clone());
        }
        Ok(matches)
    }

    fn named_graphs(&self) -> BackendResult<Vec<String>> {
        let mut graphs: Vec<String> = Vec::new();
        for (key, _value) in self.scan(b"n")? {
            let end = key
                .iter()
                .position(|b| *b == 0)
                .ok_or_else(|| BackendError::Corrupt("graph key without terminator".to_string()))?;
            let graph = String::from_utf8_lossy(&key[1..end]);
            if graphs.last().map(String::as_str) != Some(graph.as_ref()) {
                graphs.push(graph.into_owned());
            }
        }
        Ok(graphs)
    }

    fn clear_graph(&mut self, graph: Option<&str>) -> BackendResult<Vec<QuadDescriptor>> {
        let cf = self.cf(QUADS_CF)?;
        let mut batch = WriteBatch::default();
        let mut removed = Vec::new();
        for (key, value) in self.scan(&Self::graph_prefix(graph))? {
            removed.push(bincode::deserialize(&value)?);
            batch.delete_cf(cf, key);
        }
        self.db.write(batch)?;
        self.invalidate_cache();
        debug!("Cleared {} quads from {:?}", removed.len(), graph);
        Ok(removed)
    }

    fn clear(&mut self) -> BackendResult<()> {
        let cf = self.cf(QUADS_CF)?;
        let mut batch = WriteBatch::default();
        for (key, _value) in self.scan(&[])? {
            batch.delete_cf(cf, key);
        }
        self.db.write(batch)?;
        self.invalidate_cache();
        Ok(())
    }

    fn len(&self) -> BackendResult<usize> {
        Ok(self.scan(&[])?.len())
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.db.flush()?;
        debug!("Flushed document store to disk");
        Ok(())
    }
}
