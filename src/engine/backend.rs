//! Quad backends
//!
//! [`QuadBackend`] is the storage seam of the engine. Two implementations
//! exist: [`EmbeddedBackend`] (lexicon + in-memory index, optional snapshot
//! file) and [`DocumentStore`](super::document::DocumentStore) (RocksDB).

use super::descriptor::{GraphSelector, QuadDescriptor, QuadPattern, TermDescriptor};
use super::index::{IdPattern, QuadIndex, QuadKey};
use super::lexicon::{Lexicon, DEFAULT_GRAPH_ID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Column family error
    #[error("Column family error: {0}")]
    ColumnFamily(String),

    /// Stored data doesn't decode to a valid quad
    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for quads
pub trait QuadBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Store a quad; returns `false` if it was already present
    fn insert(&mut self, quad: &QuadDescriptor) -> BackendResult<bool>;

    /// Remove a quad; returns `false` if it was absent
    fn remove(&mut self, quad: &QuadDescriptor) -> BackendResult<bool>;

    /// Every stored quad matching `pattern`
    fn match_pattern(&self, pattern: &QuadPattern) -> BackendResult<Vec<QuadDescriptor>>;

    /// Named graphs holding at least one quad, sorted
    fn named_graphs(&self) -> BackendResult<Vec<String>>;

    /// Remove every quad of a graph (`None` = default graph), returning them
    fn clear_graph(&mut self, graph: Option<&str>) -> BackendResult<Vec<QuadDescriptor>> {
        let selector = match graph {
            Some(g) => GraphSelector::Named(g.to_string()),
            None => GraphSelector::Default,
        };
        let quads = self.match_pattern(&QuadPattern::any(selector))?;
        for quad in &quads {
            self.remove(quad)?;
        }
        Ok(quads)
    }

    /// Remove everything
    fn clear(&mut self) -> BackendResult<()>;

    /// Number of stored quads
    fn len(&self) -> BackendResult<usize>;

    /// Persist pending state
    fn flush(&mut self) -> BackendResult<()>;
}

/// On-disk form of the embedded backend
#[derive(Serialize, Deserialize)]
struct Snapshot {
    lexicon: Lexicon,
    quads: Vec<QuadKey>,
}

/// Snapshot contents read at startup
pub struct SnapshotData {
    pub lexicon: Lexicon,
    pub quads: Vec<QuadKey>,
}

/// Lexicon plus quad index
pub struct EmbeddedBackend {
    lexicon: Lexicon,
    index: QuadIndex,
    snapshot: Option<PathBuf>,
}

impl EmbeddedBackend {
    /// Assemble a backend from a lexicon and an index built over it
    pub fn new(lexicon: Lexicon, index: QuadIndex) -> Self {
        Self {
            lexicon,
            index,
            snapshot: None,
        }
    }

    /// Write the lexicon and index to `path` on every flush
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    /// Read a snapshot file, if one exists
    pub async fn read_snapshot(path: &Path) -> BackendResult<Option<SnapshotData>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = bincode::deserialize(&bytes)?;
        info!("Read snapshot {} ({} quads)", path.display(), snapshot.quads.len());
        Ok(Some(SnapshotData {
            lexicon: snapshot.lexicon,
            quads: snapshot.quads,
        }))
    }

    fn write_snapshot(&self, path: &Path) -> BackendResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = Snapshot {
            lexicon: self.lexicon.clone(),
            quads: self.index.iter().copied().collect(),
        };
        let bytes = bincode::serialize(&snapshot)?;
        let tmp = path.with_extension("snapshot.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!("Wrote snapshot {} ({} quads)", path.display(), snapshot.quads.len());
        Ok(())
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn index(&self) -> &QuadIndex {
        &self.index
    }

    fn encode(&mut self, quad: &QuadDescriptor) -> QuadKey {
        [
            self.lexicon.intern(&quad.subject),
            self.lexicon.intern(&quad.predicate),
            self.lexicon.intern(&quad.object),
            self.lexicon.intern_graph(quad.graph.as_deref()),
        ]
    }

    fn lookup(&self, quad: &QuadDescriptor) -> Option<QuadKey> {
        Some([
            self.lexicon.lookup(&quad.subject)?,
            self.lexicon.lookup(&quad.predicate)?,
            self.lexicon.lookup(&quad.object)?,
            self.lexicon.lookup_graph(quad.graph.as_deref())?,
        ])
    }

    fn decode(&self, key: &QuadKey) -> BackendResult<QuadDescriptor> {
        let term = |id: u64| -> BackendResult<TermDescriptor> {
            self.lexicon
                .resolve(id)
                .cloned()
                .ok_or_else(|| BackendError::Corrupt(format!("unknown term id {}", id)))
        };
        let graph = self
            .lexicon
            .resolve_graph(key[3])
            .ok_or_else(|| BackendError::Corrupt(format!("unknown graph id {}", key[3])))?;
        Ok(QuadDescriptor::new(term(key[0])?, term(key[1])?, term(key[2])?, graph))
    }

    /// Translate a pattern to ids; `None` when a bound term is unknown
    fn id_pattern(&self, pattern: &QuadPattern) -> Option<IdPattern> {
        let bound = |t: &Option<TermDescriptor>| -> Option<Option<u64>> {
            match t {
                Some(term) => self.lexicon.lookup(term).map(Some),
                None => Some(None),
            }
        };
        let graph = match &pattern.graph {
            GraphSelector::Default => Some(DEFAULT_GRAPH_ID),
            GraphSelector::Named(g) => Some(self.lexicon.lookup_graph(Some(g))?),
            GraphSelector::AllNamed | GraphSelector::All => None,
        };
        Some(IdPattern {
            subject: bound(&pattern.subject)?,
            predicate: bound(&pattern.predicate)?,
            object: bound(&pattern.object)?,
            graph,
        })
    }
}

impl QuadBackend for EmbeddedBackend {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn insert(&mut self, quad: &QuadDescriptor) -> BackendResult<bool> {
        let key = self.encode(quad);
        let added = self.index.insert(key);
        if added {
            self.lexicon.retain_graph(key[3]);
        }
        Ok(added)
    }

    fn remove(&mut self, quad: &QuadDescriptor) -> BackendResult<bool> {
        let Some(key) = self.lookup(quad) else {
            return Ok(false);
        };
        let removed = self.index.remove(&key);
        if removed {
            self.lexicon.release_graph(key[3]);
        }
        Ok(removed)
    }

    fn match_pattern(&self, pattern: &QuadPattern) -> BackendResult<Vec<QuadDescriptor>> {
        let Some(ids) = self.id_pattern(pattern) else {
            return Ok(Vec::new());
        };
        let exclude_default = pattern.graph == GraphSelector::AllNamed;
        self.index
            .find(&ids)
            .iter()
            .filter(|k| !(exclude_default && k[3] == DEFAULT_GRAPH_ID))
            .map(|k| self.decode(k))
            .collect()
    }

    fn named_graphs(&self) -> BackendResult<Vec<String>> {
        Ok(self.lexicon.registered_graphs())
    }

    fn clear_graph(&mut self, graph: Option<&str>) -> BackendResult<Vec<QuadDescriptor>> {
        let Some(id) = self.lexicon.lookup_graph(graph) else {
            return Ok(Vec::new());
        };
        let removed = self.index.clear_graph(id);
        for key in &removed {
            self.lexicon.release_graph(key[3]);
        }
        removed.iter().map(|k| self.decode(k)).collect()
    }

    fn clear(&mut self) -> BackendResult<()> {
        self.index.clear();
        self.lexicon.clear();
        Ok(())
    }

    fn len(&self) -> BackendResult<usize> {
        Ok(self.index.len())
    }

    fn flush(&mut self) -> BackendResult<()> {
        if let Some(path) = &self.snapshot {
            self.write_snapshot(path)?;
        }
        Ok(())
    }
}
