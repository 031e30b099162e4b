use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::geom::vec2;
use crate::graph::RetainedGraph;
use crate::physics::SimNode;

/// Opaque byte store the engine persists layouts into. The backend is
/// injected; a failing backend only ever costs the saved layout.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }
}

/// File-per-key store rooted at a directory. Keys are already short hashes,
/// so they map straight to file names.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("reading layout entry {key}")),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating layout dir {}", self.dir.display()))?;
        fs::write(self.path_for(key), value).with_context(|| format!("writing layout entry {key}"))
    }
}

/// One persisted node position. `fx`/`fy` carry the pin when the user left
/// the node pinned (roots, dragged-and-held nodes).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredPosition {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub fx: Option<f32>,
    #[serde(default)]
    pub fy: Option<f32>,
}

impl StoredPosition {
    pub(crate) fn of(node: &SimNode) -> Self {
        Self {
            x: node.pos.x,
            y: node.pos.y,
            fx: node.pin.map(|pin| pin.x),
            fy: node.pin.map(|pin| pin.y),
        }
    }

    pub(crate) fn apply_to(self, node: &mut SimNode) {
        node.pos = vec2(self.x, self.y);
        if let (Some(fx), Some(fy)) = (self.fx, self.fy) {
            node.pin = Some(vec2(fx, fy));
        }
    }
}

/// Adapter between the simulation and the raw byte store: JSON payload,
/// structural key, and the degrade-to-cache-miss policy on every failure.
pub struct PositionStore {
    backend: Box<dyn KeyValueStore>,
}

impl PositionStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn save(&mut self, key: &str, nodes: &[SimNode]) {
        let payload = nodes
            .iter()
            .map(|node| (node.id.as_str(), StoredPosition::of(node)))
            .collect::<HashMap<_, _>>();

        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!("skipping layout save for {key}: {error}");
                return;
            }
        };

        if let Err(error) = self.backend.set(key, &bytes) {
            warn!("layout save failed for {key}: {error:#}");
        }
    }

    pub fn load(&self, key: &str) -> Option<HashMap<String, StoredPosition>> {
        let bytes = match self.backend.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(error) => {
                warn!("layout load failed for {key}: {error:#}");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(positions) => Some(positions),
            Err(error) => {
                warn!("discarding corrupt layout payload for {key}: {error}");
                None
            }
        }
    }
}

/// Order-independent fingerprint of the retained topology. The same node
/// set and connections always produce the same key; any topology change
/// produces a clean cache miss instead of a stale layout.
pub fn structural_key(graph: &RetainedGraph) -> String {
    let mut ids = graph.node_ids().collect::<Vec<_>>();
    ids.sort_unstable();

    let mut links = graph
        .edges
        .iter()
        .map(|edge| (edge.source_id.as_str(), edge.target_id.as_str()))
        .collect::<Vec<_>>();
    links.sort_unstable();

    let mut hasher = DefaultHasher::new();
    for id in &ids {
        id.hash(&mut hasher);
    }
    0u8.hash(&mut hasher);
    for (source, target) in &links {
        source.hash(&mut hasher);
        target.hash(&mut hasher);
    }

    format!("layout-{:016x}", hasher.finish())
}
