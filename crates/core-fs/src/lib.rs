//! Read-only content-addressed filesystem.
//!
//! Storage is out of scope: elements are fetched by ID from an
//! [`ElementStore`] (HTTP in production, in-memory for tests and the
//! native harness) and deserialised here. A [`FsView`] holds a
//! process's working directory and resolves path strings against the
//! tree. There is no write path anywhere in this crate.

mod store;
mod view;

pub use store::{ElementStore, HttpStore, MemStore, TreeBuilder};
pub use view::{FileInfo, FileKind, FileReader, FsView, PathElement};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
    #[error("not a regular file: {0}")]
    NotFile(String),
    #[error("invalid filesystem root")]
    InvalidRoot,
    #[error("store: {0}")]
    Store(String),
    #[error("decode: {0}")]
    Decode(String),
}

/// Content address of one stored element or blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub String);

impl ElementId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One tree node, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
    /// The mount point: points at the root directory.
    Snapshot { root: ElementId },
    Directory { entries: Vec<DirEntry> },
    File { size: u64, content: ElementId },
}

impl Element {
    pub fn decode(bytes: &[u8]) -> Result<Self, FsError> {
        serde_json::from_slice(bytes).map_err(|e| FsError::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("element serialization is infallible")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub id: ElementId,
}

/// An opened filesystem zone: the store plus the snapshot's root
/// directory. Identity handling happens before this point; by the
/// time a zone exists it is plain read-only lookups.
#[derive(Clone)]
pub struct Zone {
    store: Arc<dyn ElementStore>,
    root: ElementId,
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone").field("root", &self.root).finish()
    }
}

impl Zone {
    /// Open the zone at `head`, which must deserialise to a snapshot.
    pub async fn open(store: Arc<dyn ElementStore>, head: &ElementId) -> Result<Self, FsError> {
        let element = Element::decode(&store.fetch(head).await?)?;
        let Element::Snapshot { root } = element else {
            return Err(FsError::InvalidRoot);
        };
        tracing::info!(target: "fs.zone", head = %head, root = %root, "zone_opened");
        Ok(Self { store, root })
    }

    pub fn root(&self) -> &ElementId {
        &self.root
    }

    pub async fn element(&self, id: &ElementId) -> Result<Element, FsError> {
        Element::decode(&self.store.fetch(id).await?)
    }

    pub async fn blob(&self, id: &ElementId) -> Result<Vec<u8>, FsError> {
        self.store.fetch(id).await
    }
}
