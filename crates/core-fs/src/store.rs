//! Element stores: where content-addressed bytes come from.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;
use tracing::debug;

use crate::{DirEntry, Element, ElementId, FsError};

/// Fetch raw bytes by content address.
#[async_trait]
pub trait ElementStore: Send + Sync {
    async fn fetch(&self, id: &ElementId) -> Result<Vec<u8>, FsError>;
}

/// HTTP store: `GET {base}/{id}` against the content-addressed tree
/// root the kernel was pointed at.
#[derive(Debug, Clone)]
pub struct HttpStore {
    base: String,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ElementStore for HttpStore {
    async fn fetch(&self, id: &ElementId) -> Result<Vec<u8>, FsError> {
        let url = format!("{}/{}", self.base, id);
        debug!(target: "fs.store", %url, "fetch");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FsError::Store(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FsError::NotFound(id.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| FsError::Store(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FsError::Store(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// In-memory store for tests and the self-contained native boot.
#[derive(Debug, Default)]
pub struct MemStore {
    objects: HashMap<ElementId, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert bytes under their content address.
    pub fn put(&mut self, bytes: Vec<u8>) -> ElementId {
        let id = content_id(&bytes);
        self.objects.insert(id.clone(), bytes);
        id
    }
}

#[async_trait]
impl ElementStore for MemStore {
    async fn fetch(&self, id: &ElementId) -> Result<Vec<u8>, FsError> {
        self.objects
            .get(id)
            .cloned()
            .ok_or_else(|| FsError::NotFound(id.to_string()))
    }
}

fn content_id(bytes: &[u8]) -> ElementId {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    ElementId(format!("{:016x}", hasher.finish()))
}

/// Builds a tree bottom-up into a [`MemStore`], yielding the head ID
/// a [`crate::Zone`] opens.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    store: MemStore,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&mut self, data: &[u8]) -> ElementId {
        let content = self.store.put(data.to_vec());
        let element = Element::File {
            size: data.len() as u64,
            content,
        };
        self.store.put(element.encode())
    }

    pub fn dir(&mut self, entries: Vec<(&str, ElementId)>) -> ElementId {
        let element = Element::Directory {
            entries: entries
                .into_iter()
                .map(|(name, id)| DirEntry {
                    name: name.to_string(),
                    id,
                })
                .collect(),
        };
        self.store.put(element.encode())
    }

    /// Finish with a snapshot pointing at `root`; returns the store
    /// and the head ID.
    pub fn snapshot(mut self, root: ElementId) -> (MemStore, ElementId) {
        let head = self.store.put(Element::Snapshot { root }.encode());
        (self.store, head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mem_store_round_trips() {
        let mut store = MemStore::new();
        let id = store.put(b"hello".to_vec());
        assert_eq!(store.fetch(&id).await.unwrap(), b"hello");
        assert!(matches!(
            store.fetch(&ElementId::from("missing")).await,
            Err(FsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn identical_content_shares_an_address() {
        let mut store = MemStore::new();
        let a = store.put(b"same".to_vec());
        let b = store.put(b"same".to_vec());
        assert_eq!(a, b);
    }

    #[test]
    fn element_encoding_round_trips() {
        let element = Element::Directory {
            entries: vec![DirEntry {
                name: "etc".into(),
                id: ElementId::from("abc123"),
            }],
        };
        let decoded = Element::decode(&element.encode()).unwrap();
        match decoded {
            Element::Directory { entries } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "etc");
            }
            other => panic!("wrong element: {other:?}"),
        }
    }
}
