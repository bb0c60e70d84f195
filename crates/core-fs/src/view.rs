//! Per-process view of the filesystem: a working-directory path of
//! (name, id) pairs and resolution of path strings against it.

use std::sync::Arc;

use tracing::trace;

use crate::{Element, ElementId, FsError, Zone};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathElement {
    pub id: ElementId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub kind: FileKind,
    pub size: u64,
}

/// A process's working directory over a shared zone. Cheap to clone:
/// syscall handlers clone the view, resolve without any process lock,
/// and commit the result back if the call was a chdir.
#[derive(Debug, Clone)]
pub struct FsView {
    zone: Arc<Zone>,
    wd: Vec<PathElement>,
}

impl FsView {
    pub fn new(zone: Arc<Zone>) -> Self {
        let root = PathElement {
            id: zone.root().clone(),
            name: String::new(),
        };
        Self {
            zone,
            wd: vec![root],
        }
    }

    pub fn zone(&self) -> &Arc<Zone> {
        &self.zone
    }

    pub fn wd(&self) -> &[PathElement] {
        &self.wd
    }

    pub fn wd_string(&self) -> String {
        path_string(&self.wd)
    }

    /// Replace the working directory with an already-resolved path.
    pub fn set_wd(&mut self, wd: Vec<PathElement>) {
        self.wd = wd;
    }

    /// Resolve a path string. Relative paths start at the working
    /// directory, absolute ones at the root; `.` holds, `..` pops
    /// (never past the root), anything else looks a child up in the
    /// directory at the current tail.
    pub async fn resolve(&self, filename: &str) -> Result<Vec<PathElement>, FsError> {
        let parts = if filename.is_empty() {
            core_path::Path::new()
        } else {
            core_path::split(filename)
        };

        let mut path: Vec<PathElement> = if parts.components().first().is_none_or(|p| !p.is_empty())
        {
            self.wd.clone()
        } else {
            self.wd[..1].to_vec()
        };

        for part in parts.components() {
            match part.as_str() {
                "" | "." => {}
                ".." => {
                    if path.len() > 1 {
                        path.pop();
                    }
                }
                name => {
                    let tail = path.last().expect("path always holds the root");
                    let child = self.lookup_child(tail, name).await?;
                    path.push(child);
                }
            }
        }
        trace!(target: "fs.view", path = %filename, resolved = %path_string(&path), "resolve");
        Ok(path)
    }

    /// Resolve and require a directory at the end; the chdir path.
    pub async fn resolve_dir(&self, filename: &str) -> Result<Vec<PathElement>, FsError> {
        let path = self.resolve(filename).await?;
        let tail = path.last().expect("path always holds the root");
        match self.zone.element(&tail.id).await? {
            Element::Directory { .. } => Ok(path),
            _ => Err(FsError::NotDirectory(filename.to_string())),
        }
    }

    async fn lookup_child(
        &self,
        tail: &PathElement,
        name: &str,
    ) -> Result<PathElement, FsError> {
        let Element::Directory { entries } = self.zone.element(&tail.id).await? else {
            return Err(FsError::NotDirectory(tail.name.clone()));
        };
        entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| PathElement {
                id: entry.id.clone(),
                name: entry.name.clone(),
            })
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    pub async fn stat(&self, filename: &str) -> Result<FileInfo, FsError> {
        let path = self.resolve(filename).await?;
        let tail = path.last().expect("path always holds the root");
        match self.zone.element(&tail.id).await? {
            Element::Directory { .. } => Ok(FileInfo {
                name: tail.name.clone(),
                kind: FileKind::Directory,
                size: 0,
            }),
            Element::File { size, .. } => Ok(FileInfo {
                name: tail.name.clone(),
                kind: FileKind::File,
                size,
            }),
            Element::Snapshot { .. } => Err(FsError::Decode("snapshot inside tree".into())),
        }
    }

    /// Entry names of a directory, in stored order.
    pub async fn read_dir(&self, filename: &str) -> Result<Vec<String>, FsError> {
        let path = self.resolve(filename).await?;
        let tail = path.last().expect("path always holds the root");
        match self.zone.element(&tail.id).await? {
            Element::Directory { entries } => {
                Ok(entries.into_iter().map(|e| e.name).collect())
            }
            _ => Err(FsError::NotDirectory(filename.to_string())),
        }
    }

    /// Open a regular file for reading. Content is fetched up front;
    /// the reader itself never touches the network.
    pub async fn open(&self, filename: &str) -> Result<FileReader, FsError> {
        let path = self.resolve(filename).await?;
        let tail = path.last().expect("path always holds the root");
        match self.zone.element(&tail.id).await? {
            Element::File { content, .. } => Ok(FileReader {
                content: self.zone.blob(&content).await?,
                pos: 0,
            }),
            _ => Err(FsError::NotFile(filename.to_string())),
        }
    }
}

fn path_string(path: &[PathElement]) -> String {
    let components: Vec<String> = path.iter().map(|e| e.name.clone()).collect();
    core_path::Path::from(components).to_string()
}

/// A read cursor over a file's content.
#[derive(Debug)]
pub struct FileReader {
    content: Vec<u8>,
    pos: usize,
}

impl FileReader {
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.content.len() - self.pos);
        buf[..n].copy_from_slice(&self.content[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemStore, TreeBuilder};

    /// /a/b/c plus /a/d and /e, with /etc/motd on the side.
    async fn sample_view() -> FsView {
        let mut tree = TreeBuilder::new();
        let motd = tree.file(b"welcome\n");
        let etc = tree.dir(vec![("motd", motd)]);
        let c = tree.dir(vec![]);
        let d_file = tree.file(b"dee");
        let b = tree.dir(vec![("c", c)]);
        let a = tree.dir(vec![("b", b), ("d", d_file)]);
        let e = tree.dir(vec![]);
        let root = tree.dir(vec![("a", a), ("e", e), ("etc", etc)]);
        let (store, head) = tree.snapshot(root);
        let zone = Zone::open(Arc::new(store) as Arc<dyn crate::ElementStore>, &head)
            .await
            .unwrap();
        FsView::new(Arc::new(zone))
    }

    #[tokio::test]
    async fn fresh_view_is_at_root() {
        let view = sample_view().await;
        assert_eq!(view.wd_string(), "/");
    }

    #[tokio::test]
    async fn resolve_descends_and_pops() {
        let mut view = sample_view().await;
        let abc = view.resolve_dir("/a/b/c").await.unwrap();
        view.set_wd(abc);
        assert_eq!(view.wd_string(), "/a/b/c");

        let path = view.resolve("../../d").await.unwrap();
        assert_eq!(path_string(&path), "/a/d");

        let path = view.resolve("/e").await.unwrap();
        assert_eq!(path_string(&path), "/e");
    }

    #[tokio::test]
    async fn dotdot_at_root_does_not_underflow() {
        let view = sample_view().await;
        let path = view.resolve("..").await.unwrap();
        assert_eq!(path_string(&path), "/");
        let path = view.resolve("../../..").await.unwrap();
        assert_eq!(path_string(&path), "/");
    }

    #[tokio::test]
    async fn dot_and_empty_components_hold() {
        let view = sample_view().await;
        let path = view.resolve("/a/./b//c").await.unwrap();
        assert_eq!(path_string(&path), "/a/b/c");
    }

    #[tokio::test]
    async fn chdir_then_wd_round_trips() {
        let mut view = sample_view().await;
        for target in ["/a/b", "/e", "/a/b/c"] {
            let wd = view.resolve_dir(target).await.unwrap();
            view.set_wd(wd);
            assert_eq!(view.wd_string(), target);
            // Re-resolving what we printed lands in the same place.
            let again = view.resolve_dir(&view.wd_string()).await.unwrap();
            assert_eq!(again, view.wd());
        }
    }

    #[tokio::test]
    async fn missing_entry_is_not_found() {
        let view = sample_view().await;
        assert!(matches!(
            view.resolve("/nope").await,
            Err(FsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn chdir_to_file_is_rejected() {
        let view = sample_view().await;
        assert!(matches!(
            view.resolve_dir("/a/d").await,
            Err(FsError::NotDirectory(_))
        ));
    }

    #[tokio::test]
    async fn lookup_through_file_is_rejected() {
        let view = sample_view().await;
        assert!(matches!(
            view.resolve("/a/d/x").await,
            Err(FsError::NotDirectory(_))
        ));
    }

    #[tokio::test]
    async fn stat_reports_kind_and_size() {
        let view = sample_view().await;
        let st = view.stat("/etc/motd").await.unwrap();
        assert_eq!(st.kind, FileKind::File);
        assert_eq!(st.size, 8);

        let st = view.stat("/a").await.unwrap();
        assert_eq!(st.kind, FileKind::Directory);
    }

    #[tokio::test]
    async fn read_dir_lists_names() {
        let view = sample_view().await;
        assert_eq!(view.read_dir("/a").await.unwrap(), vec!["b", "d"]);
        assert!(matches!(
            view.read_dir("/etc/motd").await,
            Err(FsError::NotDirectory(_))
        ));
    }

    #[tokio::test]
    async fn open_and_read_in_chunks() {
        let view = sample_view().await;
        let mut reader = view.open("/etc/motd").await.unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf), 3);
        assert_eq!(&buf, b"wel");
        let mut rest = [0u8; 64];
        let n = reader.read(&mut rest);
        assert_eq!(&rest[..n], b"come\n");
        assert_eq!(reader.read(&mut rest), 0);
    }

    #[tokio::test]
    async fn open_directory_is_rejected() {
        let view = sample_view().await;
        assert!(matches!(view.open("/a").await, Err(FsError::NotFile(_))));
    }

    #[tokio::test]
    async fn entry_names_with_slashes_round_trip_escaped() {
        let mut tree = TreeBuilder::new();
        let inner = tree.dir(vec![]);
        let root = tree.dir(vec![("a/b", inner)]);
        let (store, head) = tree.snapshot(root);
        let zone = Zone::open(Arc::new(store) as Arc<dyn crate::ElementStore>, &head)
            .await
            .unwrap();
        let mut view = FsView::new(Arc::new(zone));

        // The escaped form resolves to the oddly-named entry...
        let wd = view.resolve_dir("/a\\/b").await.unwrap();
        view.set_wd(wd);
        // ...and the printed working directory re-escapes it.
        assert_eq!(view.wd_string(), "/a\\/b");
        let again = view.resolve_dir(&view.wd_string()).await.unwrap();
        assert_eq!(again, view.wd());
    }

    #[tokio::test]
    async fn zone_rejects_non_snapshot_head() {
        let mut tree = TreeBuilder::new();
        let root = tree.dir(vec![]);
        let (store, _head) = tree.snapshot(root.clone());
        let result = Zone::open(Arc::new(store) as Arc<dyn crate::ElementStore>, &root).await;
        assert!(matches!(result, Err(FsError::InvalidRoot)));
    }
}
