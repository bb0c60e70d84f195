//! The self-contained boot filesystem used when no --fs-root is
//! given: just enough tree to log in and look around.

use std::sync::Arc;

use core_fs::{ElementId, ElementStore, TreeBuilder};

const MOTD: &[u8] = b"Welcome to Terrarium.\n\nType 'help' for the list of commands.\n\n";

pub fn builtin_tree() -> (Arc<dyn ElementStore>, ElementId) {
    let mut tree = TreeBuilder::new();

    let motd = tree.file(MOTD);
    let hostname = tree.file(b"terrarium\n");
    let etc = tree.dir(vec![("motd", motd), ("hostname", hostname)]);

    let notes = tree.file(b"The filesystem is read-only and content-addressed.\n");
    let guest = tree.dir(vec![("notes.txt", notes)]);
    let home = tree.dir(vec![("guest", guest)]);

    let readme = tree.file(
        b"Terrarium: a tiny Unix-flavoured world behind a terminal.\n\
          Programs talk to the kernel with message-passing syscalls.\n",
    );

    let root = tree.dir(vec![("README", readme), ("etc", etc), ("home", home)]);
    let (store, head) = tree.snapshot(root);
    (Arc::new(store), head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_fs::{FsView, Zone};

    #[tokio::test]
    async fn seed_tree_opens_and_lists() {
        let (store, head) = builtin_tree();
        let zone = Zone::open(store, &head).await.unwrap();
        let view = FsView::new(Arc::new(zone));
        assert_eq!(
            view.read_dir("/").await.unwrap(),
            vec!["README", "etc", "home"]
        );
        let mut motd = view.open("/etc/motd").await.unwrap();
        let mut buf = [0u8; 256];
        let n = motd.read(&mut buf);
        assert!(String::from_utf8_lossy(&buf[..n]).contains("Terrarium"));
    }
}
