//! Processes: a pid, an FD table, a filesystem view, and an exit
//! latch. Exit is terminal and entered exactly once; `wait` blocks on
//! the latch and late waiters read the same code.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use core_fs::{FsView, PathElement};
use core_sys::Errno;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::fd::Fd;

pub type Pid = i32;

/// Slots 0/1/2 come from the parent; everything else counts up from 3
/// and freed numbers are never handed out again.
#[derive(Debug, Default)]
pub struct FdTable {
    entries: HashMap<i32, Fd>,
    next: i32,
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next: 3,
        }
    }

    pub fn insert(&mut self, fd: Fd) -> i32 {
        let slot = self.next;
        self.next += 1;
        self.entries.insert(slot, fd);
        slot
    }

    pub fn insert_at(&mut self, slot: i32, fd: Fd) {
        self.entries.insert(slot, fd);
        if slot >= self.next {
            self.next = slot + 1;
        }
    }

    pub fn get(&self, slot: i32) -> Result<Fd, Errno> {
        self.entries.get(&slot).cloned().ok_or(Errno::Ebadf)
    }

    pub fn remove(&mut self, slot: i32) -> Result<Fd, Errno> {
        self.entries.remove(&slot).ok_or(Errno::Ebadf)
    }
}

#[derive(Debug)]
pub struct Process {
    pub pid: Pid,
    fds: Mutex<FdTable>,
    fs: tokio::sync::Mutex<FsView>,
    exit: watch::Sender<Option<i32>>,
}

impl Process {
    pub fn new(pid: Pid, view: FsView) -> Arc<Self> {
        let (exit, _) = watch::channel(None);
        Arc::new(Self {
            pid,
            fds: Mutex::new(FdTable::new()),
            fs: tokio::sync::Mutex::new(view),
            exit,
        })
    }

    pub fn fd(&self, slot: i32) -> Result<Fd, Errno> {
        self.fds.lock().unwrap().get(slot)
    }

    pub fn install_fd(&self, fd: Fd) -> i32 {
        self.fds.lock().unwrap().insert(fd)
    }

    pub fn install_fd_at(&self, slot: i32, fd: Fd) {
        self.fds.lock().unwrap().insert_at(slot, fd);
    }

    pub fn remove_fd(&self, slot: i32) -> Result<Fd, Errno> {
        self.fds.lock().unwrap().remove(slot)
    }

    /// A snapshot of the filesystem view. Handlers resolve on the
    /// snapshot so no process lock is held across store fetches.
    pub async fn view(&self) -> FsView {
        self.fs.lock().await.clone()
    }

    pub async fn set_wd(&self, wd: Vec<PathElement>) {
        self.fs.lock().await.set_wd(wd);
    }

    /// Latch the exit code. Only the first call takes effect; every
    /// waiter wakes either way.
    pub fn exit(&self, code: i32) {
        let latched = self.exit.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(code);
                true
            } else {
                false
            }
        });
        if latched {
            info!(target: "kernel.proc", pid = self.pid, code, "exited");
        } else {
            debug!(target: "kernel.proc", pid = self.pid, code, "exit_after_exit");
        }
    }

    pub fn exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Block until the process exits; repeat calls return the same
    /// code immediately.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.exit.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(code) => code.unwrap_or(0),
            // The sender lives in this process, so this arm is dead;
            // resolve to 0 rather than panic if it ever fires.
            Err(_) => 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcessTable {
    procs: Mutex<HashMap<Pid, Arc<Process>>>,
    next: AtomicI32,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            procs: Mutex::new(HashMap::new()),
            next: AtomicI32::new(1),
        }
    }

    /// Exited processes stay in the table so late `wait`s still read
    /// their code.
    pub fn create(&self, view: FsView) -> Arc<Process> {
        let pid = self.next.fetch_add(1, Ordering::Relaxed);
        let process = Process::new(pid, view);
        self.procs.lock().unwrap().insert(pid, process.clone());
        debug!(target: "kernel.proc", pid, "created");
        process
    }

    pub fn get(&self, pid: Pid) -> Result<Arc<Process>, Errno> {
        self.procs
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or(Errno::Enoent)
    }
}
