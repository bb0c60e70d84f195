//! File descriptors: refcounted wrappers over polymorphic handles.
//!
//! A handle is whatever a small integer can name: the console, a file
//! reader, a proxied network connection. Operations dispatch on the
//! variant and answer EBADF when the capability is missing. The
//! refcount counts logical opens across processes; the underlying
//! resource is released exactly once, when the count hits zero.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use core_fs::FileReader;
use core_sys::{Errno, stat};
use core_tty::{Console, TtyFlags};
use core_wsproxy::Conn;
use tracing::warn;

#[derive(Debug)]
pub enum Handle {
    Console(Arc<Console>),
    File(Mutex<FileReader>),
    Conn(Arc<Conn>),
}

pub type Fd = Arc<FdEntry>;

#[derive(Debug)]
pub struct FdEntry {
    handle: Handle,
    refs: AtomicU32,
}

impl FdEntry {
    pub fn new(handle: Handle) -> Fd {
        Arc::new(Self {
            handle,
            refs: AtomicU32::new(1),
        })
    }

    /// Another logical open of the same resource.
    pub fn dup(self: &Arc<Self>) -> Fd {
        self.refs.fetch_add(1, Ordering::AcqRel);
        self.clone()
    }

    /// Drop one reference; release the resource on the last. Returns
    /// whether the native close ran. Closing past zero logs and does
    /// nothing.
    pub async fn close(&self) -> bool {
        let previous = self.refs.fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
            refs.checked_sub(1)
        });
        match previous {
            Ok(1) => {
                if let Handle::Conn(conn) = &self.handle {
                    conn.close().await;
                }
                true
            }
            Ok(_) => false,
            Err(_) => {
                warn!(target: "kernel.fd", "close_past_zero");
                false
            }
        }
    }

    pub fn refs(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    pub fn console(&self) -> Option<&Arc<Console>> {
        match &self.handle {
            Handle::Console(console) => Some(console),
            _ => None,
        }
    }

    /// Read up to `len` bytes. Empty result is end of file.
    pub async fn read(&self, len: usize) -> Result<Vec<u8>, Errno> {
        match &self.handle {
            Handle::Console(console) => {
                let mut buf = vec![0u8; len];
                let n = console.read(&mut buf).await;
                buf.truncate(n);
                Ok(buf)
            }
            Handle::File(reader) => {
                let mut buf = vec![0u8; len];
                let n = reader.lock().unwrap().read(&mut buf);
                buf.truncate(n);
                Ok(buf)
            }
            Handle::Conn(conn) => {
                let mut buf = vec![0u8; len];
                let n = conn.read(&mut buf).await.map_err(|_| Errno::Einval)?;
                buf.truncate(n);
                Ok(buf)
            }
        }
    }

    pub async fn write(&self, data: &[u8]) -> Result<usize, Errno> {
        match &self.handle {
            Handle::Console(console) => Ok(console.write(data)),
            Handle::File(_) => Err(Errno::Ebadf),
            Handle::Conn(conn) => conn.write(data).await.map_err(|_| Errno::Einval),
        }
    }

    pub fn flags(&self) -> Result<TtyFlags, Errno> {
        match &self.handle {
            Handle::Console(console) => Ok(console.flags()),
            _ => Err(Errno::Ebadf),
        }
    }

    /// (mode, size) as fstat reports them.
    pub fn stat(&self) -> (u32, u64) {
        match &self.handle {
            Handle::Console(_) => (stat::S_IFCHR, 0),
            Handle::File(reader) => (stat::S_IFREG, reader.lock().unwrap().size()),
            Handle::Conn(_) => (stat::S_IFSOCK, 0),
        }
    }
}
