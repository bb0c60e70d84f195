//! The worker↔kernel syscall boundary.
//!
//! Both sides import this crate: the kernel consumes [`SyscallEvent`]s
//! and answers with [`SyscallReply`]s; workers drive the typed [`Sys`]
//! client. The payload stays a loosely-typed JSON map because the far
//! side of the boundary is host glue; bulk bytes ride in a binary
//! sidecar next to it rather than inside the JSON.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

mod errno;
pub use errno::Errno;

/// File type bits reported by stat/fstat.
pub mod stat {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFCHR: u32 = 0o020000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFSOCK: u32 = 0o140000;
}

/// TTY flag bits as they cross the ioctl boundary.
pub mod tty {
    pub const ICANON: u32 = 1;
    pub const ECHO: u32 = 2;
}

/// One inbound syscall: the JSON payload (carrying `id` and `cmd`),
/// an optional binary sidecar, and the reply callback.
#[derive(Debug)]
pub struct SyscallEvent {
    pub payload: Value,
    pub data: Option<Vec<u8>>,
    pub reply: oneshot::Sender<SyscallReply>,
}

/// The `(id, error, ret, buf, value)` reply tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct SyscallReply {
    pub id: u64,
    pub error: Option<Errno>,
    pub ret: i64,
    pub buf: Option<Vec<u8>>,
    pub value: Option<Value>,
}

impl SyscallReply {
    pub fn ok(id: u64, ret: i64) -> Self {
        Self {
            id,
            error: None,
            ret,
            buf: None,
            value: None,
        }
    }

    pub fn err(id: u64, errno: Errno) -> Self {
        Self {
            id,
            error: Some(errno),
            ret: 0,
            buf: None,
            value: None,
        }
    }

    pub fn with_buf(mut self, buf: Vec<u8>) -> Self {
        self.buf = Some(buf);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// The worker's half of the syscall channel.
pub type SyscallSender = mpsc::Sender<SyscallEvent>;

#[derive(Debug, thiserror::Error)]
pub enum SysError {
    #[error("{0}")]
    Os(Errno),
    #[error("kernel channel closed")]
    Disconnected,
    #[error("malformed reply: {0}")]
    BadReply(&'static str),
}

impl SysError {
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::Os(errno) => Some(*errno),
            _ => None,
        }
    }

    pub fn is_enoent(&self) -> bool {
        matches!(self, Self::Os(Errno::Enoent))
    }
}

/// File status as reported by stat/fstat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub mode: u32,
    pub size: u64,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.mode & stat::S_IFMT == stat::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & stat::S_IFMT == stat::S_IFREG
    }
}

/// Typed syscall client handed to every worker program.
#[derive(Debug, Clone)]
pub struct Sys {
    tx: SyscallSender,
    next_id: Arc<AtomicU64>,
}

impl Sys {
    pub fn new(tx: SyscallSender) -> Self {
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn call(
        &self,
        cmd: &str,
        mut payload: Value,
        data: Option<Vec<u8>>,
    ) -> Result<SyscallReply, SysError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let map = payload
            .as_object_mut()
            .expect("syscall payload must be an object");
        map.insert("cmd".into(), json!(cmd));
        map.insert("id".into(), json!(id));
        trace!(target: "sys.call", cmd, id, "syscall");

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SyscallEvent {
                payload,
                data,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SysError::Disconnected)?;
        let reply = reply_rx.await.map_err(|_| SysError::Disconnected)?;

        match reply.error {
            Some(errno) => Err(SysError::Os(errno)),
            None => Ok(reply),
        }
    }

    pub async fn open(&self, path: &str) -> Result<i32, SysError> {
        let reply = self.call("open", json!({ "path": path }), None).await?;
        Ok(reply.ret as i32)
    }

    /// Read up to `buf.len()` bytes. 0 means end of file.
    pub async fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize, SysError> {
        let reply = self
            .call("read", json!({ "fd": fd, "length": buf.len() }), None)
            .await?;
        let n = reply.ret.max(0) as usize;
        if n == 0 {
            return Ok(0);
        }
        let data = reply.buf.ok_or(SysError::BadReply("read without buffer"))?;
        let n = n.min(data.len()).min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    pub async fn write(&self, fd: i32, data: &[u8]) -> Result<usize, SysError> {
        let reply = self
            .call(
                "write",
                json!({ "fd": fd, "offset": 0, "length": data.len() }),
                Some(data.to_vec()),
            )
            .await?;
        Ok(reply.ret.max(0) as usize)
    }

    /// Write everything, looping on short writes.
    pub async fn write_all(&self, fd: i32, data: &[u8]) -> Result<(), SysError> {
        let mut off = 0;
        while off < data.len() {
            let n = self.write(fd, &data[off..]).await?;
            if n == 0 {
                return Err(SysError::BadReply("write made no progress"));
            }
            off += n;
        }
        Ok(())
    }

    pub async fn close(&self, fd: i32) -> Result<(), SysError> {
        self.call("close", json!({ "fd": fd }), None).await?;
        Ok(())
    }

    pub async fn get_flags(&self, fd: i32) -> Result<u32, SysError> {
        let reply = self
            .call("ioctl", json!({ "fd": fd, "request": "GetFlags" }), None)
            .await?;
        Ok(reply.ret as u32)
    }

    pub async fn set_flags(&self, fd: i32, flags: u32) -> Result<(), SysError> {
        self.call(
            "ioctl",
            json!({ "fd": fd, "request": "SetFlags", "value": flags }),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn stat(&self, path: &str) -> Result<FileStat, SysError> {
        let reply = self.call("stat", json!({ "path": path }), None).await?;
        decode_stat(&reply)
    }

    pub async fn fstat(&self, fd: i32) -> Result<FileStat, SysError> {
        let reply = self.call("fstat", json!({ "fd": fd }), None).await?;
        decode_stat(&reply)
    }

    /// Change directory; the reply carries the new working directory.
    pub async fn chdir(&self, path: &str) -> Result<String, SysError> {
        let reply = self.call("chdir", json!({ "path": path }), None).await?;
        reply_string(&reply)
    }

    pub async fn getwd(&self) -> Result<String, SysError> {
        let reply = self.call("getwd", json!({}), None).await?;
        reply_string(&reply)
    }

    pub async fn readdir(&self, path: &str) -> Result<Vec<String>, SysError> {
        let reply = self.call("readdir", json!({ "path": path }), None).await?;
        let value = reply
            .value
            .ok_or(SysError::BadReply("readdir without entries"))?;
        let entries = value
            .as_array()
            .ok_or(SysError::BadReply("readdir entries not a list"))?;
        Ok(entries
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    pub async fn dial(
        &self,
        network: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<i32, SysError> {
        let reply = self
            .call(
                "dial",
                json!({
                    "network": network,
                    "address": address,
                    "timeout": timeout.as_nanos() as u64,
                }),
                None,
            )
            .await?;
        Ok(reply.ret as i32)
    }

    /// Spawn `argv` with the child's FDs 0..n mapped from our `fds`.
    pub async fn spawn(&self, argv: &[String], fds: &[i32]) -> Result<i32, SysError> {
        let reply = self
            .call("spawn", json!({ "argv": argv, "fds": fds }), None)
            .await?;
        Ok(reply.ret as i32)
    }

    pub async fn wait(&self, pid: i32) -> Result<i32, SysError> {
        let reply = self.call("wait", json!({ "pid": pid }), None).await?;
        Ok(reply.ret as i32)
    }

    pub async fn exit(&self, code: i32) -> Result<(), SysError> {
        self.call("exit", json!({ "code": code }), None).await?;
        Ok(())
    }

    /// Read (`value == None`) or set a kernel control variable.
    pub async fn sysctl(&self, name: &str, value: Option<&str>) -> Result<String, SysError> {
        let payload = match value {
            Some(v) => json!({ "name": name, "value": v }),
            None => json!({ "name": name }),
        };
        let reply = self.call("sysctl", payload, None).await?;
        reply_string(&reply)
    }
}

fn reply_string(reply: &SyscallReply) -> Result<String, SysError> {
    let buf = reply
        .buf
        .as_ref()
        .ok_or(SysError::BadReply("missing string buffer"))?;
    String::from_utf8(buf.clone()).map_err(|_| SysError::BadReply("string buffer not UTF-8"))
}

fn decode_stat(reply: &SyscallReply) -> Result<FileStat, SysError> {
    let value = reply.value.as_ref().ok_or(SysError::BadReply("stat without value"))?;
    let mode = value
        .get("mode")
        .and_then(Value::as_u64)
        .ok_or(SysError::BadReply("stat missing mode"))?;
    let size = value.get("size").and_then(Value::as_u64).unwrap_or(0);
    Ok(FileStat {
        mode: mode as u32,
        size,
    })
}
