//! The kernel proper: request routing, process supervision, and the
//! bootstrap loop.
//!
//! Every worker gets a syscall channel; a router task drains it and
//! spawns one task per event, so a handler parked in `read` or `wait`
//! never stalls the dispatcher. Handlers resolve filesystem paths on
//! a cloned view and never hold a process lock across a fetch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use core_fs::{FileKind, FsView, Zone};
use core_sys::{Errno, SyscallEvent, SyscallReply, stat};
use core_tty::{Console, TtyFlags};
use core_wsproxy::ProxyError;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::control::Controls;
use crate::fd::{FdEntry, Handle};
use crate::launch::{LaunchSpec, ProgramStore, WorkerLauncher, WorkerOutcome};
use crate::process::{Pid, Process, ProcessTable};
use crate::syscall::{IoctlRequest, Syscall};
use crate::{KernelError, syscall};

/// Capacity of one worker's syscall channel. Callers await replies,
/// so depth only matters when a worker runs many calls concurrently.
const SYSCALL_CHANNEL_CAP: usize = 64;

const FALLBACK_BANNER: &[u8] = b"Terrarium OS\n\n";

pub struct Kernel {
    procs: ProcessTable,
    controls: Arc<Controls>,
    console: Arc<Console>,
    zone: Arc<Zone>,
    launcher: Arc<dyn WorkerLauncher>,
    programs: Arc<dyn ProgramStore>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel").finish_non_exhaustive()
    }
}

struct Outcome {
    ret: i64,
    buf: Option<Vec<u8>>,
    value: Option<Value>,
}

impl Outcome {
    fn ret(ret: i64) -> Self {
        Self {
            ret,
            buf: None,
            value: None,
        }
    }

    fn with_buf(mut self, buf: Vec<u8>) -> Self {
        self.buf = Some(buf);
        self
    }

    fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

impl Kernel {
    pub fn new(
        console: Arc<Console>,
        zone: Arc<Zone>,
        launcher: Arc<dyn WorkerLauncher>,
        programs: Arc<dyn ProgramStore>,
        controls: Arc<Controls>,
    ) -> Arc<Self> {
        Arc::new(Self {
            procs: ProcessTable::new(),
            controls,
            console,
            zone,
            launcher,
            programs,
        })
    }

    pub fn console(&self) -> &Arc<Console> {
        &self.console
    }

    pub fn controls(&self) -> &Arc<Controls> {
        &self.controls
    }

    /// The init loop: run a shell against the console until the power
    /// control variable drops to zero.
    pub async fn run(self: &Arc<Self>) -> Result<(), KernelError> {
        self.console.flush();
        while self.controls.power() != 0 {
            let init = self.create_console_process();
            self.print_motd(&init).await;

            match self.run_child(&init, vec!["sh".into()], &[0, 1, 2]).await {
                Ok(code) => {
                    info!(target: "kernel.boot", code, "shell_exited");
                }
                Err(errno) => {
                    self.console
                        .write(format!("init: failed to run sh: {errno}\n").as_bytes());
                    init.exit(1);
                    return Err(KernelError::Sys(errno));
                }
            }
            init.exit(0);
        }
        self.console.write(b"\nSystem halted.\n");
        Ok(())
    }

    async fn print_motd(&self, init: &Process) {
        let view = init.view().await;
        match view.open("/etc/motd").await {
            Ok(mut motd) => {
                let mut buf = [0u8; 1024];
                loop {
                    let n = motd.read(&mut buf);
                    if n == 0 {
                        break;
                    }
                    self.console.write(&buf[..n]);
                }
            }
            Err(_) => {
                self.console.write(FALLBACK_BANNER);
            }
        }
    }

    /// A fresh process at the filesystem root with the console at FDs
    /// 0/1/2. The bootstrap uses this for init; hosts embedding the
    /// kernel use it for their own console sessions.
    pub fn create_console_process(&self) -> Arc<Process> {
        let process = self.procs.create(FsView::new(self.zone.clone()));
        let console_fd = FdEntry::new(Handle::Console(self.console.clone()));
        process.install_fd_at(1, console_fd.dup());
        process.install_fd_at(2, console_fd.dup());
        process.install_fd_at(0, console_fd);
        process
    }

    /// Spawn `argv` as a child of `parent` and wait for its exit code.
    pub async fn run_child(
        self: &Arc<Self>,
        parent: &Process,
        argv: Vec<String>,
        fds: &[i32],
    ) -> Result<i32, Errno> {
        let pid = self.spawn_process(parent, argv, fds).await?;
        let child = self.procs.get(pid)?;
        Ok(child.wait().await)
    }

    /// Create, wire, and launch a worker process. The child's FD slot
    /// `i` is a dup of the parent's slot `fds[i]`.
    async fn spawn_process(
        self: &Arc<Self>,
        parent: &Process,
        argv: Vec<String>,
        fds: &[i32],
    ) -> Result<Pid, Errno> {
        let image = self.programs.fetch(&argv[0]).await?;
        let child = self.procs.create(FsView::new(self.zone.clone()));
        for (slot, parent_fd) in fds.iter().enumerate() {
            let fd = parent.fd(*parent_fd)?;
            child.install_fd_at(slot as i32, fd.dup());
        }

        let (syscalls, events) = mpsc::channel(SYSCALL_CHANNEL_CAP);
        let (completion, outcome) = oneshot::channel();
        self.attach_worker(child.clone(), events);
        self.supervise(child.clone(), outcome);

        info!(target: "kernel.proc", pid = child.pid, argv = ?argv, "spawn");
        if let Err(errno) = self.launcher.launch(LaunchSpec {
            pid: child.pid,
            argv,
            image,
            syscalls,
            completion,
        }) {
            child.exit(127);
            return Err(errno);
        }
        Ok(child.pid)
    }

    /// Route one worker's syscall events, each on its own task. The
    /// router lives until the worker drops its sender.
    pub fn attach_worker(
        self: &Arc<Self>,
        process: Arc<Process>,
        mut events: mpsc::Receiver<SyscallEvent>,
    ) {
        let kernel = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let kernel = kernel.clone();
                let process = process.clone();
                tokio::spawn(async move {
                    kernel.handle_event(&process, event).await;
                });
            }
            debug!(target: "kernel.syscall", "worker_channel_closed");
        });
    }

    /// Resolve the worker's fate. A worker that never called `exit`
    /// gets 0 on a clean return, 127 on a fault or a vanished
    /// launcher; an explicit exit always wins.
    fn supervise(&self, process: Arc<Process>, outcome: oneshot::Receiver<WorkerOutcome>) {
        tokio::spawn(async move {
            match outcome.await {
                Ok(Ok(())) => process.exit(0),
                Ok(Err(message)) => {
                    warn!(target: "kernel.proc", pid = process.pid, %message, "worker_fault");
                    process.exit(127);
                }
                Err(_) => {
                    warn!(target: "kernel.proc", pid = process.pid, "worker_lost");
                    process.exit(127);
                }
            }
        });
    }

    async fn handle_event(self: Arc<Self>, process: &Process, event: SyscallEvent) {
        let SyscallEvent {
            payload,
            data,
            reply,
        } = event;
        let (id, call) = match syscall::decode(&payload, data) {
            Ok(decoded) => decoded,
            Err((id, errno)) => {
                debug!(target: "kernel.syscall", pid = process.pid, id, %errno, "decode_failed");
                let _ = reply.send(SyscallReply::err(id, errno));
                return;
            }
        };

        debug!(target: "kernel.syscall", pid = process.pid, id, call = call_name(&call), "dispatch");
        let message = match self.dispatch(process, call).await {
            Ok(outcome) => SyscallReply {
                id,
                error: None,
                ret: outcome.ret,
                buf: outcome.buf,
                value: outcome.value,
            },
            Err(errno) => SyscallReply::err(id, errno),
        };
        let _ = reply.send(message);
    }

    async fn dispatch(self: &Arc<Self>, process: &Process, call: Syscall) -> Result<Outcome, Errno> {
        match call {
            Syscall::Open { path } => {
                let view = process.view().await;
                let reader = view.open(&path).await.map_err(fs_errno)?;
                let fd = process.install_fd(FdEntry::new(Handle::File(Mutex::new(reader))));
                Ok(Outcome::ret(fd as i64))
            }
            Syscall::Close { fd } => {
                let entry = process.remove_fd(fd)?;
                entry.close().await;
                Ok(Outcome::ret(0))
            }
            Syscall::Read { fd, length } => {
                let entry = process.fd(fd)?;
                let data = entry.read(length).await?;
                let n = data.len() as i64;
                if data.is_empty() {
                    Ok(Outcome::ret(0))
                } else {
                    Ok(Outcome::ret(n).with_buf(data))
                }
            }
            Syscall::Write { fd, data } => {
                let entry = process.fd(fd)?;
                let n = entry.write(&data).await?;
                Ok(Outcome::ret(n as i64))
            }
            Syscall::Ioctl { fd, request, value } => {
                let entry = process.fd(fd)?;
                let console = entry.console().ok_or(Errno::Ebadf)?;
                match request {
                    IoctlRequest::GetFlags => Ok(Outcome::ret(console.flags().bits() as i64)),
                    IoctlRequest::SetFlags => {
                        let bits = value.ok_or(Errno::Einval)?;
                        let flags = TtyFlags::from_bits_truncate(bits);
                        console.set_flags(flags);
                        Ok(Outcome::ret(flags.bits() as i64))
                    }
                }
            }
            Syscall::Stat { path } => {
                let view = process.view().await;
                let info = view.stat(&path).await.map_err(fs_errno)?;
                Ok(Outcome::ret(0).with_value(stat_value(kind_mode(info.kind), info.size)))
            }
            Syscall::Fstat { fd } => {
                let entry = process.fd(fd)?;
                let (mode, size) = entry.stat();
                Ok(Outcome::ret(0).with_value(stat_value(mode, size)))
            }
            Syscall::Chdir { path } => {
                let view = process.view().await;
                let wd = view.resolve_dir(&path).await.map_err(fs_errno)?;
                process.set_wd(wd).await;
                // Falls through into getwd: the reply carries the new
                // working directory.
                let view = process.view().await;
                Ok(Outcome::ret(0).with_buf(view.wd_string().into_bytes()))
            }
            Syscall::Getwd => {
                let view = process.view().await;
                Ok(Outcome::ret(0).with_buf(view.wd_string().into_bytes()))
            }
            Syscall::Readdir { path } => {
                let view = process.view().await;
                let names = view.read_dir(&path).await.map_err(fs_errno)?;
                Ok(Outcome::ret(names.len() as i64).with_value(json!(names)))
            }
            Syscall::Dial {
                network,
                address,
                timeout_ns,
            } => {
                let proxy = self.controls.ws_proxy();
                let conn = core_wsproxy::client::dial(
                    &proxy,
                    &network,
                    &address,
                    Duration::from_nanos(timeout_ns),
                )
                .await
                .map_err(proxy_errno)?;
                let fd = process.install_fd(FdEntry::new(Handle::Conn(Arc::new(conn))));
                Ok(Outcome::ret(fd as i64))
            }
            Syscall::Spawn { argv, fds } => {
                let pid = self.spawn_process(process, argv, &fds).await?;
                Ok(Outcome::ret(pid as i64))
            }
            Syscall::Wait { pid } => {
                let target = self.procs.get(pid)?;
                let code = target.wait().await;
                Ok(Outcome::ret(code as i64))
            }
            Syscall::Exit { code } => {
                process.exit(code);
                Ok(Outcome::ret(0))
            }
            Syscall::Sysctl { name, value } => {
                let current = match value {
                    Some(value) => self.controls.set(&name, &value)?,
                    None => self.controls.get(&name)?,
                };
                Ok(Outcome::ret(0).with_buf(current.to_string().into_bytes()))
            }
        }
    }
}

fn call_name(call: &Syscall) -> &'static str {
    match call {
        Syscall::Open { .. } => "open",
        Syscall::Close { .. } => "close",
        Syscall::Read { .. } => "read",
        Syscall::Write { .. } => "write",
        Syscall::Ioctl { .. } => "ioctl",
        Syscall::Stat { .. } => "stat",
        Syscall::Fstat { .. } => "fstat",
        Syscall::Chdir { .. } => "chdir",
        Syscall::Getwd => "getwd",
        Syscall::Readdir { .. } => "readdir",
        Syscall::Dial { .. } => "dial",
        Syscall::Spawn { .. } => "spawn",
        Syscall::Wait { .. } => "wait",
        Syscall::Exit { .. } => "exit",
        Syscall::Sysctl { .. } => "sysctl",
    }
}

fn kind_mode(kind: FileKind) -> u32 {
    match kind {
        FileKind::File => stat::S_IFREG,
        FileKind::Directory => stat::S_IFDIR,
    }
}

fn stat_value(mode: u32, size: u64) -> Value {
    json!({ "mode": mode, "size": size })
}

/// Collapse filesystem errors into the wire vocabulary; the message
/// is logged here and then discarded.
fn fs_errno(error: core_fs::FsError) -> Errno {
    debug!(target: "kernel.syscall", %error, "fs_error");
    match error {
        core_fs::FsError::NotFound(_) | core_fs::FsError::Store(_) => Errno::Enoent,
        _ => Errno::Einval,
    }
}

fn proxy_errno(error: ProxyError) -> Errno {
    debug!(target: "kernel.syscall", %error, "dial_error");
    match error {
        ProxyError::UnsupportedNetwork(_) | ProxyError::Wire(_) => Errno::Einval,
        _ => Errno::Enoent,
    }
}
