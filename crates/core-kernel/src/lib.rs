//! The resident kernel: syscall broker, process supervision, file
//! descriptors, control variables, and the bootstrap loop.
//!
//! Worker programs run in host-provided sandboxes and reach the
//! kernel only through the message events of `core-sys`. The kernel
//! itself is event-driven: one router task per worker, one handler
//! task per inbound syscall, shared state behind short-lived locks.

mod broker;
mod control;
mod fd;
mod launch;
pub mod native;
mod process;
mod syscall;

pub use broker::Kernel;
pub use control::{CtlValue, Controls, FS_ROOT, FS_ZONE, KERNEL_POWER, WS_PROXY};
pub use core_sys::Errno;
pub use fd::{Fd, FdEntry, Handle};
pub use launch::{LaunchSpec, ProgramStore, WorkerLauncher, WorkerOutcome};
pub use process::{FdTable, Pid, Process, ProcessTable};
pub use syscall::{IoctlRequest, Syscall};

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("filesystem: {0}")]
    Fs(#[from] core_fs::FsError),
    #[error("{0}")]
    Sys(Errno),
}
