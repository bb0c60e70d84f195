//! The seam to the host sandbox launcher.
//!
//! The kernel fetches a program image, wires a syscall channel, and
//! hands both to the host [`WorkerLauncher`]. The completion sender
//! doubles as the error reporter: resolving it with `Err` (or just
//! dropping it) marks the worker faulted, and the kernel's supervisor
//! latches a non-zero exit for workers that never called `exit`.

use async_trait::async_trait;
use core_sys::{Errno, SyscallSender};
use tokio::sync::oneshot;

use crate::process::Pid;

/// Why a worker stopped, from the launcher's point of view.
pub type WorkerOutcome = Result<(), String>;

#[derive(Debug)]
pub struct LaunchSpec {
    pub pid: Pid,
    pub argv: Vec<String>,
    /// The sandboxed program image. A native launcher running
    /// registered built-ins may ignore it.
    pub image: Vec<u8>,
    /// Where the worker's syscalls go.
    pub syscalls: SyscallSender,
    pub completion: oneshot::Sender<WorkerOutcome>,
}

/// Host-provided: start an isolated worker for the given spec.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, spec: LaunchSpec) -> Result<(), Errno>;
}

/// Host-provided: resolve a program name to its image bytes.
#[async_trait]
pub trait ProgramStore: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, Errno>;
}
