//! A worker launcher for hosts without a real sandbox: programs are
//! registered async functions run on their own tokio task. The
//! conceptual isolation of the sandbox boundary stays intact because
//! programs only ever receive a [`Sys`] client, never kernel state.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use core_sys::{Errno, Sys};
use tracing::debug;

use crate::launch::{LaunchSpec, ProgramStore, WorkerLauncher};

pub type ProgramFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type ProgramFn = Arc<dyn Fn(Sys, Vec<String>) -> ProgramFuture + Send + Sync>;

#[derive(Default)]
pub struct NativeRegistry {
    programs: Mutex<HashMap<String, ProgramFn>>,
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRegistry").finish_non_exhaustive()
    }
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, name: &str, program: F)
    where
        F: Fn(Sys, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.programs.lock().unwrap().insert(
            name.to_string(),
            Arc::new(move |sys, argv| Box::pin(program(sys, argv))),
        );
    }

    fn lookup(&self, name: &str) -> Option<ProgramFn> {
        self.programs.lock().unwrap().get(name).cloned()
    }
}

impl WorkerLauncher for NativeRegistry {
    fn launch(&self, spec: LaunchSpec) -> Result<(), Errno> {
        let program = self.lookup(&spec.argv[0]).ok_or(Errno::Enoent)?;
        let sys = Sys::new(spec.syscalls.clone());
        debug!(target: "kernel.native", pid = spec.pid, name = %spec.argv[0], "launch");
        tokio::spawn(async move {
            let result = program(sys, spec.argv).await;
            let _ = spec.completion.send(result);
        });
        Ok(())
    }
}

#[async_trait]
impl ProgramStore for NativeRegistry {
    /// Native programs have no image; an empty one satisfies the
    /// fetch-before-launch contract.
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, Errno> {
        if self.lookup(name).is_some() {
            Ok(Vec::new())
        } else {
            Err(Errno::Enoent)
        }
    }
}
