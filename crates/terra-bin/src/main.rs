//! Terrarium's native harness: boots the kernel against a real
//! terminal, with worker programs running as local tasks. The same
//! kernel runs in the browser behind a canvas and wasm sandboxes;
//! this binary exists for development, testing, and the fun of it.

mod input;
mod render;
mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use core_fs::{ElementId, ElementStore, HttpStore, Zone};
use core_kernel::native::NativeRegistry;
use core_kernel::{Controls, FS_ROOT, FS_ZONE, Kernel, WS_PROXY};
use core_tty::Console;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use render::{CrosstermRenderer, TerminalGuard};

#[derive(Parser, Debug)]
#[command(name = "terra", version, about = "Terrarium micro-OS, native harness")]
struct Args {
    /// HTTP root of a content-addressed tree. Defaults to a built-in
    /// in-memory filesystem.
    #[arg(long)]
    fs_root: Option<String>,
    /// Head element ID of the zone under --fs-root.
    #[arg(long)]
    fs_zone: Option<String>,
    /// WebSocket proxy for outbound connections (host:port).
    #[arg(long, default_value = "localhost:8100")]
    ws_proxy: String,
    /// Log file path. The terminal belongs to the console, so logs
    /// never go to stderr.
    #[arg(long, default_value = "terra.log")]
    log_file: PathBuf,
}

fn configure_logging(path: &PathBuf) -> Result<WorkerGuard> {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let file = path.file_name().context("log file needs a name")?;
    let appender =
        tracing_appender::rolling::never(dir.unwrap_or(std::path::Path::new(".")), file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn install_panic_hook() {
    let default = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        TerminalGuard::restore();
        default(info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging(&args.log_file)?;
    install_panic_hook();
    info!(target: "runtime", "startup");

    let (store, head): (Arc<dyn ElementStore>, ElementId) = match (&args.fs_root, &args.fs_zone) {
        (Some(root), Some(zone)) => (
            Arc::new(HttpStore::new(root)),
            ElementId::from(zone.as_str()),
        ),
        (Some(_), None) => bail!("--fs-zone is required with --fs-root"),
        (None, Some(_)) => bail!("--fs-root is required with --fs-zone"),
        (None, None) => seed::builtin_tree(),
    };
    let zone = Arc::new(
        Zone::open(store, &head)
            .await
            .context("opening filesystem zone")?,
    );

    let controls = Arc::new(Controls::new());
    controls.set_str(WS_PROXY, &args.ws_proxy);
    if let Some(root) = &args.fs_root {
        controls.set_str(FS_ROOT, root);
    }
    controls.set_str(FS_ZONE, head.as_str());

    let registry = Arc::new(NativeRegistry::new());
    registry.register("sh", userland::sh::run);
    registry.register("echo", userland::echo::run);
    registry.register("telnet", userland::telnet::run);

    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    let guard = TerminalGuard::enter()?;
    let console = Arc::new(Console::new(
        cols as usize,
        rows as usize,
        Box::new(CrosstermRenderer::new()),
    ));

    let kernel = Kernel::new(
        console.clone(),
        zone,
        registry.clone(),
        registry,
        controls,
    );
    let input_task = input::spawn_input_task(console.clone());

    let result = kernel.run().await;
    console.close();
    input_task.abort();
    drop(guard);
    info!(target: "runtime", ok = result.is_ok(), "shutdown");
    result.map_err(Into::into)
}
