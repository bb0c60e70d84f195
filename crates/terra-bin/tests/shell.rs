//! End-to-end: boot the kernel with the real shell on a headless
//! console, type at it, and read the screen.

use std::sync::Arc;
use std::time::Duration;

use core_display::NullSink;
use core_fs::{TreeBuilder, Zone};
use core_kernel::native::NativeRegistry;
use core_kernel::{Controls, Kernel, KernelError};
use core_tty::{Console, KeyKind};
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct World {
    console: Arc<Console>,
    run: JoinHandle<Result<(), KernelError>>,
}

async fn boot() -> World {
    boot_with(|_| {}).await
}

async fn boot_with(extra: impl FnOnce(&NativeRegistry)) -> World {
    let mut tree = TreeBuilder::new();
    let motd = tree.file(b"Welcome to Terrarium.\n\n");
    let etc = tree.dir(vec![("motd", motd)]);
    let guide = tree.file(b"content-addressed worlds are calm\n");
    let docs = tree.dir(vec![("guide.txt", guide)]);
    let readme = tree.file(b"hi\n");
    let root = tree.dir(vec![("README", readme), ("docs", docs), ("etc", etc)]);
    let (store, head) = tree.snapshot(root);
    let zone = Arc::new(
        Zone::open(Arc::new(store) as Arc<dyn core_fs::ElementStore>, &head)
            .await
            .expect("zone open failed"),
    );

    let registry = Arc::new(NativeRegistry::new());
    registry.register("sh", userland::sh::run);
    registry.register("echo", userland::echo::run);
    extra(&registry);

    let console = Arc::new(Console::new(80, 24, Box::new(NullSink)));
    let kernel = Kernel::new(
        console.clone(),
        zone,
        registry.clone(),
        registry,
        Arc::new(Controls::new()),
    );

    let run = {
        let kernel = kernel.clone();
        tokio::spawn(async move { kernel.run().await })
    };
    World { console, run }
}

fn screen(console: &Console) -> Vec<String> {
    (0..24)
        .map(|y| console.row_text(y).trim_end().to_string())
        .collect()
}

fn prompt_count(console: &Console) -> usize {
    screen(console)
        .iter()
        .filter(|row| row.starts_with("terra ") && row.contains(" $"))
        .count()
}

/// Poll the display until `pred` holds; panics with the screen dump
/// on timeout.
async fn wait_for(console: &Console, what: &str, pred: impl Fn(&Console) -> bool) {
    for _ in 0..500 {
        if pred(console) {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}; screen:\n{:#?}", screen(console));
}

async fn type_line(console: &Console, text: &str) {
    for ch in text.chars() {
        console.on_key(KeyKind::Code, ch);
    }
    console.on_key(KeyKind::Enter, '\0');
}

#[tokio::test]
async fn boots_to_motd_and_prompt() {
    let world = boot().await;
    wait_for(&world.console, "first prompt", |c| prompt_count(c) >= 1).await;
    let rows = screen(&world.console);
    assert_eq!(rows[0], "Welcome to Terrarium.");
    assert!(rows.iter().any(|r| r.starts_with("terra / $")));
    world.run.abort();
}

#[tokio::test]
async fn echo_builtin_prints_and_reprompts() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    type_line(&world.console, "echo hello world").await;
    wait_for(&world.console, "echo output", |c| {
        screen(c).iter().any(|r| r == "hello world") && prompt_count(c) >= 2
    })
    .await;

    // The typed command was echoed onto the prompt row.
    assert!(
        screen(&world.console)
            .iter()
            .any(|r| r.ends_with("$ echo hello world"))
    );
    world.run.abort();
}

#[tokio::test]
async fn cd_changes_prompt_and_pwd() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    type_line(&world.console, "cd docs").await;
    wait_for(&world.console, "docs prompt", |c| {
        screen(c).iter().any(|r| r.starts_with("terra docs $"))
    })
    .await;

    type_line(&world.console, "pwd").await;
    wait_for(&world.console, "pwd output", |c| {
        screen(c).iter().any(|r| r == "/docs")
    })
    .await;
    world.run.abort();
}

#[tokio::test]
async fn ls_tabulates_root_entries() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    type_line(&world.console, "ls /").await;
    wait_for(&world.console, "listing", |c| {
        screen(c)
            .iter()
            .any(|r| r.contains("README") && r.contains("docs") && r.contains("etc"))
    })
    .await;
    world.run.abort();
}

#[tokio::test]
async fn cat_streams_file_contents() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    type_line(&world.console, "cat /docs/guide.txt").await;
    wait_for(&world.console, "file contents", |c| {
        screen(c)
            .iter()
            .any(|r| r == "content-addressed worlds are calm")
    })
    .await;
    world.run.abort();
}

#[tokio::test]
async fn tab_completion_finishes_the_path() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    for ch in "cat /docs/gu".chars() {
        world.console.on_key(KeyKind::Code, ch);
    }
    world.console.on_key(KeyKind::Code, '\t');
    wait_for(&world.console, "completed line", |c| {
        screen(c).iter().any(|r| r.ends_with("cat /docs/guide.txt"))
    })
    .await;

    world.console.on_key(KeyKind::Enter, '\0');
    wait_for(&world.console, "file contents", |c| {
        screen(c)
            .iter()
            .any(|r| r == "content-addressed worlds are calm")
    })
    .await;
    world.run.abort();
}

#[tokio::test]
async fn unknown_command_reports_enoent() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    type_line(&world.console, "frobnicate").await;
    wait_for(&world.console, "error line", |c| {
        screen(c).iter().any(|r| r == "frobnicate: ENOENT")
    })
    .await;
    world.run.abort();
}

#[tokio::test]
async fn external_program_spawns_with_inherited_fds() {
    let world = boot_with(|registry| {
        registry.register("banner", |sys, _argv| async move {
            sys.write_all(1, b"from the worker\n")
                .await
                .map_err(|e| e.to_string())?;
            sys.exit(0).await.map_err(|e| e.to_string())
        });
        registry.register("fail", |sys, _argv| async move {
            sys.exit(3).await.map_err(|e| e.to_string())
        });
    })
    .await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    type_line(&world.console, "banner").await;
    wait_for(&world.console, "worker output", |c| {
        screen(c).iter().any(|r| r == "from the worker")
    })
    .await;

    type_line(&world.console, "fail").await;
    wait_for(&world.console, "exit report", |c| {
        screen(c).iter().any(|r| r == "fail: exit 3")
    })
    .await;
    world.run.abort();
}

#[tokio::test]
async fn line_editing_fixes_a_typo() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    // Type "ecko hi", then back up and fix the 'k'.
    for ch in "ecko hi".chars() {
        world.console.on_key(KeyKind::Code, ch);
    }
    for _ in 0..4 {
        world.console.on_key(KeyKind::CursorLeft, '\0');
    }
    world.console.on_key(KeyKind::Code, '\u{7f}');
    world.console.on_key(KeyKind::Code, 'h');
    world.console.on_key(KeyKind::Enter, '\0');

    wait_for(&world.console, "fixed command output", |c| {
        screen(c).iter().any(|r| r == "hi")
    })
    .await;
    world.run.abort();
}

#[tokio::test]
async fn sysctl_and_halt_power_the_kernel_down() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    type_line(&world.console, "sysctl kernel.power").await;
    wait_for(&world.console, "sysctl output", |c| {
        screen(c).iter().any(|r| r == "kernel.power=1")
    })
    .await;

    type_line(&world.console, "halt").await;
    let result = tokio::time::timeout(Duration::from_secs(2), world.run)
        .await
        .expect("kernel did not halt")
        .expect("run task panicked");
    assert!(result.is_ok());

    let rows = screen(&world.console);
    assert!(
        rows.iter().any(|r| r == "System shutting down..."),
        "missing shutdown notice: {rows:?}"
    );
    assert!(
        rows.iter().any(|r| r == "System halted."),
        "missing halt banner: {rows:?}"
    );
}

#[tokio::test]
async fn exit_respawns_a_fresh_shell() {
    let world = boot().await;
    wait_for(&world.console, "prompt", |c| prompt_count(c) >= 1).await;

    type_line(&world.console, "exit").await;
    // The bootstrap loop prints the motd again and restarts sh.
    wait_for(&world.console, "respawned shell", |c| prompt_count(c) >= 2).await;
    world.run.abort();
}
