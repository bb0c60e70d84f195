//! The network path end to end: worker dial syscall through the
//! kernel and the WebSocket proxy to a TCP peer, and back.

use std::sync::Arc;
use std::time::Duration;

use core_display::NullSink;
use core_fs::{TreeBuilder, Zone};
use core_kernel::native::NativeRegistry;
use core_kernel::{Controls, Errno, Kernel, WS_PROXY};
use core_sys::Sys;
use core_tty::Console;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

async fn spawn_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok(n) = stream.read(&mut buf).await {
                    if n == 0 || stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

async fn spawn_proxy() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(core_wsproxy::server::serve(listener));
    addr
}

/// A TCP peer that prints a banner and hangs up.
async fn spawn_banner_server(banner: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(banner).await;
        }
    });
    addr
}

async fn kernel_session(proxy: &str) -> Sys {
    let mut tree = TreeBuilder::new();
    let root = tree.dir(vec![]);
    let (store, head) = tree.snapshot(root);
    let zone = Arc::new(
        Zone::open(Arc::new(store) as Arc<dyn core_fs::ElementStore>, &head)
            .await
            .unwrap(),
    );

    let controls = Arc::new(Controls::new());
    controls.set_str(WS_PROXY, proxy);

    let registry = Arc::new(NativeRegistry::new());
    let console = Arc::new(Console::new(80, 24, Box::new(NullSink)));
    let kernel = Kernel::new(console, zone, registry.clone(), registry, controls);

    let session = kernel.create_console_process();
    let (tx, rx) = mpsc::channel(16);
    kernel.attach_worker(session, rx);
    Sys::new(tx)
}

#[tokio::test]
async fn dial_syscall_tunnels_bytes_both_ways() {
    let echo = spawn_echo_server().await;
    let proxy = spawn_proxy().await;
    let sys = kernel_session(&proxy).await;

    let fd = sys
        .dial("tcp", &echo, Duration::from_secs(5))
        .await
        .expect("dial failed");
    assert_eq!(fd, 3, "first allocated fd");

    sys.write_all(fd, b"over the tunnel").await.unwrap();
    let mut buf = [0u8; 64];
    let n = sys.read(fd, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"over the tunnel");

    sys.close(fd).await.unwrap();
    // The slot is gone once closed.
    let err = sys.write(fd, b"x").await.unwrap_err();
    assert_eq!(err.errno(), Some(Errno::Ebadf));
}

#[tokio::test]
async fn dial_failure_collapses_to_enoent() {
    let proxy = spawn_proxy().await;
    let sys = kernel_session(&proxy).await;

    // Bind-and-drop: nothing listens on this port.
    let dead = {
        let sock = TcpListener::bind("127.0.0.1:0").await.unwrap();
        sock.local_addr().unwrap().to_string()
    };
    let err = sys
        .dial("tcp", &dead, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.errno(), Some(Errno::Enoent));
}

#[tokio::test]
async fn telnet_relays_a_banner_session() {
    let banner = spawn_banner_server(b"hello from the wire\r\n").await;
    let proxy = spawn_proxy().await;

    let mut tree = TreeBuilder::new();
    let root = tree.dir(vec![]);
    let (store, head) = tree.snapshot(root);
    let zone = Arc::new(
        Zone::open(Arc::new(store) as Arc<dyn core_fs::ElementStore>, &head)
            .await
            .unwrap(),
    );
    let controls = Arc::new(Controls::new());
    controls.set_str(WS_PROXY, &proxy);

    let registry = Arc::new(NativeRegistry::new());
    registry.register("telnet", userland::telnet::run);

    let console = Arc::new(Console::new(80, 24, Box::new(NullSink)));
    let kernel = Kernel::new(console.clone(), zone, registry.clone(), registry, controls);

    let session = kernel.create_console_process();
    let argv = vec!["telnet".to_string(), banner];
    let code = tokio::time::timeout(
        Duration::from_secs(5),
        kernel.run_child(&session, argv, &[0, 1, 2]),
    )
    .await
    .expect("telnet session hung")
    .expect("telnet failed to spawn");
    assert_eq!(code, 0);

    let rows: Vec<String> = (0..24)
        .map(|y| console.row_text(y).trim_end().to_string())
        .collect();
    assert!(
        rows.iter().any(|r| r == "hello from the wire"),
        "banner missing: {rows:?}"
    );
    assert!(rows.iter().any(|r| r == "Connection closed."));
}

#[tokio::test]
async fn non_tcp_network_is_einval() {
    let proxy = spawn_proxy().await;
    let sys = kernel_session(&proxy).await;
    let err = sys
        .dial("udp", "example.com:53", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.errno(), Some(Errno::Einval));
}
