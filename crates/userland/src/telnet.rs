//! `telnet`: a raw byte relay between the terminal and a proxied TCP
//! connection. The keyboard side runs the TTY without ICANON so every
//! keystroke goes to the peer; the session ends when either side
//! closes.

use std::time::Duration;

use core_sys::{Sys, SysError, tty};
use tracing::debug;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(sys: Sys, argv: Vec<String>) -> Result<(), String> {
    let code = match session(&sys, &argv).await {
        Ok(code) => code,
        Err(e) => {
            let _ = sys.write_all(2, format!("telnet: {e}\n").as_bytes()).await;
            1
        }
    };
    sys.exit(code).await.map_err(|e| e.to_string())
}

async fn session(sys: &Sys, argv: &[String]) -> Result<i32, SysError> {
    let Some(target) = argv.get(1) else {
        sys.write_all(2, b"Usage: telnet host:port\n").await?;
        return Ok(1);
    };

    sys.write_all(1, format!("Connecting to {target}...\n").as_bytes())
        .await?;
    let conn = sys.dial("tcp", target, DIAL_TIMEOUT).await?;

    let saved = sys.get_flags(0).await?;
    sys.set_flags(0, saved & !(tty::ICANON | tty::ECHO)).await?;
    let result = relay(sys, conn).await;
    sys.set_flags(0, saved).await?;
    sys.close(conn).await?;
    sys.write_all(1, b"Connection closed.\n").await?;
    result?;
    Ok(0)
}

/// Pump keyboard→peer and peer→screen until either side ends.
async fn relay(sys: &Sys, conn: i32) -> Result<(), SysError> {
    let keyboard = {
        let sys = sys.clone();
        async move {
            let mut buf = [0u8; 256];
            loop {
                let n = sys.read(0, &mut buf).await?;
                if n == 0 {
                    return Ok::<(), SysError>(());
                }
                sys.write_all(conn, &buf[..n]).await?;
            }
        }
    };
    let peer = {
        let sys = sys.clone();
        async move {
            let mut buf = [0u8; 1024];
            loop {
                let n = sys.read(conn, &mut buf).await?;
                if n == 0 {
                    return Ok::<(), SysError>(());
                }
                sys.write_all(1, &buf[..n]).await?;
            }
        }
    };

    let result = tokio::select! {
        r = keyboard => r,
        r = peer => r,
    };
    debug!(target: "telnet", ok = result.is_ok(), "relay_done");
    result
}
