//! Stream-framed WebSocket↔TCP proxy protocol.
//!
//! The browser has no TCP stack, so outbound connections tunnel
//! through a WebSocket to a host-side proxy: one length-prefixed
//! [`wire::Dial`] frame out, one [`wire::Status`] frame back, then a
//! plain bidirectional byte relay. [`client`] is the in-browser end
//! the kernel's `dial` syscall uses; [`server`] is the daemon end.

pub mod client;
pub mod server;
pub mod wire;

pub use client::Conn;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The remote proxy reported a failed dial; the message travels
    /// verbatim.
    #[error("{0}")]
    Remote(String),
    #[error("websocket transport: {0}")]
    Transport(String),
    #[error("connection closed before dial status")]
    ClosedBeforeStatus,
    #[error("malformed proxy frame: {0}")]
    Wire(&'static str),
    #[error("unsupported network {0:?}")]
    UnsupportedNetwork(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    /// A TCP peer that echoes everything back.
    async fn spawn_echo_server() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
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

    /// A real proxy instance on a loopback port.
    async fn spawn_proxy() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener));
        addr.to_string()
    }

    #[tokio::test]
    async fn dial_and_echo_round_trip() {
        let echo = spawn_echo_server().await;
        let proxy = spawn_proxy().await;

        let conn = client::dial(&proxy, "tcp", &echo.to_string(), Duration::from_secs(5))
            .await
            .expect("dial failed");

        conn.write(b"ping over the tunnel").await.unwrap();
        let mut buf = [0u8; 64];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping over the tunnel");
        conn.close().await;
    }

    #[tokio::test]
    async fn read_hands_out_callers_chunk_size() {
        let echo = spawn_echo_server().await;
        let proxy = spawn_proxy().await;
        let conn = client::dial(&proxy, "tcp", &echo.to_string(), Duration::from_secs(5))
            .await
            .unwrap();

        conn.write(b"abcdef").await.unwrap();
        let mut chunk = [0u8; 2];
        let mut got = Vec::new();
        while got.len() < 6 {
            let n = conn.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            got.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(got, b"abcdef");
    }

    #[tokio::test]
    async fn failed_dial_surfaces_proxy_error_string() {
        // A fake proxy that always refuses.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Consume the dial frame, then refuse.
            let _ = ws.next().await;
            let status = wire::Status::failed("connection refused");
            ws.send(Message::binary(status.encode())).await.unwrap();
            let _ = ws.close(None).await;
        });

        let err = client::dial(&addr, "tcp", "10.0.0.1:9", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn refused_tcp_target_fails_the_dial() {
        let proxy = spawn_proxy().await;
        // A port we just bound and dropped: nothing listens there.
        let dead = {
            let sock = TcpListener::bind("127.0.0.1:0").await.unwrap();
            sock.local_addr().unwrap().to_string()
        };
        let result = client::dial(&proxy, "tcp", &dead, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProxyError::Remote(_))));
    }

    #[tokio::test]
    async fn close_before_status_aborts_dial() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let err = client::dial(&addr, "tcp", "10.0.0.1:9", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::ClosedBeforeStatus));
    }

    #[tokio::test]
    async fn non_tcp_network_is_rejected() {
        let err = client::dial("127.0.0.1:1", "udp", "x:1", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedNetwork(_)));
    }

    #[tokio::test]
    async fn wrong_path_is_rejected() {
        let proxy = spawn_proxy().await;
        let url = format!("ws://{proxy}/other");
        let result = tokio_tungstenite::connect_async(url.as_str()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn peer_close_reads_as_eof() {
        // Echo server that closes after the first exchange.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
            // Dropping the stream closes the TCP side.
        });

        let proxy = spawn_proxy().await;
        let conn = client::dial(&proxy, "tcp", &target, Duration::from_secs(5))
            .await
            .unwrap();
        conn.write(b"bye").await.unwrap();
        let mut buf = [0u8; 8];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"bye");
        // The relay tears down after the peer closes; EOF follows.
        assert_eq!(conn.read(&mut buf).await.unwrap(), 0);
    }
}
