//! Host side of the proxy: accept the upgrade on `/proxy`, perform
//! the TCP dial, report a status, then relay bytes both ways until
//! either side gives up.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tracing::{debug, info, warn};

use crate::wire::{Dial, Status};
use crate::ProxyError;

const RELAY_BUF: usize = 4096;

/// Accept loop. Each connection gets its own task; a bad one never
/// takes the listener down.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    info!(target: "proxy.serve", addr = %listener.local_addr()?, "listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer).await {
                warn!(target: "proxy.serve", %peer, error = %e, "connection_failed");
            }
        });
    }
}

pub async fn handle_connection(stream: TcpStream, peer: SocketAddr) -> Result<(), ProxyError> {
    let ws = accept_hdr_async(stream, check_path)
        .await
        .map_err(|e| ProxyError::Transport(e.to_string()))?;
    debug!(target: "proxy.serve", %peer, "upgraded");

    let mut ws = ws;
    let dial = match read_dial(&mut ws).await? {
        Some(dial) => dial,
        None => return Ok(()), // closed before dialing
    };

    let connect = TcpStream::connect(&dial.address);
    let tcp = match dial.timeout() {
        Some(limit) => match tokio::time::timeout(limit, connect).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "dial timed out",
            )),
        },
        None => connect.await,
    };

    let tcp = match tcp {
        Ok(tcp) => tcp,
        Err(e) => {
            debug!(target: "proxy.serve", address = %dial.address, error = %e, "dial_failed");
            let status = Status::failed(&e.to_string());
            let _ = ws.send(Message::binary(status.encode())).await;
            let _ = ws.close(None).await;
            return Ok(());
        }
    };

    ws.send(Message::binary(Status::ok().encode()))
        .await
        .map_err(|e| ProxyError::Transport(e.to_string()))?;
    info!(target: "proxy.serve", %peer, address = %dial.address, "relaying");

    relay(ws, tcp).await;
    Ok(())
}

fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == "/proxy" {
        Ok(response)
    } else {
        let mut refused = ErrorResponse::new(Some("not found".into()));
        *refused.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::NOT_FOUND;
        Err(refused)
    }
}

async fn read_dial(
    ws: &mut WebSocketStream<TcpStream>,
) -> Result<Option<Dial>, ProxyError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => return Dial::decode(&data).map(Some),
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ProxyError::Transport(e.to_string())),
        }
    }
}

/// Pump TCP→WS and WS→TCP until either direction ends; dropping the
/// halves tears the other direction down with it.
async fn relay(ws: WebSocketStream<TcpStream>, tcp: TcpStream) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (mut tcp_rx, mut tcp_tx) = tcp.into_split();

    let tcp_to_ws = async {
        let mut buf = [0u8; RELAY_BUF];
        loop {
            match tcp_rx.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if ws_tx.send(Message::binary(buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    };

    let ws_to_tcp = async {
        while let Some(message) = ws_rx.next().await {
            let payload = match message {
                Ok(Message::Binary(data)) => data.to_vec(),
                Ok(Message::Text(text)) => text.as_bytes().to_vec(),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            if tcp_tx.write_all(&payload).await.is_err() {
                break;
            }
        }
        let _ = tcp_tx.shutdown().await;
    };

    tokio::select! {
        () = tcp_to_ws => {}
        () = ws_to_tcp => {}
    }
    debug!(target: "proxy.serve", "relay_done");
}
