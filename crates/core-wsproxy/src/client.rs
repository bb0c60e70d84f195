//! In-browser side of the proxy: dial through the WebSocket and get a
//! byte-stream connection back.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::wire::{Dial, Status};
use crate::ProxyError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a proxied TCP connection to `address` via the proxy at
/// `proxy` (host:port). Any error or close before the first status
/// frame aborts the dial; a failed status surfaces its error string
/// verbatim.
pub async fn dial(
    proxy: &str,
    network: &str,
    address: &str,
    timeout: Duration,
) -> Result<Conn, ProxyError> {
    if network != "tcp" {
        return Err(ProxyError::UnsupportedNetwork(network.to_string()));
    }
    let url = format!("ws://{proxy}/proxy");
    debug!(target: "proxy.dial", %url, address, "connecting");

    let (ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| ProxyError::Transport(e.to_string()))?;
    let (mut writer, mut reader) = ws.split();

    writer
        .send(Message::binary(Dial::new(address, timeout).encode()))
        .await
        .map_err(|e| ProxyError::Transport(e.to_string()))?;

    loop {
        match reader.next().await {
            Some(Ok(Message::Binary(data))) => {
                let status = Status::decode(&data)?;
                if status.success {
                    debug!(target: "proxy.dial", address, "established");
                    return Ok(Conn::new(writer, reader));
                }
                let _ = writer.close().await;
                return Err(ProxyError::Remote(status.error));
            }
            Some(Ok(Message::Close(_))) | None => return Err(ProxyError::ClosedBeforeStatus),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ProxyError::Transport(e.to_string())),
        }
    }
}

/// A proxied byte stream. Reads buffer whole frame payloads and hand
/// them out in caller-sized chunks; a clean close reads as EOF.
pub struct Conn {
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: Mutex<ConnReader>,
}

struct ConnReader {
    stream: SplitStream<WsStream>,
    pending: Vec<u8>,
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn").finish_non_exhaustive()
    }
}

impl Conn {
    fn new(writer: SplitSink<WsStream, Message>, stream: SplitStream<WsStream>) -> Self {
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(ConnReader {
                stream,
                pending: Vec::new(),
            }),
        }
    }

    /// Read up to `buf.len()` bytes; 0 means the peer closed cleanly.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, ProxyError> {
        let mut reader = self.reader.lock().await;
        while reader.pending.is_empty() {
            match reader.stream.next().await {
                Some(Ok(Message::Binary(data))) => reader.pending = data.to_vec(),
                Some(Ok(Message::Text(text))) => reader.pending = text.as_bytes().to_vec(),
                Some(Ok(Message::Close(_))) | None => return Ok(0),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ProxyError::Transport(e.to_string())),
            }
        }
        let n = reader.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&reader.pending[..n]);
        reader.pending.drain(..n);
        Ok(n)
    }

    pub async fn write(&self, data: &[u8]) -> Result<usize, ProxyError> {
        self.writer
            .lock()
            .await
            .send(Message::binary(data.to_vec()))
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;
        Ok(data.len())
    }

    pub async fn close(&self) {
        let _ = self.writer.lock().await.close().await;
    }
}
