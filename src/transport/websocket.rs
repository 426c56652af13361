//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WebSocketTransport::connect`] splits the socket into a writer task fed
//! by an unbounded channel and a reader task that only watches for close and
//! logs text traffic.  Either task going away flips the transport closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::Transport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// Client socket.  Must be created inside a tokio runtime.
pub struct WebSocketTransport {
    open: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Message>,
}

impl WebSocketTransport {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|source| TransportError::Connect {
                url: url.to_string(),
                source,
            })?;
        log::info!("transport: connected to {url}");

        let (mut sink, mut stream) = socket.split();
        let open = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    log::warn!("transport: write failed: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
            writer_open.store(false, Ordering::SeqCst);
            let _ = sink.close().await;
        });

        let reader_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => log::debug!("transport: <- {text}"),
                    Ok(Message::Close(frame)) => {
                        log::info!("transport: closed by peer ({frame:?})");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("transport: read failed: {e}");
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
        });

        Ok(Self { open, tx })
    }

    /// Send a close frame; the transport reports closed from now on.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Message::Close(None));
    }
}

impl Transport for WebSocketTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn send(&self, frame: Vec<u8>) {
        if self.tx.send(Message::Binary(frame)).is_err() {
            self.open.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_unreachable_host_fails() {
        // Port 9 (discard) on localhost is closed on test machines.
        let err = WebSocketTransport::connect("ws://127.0.0.1:9/satellite")
            .await
            .err()
            .expect("connect should fail");
        assert!(err.to_string().contains("127.0.0.1:9"), "{err}");
    }

    #[tokio::test]
    async fn round_trip_against_local_server() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
            match ws.next().await {
                Some(Ok(Message::Binary(bytes))) => bytes,
                other => panic!("unexpected message: {other:?}"),
            }
        });

        let transport = WebSocketTransport::connect(&format!("ws://{addr}"))
            .await
            .expect("connect");
        assert!(transport.is_open());
        transport.send(vec![3, 0x00, 0x00]);

        assert_eq!(server.await.expect("server task"), vec![3, 0x00, 0x00]);
        transport.close();
        assert!(!transport.is_open());
    }
}
